//! Flat price schema.
//!
//! One row per `(uuid, date, source, provider, price_type, finish)` with a
//! price and currency. Every provider normalizes to this shape before the
//! frames concatenate.

use mtgdb_common::types::{Finish, PriceSource, PriceType};
use mtgdb_common::{MtgdbError, Result};
use polars::prelude::*;

pub const PRICE_COLUMNS: &[&str] = &[
    "uuid",
    "date",
    "source",
    "provider",
    "price_type",
    "finish",
    "price",
    "currency",
];

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub uuid: String,
    pub date: String,
    pub source: PriceSource,
    pub provider: String,
    pub price_type: PriceType,
    pub finish: Finish,
    pub price: f64,
    pub currency: String,
}

/// Typed empty frame in the canonical schema.
pub fn empty_frame() -> DataFrame {
    let columns: Vec<Column> = vec![
        Series::new_empty("uuid".into(), &DataType::String).into_column(),
        Series::new_empty("date".into(), &DataType::String).into_column(),
        Series::new_empty("source".into(), &DataType::String).into_column(),
        Series::new_empty("provider".into(), &DataType::String).into_column(),
        Series::new_empty("price_type".into(), &DataType::String).into_column(),
        Series::new_empty("finish".into(), &DataType::String).into_column(),
        Series::new_empty("price".into(), &DataType::Float64).into_column(),
        Series::new_empty("currency".into(), &DataType::String).into_column(),
    ];
    DataFrame::new(columns).unwrap_or_default()
}

/// Rows into the canonical frame.
pub fn rows_to_frame(rows: &[PriceRow]) -> Result<DataFrame> {
    if rows.is_empty() {
        return Ok(empty_frame());
    }
    let df = df!(
        "uuid" => rows.iter().map(|r| r.uuid.clone()).collect::<Vec<_>>(),
        "date" => rows.iter().map(|r| r.date.clone()).collect::<Vec<_>>(),
        "source" => rows.iter().map(|r| r.source.to_string()).collect::<Vec<_>>(),
        "provider" => rows.iter().map(|r| r.provider.clone()).collect::<Vec<_>>(),
        "price_type" => rows.iter().map(|r| r.price_type.to_string()).collect::<Vec<_>>(),
        "finish" => rows.iter().map(|r| r.finish.to_string()).collect::<Vec<_>>(),
        "price" => rows.iter().map(|r| r.price).collect::<Vec<_>>(),
        "currency" => rows.iter().map(|r| r.currency.clone()).collect::<Vec<_>>(),
    )
    .map_err(MtgdbError::from)?;
    Ok(df)
}

/// Frame back into rows (writers iterate the flat shape).
pub fn frame_to_rows(df: &DataFrame) -> Result<Vec<PriceRow>> {
    let n = df.height();
    let get = |name: &str| -> Result<Vec<Option<String>>> {
        Ok(df
            .column(name)
            .map_err(MtgdbError::from)?
            .str()
            .map_err(MtgdbError::from)?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect())
    };
    let uuids = get("uuid")?;
    let dates = get("date")?;
    let sources = get("source")?;
    let providers = get("provider")?;
    let price_types = get("price_type")?;
    let finishes = get("finish")?;
    let currencies = get("currency")?;
    let prices: Vec<Option<f64>> = df
        .column("price")
        .map_err(MtgdbError::from)?
        .f64()
        .map_err(MtgdbError::from)?
        .into_iter()
        .collect();

    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let source = match sources[i].as_deref() {
            Some("mtgo") => PriceSource::Mtgo,
            _ => PriceSource::Paper,
        };
        let price_type = match price_types[i].as_deref() {
            Some("buylist") => PriceType::Buylist,
            _ => PriceType::Retail,
        };
        let finish = finishes[i]
            .as_deref()
            .and_then(|f| f.parse().ok())
            .unwrap_or(Finish::Normal);
        rows.push(PriceRow {
            uuid: uuids[i].clone().unwrap_or_default(),
            date: dates[i].clone().unwrap_or_default(),
            source,
            provider: providers[i].clone().unwrap_or_default(),
            price_type,
            finish,
            price: prices[i].unwrap_or(0.0),
            currency: currencies[i].clone().unwrap_or_else(|| "USD".to_string()),
        });
    }
    Ok(rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    pub fn row(uuid: &str, provider: &str, price: f64) -> PriceRow {
        PriceRow {
            uuid: uuid.to_string(),
            date: "2024-02-07".to_string(),
            source: PriceSource::Paper,
            provider: provider.to_string(),
            price_type: PriceType::Retail,
            finish: Finish::Normal,
            price,
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn rows_round_trip() {
        let rows = vec![row("u-1", "tcgplayer", 1.5), row("u-2", "cardkingdom", 0.25)];
        let df = rows_to_frame(&rows).unwrap();
        assert_eq!(df.height(), 2);
        let back = frame_to_rows(&df).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn empty_frame_has_schema() {
        let df = empty_frame();
        assert_eq!(df.width(), PRICE_COLUMNS.len());
        assert_eq!(df.height(), 0);
    }
}
