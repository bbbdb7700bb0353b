//! Retail+buylist provider (P5): USD, async fetch with a columnar cache.
//! The raw inventory frame is cached as parquet so a same-day rerun skips
//! the network.

use async_trait::async_trait;
use mtgdb_common::types::{Finish, PriceSource, PriceType};
use mtgdb_common::{MtgdbError, Result};
use polars::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::context::PriceContext;
use crate::schema::{self, PriceRow};

const RAW_CACHE_FILE: &str = "ck_raw.parquet";

/// Transport contract: the full inventory frame
/// `(scryfall_id, is_foil, is_etched, price_retail, price_buy)`.
#[async_trait]
pub trait CardkingdomFeed: Send + Sync {
    async fn inventory(&self) -> Result<DataFrame>;
}

pub struct CardkingdomProvider {
    feed: Arc<dyn CardkingdomFeed>,
}

impl CardkingdomProvider {
    pub fn new(feed: Arc<dyn CardkingdomFeed>) -> Self {
        Self { feed }
    }

    pub async fn fetch(
        &self,
        ctx: &PriceContext,
        today: &str,
        cache_dir: &Path,
    ) -> Result<DataFrame> {
        let cache_path = cache_dir.join(RAW_CACHE_FILE);
        let raw = if cache_path.exists() {
            debug!(path = %cache_path.display(), "using cached inventory");
            LazyFrame::scan_parquet(&cache_path, ScanArgsParquet::default())?.collect()?
        } else {
            let mut raw = self.feed.inventory().await?;
            if let Some(parent) = cache_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::File::create(&cache_path)?;
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Zstd(None))
                .finish(&mut raw)
                .map_err(MtgdbError::from)?;
            raw
        };
        schema::rows_to_frame(&normalize(&raw, ctx, today)?)
    }
}

pub fn normalize(df: &DataFrame, ctx: &PriceContext, today: &str) -> Result<Vec<PriceRow>> {
    let mut rows = Vec::new();
    if df.height() == 0 {
        return Ok(rows);
    }
    let ids = df
        .column("scryfall_id")
        .map_err(MtgdbError::from)?
        .str()
        .map_err(MtgdbError::from)?
        .clone();
    let bools = |name: &str| -> Result<Vec<Option<bool>>> {
        Ok(df
            .column(name)
            .map_err(MtgdbError::from)?
            .bool()
            .map_err(MtgdbError::from)?
            .into_iter()
            .collect())
    };
    let floats = |name: &str| -> Result<Vec<Option<f64>>> {
        let c = df
            .column(name)
            .map_err(MtgdbError::from)?
            .cast(&DataType::Float64)
            .map_err(MtgdbError::from)?;
        Ok(c.f64().map_err(MtgdbError::from)?.into_iter().collect())
    };
    let is_foil = bools("is_foil")?;
    let is_etched = bools("is_etched")?;
    let retail = floats("price_retail")?;
    let buylist = floats("price_buy")?;

    for i in 0..df.height() {
        let Some(id) = ids.get(i) else {
            continue;
        };
        let Some(uuids) = ctx.scryfall_to_uuid.get(id) else {
            continue;
        };
        let finish = if is_etched[i].unwrap_or(false) {
            Finish::Etched
        } else if is_foil[i].unwrap_or(false) {
            Finish::Foil
        } else {
            Finish::Normal
        };
        for uuid in uuids {
            if let Some(price) = retail[i] {
                rows.push(usd_row(uuid, today, PriceType::Retail, finish, price));
            }
            if let Some(price) = buylist[i] {
                rows.push(usd_row(uuid, today, PriceType::Buylist, finish, price));
            }
        }
    }
    Ok(rows)
}

fn usd_row(uuid: &str, today: &str, price_type: PriceType, finish: Finish, price: f64) -> PriceRow {
    PriceRow {
        uuid: uuid.to_string(),
        date: today.to_string(),
        source: PriceSource::Paper,
        provider: "cardkingdom".to_string(),
        price_type,
        finish,
        price,
        currency: "USD".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn finish_resolution_prefers_etched() {
        let ctx = PriceContext::from_pairs(&[], &[], &[], &[("sf-1", "u-1")]);
        let df = df!(
            "scryfall_id" => ["sf-1"],
            "is_foil" => [true],
            "is_etched" => [true],
            "price_retail" => [Some(3.0f64)],
            "price_buy" => [None::<f64>],
        )
        .unwrap();
        let rows = normalize(&df, &ctx, "2024-02-07").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].finish, Finish::Etched);
    }

    #[test]
    fn both_price_types_emit() {
        let ctx = PriceContext::from_pairs(&[], &[], &[], &[("sf-1", "u-1")]);
        let df = df!(
            "scryfall_id" => ["sf-1"],
            "is_foil" => [false],
            "is_etched" => [false],
            "price_retail" => [Some(1.0f64)],
            "price_buy" => [Some(0.4f64)],
        )
        .unwrap();
        let rows = normalize(&df, &ctx, "2024-02-07").unwrap();
        assert_eq!(rows.len(), 2);
    }
}
