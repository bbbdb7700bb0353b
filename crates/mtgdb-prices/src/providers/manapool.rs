//! Paper retailer (P3): retail USD via a single bulk endpoint. Prices
//! arrive in cents and convert to dollars during normalization.

use async_trait::async_trait;
use mtgdb_common::types::{Finish, PriceSource, PriceType};
use mtgdb_common::{MtgdbError, Result};
use polars::prelude::*;
use std::sync::Arc;

use crate::context::PriceContext;
use crate::schema::{self, PriceRow};

/// Transport contract: one bulk frame of
/// `(scryfall_id, finish, price_cents)`.
#[async_trait]
pub trait ManapoolFeed: Send + Sync {
    async fn bulk_prices(&self) -> Result<DataFrame>;
}

pub struct ManapoolProvider {
    feed: Arc<dyn ManapoolFeed>,
}

impl ManapoolProvider {
    pub fn new(feed: Arc<dyn ManapoolFeed>) -> Self {
        Self { feed }
    }

    pub async fn fetch(&self, ctx: &PriceContext, today: &str) -> Result<DataFrame> {
        let raw = self.feed.bulk_prices().await?;
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
    let finishes = df
        .column("finish")
        .map_err(MtgdbError::from)?
        .str()
        .map_err(MtgdbError::from)?
        .clone();
    let cents = df
        .column("price_cents")
        .map_err(MtgdbError::from)?
        .cast(&DataType::Int64)
        .map_err(MtgdbError::from)?;
    let cents = cents.i64().map_err(MtgdbError::from)?.clone();

    for i in 0..df.height() {
        let (Some(id), Some(cents)) = (ids.get(i), cents.get(i)) else {
            continue;
        };
        let Some(uuids) = ctx.scryfall_to_uuid.get(id) else {
            continue;
        };
        let finish: Finish = finishes.get(i).and_then(|f| f.parse().ok()).unwrap_or(Finish::Normal);
        for uuid in uuids {
            rows.push(PriceRow {
                uuid: uuid.clone(),
                date: today.to_string(),
                source: PriceSource::Paper,
                provider: "manapool".to_string(),
                price_type: PriceType::Retail,
                finish,
                price: cents as f64 / 100.0,
                currency: "USD".to_string(),
            });
        }
    }
    Ok(rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn cents_convert_to_dollars() {
        let ctx = PriceContext::from_pairs(&[], &[], &[], &[("sf-1", "u-1")]);
        let df = df!(
            "scryfall_id" => ["sf-1"],
            "finish" => ["normal"],
            "price_cents" => [150i64],
        )
        .unwrap();
        let rows = normalize(&df, &ctx, "2024-02-07").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price, 1.50);
        assert_eq!(rows[0].currency, "USD");
    }
}
