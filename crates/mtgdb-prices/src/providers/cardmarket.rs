//! EU marketplace (P4): retail and buylist in EUR. The API tolerates one
//! request per 1.5 s, so pages fetch sequentially with an enforced pause.

use async_trait::async_trait;
use mtgdb_common::types::{Finish, PriceSource, PriceType};
use mtgdb_common::{MtgdbError, Result};
use polars::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::context::PriceContext;
use crate::schema::{self, PriceRow};

/// Minimum spacing between requests.
pub const REQUEST_PACING: Duration = Duration::from_millis(1500);

/// Transport contract: page tokens, then one page of
/// `(scryfall_id, finish, retail_eur, buylist_eur)`.
#[async_trait]
pub trait CardmarketFeed: Send + Sync {
    async fn pages(&self) -> Result<Vec<String>>;
    async fn page_prices(&self, page: &str) -> Result<DataFrame>;
}

pub struct CardmarketProvider {
    feed: Arc<dyn CardmarketFeed>,
}

impl CardmarketProvider {
    pub fn new(feed: Arc<dyn CardmarketFeed>) -> Self {
        Self { feed }
    }

    pub async fn fetch(&self, ctx: &PriceContext, today: &str) -> Result<DataFrame> {
        let pages = self.feed.pages().await?;
        let mut rows = Vec::new();
        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(REQUEST_PACING).await;
            }
            let frame = self.feed.page_prices(page).await?;
            rows.extend(normalize_page(&frame, ctx, today)?);
        }
        schema::rows_to_frame(&rows)
    }
}

pub fn normalize_page(df: &DataFrame, ctx: &PriceContext, today: &str) -> Result<Vec<PriceRow>> {
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
    let retail = float_col(df, "retail_eur")?;
    let buylist = float_col(df, "buylist_eur")?;

    for i in 0..df.height() {
        let Some(id) = ids.get(i) else {
            continue;
        };
        let Some(uuids) = ctx.scryfall_to_uuid.get(id) else {
            continue;
        };
        let finish: Finish = finishes.get(i).and_then(|f| f.parse().ok()).unwrap_or(Finish::Normal);
        for uuid in uuids {
            if let Some(price) = retail[i] {
                rows.push(eur_row(uuid, today, PriceType::Retail, finish, price));
            }
            if let Some(price) = buylist[i] {
                rows.push(eur_row(uuid, today, PriceType::Buylist, finish, price));
            }
        }
    }
    Ok(rows)
}

fn float_col(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let s = df
        .column(name)
        .map_err(MtgdbError::from)?
        .cast(&DataType::Float64)
        .map_err(MtgdbError::from)?;
    Ok(s.f64().map_err(MtgdbError::from)?.into_iter().collect())
}

fn eur_row(uuid: &str, today: &str, price_type: PriceType, finish: Finish, price: f64) -> PriceRow {
    PriceRow {
        uuid: uuid.to_string(),
        date: today.to_string(),
        source: PriceSource::Paper,
        provider: "cardmarket".to_string(),
        price_type,
        finish,
        price,
        currency: "EUR".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn retail_and_buylist_split() {
        let ctx = PriceContext::from_pairs(&[], &[], &[], &[("sf-1", "u-1")]);
        let df = df!(
            "scryfall_id" => ["sf-1"],
            "finish" => ["normal"],
            "retail_eur" => [Some(1.20f64)],
            "buylist_eur" => [Some(0.90f64)],
        )
        .unwrap();
        let rows = normalize_page(&df, &ctx, "2024-02-07").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.currency == "EUR"));
        assert!(rows.iter().any(|r| r.price_type == PriceType::Retail && r.price == 1.20));
        assert!(rows.iter().any(|r| r.price_type == PriceType::Buylist && r.price == 0.90));
    }

    #[test]
    fn missing_buylist_is_absent() {
        let ctx = PriceContext::from_pairs(&[], &[], &[], &[("sf-1", "u-1")]);
        let df = df!(
            "scryfall_id" => ["sf-1"],
            "finish" => ["foil"],
            "retail_eur" => [Some(5.0f64)],
            "buylist_eur" => [None::<f64>],
        )
        .unwrap();
        let rows = normalize_page(&df, &ctx, "2024-02-07").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].finish, Finish::Foil);
    }
}
