//! MTGO-only provider (P2): retail USD, bulk TSV, normal and foil feeds
//! fetched in parallel.

use async_trait::async_trait;
use futures::try_join;
use mtgdb_common::types::{Finish, PriceSource, PriceType};
use mtgdb_common::Result;
use polars::prelude::*;
use std::sync::Arc;

use crate::context::PriceContext;
use crate::schema::{self, PriceRow};

/// Transport contract: the raw TSV body for each finish feed.
#[async_trait]
pub trait CardhoarderFeed: Send + Sync {
    async fn normal_tsv(&self) -> Result<String>;
    async fn foil_tsv(&self) -> Result<String>;
}

pub struct CardhoarderProvider {
    feed: Arc<dyn CardhoarderFeed>,
}

impl CardhoarderProvider {
    pub fn new(feed: Arc<dyn CardhoarderFeed>) -> Self {
        Self { feed }
    }

    pub async fn fetch(&self, ctx: &PriceContext, today: &str) -> Result<DataFrame> {
        let (normal, foil) = try_join!(self.feed.normal_tsv(), self.feed.foil_tsv())?;
        let mut rows = parse_tsv(&normal, Finish::Normal, ctx, today);
        rows.extend(parse_tsv(&foil, Finish::Foil, ctx, today));
        schema::rows_to_frame(&rows)
    }
}

/// Parse the bulk TSV: a header line, then `mtgo_id<TAB>name<TAB>price`
/// rows. Unparseable lines and unresolvable ids are skipped.
pub fn parse_tsv(body: &str, finish: Finish, ctx: &PriceContext, today: &str) -> Vec<PriceRow> {
    let mut rows = Vec::new();
    for line in body.lines().skip(1) {
        let mut parts = line.split('\t');
        let Some(mtgo_id) = parts.next() else {
            continue;
        };
        let Some(price) = parts.nth(1).and_then(|p| p.parse::<f64>().ok()) else {
            continue;
        };
        let Some(uuids) = ctx.mtgo_to_uuid.get(mtgo_id.trim()) else {
            continue;
        };
        for uuid in uuids {
            rows.push(PriceRow {
                uuid: uuid.clone(),
                date: today.to_string(),
                source: PriceSource::Mtgo,
                provider: "cardhoarder".to_string(),
                price_type: PriceType::Retail,
                finish,
                price,
                currency: "USD".to_string(),
            });
        }
    }
    rows
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn tsv_parses_and_resolves() {
        let ctx = PriceContext::from_pairs(&[], &[], &[("12345", "u-1")], &[]);
        let body = "id\tname\tprice\n12345\tLightning Bolt\t0.03\n99999\tUnknown\t1.00\n";
        let rows = parse_tsv(body, Finish::Normal, &ctx, "2024-02-07");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, PriceSource::Mtgo);
        assert_eq!(rows[0].price, 0.03);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let ctx = PriceContext::from_pairs(&[], &[], &[("1", "u-1")], &[]);
        let body = "header\n1\tname-only\n1\tok\t2.5\n";
        let rows = parse_tsv(body, Finish::Foil, &ctx, "2024-02-07");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].finish, Finish::Foil);
    }
}
