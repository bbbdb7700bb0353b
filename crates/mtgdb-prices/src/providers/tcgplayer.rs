//! Largest paper retailer (P1): retail USD, per-set pagination.
//!
//! Groups fetch one at a time through the feed; every 50 completed groups
//! the adapter writes `.tcg_price_checkpoint.json` plus the partial rows so
//! a restarted build resumes instead of refetching everything.

use async_trait::async_trait;
use mtgdb_common::types::{Finish, PriceSource, PriceType};
use mtgdb_common::{MtgdbError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::PriceContext;
use crate::schema::{self, PriceRow};

pub const CHECKPOINT_FILE: &str = ".tcg_price_checkpoint.json";
const PARTIAL_ROWS_FILE: &str = ".tcg_price_rows.parquet";
const CHECKPOINT_EVERY: usize = 50;

/// Transport contract: list the marketplace's set groups, then fetch one
/// group's product prices as `(product_id, sub_type, market_price)`.
#[async_trait]
pub trait TcgplayerFeed: Send + Sync {
    async fn set_groups(&self) -> Result<Vec<String>>;
    async fn group_prices(&self, group_id: &str) -> Result<DataFrame>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Checkpoint {
    completed_groups: Vec<String>,
}

pub struct TcgplayerProvider {
    feed: Arc<dyn TcgplayerFeed>,
}

impl TcgplayerProvider {
    pub fn new(feed: Arc<dyn TcgplayerFeed>) -> Self {
        Self { feed }
    }

    pub async fn fetch(
        &self,
        ctx: &PriceContext,
        today: &str,
        cache_dir: &Path,
    ) -> Result<DataFrame> {
        let groups = self.feed.set_groups().await?;
        info!(groups = groups.len(), "tcgplayer set groups listed");

        let checkpoint_path = cache_dir.join(CHECKPOINT_FILE);
        let rows_path = cache_dir.join(PARTIAL_ROWS_FILE);
        let mut checkpoint = load_checkpoint(&checkpoint_path);
        let completed: HashSet<String> = checkpoint.completed_groups.iter().cloned().collect();

        let mut rows = load_partial_rows(&rows_path)?;
        let mut since_checkpoint = 0usize;

        for group in &groups {
            if completed.contains(group) {
                continue;
            }
            let frame = self.feed.group_prices(group).await?;
            rows.extend(normalize_group(&frame, ctx, today)?);
            checkpoint.completed_groups.push(group.clone());
            since_checkpoint += 1;

            if since_checkpoint >= CHECKPOINT_EVERY {
                save_checkpoint(&checkpoint_path, &checkpoint)?;
                save_partial_rows(&rows_path, &rows)?;
                debug!(
                    completed = checkpoint.completed_groups.len(),
                    "tcgplayer checkpoint saved"
                );
                since_checkpoint = 0;
            }
        }

        // Finished: the resume state must not leak into the next day.
        let _ = std::fs::remove_file(&checkpoint_path);
        let _ = std::fs::remove_file(&rows_path);

        schema::rows_to_frame(&rows)
    }
}

/// Normalize one group's frame. Sub-type "Foil" maps to the foil finish;
/// etched products resolve through the etched bridge.
pub fn normalize_group(
    df: &DataFrame,
    ctx: &PriceContext,
    today: &str,
) -> Result<Vec<PriceRow>> {
    let mut rows = Vec::new();
    if df.height() == 0 {
        return Ok(rows);
    }
    let ids = df
        .column("product_id")
        .map_err(MtgdbError::from)?
        .cast(&DataType::String)
        .map_err(MtgdbError::from)?;
    let ids = ids.str().map_err(MtgdbError::from)?.clone();
    let sub_types = df
        .column("sub_type")
        .map_err(MtgdbError::from)?
        .str()
        .map_err(MtgdbError::from)?
        .clone();
    let prices = df
        .column("market_price")
        .map_err(MtgdbError::from)?
        .cast(&DataType::Float64)
        .map_err(MtgdbError::from)?;
    let prices = prices.f64().map_err(MtgdbError::from)?.clone();

    for i in 0..df.height() {
        let (Some(id), Some(price)) = (ids.get(i), prices.get(i)) else {
            continue;
        };
        let finish = match sub_types.get(i) {
            Some("Foil") => Finish::Foil,
            _ => Finish::Normal,
        };

        // Etched products live in their own bridge; try it first, then the
        // normal product bridge.
        let (uuids, finish) = match ctx.tcg_etched_to_uuid.get(id) {
            Some(uuids) => (uuids, Finish::Etched),
            None => match ctx.tcg_to_uuid.get(id) {
                Some(uuids) => (uuids, finish),
                None => continue,
            },
        };

        for uuid in uuids {
            rows.push(PriceRow {
                uuid: uuid.clone(),
                date: today.to_string(),
                source: PriceSource::Paper,
                provider: "tcgplayer".to_string(),
                price_type: PriceType::Retail,
                finish,
                price,
                currency: "USD".to_string(),
            });
        }
    }
    Ok(rows)
}

fn load_checkpoint(path: &Path) -> Checkpoint {
    std::fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

fn save_checkpoint(path: &Path, checkpoint: &Checkpoint) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec(checkpoint)?)?;
    Ok(())
}

fn load_partial_rows(path: &PathBuf) -> Result<Vec<PriceRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let df = LazyFrame::scan_parquet(path, ScanArgsParquet::default())?.collect()?;
    schema::frame_to_rows(&df)
}

fn save_partial_rows(path: &Path, rows: &[PriceRow]) -> Result<()> {
    let mut df = schema::rows_to_frame(rows)?;
    let file = std::fs::File::create(path)?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .finish(&mut df)
        .map_err(MtgdbError::from)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn foil_sub_type_maps_to_finish() {
        let ctx = PriceContext::from_pairs(&[("100", "u-1")], &[], &[], &[]);
        let df = df!(
            "product_id" => ["100", "100"],
            "sub_type" => ["Normal", "Foil"],
            "market_price" => [1.50f64, 4.00],
        )
        .unwrap();
        let rows = normalize_group(&df, &ctx, "2024-02-07").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].finish, Finish::Normal);
        assert_eq!(rows[1].finish, Finish::Foil);
        assert_eq!(rows[0].price, 1.50);
    }

    #[test]
    fn etched_bridge_wins() {
        let ctx = PriceContext::from_pairs(&[], &[("200", "u-etched")], &[], &[]);
        let df = df!(
            "product_id" => ["200"],
            "sub_type" => ["Foil"],
            "market_price" => [9.99f64],
        )
        .unwrap();
        let rows = normalize_group(&df, &ctx, "2024-02-07").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].finish, Finish::Etched);
    }

    #[test]
    fn unresolvable_ids_are_dropped() {
        let ctx = PriceContext::from_pairs(&[], &[], &[], &[]);
        let df = df!(
            "product_id" => ["999"],
            "sub_type" => ["Normal"],
            "market_price" => [1.0f64],
        )
        .unwrap();
        let rows = normalize_group(&df, &ctx, "2024-02-07").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn duplicate_uuids_fan_out() {
        let ctx = PriceContext::from_pairs(&[("100", "u-a"), ("100", "u-b")], &[], &[], &[]);
        let df = df!(
            "product_id" => ["100"],
            "sub_type" => ["Normal"],
            "market_price" => [2.0f64],
        )
        .unwrap();
        let rows = normalize_group(&df, &ctx, "2024-02-07").unwrap();
        assert_eq!(rows.len(), 2);
    }
}
