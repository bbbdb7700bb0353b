//! Date-partitioned price archive.
//!
//! One file per calendar date at `prices/date=YYYY-MM-DD/data.parquet`,
//! zstd. Hive partitioning lets the 90-day window read ~90 files instead of
//! scanning years of history. Local retention is 90 days; the remote copy
//! is append-only.

use mtgdb_common::{MtgdbError, Result};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema;

/// Rolling local retention window, in days.
pub const RETENTION_DAYS: i64 = 90;

pub fn partition_dir(root: &Path, date: &str) -> PathBuf {
    root.join(format!("date={date}"))
}

pub fn partition_file(root: &Path, date: &str) -> PathBuf {
    partition_dir(root, date).join("data.parquet")
}

/// Write (or rewrite) one date's partition. Reruns on the same day replace
/// the file wholesale; merge semantics are the reader's concern.
pub fn save_partition(root: &Path, date: &str, df: &DataFrame) -> Result<PathBuf> {
    let dir = partition_dir(root, date);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("data.parquet");
    let tmp = dir.join("data.parquet.tmp");
    let file = std::fs::File::create(&tmp)?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .finish(&mut df.clone())
        .map_err(MtgdbError::from)?;
    std::fs::rename(&tmp, &path)?;
    info!(date, rows = df.height(), "price partition saved");
    Ok(path)
}

/// List local partition dates, sorted ascending.
pub fn list_partitions(root: &Path) -> Result<Vec<String>> {
    let mut dates = Vec::new();
    if !root.exists() {
        return Ok(dates);
    }
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(date) = name.strip_prefix("date=") {
            if entry.path().join("data.parquet").exists() {
                dates.push(date.to_string());
            }
        }
    }
    dates.sort();
    Ok(dates)
}

/// Lazy scan over the partitions inside the retention window. The date
/// filter prunes partitions before any file is opened.
pub fn load_window(root: &Path, today: &str, days: i64) -> Result<LazyFrame> {
    let cutoff = cutoff_date(today, days)?;
    let valid: Vec<PathBuf> = list_partitions(root)?
        .into_iter()
        .filter(|date| date.as_str() >= cutoff.as_str())
        .map(|date| partition_file(root, &date))
        .collect();
    if valid.is_empty() {
        return Ok(schema::empty_frame().lazy());
    }
    let scans: Vec<LazyFrame> = valid
        .iter()
        .map(|p| LazyFrame::scan_parquet(p, ScanArgsParquet::default()))
        .collect::<PolarsResult<_>>()?;
    let lf = concat(scans, UnionArgs::default())?;
    Ok(lf.filter(col("date").gt_eq(lit(cutoff))))
}

/// Delete local partitions older than the retention window.
pub fn prune_partitions(root: &Path, today: &str, days: i64) -> Result<usize> {
    let cutoff = cutoff_date(today, days)?;
    let mut deleted = 0;
    for date in list_partitions(root)? {
        if date.as_str() < cutoff.as_str() {
            let dir = partition_dir(root, &date);
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {
                    info!(date, "pruned local partition");
                    deleted += 1;
                }
                Err(e) => warn!(date, error = %e, "failed to prune partition"),
            }
        }
    }
    Ok(deleted)
}

/// One-time migration of a legacy single-file archive into partitions.
/// Idempotent: a missing legacy file is a no-op, and the legacy file is
/// removed only after every partition lands.
pub fn migrate_legacy(root: &Path, legacy_path: &Path) -> Result<bool> {
    if !legacy_path.exists() {
        return Ok(false);
    }
    info!(path = %legacy_path.display(), "migrating legacy price archive");

    let df = LazyFrame::scan_parquet(legacy_path, ScanArgsParquet::default())?.collect()?;
    if df.height() == 0 {
        std::fs::remove_file(legacy_path)?;
        return Ok(false);
    }

    let parts = df
        .partition_by_stable(["date"], true)
        .map_err(MtgdbError::from)?;
    for part in parts {
        let date = part
            .column("date")
            .map_err(MtgdbError::from)?
            .str()
            .map_err(MtgdbError::from)?
            .get(0)
            .unwrap_or_default()
            .to_string();
        if date.is_empty() {
            continue;
        }
        save_partition(root, &date, &part)?;
    }
    std::fs::remove_file(legacy_path)?;
    Ok(true)
}

/// Merge with last-write-wins on the full composite key. Sort first so the
/// result is deterministic.
pub fn merge_prices(archive: LazyFrame, today: LazyFrame) -> Result<LazyFrame> {
    let combined = concat([archive, today], UnionArgs::default())?;
    Ok(combined
        .group_by_stable([
            col("uuid"),
            col("date"),
            col("source"),
            col("provider"),
            col("price_type"),
            col("finish"),
        ])
        .agg([col("price").last(), col("currency").last()]))
}

fn cutoff_date(today: &str, days: i64) -> Result<String> {
    let date = chrono::NaiveDate::parse_from_str(today, "%Y-%m-%d")
        .map_err(|e| MtgdbError::parse("date", e.to_string()))?;
    Ok((date - chrono::Duration::days(days))
        .format("%Y-%m-%d")
        .to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::{rows_to_frame, PriceRow};
    use mtgdb_common::types::{Finish, PriceSource, PriceType};

    fn row(uuid: &str, date: &str, price: f64) -> PriceRow {
        PriceRow {
            uuid: uuid.to_string(),
            date: date.to_string(),
            source: PriceSource::Paper,
            provider: "tcgplayer".to_string(),
            price_type: PriceType::Retail,
            finish: Finish::Normal,
            price,
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn partition_round_trip_with_date_filter() {
        let dir = tempfile::tempdir().unwrap();
        let df = rows_to_frame(&[row("u-1", "2024-02-07", 1.5)]).unwrap();
        save_partition(dir.path(), "2024-02-07", &df).unwrap();

        let lf = load_window(dir.path(), "2024-02-07", RETENTION_DAYS).unwrap();
        let out = lf.collect().unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(out.column("uuid").unwrap().str().unwrap().get(0), Some("u-1"));
    }

    #[test]
    fn window_excludes_old_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let old = rows_to_frame(&[row("u-old", "2023-01-01", 1.0)]).unwrap();
        let new = rows_to_frame(&[row("u-new", "2024-02-01", 2.0)]).unwrap();
        save_partition(dir.path(), "2023-01-01", &old).unwrap();
        save_partition(dir.path(), "2024-02-01", &new).unwrap();

        let out = load_window(dir.path(), "2024-02-07", 90).unwrap().collect().unwrap();
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn prune_deletes_only_expired() {
        let dir = tempfile::tempdir().unwrap();
        let old = rows_to_frame(&[row("u-old", "2023-01-01", 1.0)]).unwrap();
        let new = rows_to_frame(&[row("u-new", "2024-02-01", 2.0)]).unwrap();
        save_partition(dir.path(), "2023-01-01", &old).unwrap();
        save_partition(dir.path(), "2024-02-01", &new).unwrap();

        let deleted = prune_partitions(dir.path(), "2024-02-07", 90).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(list_partitions(dir.path()).unwrap(), vec!["2024-02-01"]);
    }

    #[test]
    fn merge_is_last_write_wins() {
        let archive = rows_to_frame(&[row("u-1", "2024-02-07", 1.0)]).unwrap();
        let today = rows_to_frame(&[row("u-1", "2024-02-07", 2.0)]).unwrap();
        let merged = merge_prices(archive.lazy(), today.lazy())
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(merged.height(), 1);
        assert_eq!(merged.column("price").unwrap().f64().unwrap().get(0), Some(2.0));
    }

    #[test]
    fn merge_against_self_is_noop() {
        let today = rows_to_frame(&[row("u-1", "2024-02-07", 1.0), row("u-2", "2024-02-07", 2.0)])
            .unwrap();
        let merged = merge_prices(today.clone().lazy(), today.lazy())
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(merged.height(), 2);
    }

    #[test]
    fn legacy_migration_splits_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("prices_archive.parquet");
        let mut df = rows_to_frame(&[
            row("u-1", "2024-02-01", 1.0),
            row("u-2", "2024-02-02", 2.0),
        ])
        .unwrap();
        let file = std::fs::File::create(&legacy).unwrap();
        ParquetWriter::new(file).finish(&mut df).unwrap();

        let root = dir.path().join("prices");
        assert!(migrate_legacy(&root, &legacy).unwrap());
        assert!(!legacy.exists());
        assert_eq!(
            list_partitions(&root).unwrap(),
            vec!["2024-02-01", "2024-02-02"]
        );
        // Idempotent second run.
        assert!(!migrate_legacy(&root, &legacy).unwrap());
    }
}
