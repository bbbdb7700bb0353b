//! Build configuration.
//!
//! Paths and switches shared by the pipeline, the price engine, and the CLI.
//! Environment variables override defaults; CLI flags override both.

use mtgdb_common::{MtgdbError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Version stamped into every `meta` block.
pub const MTGDB_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hours a materialized source stays fresh before re-download.
pub const SOURCE_MAX_AGE_HOURS: f64 = 290.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Root for finished artifacts
    pub output_path: PathBuf,

    /// Root for cached sources and partitions
    pub cache_path: PathBuf,

    /// Skip all network access and rebuild from cached partitions
    #[serde(default)]
    pub offline: bool,

    /// Pretty-print JSON outputs
    #[serde(default)]
    pub pretty: bool,

    /// Skip set files that already exist
    #[serde(default)]
    pub resume: bool,

    /// Re-download sources even when fresh
    #[serde(default)]
    pub force_refresh: bool,
}

impl BuildConfig {
    pub fn new() -> Self {
        Self {
            output_path: PathBuf::from("./mtgdb_build"),
            cache_path: PathBuf::from("./cache"),
            offline: false,
            pretty: false,
            resume: false,
            force_refresh: false,
        }
    }

    /// Load config from environment variables.
    ///
    /// - `MTGDB_OUTPUT_PATH` overrides the output root
    /// - `MTGDB_CACHE_PATH` overrides the cache root
    /// - `MTGDB_OFFLINE_MODE` enables from-cache builds
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new();

        if let Ok(path) = std::env::var("MTGDB_OUTPUT_PATH") {
            if path.is_empty() {
                return Err(MtgdbError::config(
                    "MTGDB_OUTPUT_PATH is empty",
                    "Unset it or point it at a writable directory.",
                ));
            }
            config.output_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("MTGDB_CACHE_PATH") {
            config.cache_path = PathBuf::from(path);
        }

        if matches!(
            std::env::var("MTGDB_OFFLINE_MODE").as_deref(),
            Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes")
        ) {
            config.offline = true;
        }

        Ok(config)
    }

    /// `cache/sources/<name>.parquet`
    pub fn source_path(&self, name: &str) -> PathBuf {
        self.cache_path.join("sources").join(format!("{name}.parquet"))
    }

    /// `cache/cards/` hive root
    pub fn cards_partition_root(&self) -> PathBuf {
        self.cache_path.join("cards")
    }

    /// `cache/tokens/` hive root
    pub fn tokens_partition_root(&self) -> PathBuf {
        self.cache_path.join("tokens")
    }

    /// `cache/prices/` hive root
    pub fn prices_partition_root(&self) -> PathBuf {
        self.cache_path.join("prices")
    }

    pub fn csv_output_dir(&self) -> PathBuf {
        self.output_path.join("csv")
    }

    pub fn parquet_output_dir(&self) -> PathBuf {
        self.output_path.join("parquet")
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `bytes` to `path` atomically: emit to a temp sibling and rename on
/// completion, so a failed run leaves previous outputs untouched.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = BuildConfig::new();
        assert!(config.source_path("card_bulk").ends_with("sources/card_bulk.parquet"));
        assert!(config.cards_partition_root().ends_with("cards"));
        assert!(!config.offline);
    }

    #[test]
    fn test_atomic_write_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        assert!(!path.with_extension("tmp").exists());
    }
}
