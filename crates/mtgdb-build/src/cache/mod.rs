//! Source cache.
//!
//! One lazy frame per external source. `load_all` downloads each stale
//! source once on a bounded worker pool (~10 permits), materializes it to
//! `cache/sources/<name>.parquet` (zstd), then re-opens every source as a
//! lazy parquet scan so downstream queries stream instead of pinning the
//! multi-GB deserialized bulk in memory.
//!
//! After `load_all` returns the cache is read-only; every consumer clones
//! cheap lazy handles out of it.

pub mod registry;

use mtgdb_common::{MtgdbError, Result};
use polars::prelude::*;
use registry::{SourceFormat, SourceKind};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{BuildConfig, SOURCE_MAX_AGE_HOURS};

/// Parallel download workers for `load_all`.
const LOAD_WORKERS: usize = 10;

/// Transport for raw source bytes. The production impl wraps `reqwest`;
/// tests inject closures that return fixture bytes.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, kind: SourceKind) -> Result<Vec<u8>>;
}

/// HTTP transport with per-request timeout and retry.
pub struct HttpFetcher {
    client: reqwest::Client,
    retries: u32,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .gzip(true)
            .user_agent(concat!("mtgdb/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MtgdbError::config("failed to build HTTP client", e.to_string()))?;
        Ok(Self { client, retries: 3 })
    }
}

#[async_trait::async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, kind: SourceKind) -> Result<Vec<u8>> {
        let spec = kind.spec();
        let mut last_err = String::new();
        for attempt in 0..self.retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
            match self.client.get(spec.url).send().await {
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => match resp.bytes().await {
                        Ok(bytes) => return Ok(bytes.to_vec()),
                        Err(e) => last_err = e.to_string(),
                    },
                    Err(e) => last_err = e.to_string(),
                },
                Err(e) => last_err = e.to_string(),
            }
            debug!(source = spec.name, attempt, error = %last_err, "source fetch retry");
        }
        Err(MtgdbError::source_fetch(spec.name, spec.url, last_err))
    }
}

/// Lazy handle to every materialized source.
pub struct SourceCache {
    frames: HashMap<SourceKind, LazyFrame>,
    /// Requested set codes (uppercase); empty means all sets
    set_filter: Vec<String>,
    /// Face-ID allow-list for deck-only builds
    face_id_filter: Vec<String>,
    cache_path: PathBuf,
}

impl SourceCache {
    /// Download (where stale), materialize, and lazily reopen every source.
    pub async fn load_all(
        config: &BuildConfig,
        fetcher: Arc<dyn SourceFetcher>,
        set_filter: Vec<String>,
        face_id_filter: Vec<String>,
    ) -> Result<Self> {
        std::fs::create_dir_all(config.cache_path.join("sources"))?;

        let semaphore = Arc::new(Semaphore::new(LOAD_WORKERS));
        let mut tasks: JoinSet<Result<(SourceKind, PathBuf)>> = JoinSet::new();

        for &kind in SourceKind::all() {
            let path = config.source_path(kind.name());
            if config.offline {
                continue;
            }
            if !config.force_refresh && is_fresh(&path, SOURCE_MAX_AGE_HOURS) {
                debug!(source = kind.name(), "cached source is fresh");
                continue;
            }

            let fetcher = Arc::clone(&fetcher);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| MtgdbError::config("semaphore closed", e.to_string()))?;
                info!(source = kind.name(), "downloading source");
                let bytes = fetcher.fetch(kind).await?;
                let df = parse_source(kind, &bytes)?;
                materialize(&path, df)?;
                Ok((kind, path))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((kind, path))) => {
                    info!(source = kind.name(), path = %path.display(), "source materialized");
                }
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    return Err(MtgdbError::config("source load task panicked", e.to_string()))
                }
            }
        }

        // Reopen everything lazily. A missing optional source becomes an
        // empty frame rather than an error; the card bulk is required.
        let mut frames = HashMap::new();
        for &kind in SourceKind::all() {
            let path = config.source_path(kind.name());
            if path.exists() {
                frames.insert(kind, scan(&path)?);
            } else if kind == SourceKind::CardBulk {
                return Err(MtgdbError::source_fetch(
                    kind.name(),
                    kind.spec().url,
                    "card bulk is required and was not materialized",
                ));
            } else {
                warn!(source = kind.name(), "source missing; consumers see an empty frame");
            }
        }

        Ok(Self {
            frames,
            set_filter,
            face_id_filter,
            cache_path: config.cache_path.clone(),
        })
    }

    /// Build a cache straight from already-materialized files (offline mode
    /// and tests).
    pub fn from_dir(
        config: &BuildConfig,
        set_filter: Vec<String>,
        face_id_filter: Vec<String>,
    ) -> Result<Self> {
        let mut frames = HashMap::new();
        for &kind in SourceKind::all() {
            let path = config.source_path(kind.name());
            if path.exists() {
                frames.insert(kind, scan(&path)?);
            }
        }
        Ok(Self {
            frames,
            set_filter,
            face_id_filter,
            cache_path: config.cache_path.clone(),
        })
    }

    /// Test constructor over in-memory frames.
    pub fn from_frames(frames: HashMap<SourceKind, DataFrame>) -> Self {
        Self {
            frames: frames.into_iter().map(|(k, df)| (k, df.lazy())).collect(),
            set_filter: Vec::new(),
            face_id_filter: Vec::new(),
            cache_path: PathBuf::from("."),
        }
    }

    pub fn with_set_filter(mut self, set_codes: Vec<String>) -> Self {
        self.set_filter = set_codes;
        self
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn set_filter(&self) -> &[String] {
        &self.set_filter
    }

    /// Lazy frame for a source; absent sources yield a typed empty frame so
    /// lookups null-propagate instead of failing on missing columns.
    pub fn frame(&self, kind: SourceKind) -> LazyFrame {
        self.frames
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.empty_frame().lazy())
    }

    pub fn has(&self, kind: SourceKind) -> bool {
        self.frames.contains_key(&kind)
    }

    /// Card bulk, with the requested set-code filter and face-ID allow-list
    /// applied. Language policy is the pipeline's concern, not the cache's.
    pub fn card_bulk(&self) -> LazyFrame {
        let mut lf = self.frame(SourceKind::CardBulk);
        if !self.face_id_filter.is_empty() {
            let ids = Series::new("".into(), self.face_id_filter.clone());
            lf = lf.filter(col("id").is_in(lit(ids)));
        } else if !self.set_filter.is_empty() {
            let sets = Series::new("".into(), self.set_filter.clone());
            lf = lf.filter(col("set").str().to_uppercase().is_in(lit(sets)));
        }
        lf
    }

    pub fn rulings(&self) -> LazyFrame {
        self.frame(SourceKind::Rulings)
    }

    pub fn sets_meta(&self) -> LazyFrame {
        self.frame(SourceKind::SetsMeta)
    }

    pub fn retail_inventory(&self) -> LazyFrame {
        self.frame(SourceKind::RetailInventory)
    }

    pub fn marketplace_ids(&self) -> LazyFrame {
        self.frame(SourceKind::MarketplaceIds)
    }

    pub fn salt_scores(&self) -> LazyFrame {
        self.frame(SourceKind::SaltScores)
    }

    pub fn combos(&self) -> LazyFrame {
        self.frame(SourceKind::Combos)
    }

    pub fn meld_triplets(&self) -> LazyFrame {
        self.frame(SourceKind::MeldTriplets)
    }

    pub fn secret_lair_drops(&self) -> LazyFrame {
        self.frame(SourceKind::SecretLairDrops)
    }

    pub fn marketplace_skus(&self) -> LazyFrame {
        self.frame(SourceKind::MarketplaceSkus)
    }

    pub fn gatherer_pages(&self) -> LazyFrame {
        self.frame(SourceKind::GathererPages)
    }

    pub fn orientations(&self) -> LazyFrame {
        self.frame(SourceKind::Orientations)
    }

    pub fn multiverse_bridge(&self) -> LazyFrame {
        self.frame(SourceKind::MultiverseBridge)
    }

    pub fn sealed_products(&self) -> LazyFrame {
        self.frame(SourceKind::SealedProducts)
    }

    pub fn sealed_contents(&self) -> LazyFrame {
        self.frame(SourceKind::SealedContents)
    }

    pub fn deck_lists(&self) -> LazyFrame {
        self.frame(SourceKind::DeckLists)
    }

    pub fn booster_configs(&self) -> LazyFrame {
        self.frame(SourceKind::BoosterConfigs)
    }

    pub fn token_products(&self) -> LazyFrame {
        self.frame(SourceKind::TokenProducts)
    }

    pub fn manual_overrides(&self) -> LazyFrame {
        self.frame(SourceKind::ManualOverrides)
    }

    pub fn watermark_overrides(&self) -> LazyFrame {
        self.frame(SourceKind::WatermarkOverrides)
    }

    pub fn face_flavor_names(&self) -> LazyFrame {
        self.frame(SourceKind::FaceFlavorNames)
    }

    pub fn signatures(&self) -> LazyFrame {
        self.frame(SourceKind::Signatures)
    }

    pub fn standard_sets(&self) -> LazyFrame {
        self.frame(SourceKind::StandardSets)
    }
}

fn is_fresh(path: &Path, max_age_hours: f64) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    let Ok(age) = SystemTime::now().duration_since(modified) else {
        return false;
    };
    age.as_secs_f64() / 3600.0 < max_age_hours
}

/// Deserialize raw source bytes into a frame. Gzip payloads are detected by
/// magic number; the registry declares the inner format.
fn parse_source(kind: SourceKind, bytes: &[u8]) -> Result<DataFrame> {
    let spec = kind.spec();
    let decoded: Vec<u8> = if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
        use std::io::Read;
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(bytes).read_to_end(&mut out)?;
        out
    } else {
        bytes.to_vec()
    };

    let df = match spec.format {
        SourceFormat::JsonArray => JsonReader::new(Cursor::new(decoded))
            .with_json_format(JsonFormat::Json)
            .finish()?,
        SourceFormat::NdJson => JsonReader::new(Cursor::new(decoded))
            .with_json_format(JsonFormat::JsonLines)
            .finish()?,
        SourceFormat::Csv => CsvReadOptions::default()
            .with_has_header(true)
            .into_reader_with_file_handle(Cursor::new(decoded))
            .finish()?,
    };
    Ok(df)
}

/// Write a frame to zstd parquet, atomically.
fn materialize(path: &Path, mut df: DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("parquet.tmp");
    let file = std::fs::File::create(&tmp)?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .finish(&mut df)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn scan(path: &Path) -> Result<LazyFrame> {
    Ok(LazyFrame::scan_parquet(path, ScanArgsParquet::default())?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_source_yields_empty_frame() {
        let cache = SourceCache::from_frames(HashMap::new());
        let df = cache.rulings().collect().unwrap();
        assert_eq!(df.height(), 0);
    }

    #[test]
    fn set_filter_applies_to_bulk() {
        let bulk = df!(
            "id" => ["1", "2"],
            "set" => ["lea", "neo"],
        )
        .unwrap();
        let mut frames = HashMap::new();
        frames.insert(SourceKind::CardBulk, bulk);
        let cache = SourceCache::from_frames(frames).with_set_filter(vec!["LEA".to_string()]);
        let df = cache.card_bulk().collect().unwrap();
        assert_eq!(df.height(), 1);
    }

    #[test]
    fn stale_file_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.parquet");
        assert!(!is_fresh(&path, 1.0));
        std::fs::write(&path, b"data").unwrap();
        assert!(is_fresh(&path, 1.0));
    }
}
