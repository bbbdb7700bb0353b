//! Price build orchestration.
//!
//! Once per calendar date: migrate any legacy archive, sync down missing
//! partitions, fetch today's prices, land today's partition, sync it up,
//! prune the local window, then stream every output over the 90-day lazy
//! scan. Reruns on the same day rewrite today's partition; the merge is
//! last-write-wins on the full composite key.

use chrono::Utc;
use mtgdb_build::config::{BuildConfig, MTGDB_VERSION};
use mtgdb_build::report::BuildReport;
use mtgdb_common::Result;
use polars::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::archive::{self, RETENTION_DAYS};
use crate::context::PriceContext;
use crate::providers::{self, ProviderSet};
use crate::s3::PriceStore;
use crate::writers;

pub struct PriceBuilder {
    config: BuildConfig,
    today: String,
    store: Option<Arc<PriceStore>>,
}

impl PriceBuilder {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            today: Utc::now().format("%Y-%m-%d").to_string(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<PriceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_today(mut self, today: impl Into<String>) -> Self {
        self.today = today.into();
        self
    }

    fn partition_root(&self) -> PathBuf {
        self.config.prices_partition_root()
    }

    /// The full daily build sequence.
    #[instrument(skip_all)]
    pub async fn build(&self, provider_set: ProviderSet, report: Arc<BuildReport>) -> Result<()> {
        let root = self.partition_root();
        std::fs::create_dir_all(&root)?;

        // 1. One-time legacy migration.
        let legacy = self.config.cache_path.join("prices_archive.parquet");
        if archive::migrate_legacy(&root, &legacy)? {
            info!("legacy price archive migrated to partitions");
        }

        // 2. Sync down remote partitions missing locally.
        if let Some(store) = &self.store {
            match store.sync_down(&root, &self.today, RETENTION_DAYS).await {
                Ok(n) if n > 0 => info!(partitions = n, "synced partitions from object store"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "sync-down failed; continuing with local archive"),
            }
        }

        // 3. Fetch today's prices from all providers.
        let ctx = Arc::new(PriceContext::load(&self.config.cache_path)?);
        if ctx.is_empty() {
            warn!("no id bridges found; provider rows will not resolve to UUIDs");
        }
        let today_df = providers::fetch_all(
            provider_set,
            ctx,
            self.today.clone(),
            self.config.cache_path.clone(),
            Arc::clone(&report),
        )
        .await?;
        info!(rows = today_df.height(), "today's prices fetched");

        // A provider outage still produces today's (possibly empty)
        // partition so downstream artifacts stay consistent.

        // 4. Merge against any existing copy of today and write the
        // partition (rewrites on same-day reruns).
        let today_partition = archive::partition_file(&root, &self.today);
        let today_df = if today_partition.exists() {
            let existing = LazyFrame::scan_parquet(&today_partition, ScanArgsParquet::default())?;
            archive::merge_prices(existing, today_df.lazy())?.collect()?
        } else {
            today_df
        };
        archive::save_partition(&root, &self.today, &today_df)?;

        // 5. Sync up (non-fatal on failure; next run re-uploads).
        if let Some(store) = &self.store {
            let mut to_upload = vec![self.today.clone()];
            if let Ok(missing) = store.missing_remote_dates(&root).await {
                for date in missing {
                    if !to_upload.contains(&date) {
                        to_upload.push(date);
                    }
                }
            }
            let uploaded = Arc::clone(store).sync_up(root.clone(), to_upload).await;
            info!(partitions = uploaded, "partitions uploaded");
        }

        // 6. Prune the local window.
        let pruned = archive::prune_partitions(&root, &self.today, RETENTION_DAYS)?;
        if pruned > 0 {
            info!(partitions = pruned, "local partitions pruned");
        }

        // 7. Load the window as a lazy partition-pruned scan.
        let window = archive::load_window(&root, &self.today, RETENTION_DAYS)?;

        // 8. Stream outputs.
        self.write_outputs(window, &today_df)?;
        Ok(())
    }

    /// Emit `AllPrices.*` over the window and `AllPricesToday.*` over
    /// today's frame.
    pub fn write_outputs(&self, window: LazyFrame, today_df: &DataFrame) -> Result<()> {
        let out = &self.config.output_path;
        std::fs::create_dir_all(out)?;

        writers::stream_prices_json(
            window.clone(),
            &out.join("AllPrices.json"),
            &self.today,
            MTGDB_VERSION,
        )?;
        writers::stream_prices_json(
            today_df.clone().lazy(),
            &out.join("AllPricesToday.json"),
            &self.today,
            MTGDB_VERSION,
        )?;

        let window_df = window.collect()?;
        writers::write_prices_sqlite(
            &window_df,
            &out.join("AllPrices.sqlite"),
            &self.today,
            MTGDB_VERSION,
        )?;
        writers::write_prices_sql(&window_df, &out.join("AllPrices.sql"), &self.today)?;
        writers::write_prices_psql(&window_df, &out.join("AllPrices.psql"), &self.today)?;

        writers::write_prices_sqlite(
            today_df,
            &out.join("AllPricesToday.sqlite"),
            &self.today,
            MTGDB_VERSION,
        )?;
        writers::write_prices_sql(today_df, &out.join("AllPricesToday.sql"), &self.today)?;
        writers::write_prices_psql(today_df, &out.join("AllPricesToday.psql"), &self.today)?;

        let csv_dir = self.config.csv_output_dir();
        writers::write_prices_csv(&window_df, &out.join("AllPrices.csv"))?;
        writers::write_prices_csv(today_df, &csv_dir.join("cardPrices.csv"))?;
        Ok(())
    }
}
