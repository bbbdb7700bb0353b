//! Object-store synchronization for the price archive.
//!
//! Remote layout mirrors the local one: `price_archive/date=YYYY-MM-DD/
//! data.parquet`, append-only. Sync-down fills local gaps inside the
//! retention window; sync-up pushes today's partition (and any the remote
//! lacks) on a bounded worker pool with retries. A final upload failure is
//! non-fatal: the next run re-uploads.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use mtgdb_common::{MtgdbError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::archive;

/// Upload workers for partition sync.
const SYNC_WORKERS: usize = 16;
const UPLOAD_RETRIES: u32 = 3;

pub const REMOTE_PREFIX: &str = "price_archive/";

#[derive(Clone)]
pub struct PriceStore {
    client: Client,
    bucket: String,
}

impl PriceStore {
    /// Build from ambient AWS configuration (env credentials / profile).
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self {
            client: Client::new(&config),
            bucket: bucket.into(),
        }
    }

    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn remote_key(date: &str) -> String {
        format!("{REMOTE_PREFIX}date={date}/data.parquet")
    }

    /// List remote partition dates.
    pub async fn list_remote_dates(&self) -> Result<Vec<String>> {
        let mut dates = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(REMOTE_PREFIX);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let resp = req.send().await.map_err(|e| {
                MtgdbError::object_store_upload(REMOTE_PREFIX, 1, e.to_string())
            })?;
            for obj in resp.contents() {
                if let Some(key) = obj.key() {
                    if let Some(rest) = key.strip_prefix(REMOTE_PREFIX) {
                        if let Some(date) = rest.strip_suffix("/data.parquet") {
                            if let Some(date) = date.strip_prefix("date=") {
                                dates.push(date.to_string());
                            }
                        }
                    }
                }
            }
            continuation = resp.next_continuation_token().map(str::to_string);
            if continuation.is_none() {
                break;
            }
        }
        dates.sort();
        Ok(dates)
    }

    async fn upload_file(&self, date: &str, path: &Path) -> Result<()> {
        let key = Self::remote_key(date);
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| MtgdbError::object_store_upload(&key, 1, e.to_string()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| MtgdbError::object_store_upload(&key, 1, e.to_string()))?;
        Ok(())
    }

    async fn download_file(&self, date: &str, path: &Path) -> Result<()> {
        let key = Self::remote_key(date);
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| MtgdbError::object_store_upload(&key, 1, e.to_string()))?;
        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| MtgdbError::object_store_upload(&key, 1, e.to_string()))?
            .into_bytes();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &bytes)?;
        Ok(())
    }

    /// Upload one partition with exponential-backoff retries.
    pub async fn upload_partition_with_retry(&self, root: &Path, date: &str) -> Result<()> {
        let path = archive::partition_file(root, date);
        let mut last_err = String::new();
        for attempt in 0..UPLOAD_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
            match self.upload_file(date, &path).await {
                Ok(()) => {
                    debug!(date, "partition uploaded");
                    return Ok(());
                }
                Err(e) => last_err = e.to_string(),
            }
        }
        Err(MtgdbError::object_store_upload(
            Self::remote_key(date),
            UPLOAD_RETRIES,
            last_err,
        ))
    }

    /// Download remote partitions missing locally, within the window.
    pub async fn sync_down(&self, root: &Path, today: &str, days: i64) -> Result<usize> {
        let local: HashSet<String> = archive::list_partitions(root)?.into_iter().collect();
        let cutoff = {
            let date = chrono::NaiveDate::parse_from_str(today, "%Y-%m-%d")
                .map_err(|e| MtgdbError::parse("date", e.to_string()))?;
            (date - chrono::Duration::days(days)).format("%Y-%m-%d").to_string()
        };

        let mut downloaded = 0;
        for date in self.list_remote_dates().await? {
            if date < cutoff || local.contains(&date) {
                continue;
            }
            let path = archive::partition_file(root, &date);
            match self.download_file(&date, &path).await {
                Ok(()) => {
                    info!(date, "partition downloaded");
                    downloaded += 1;
                }
                Err(e) => warn!(date, error = %e, "partition download failed"),
            }
        }
        Ok(downloaded)
    }

    /// Upload local partitions the remote lacks, bounded parallelism.
    /// Failures are tallied, not fatal.
    pub async fn sync_up(self: Arc<Self>, root: PathBuf, days_window: Vec<String>) -> usize {
        let semaphore = Arc::new(Semaphore::new(SYNC_WORKERS));
        let mut tasks: JoinSet<bool> = JoinSet::new();

        for date in days_window {
            let store = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            let root = root.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return false;
                };
                match store.upload_partition_with_retry(&root, &date).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(date, error = %e, "partition upload failed after retries");
                        false
                    }
                }
            });
        }

        let mut uploaded = 0;
        while let Some(result) = tasks.join_next().await {
            if matches!(result, Ok(true)) {
                uploaded += 1;
            }
        }
        uploaded
    }

    /// Dates present locally but absent remotely.
    pub async fn missing_remote_dates(&self, root: &Path) -> Result<Vec<String>> {
        let remote: HashSet<String> = self.list_remote_dates().await?.into_iter().collect();
        Ok(archive::list_partitions(root)?
            .into_iter()
            .filter(|d| !remote.contains(d))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn remote_key_layout() {
        assert_eq!(
            PriceStore::remote_key("2024-02-07"),
            "price_archive/date=2024-02-07/data.parquet"
        );
    }
}
