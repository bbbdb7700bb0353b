//! Per-run report of non-fatal conditions.
//!
//! Missed lookups, partially-in-scope meld triplets, and skipped price
//! providers do not abort the run; they accumulate here and are summarized
//! once at the end so an operator can judge snapshot quality.

use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct BuildReport {
    inner: Mutex<ReportInner>,
}

#[derive(Debug, Default)]
struct ReportInner {
    /// lookup name -> miss count
    missed_lookups: BTreeMap<String, u64>,
    /// provider name -> reason
    skipped_providers: BTreeMap<String, String>,
    /// meld result name for triplets with members out of scope
    partial_melds: Vec<String>,
    /// set codes whose individual file failed to write
    failed_sets: Vec<String>,
}

impl BuildReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lookup_misses(&self, lookup: &str, count: u64) {
        if count == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *inner.missed_lookups.entry(lookup.to_string()).or_insert(0) += count;
    }

    pub fn record_skipped_provider(&self, provider: &str, reason: &str) {
        warn!(provider, reason, "price provider skipped");
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .skipped_providers
            .insert(provider.to_string(), reason.to_string());
    }

    pub fn record_partial_meld(&self, result_name: &str) {
        warn!(meld = result_name, "meld triplet partially in scope");
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.partial_melds.push(result_name.to_string());
    }

    pub fn record_failed_set(&self, set_code: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.failed_sets.push(set_code.to_string());
    }

    pub fn failed_set_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .failed_sets
            .len()
    }

    /// Log the summary. Called once, after the run.
    pub fn summarize(&self) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        for (lookup, count) in &inner.missed_lookups {
            info!(lookup, count, "lookup keys with no match");
        }
        for (provider, reason) in &inner.skipped_providers {
            info!(provider, reason, "provider contributed no data");
        }
        if !inner.partial_melds.is_empty() {
            info!(count = inner.partial_melds.len(), "partial meld triplets");
        }
        if !inner.failed_sets.is_empty() {
            warn!(sets = ?inner.failed_sets, "individual set files failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_counts() {
        let report = BuildReport::new();
        report.record_lookup_misses("oracle", 3);
        report.record_lookup_misses("oracle", 2);
        report.record_lookup_misses("identifiers", 0);
        let inner = report.inner.lock().unwrap();
        assert_eq!(inner.missed_lookups.get("oracle"), Some(&5));
        assert!(!inner.missed_lookups.contains_key("identifiers"));
    }

    #[test]
    fn tracks_failed_sets() {
        let report = BuildReport::new();
        assert_eq!(report.failed_set_count(), 0);
        report.record_failed_set("LEA");
        assert_eq!(report.failed_set_count(), 1);
    }
}
