//! The card compilation pipeline.
//!
//! Thirteen stages, four checkpoints. The outer sequence is strictly
//! sequential: each stage group depends on the previous checkpoint, and the
//! checkpoints are the only synchronization points. Deterministic given
//! identical inputs: every dedup sorts first and keeps first, every grouped
//! list is sorted, every map lookup has a declared default.

pub mod checkpoint;
pub mod enrich;
pub mod identity;
pub mod joins;
pub mod relationships;
pub mod sink;
pub mod stages;
pub mod util;

use mtgdb_common::Result;
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{info, instrument};

use crate::cache::SourceCache;
use crate::config::BuildConfig;
use crate::lookups::{IdBridges, Lookups};
use crate::report::BuildReport;

/// Everything a stage needs, passed explicitly. Write-once: stages read the
/// cache and lookups, never mutate them.
pub struct PipelineContext<'a> {
    pub cache: &'a SourceCache,
    pub lookups: &'a Lookups,
    pub config: &'a BuildConfig,
    pub report: &'a BuildReport,
}

/// Result of a pipeline run: the set codes that produced card and token
/// partitions.
pub struct PipelineOutcome {
    pub card_sets: Vec<String>,
    pub token_sets: Vec<String>,
}

/// Run the full pipeline and write per-set partitions.
#[instrument(skip_all)]
pub fn build_cards(ctx: &PipelineContext<'_>) -> Result<PipelineOutcome> {
    info!("card pipeline starting");

    // Stage 1: load + filter (language policy, set metadata).
    let lf = stages::load_and_filter(ctx.cache)?;

    // Stage 2: per-face transforms, lazy half.
    let lf = stages::face_transforms_lazy(lf)?;

    // Stage 3: checkpoint 1. The explode and coalesce plan materializes
    // here; the row-wise half of stage 2 finishes on the collected frame.
    let mut df = checkpoint::checkpoint("post-explode", lf)?;
    let meld_results = meld_result_names(ctx.cache)?;
    stages::face_transforms_finish(&mut df, &meld_results)?;
    checkpoint::validate_schema("post-face-transforms", &df)?;

    // Stage 4: multi-row lookup joins.
    let lf = joins::multi_row_joins(df.lazy(), ctx.lookups, ctx.cache);

    // Stage 5: checkpoint 2. The join plan resets before identity work.
    let mut df = checkpoint::checkpoint("post-joins", lf)?;
    tally_lookup_misses(&df, ctx.report);

    // Stage 6: identifier assembly and UUID assignment. Availability picks
    // up platforms implied by identifier presence.
    identity::augment_availability(&mut df)?;
    identity::assign_identity(&mut df)?;

    // Stage 7: derived fields.
    identity::derived_fields(&mut df, ctx.cache)?;

    // Stage 8: checkpoint 3.
    checkpoint::validate_schema("post-identity", &df)?;

    // Stage 9: relationship edges; every op here needs cross-row context.
    relationships::add_other_face_ids(&mut df)?;
    relationships::add_leadership_skills(&mut df, ctx.cache)?;
    relationships::add_reverse_related(&mut df)?;
    relationships::add_token_ids(&mut df)?;
    relationships::propagate_salt_to_tokens(&mut df)?;
    relationships::add_related_cards(&mut df, ctx.cache)?;
    relationships::add_flags(&mut df)?;
    relationships::add_purchase_urls(&mut df)?;

    // Stage 10: checkpoint 4.
    checkpoint::validate_schema("post-relationships", &df)?;

    // Stage 11: final enrichment.
    enrich::apply_manual_overrides(&mut df, ctx.cache)?;
    enrich::add_rebalanced_linkage(&mut df)?;
    enrich::add_secret_lair_subsets(&mut df, ctx.cache)?;
    enrich::add_source_products(&mut df, ctx.cache)?;
    enrich::check_meld_scope(&df, ctx.cache, ctx.report)?;

    // Stage 12: signatures and cleanup to the partition schema.
    enrich::add_signatures(&mut df, ctx.lookups)?;
    enrich::keep_orientation(&mut df)?;
    let df = enrich::pack_and_clean(df, ctx.cache)?;

    // Stage 13: sink.
    let mut df = sink::dedup_default_language(df)?;
    sink::add_variations(&mut df)?;
    sink::link_foil_twins(&mut df)?;
    let (cards, tokens) = sink::split_tokens(&df)?;

    let card_sets = sink::write_partitions(&cards, &ctx.config.cards_partition_root())?;
    let token_sets = sink::write_partitions(&tokens, &ctx.config.tokens_partition_root())?;

    // Persist the price-engine bridges from the fresh partitions.
    if !card_sets.is_empty() {
        IdBridges::build_and_persist(
            &ctx.config.cards_partition_root(),
            &ctx.config.cache_path,
        )?;
    }

    info!(
        cards = cards.height(),
        tokens = tokens.height(),
        "card pipeline finished"
    );
    Ok(PipelineOutcome {
        card_sets,
        token_sets,
    })
}

fn meld_result_names(cache: &SourceCache) -> Result<HashSet<String>> {
    let triplets = cache.meld_triplets().collect()?;
    if triplets.height() == 0 {
        return Ok(HashSet::new());
    }
    let results = triplets
        .column("result")
        .and_then(|c| c.str().cloned())
        .map(|ca| {
            ca.into_iter()
                .flatten()
                .map(str::to_string)
                .collect::<HashSet<_>>()
        })
        .unwrap_or_default();
    Ok(results)
}

fn tally_lookup_misses(df: &DataFrame, report: &BuildReport) {
    let count_nulls = |name: &str| -> u64 {
        df.column(name)
            .map(|c| c.null_count() as u64)
            .unwrap_or(0)
    };
    report.record_lookup_misses("oracle", count_nulls("edhrecSaltiness"));
    report.record_lookup_misses("identifiers", count_nulls("cardKingdomId"));
    report.record_lookup_misses("set_number", count_nulls("foreignData"));
}
