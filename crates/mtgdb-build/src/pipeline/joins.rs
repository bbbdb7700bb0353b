//! Stage 4: multi-row lookup joins.
//!
//! Pure lazy joins against the consolidated lookups, bracketed by
//! checkpoints on both sides. Missing keys null-propagate; the caller tallies
//! misses into the build report after the next materialization.

use polars::prelude::*;

use crate::cache::SourceCache;
use crate::lookups::Lookups;

pub fn multi_row_joins(lf: LazyFrame, lookups: &Lookups, cache: &SourceCache) -> LazyFrame {
    // Identifiers lookup keys on (scryfallId, side); a missing side means
    // the single face "a" on both sides of the join.
    let identifiers = lookups
        .identifiers
        .clone()
        .with_columns([col("side").fill_null(lit("a")).alias("_lk_side")])
        .drop(["side"]);

    let lf = lf
        .with_columns([col("side").fill_null(lit("a")).alias("_join_side")])
        .join(
            identifiers,
            [col("id"), col("_join_side")],
            [col("scryfallId"), col("_lk_side")],
            JoinArgs::new(JoinType::Left),
        )
        .drop(["_join_side"]);

    let lf = lf.join(
        lookups.oracle.clone(),
        [col("oracle_id")],
        [col("oracle_id")],
        JoinArgs::new(JoinType::Left),
    );

    let lf = lf.join(
        lookups.set_number.clone(),
        [col("setCode"), col("number")],
        [col("setCode"), col("number")],
        JoinArgs::new(JoinType::Left),
    );

    let lf = lf.join(
        lookups.by_name.clone(),
        [col("name")],
        [col("name")],
        JoinArgs::new(JoinType::Left),
    );

    let lf = lf.join(
        lookups.marketplace_sets.clone(),
        [col("setCode")],
        [col("setCode")],
        JoinArgs::new(JoinType::Left),
    );

    // Product-level marketplace meta ids for the purchase-URL seed.
    let mcm_products = cache
        .marketplace_ids()
        .select([
            col("set_code").str().to_uppercase().alias("setCode"),
            col("number"),
            col("id_metaproduct").alias("_mcmMetaId"),
        ]);
    let lf = lf.join(
        mcm_products,
        [col("setCode"), col("number")],
        [col("setCode"), col("number")],
        JoinArgs::new(JoinType::Left),
    );

    // Watermark overrides win over the printed watermark.
    let lf = lf
        .join(
            lookups.watermarks.clone(),
            [col("id")],
            [col("scryfallId")],
            JoinArgs::new(JoinType::Left),
        )
        .with_columns([coalesce(&[col("watermarkOverride"), col("watermark")]).alias("watermark")])
        .drop(["watermarkOverride"]);

    // Face-specific flavor-name aliases.
    lf.join(
        lookups.face_flavors.clone(),
        [col("id"), col("faceName")],
        [col("scryfallId"), col("faceName")],
        JoinArgs::new(JoinType::Left),
    )
    .with_columns([coalesce(&[col("faceFlavorName"), col("flavorName")]).alias("flavorName")])
    .drop(["faceFlavorName"])
}
