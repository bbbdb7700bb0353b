//! Stages 11–12: final enrichment, signatures, and output-schema cleanup.
//!
//! Manual overrides, rebalanced linkage, Secret Lair subsets, sealed-product
//! back-references, then signatures and the raw-column cleanup that leaves
//! the partition schema.

use mtgdb_common::{uuid5, Result};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};

use super::util::{i64_col, list_str_col, opt_list_str_series, set_column, str_col_opt};
use crate::cache::SourceCache;
use crate::lookups::Lookups;
use crate::report::BuildReport;

/// Manual override table: curated rows keyed by UUID that replace a specific
/// field. Joined as an ordinary frame, never a runtime patch.
pub fn apply_manual_overrides(df: &mut DataFrame, cache: &SourceCache) -> Result<()> {
    let overrides = cache.manual_overrides().collect()?;
    if overrides.height() == 0 {
        return Ok(());
    }
    let o_uuids = str_col_opt(&overrides, "uuid");
    let o_fields = str_col_opt(&overrides, "field");
    let o_values = str_col_opt(&overrides, "value");

    // other_face_ids is the one field overridden today (meld corrections).
    let mut face_overrides: HashMap<String, Vec<String>> = HashMap::new();
    for i in 0..overrides.height() {
        if o_fields[i].as_deref() != Some("other_face_ids") {
            continue;
        }
        let (Some(uuid), Some(value)) = (o_uuids[i].clone(), o_values[i].as_deref()) else {
            continue;
        };
        if let Ok(list) = serde_json::from_str::<Vec<String>>(value) {
            face_overrides.insert(uuid, list);
        }
    }
    if face_overrides.is_empty() {
        return Ok(());
    }

    let uuids = str_col_opt(df, "uuid");
    let mut other_faces = list_str_col(df, "otherFaceIds");
    for i in 0..df.height() {
        if let Some(replacement) = uuids[i].as_deref().and_then(|u| face_overrides.get(u)) {
            other_faces[i] = replacement.clone();
        }
    }
    set_column(df, super::util::list_str_series("otherFaceIds", other_faces))?;
    Ok(())
}

/// Rebalanced linkage: an `A-` prefixed digital variant links to its
/// tabletop original and vice versa, symmetric, lists sorted by UUID.
pub fn add_rebalanced_linkage(df: &mut DataFrame) -> Result<()> {
    let n = df.height();
    let names = str_col_opt(df, "name");
    let uuids = str_col_opt(df, "uuid");

    let mut rebalanced_by_original: HashMap<String, Vec<String>> = HashMap::new();
    let mut originals_by_name: HashMap<String, Vec<String>> = HashMap::new();
    for i in 0..n {
        let (Some(name), Some(uuid)) = (names[i].as_deref(), uuids[i].as_deref()) else {
            continue;
        };
        if let Some(original) = name.strip_prefix("A-") {
            rebalanced_by_original
                .entry(original.to_string())
                .or_default()
                .push(uuid.to_string());
        } else {
            originals_by_name
                .entry(name.to_string())
                .or_default()
                .push(uuid.to_string());
        }
    }
    for list in rebalanced_by_original.values_mut() {
        list.sort();
    }
    for list in originals_by_name.values_mut() {
        list.sort();
    }

    let mut rebalanced_printings: Vec<Option<Vec<String>>> = Vec::with_capacity(n);
    let mut original_printings: Vec<Option<Vec<String>>> = Vec::with_capacity(n);
    for i in 0..n {
        let name = names[i].as_deref().unwrap_or("");
        if let Some(original) = name.strip_prefix("A-") {
            original_printings.push(originals_by_name.get(original).cloned());
            rebalanced_printings.push(None);
        } else {
            rebalanced_printings.push(rebalanced_by_original.get(name).cloned());
            original_printings.push(None);
        }
    }
    set_column(df, opt_list_str_series("rebalancedPrintings", rebalanced_printings))?;
    set_column(df, opt_list_str_series("originalPrintings", original_printings))?;
    Ok(())
}

/// Secret Lair subsets: drop names keyed by collector number, SLD only.
pub fn add_secret_lair_subsets(df: &mut DataFrame, cache: &SourceCache) -> Result<()> {
    let drops = cache.secret_lair_drops().collect()?;
    let mut by_number: HashMap<String, String> = HashMap::new();
    if drops.height() > 0 {
        let numbers = str_col_opt(&drops, "number");
        let names = str_col_opt(&drops, "drop_name");
        for i in 0..drops.height() {
            if let (Some(num), Some(name)) = (numbers[i].clone(), names[i].clone()) {
                by_number.entry(num).or_insert(name);
            }
        }
    }

    let set_codes = str_col_opt(df, "setCode");
    let numbers = str_col_opt(df, "number");
    let subsets: Vec<Option<Vec<String>>> = (0..df.height())
        .map(|i| {
            if set_codes[i].as_deref() != Some("SLD") {
                return None;
            }
            numbers[i]
                .as_deref()
                .and_then(|num| by_number.get(num))
                .map(|name| vec![name.clone()])
        })
        .collect();
    set_column(df, opt_list_str_series("subsets", subsets))?;
    Ok(())
}

/// Sealed-product back-references: invert the contents table into per-face
/// UUID sets, one per finish.
pub fn add_source_products(df: &mut DataFrame, cache: &SourceCache) -> Result<()> {
    let contents = cache.sealed_contents().collect()?;
    let mut by_card: HashMap<String, [Vec<String>; 3]> = HashMap::new();
    if contents.height() > 0 {
        let products = str_col_opt(&contents, "product_name");
        let card_uuids = str_col_opt(&contents, "card_uuid");
        let finishes = str_col_opt(&contents, "finish");
        for i in 0..contents.height() {
            let (Some(product), Some(card)) = (products[i].as_deref(), card_uuids[i].clone())
            else {
                continue;
            };
            let product_uuid = uuid5::sealed_product_uuid(product);
            let slot = match finishes[i].as_deref() {
                Some("foil") => 1,
                Some("etched") => 2,
                _ => 0,
            };
            by_card.entry(card).or_default()[slot].push(product_uuid);
        }
        for sets in by_card.values_mut() {
            for list in sets.iter_mut() {
                list.sort();
                list.dedup();
            }
        }
    }

    let uuids = str_col_opt(df, "uuid");
    let mut nonfoil: Vec<Option<Vec<String>>> = Vec::with_capacity(df.height());
    let mut foil: Vec<Option<Vec<String>>> = Vec::with_capacity(df.height());
    let mut etched: Vec<Option<Vec<String>>> = Vec::with_capacity(df.height());
    for uuid in &uuids {
        match uuid.as_deref().and_then(|u| by_card.get(u)) {
            Some([n, f, e]) => {
                nonfoil.push((!n.is_empty()).then(|| n.clone()));
                foil.push((!f.is_empty()).then(|| f.clone()));
                etched.push((!e.is_empty()).then(|| e.clone()));
            }
            None => {
                nonfoil.push(None);
                foil.push(None);
                etched.push(None);
            }
        }
    }
    set_column(df, opt_list_str_series("_sp_nonfoil", nonfoil))?;
    set_column(df, opt_list_str_series("_sp_foil", foil))?;
    set_column(df, opt_list_str_series("_sp_etched", etched))?;
    Ok(())
}

/// Warn (never fail) when a meld triplet is only partially in scope; the
/// members present still carry their sides and cardParts.
pub fn check_meld_scope(df: &DataFrame, cache: &SourceCache, report: &BuildReport) -> Result<()> {
    let triplets = cache.meld_triplets().collect()?;
    if triplets.height() == 0 {
        return Ok(());
    }
    let in_scope: HashSet<String> = str_col_opt(df, "name").into_iter().flatten().collect();

    let part_a = str_col_opt(&triplets, "part_a");
    let part_b = str_col_opt(&triplets, "part_b");
    let result = str_col_opt(&triplets, "result");
    for i in 0..triplets.height() {
        let members = [&part_a[i], &part_b[i], &result[i]];
        let present = members
            .iter()
            .filter(|m| m.as_deref().map(|n| in_scope.contains(n)).unwrap_or(false))
            .count();
        if present > 0 && present < 3 {
            if let Some(name) = result[i].as_deref() {
                report.record_partial_meld(name);
            }
        }
    }
    Ok(())
}

/// Stage 12: signatures. World-Championship signatures arrive from the
/// lookup by scryfall id; Art Series sets sign with the artist. A signed
/// face gains the "signed" finish.
pub fn add_signatures(df: &mut DataFrame, lookups: &Lookups) -> Result<()> {
    let n = df.height();
    let sig_frame = lookups.signatures.clone().collect()?;
    let mut by_scryfall: HashMap<String, String> = HashMap::new();
    if sig_frame.height() > 0 {
        let ids = str_col_opt(&sig_frame, "scryfallId");
        let sigs = str_col_opt(&sig_frame, "signature");
        for i in 0..sig_frame.height() {
            if let (Some(id), Some(sig)) = (ids[i].clone(), sigs[i].clone()) {
                by_scryfall.entry(id).or_insert(sig);
            }
        }
    }

    let ids = str_col_opt(df, "id");
    let artists = str_col_opt(df, "artist");
    let set_names = str_col_opt(df, "_set_name");
    let set_codes = str_col_opt(df, "setCode");
    let mut finishes = list_str_col(df, "finishes");

    let mut signatures: Vec<Option<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let art_series = set_names[i]
            .as_deref()
            .map(|s| s.ends_with("Art Series"))
            .unwrap_or(false)
            && set_codes[i].as_deref() != Some("AMH1");
        let signature = if art_series {
            artists[i].clone().filter(|a| !a.is_empty())
        } else {
            ids[i].as_deref().and_then(|id| by_scryfall.get(id)).cloned()
        };
        if signature.is_some() && !finishes[i].iter().any(|f| f == "signed") {
            finishes[i].push("signed".to_string());
        }
        signatures.push(signature);
    }
    set_column(df, Series::new("signature".into(), signatures))?;
    set_column(df, super::util::list_str_series("finishes", finishes))?;
    Ok(())
}

/// Orientation for art-series faces, from the identifiers lookup join.
pub fn keep_orientation(df: &mut DataFrame) -> Result<()> {
    if df.column("orientation").is_err() {
        let nulls: Vec<Option<String>> = vec![None; df.height()];
        set_column(df, Series::new("orientation".into(), nulls))?;
    }
    Ok(())
}

/// Columns consumed by the pipeline that must not reach the partitions.
const RAW_COLUMNS: &[&str] = &[
    "_row_id",
    "_face_idx",
    "_join_side",
    "card_faces",
    "legalities",
    "games",
    "_type_line",
    "_card_mana_cost",
    "color_identity",
    "promo_types",
    "frame_effects",
    "artist_ids",
    "all_parts",
    "multiverse_ids",
    "attraction_lights",
    "booster",
    "lang",
    "released_at",
    "mana_cost",
    "type_line",
    "oracle_text",
    "flavor_text",
    "set",
    "collector_number",
    "cmc",
    "set_type",
    "_set_join",
    "_set_name",
    "_set_release_date",
    "_set_type",
    "_set_parent",
    "_is_funny_set",
    "_lk_side",
    "cachedUuid",
    "mcm_set_id",
    "mcm_set_name",
];

/// Stage 12 cleanup: pack the identifiers struct and drop raw upstream
/// columns. Everything left is partition schema.
pub fn pack_and_clean(df: DataFrame, cache: &SourceCache) -> Result<DataFrame> {
    // Third-party bridge ids join by scryfall id before packing.
    let bridge = cache.multiverse_bridge();

    let lf = df
        .lazy()
        .join(
            bridge.select([
                col("scryfall_id").alias("_mb_id"),
                col("cardsphere_id"),
                col("cardsphere_foil_id"),
                col("deckbox_id"),
            ]),
            [col("id")],
            [col("_mb_id")],
            JoinArgs::new(JoinType::Left),
        )
        .with_columns([as_struct(vec![
            col("id").alias("scryfallId"),
            col("oracle_id").alias("scryfallOracleId"),
            col("_illustration_id").alias("scryfallIllustrationId"),
            col("card_back_id").alias("scryfallCardBackId"),
            col("cardmarket_id").cast(DataType::String).alias("mcmId"),
            col("_mcmMetaId").alias("mcmMetaId"),
            col("arena_id").cast(DataType::String).alias("mtgArenaId"),
            col("mtgo_id").cast(DataType::String).alias("mtgoId"),
            col("mtgo_foil_id").cast(DataType::String).alias("mtgoFoilId"),
            col("_idf_multiverseId").alias("multiverseId"),
            col("tcgplayer_id")
                .cast(DataType::String)
                .alias("tcgplayerProductId"),
            col("tcgplayer_etched_id")
                .cast(DataType::String)
                .alias("tcgplayerEtchedProductId"),
            col("cardKingdomId"),
            col("cardKingdomFoilId"),
            col("cardKingdomEtchedId"),
            col("_idf_mtgjsonV4Id").alias("mtgjsonV4Id"),
            col("cardsphere_id").alias("cardsphereId"),
            col("cardsphere_foil_id").alias("cardsphereFoilId"),
            col("deckbox_id").alias("deckboxId"),
        ])
        .alias("identifiers")]);

    let mut out = lf.collect()?;

    // Drop raw columns that were folded into the struct or consumed.
    let mut to_drop: Vec<String> = RAW_COLUMNS.iter().map(|s| s.to_string()).collect();
    to_drop.extend(
        [
            "id",
            "oracle_id",
            "_illustration_id",
            "card_back_id",
            "cardmarket_id",
            "arena_id",
            "mtgo_id",
            "mtgo_foil_id",
            "tcgplayer_id",
            "tcgplayer_etched_id",
            "_idf_multiverseId",
            "_idf_mtgjsonV4Id",
            "cardsphere_id",
            "cardsphere_foil_id",
            "deckbox_id",
            "cardKingdomId",
            "cardKingdomFoilId",
            "cardKingdomEtchedId",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    for name in to_drop {
        if out.column(&name).is_ok() {
            out = out.drop(&name).map_err(mtgdb_common::MtgdbError::from)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn rebalanced_linkage_is_symmetric() {
        let mut df = df!(
            "name" => ["A-Lightning Bolt", "Lightning Bolt", "Shock"],
            "uuid" => ["u-rebal", "u-orig", "u-shock"],
        )
        .unwrap();
        add_rebalanced_linkage(&mut df).unwrap();

        let originals = df.column("originalPrintings").unwrap().list().unwrap();
        let row = originals.get_as_series(0).unwrap();
        assert_eq!(row.str().unwrap().get(0), Some("u-orig"));

        let rebalanced = df.column("rebalancedPrintings").unwrap().list().unwrap();
        let row = rebalanced.get_as_series(1).unwrap();
        assert_eq!(row.str().unwrap().get(0), Some("u-rebal"));

        // Unrelated cards carry nulls, not empty lists.
        assert!(rebalanced.get_as_series(2).is_none());
        assert!(originals.get_as_series(2).is_none());
    }

    #[test]
    fn source_products_invert_contents() {
        let contents = df!(
            "product_name" => ["Bundle A", "Bundle A", "Collector B"],
            "set_code" => ["NEO", "NEO", "NEO"],
            "card_uuid" => ["u-1", "u-2", "u-1"],
            "finish" => ["nonfoil", "foil", "foil"],
            "count" => [1i64, 1, 1],
        )
        .unwrap();
        let mut frames = std::collections::HashMap::new();
        frames.insert(crate::cache::registry::SourceKind::SealedContents, contents);
        let cache = crate::cache::SourceCache::from_frames(frames);

        let mut df = df!("uuid" => ["u-1", "u-3"]).unwrap();
        add_source_products(&mut df, &cache).unwrap();

        let nonfoil = df.column("_sp_nonfoil").unwrap().list().unwrap();
        let row = nonfoil.get_as_series(0).unwrap();
        assert_eq!(
            row.str().unwrap().get(0),
            Some(uuid5::sealed_product_uuid("Bundle A").as_str())
        );
        let foil = df.column("_sp_foil").unwrap().list().unwrap();
        assert_eq!(foil.get_as_series(0).unwrap().len(), 1);
        // Cards in no product stay null.
        assert!(nonfoil.get_as_series(1).is_none());
    }

    #[test]
    fn partial_meld_is_reported_not_fatal() {
        let triplets = df!(
            "part_a" => ["Bruna, the Fading Light"],
            "part_b" => ["Gisela, the Broken Blade"],
            "result" => ["Brisela, Voice of Nightmares"],
        )
        .unwrap();
        let mut frames = std::collections::HashMap::new();
        frames.insert(crate::cache::registry::SourceKind::MeldTriplets, triplets);
        let cache = crate::cache::SourceCache::from_frames(frames);

        let df = df!("name" => ["Brisela, Voice of Nightmares"]).unwrap();
        let report = BuildReport::new();
        check_meld_scope(&df, &cache, &report).unwrap();
    }
}
