//! Stages 6–7: identifier assembly, UUID assignment, and derived fields.
//!
//! UUIDs prefer the cached value joined from the identifiers lookup; faces
//! without one derive the deterministic v5 UUID from the canonical
//! `(scryfallId, side)` key. The legacy v4-format identifier is derived
//! alongside and carried inside the identifiers struct.

use mtgdb_common::uuid5::{self, LegacyIdParts};
use mtgdb_common::Result;
use polars::prelude::*;
use std::collections::HashMap;

use super::util::{i64_col, list_str_col, set_column, str_col_opt};
use crate::cache::SourceCache;

/// Augment availability from identifier presence: an MTGO id implies the
/// card exists on MTGO, an Arena id implies Arena.
pub fn augment_availability(df: &mut DataFrame) -> Result<()> {
    let n = df.height();
    let mtgo_ids = i64_col(df, "mtgo_id");
    let mtgo_foil_ids = i64_col(df, "mtgo_foil_id");
    let arena_ids = i64_col(df, "arena_id");
    let mut availability = list_str_col(df, "availability");

    for i in 0..n {
        if (mtgo_ids[i].is_some() || mtgo_foil_ids[i].is_some())
            && !availability[i].iter().any(|a| a == "mtgo")
        {
            availability[i].push("mtgo".to_string());
        }
        if arena_ids[i].is_some() && !availability[i].iter().any(|a| a == "arena") {
            availability[i].push("arena".to_string());
        }
        availability[i].sort();
    }

    set_column(df, super::util::list_str_series("availability", availability))?;
    Ok(())
}

/// Assign `uuid` and the legacy identifier, and derive the per-face
/// identifier columns that stage 12 packs into the nested struct.
pub fn assign_identity(df: &mut DataFrame) -> Result<()> {
    let n = df.height();
    let ids = str_col_opt(df, "id");
    let sides = str_col_opt(df, "side");
    let cached = str_col_opt(df, "cachedUuid");
    let names = str_col_opt(df, "name");
    let face_names = str_col_opt(df, "faceName");
    let types = list_str_col(df, "types");
    let colors = list_str_col(df, "colors");
    let powers = str_col_opt(df, "power");
    let toughnesses = str_col_opt(df, "toughness");
    let sets = str_col_opt(df, "set");
    let face_idx = i64_col(df, "_face_idx");

    let mut uuids: Vec<Option<String>> = Vec::with_capacity(n);
    let mut v4_ids: Vec<Option<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let Some(id) = ids[i].as_deref() else {
            uuids.push(None);
            v4_ids.push(None);
            continue;
        };
        let uuid = match cached[i].as_deref() {
            Some(hit) if !hit.is_empty() => hit.to_string(),
            _ => uuid5::face_uuid(id, sides[i].as_deref()),
        };
        uuids.push(Some(uuid));

        let parts = LegacyIdParts {
            scryfall_id: id,
            name: names[i].as_deref().unwrap_or(""),
            face_name: face_names[i].as_deref(),
            types: &types[i],
            colors: &colors[i],
            power: powers[i].as_deref(),
            toughness: toughnesses[i].as_deref(),
            side: sides[i].as_deref(),
            set_code: sets[i].as_deref().unwrap_or(""),
        };
        v4_ids.push(Some(uuid5::legacy_v4_id(&parts)));
    }

    set_column(df, Series::new("uuid".into(), uuids))?;
    set_column(df, Series::new("_idf_mtgjsonV4Id".into(), v4_ids))?;

    // Per-face multiverse id: the face index selects from the card's list.
    let mv_lists = multiverse_ids(df);
    let mut mv_out: Vec<Option<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let idx = face_idx[i].unwrap_or(0) as usize;
        mv_out.push(mv_lists[i].get(idx).copied().map(|v| v.to_string()));
    }
    set_column(df, Series::new("_idf_multiverseId".into(), mv_out))?;

    Ok(())
}

fn multiverse_ids(df: &DataFrame) -> Vec<Vec<i64>> {
    let Ok(s) = df.column("multiverse_ids") else {
        return vec![Vec::new(); df.height()];
    };
    let Ok(ca) = s.list() else {
        return vec![Vec::new(); df.height()];
    };
    (0..df.height())
        .map(|i| {
            ca.get_as_series(i)
                .and_then(|inner| {
                    inner
                        .cast(&DataType::Int64)
                        .ok()
                        .and_then(|c| c.i64().map(|x| x.into_iter().flatten().collect()).ok())
                })
                .unwrap_or_default()
        })
        .collect()
}

/// Stage 7: duel-deck side assignment from the curated override table, plus
/// the official-database page join (original printed text and type line).
pub fn derived_fields(df: &mut DataFrame, cache: &SourceCache) -> Result<()> {
    let n = df.height();

    // duelDeck: override rows with field == "duelDeck", keyed (set, number).
    let overrides = cache.manual_overrides().collect()?;
    let mut duel_map: HashMap<(String, String), String> = HashMap::new();
    if overrides.height() > 0 {
        let fields = str_col_opt(&overrides, "field");
        let set_codes = str_col_opt(&overrides, "set_code");
        let numbers = str_col_opt(&overrides, "number");
        let values = str_col_opt(&overrides, "value");
        for i in 0..overrides.height() {
            if fields[i].as_deref() == Some("duelDeck") {
                if let (Some(set), Some(num), Some(val)) =
                    (set_codes[i].clone(), numbers[i].clone(), values[i].clone())
                {
                    duel_map.insert((set.to_uppercase(), num), val);
                }
            }
        }
    }

    let set_codes = str_col_opt(df, "setCode");
    let numbers = str_col_opt(df, "number");
    let duel: Vec<Option<String>> = (0..n)
        .map(|i| {
            match (set_codes[i].as_deref(), numbers[i].as_deref()) {
                (Some(set), Some(num)) => duel_map.get(&(set.to_string(), num.to_string())).cloned(),
                _ => None,
            }
        })
        .collect();
    set_column(df, Series::new("duelDeck".into(), duel))?;

    // Official-database pages: multiverseId -> original text / type.
    let pages = cache.gatherer_pages().collect()?;
    let mut page_map: HashMap<String, (Option<String>, Option<String>)> = HashMap::new();
    if pages.height() > 0 {
        let mv = str_col_opt(&pages, "multiverse_id");
        let texts = str_col_opt(&pages, "original_text");
        let types = str_col_opt(&pages, "original_type");
        for i in 0..pages.height() {
            if let Some(key) = mv[i].clone() {
                page_map
                    .entry(key)
                    .or_insert((texts[i].clone(), types[i].clone()));
            }
        }
    }

    let mv_ids = str_col_opt(df, "_idf_multiverseId");
    let mut original_text: Vec<Option<String>> = Vec::with_capacity(n);
    let mut original_type: Vec<Option<String>> = Vec::with_capacity(n);
    for mv in &mv_ids {
        match mv.as_deref().and_then(|m| page_map.get(m)) {
            Some((text, typ)) => {
                original_text.push(text.clone());
                original_type.push(typ.clone());
            }
            None => {
                original_text.push(None);
                original_type.push(None);
            }
        }
    }
    set_column(df, Series::new("originalText".into(), original_text))?;
    set_column(df, Series::new("originalType".into(), original_type))?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cache::registry::SourceKind;

    fn identity_frame() -> DataFrame {
        let mut df = df!(
            "id" => ["sf-1", "sf-1", "sf-2"],
            "side" => [Some("a"), Some("b"), None::<&str>],
            "cachedUuid" => [None::<&str>, None, Some("11111111-2222-3333-4444-555555555555")],
            "name" => ["Delver of Secrets", "Insectile Aberration", "Lightning Bolt"],
            "faceName" => [Some("Delver of Secrets"), Some("Insectile Aberration"), None],
            "power" => [Some("1"), Some("3"), None],
            "toughness" => [Some("1"), Some("2"), None],
            "set" => ["isd", "isd", "lea"],
            "_face_idx" => [0i64, 1, 0],
        )
        .unwrap();
        df.with_column(super::super::util::list_str_series(
            "types",
            vec![vec!["Creature".into()], vec!["Creature".into()], vec!["Instant".into()]],
        ))
        .unwrap();
        df.with_column(super::super::util::list_str_series(
            "colors",
            vec![vec!["U".into()], vec!["U".into()], vec!["R".into()]],
        ))
        .unwrap();
        df
    }

    #[test]
    fn cached_uuid_wins() {
        let mut df = identity_frame();
        assign_identity(&mut df).unwrap();
        let uuids = df.column("uuid").unwrap().str().unwrap();
        assert_eq!(uuids.get(2), Some("11111111-2222-3333-4444-555555555555"));
    }

    #[test]
    fn derived_uuid_matches_canonical_formula() {
        let mut df = identity_frame();
        assign_identity(&mut df).unwrap();
        let uuids = df.column("uuid").unwrap().str().unwrap();
        assert_eq!(
            uuids.get(0).unwrap(),
            mtgdb_common::uuid5::face_uuid("sf-1", Some("a"))
        );
        assert_ne!(uuids.get(0), uuids.get(1), "faces of one card differ by side");
    }

    #[test]
    fn availability_gains_mtgo_from_id() {
        let mut df = df!(
            "mtgo_id" => [Some(123i64), None],
            "mtgo_foil_id" => [None::<i64>, None],
            "arena_id" => [None::<i64>, Some(9i64)],
        )
        .unwrap();
        df.with_column(super::super::util::list_str_series(
            "availability",
            vec![vec!["paper".into()], vec!["paper".into()]],
        ))
        .unwrap();
        augment_availability(&mut df).unwrap();
        let rows = list_str_col(&df, "availability");
        assert_eq!(rows[0], vec!["mtgo", "paper"]);
        assert_eq!(rows[1], vec!["arena", "paper"]);
    }

    #[test]
    fn duel_deck_sides_from_overrides() {
        let overrides = df!(
            "uuid" => [None::<&str>],
            "set_code" => [Some("DDG")],
            "number" => [Some("1")],
            "field" => [Some("duelDeck")],
            "value" => [Some("a")],
        )
        .unwrap();
        let mut frames = std::collections::HashMap::new();
        frames.insert(SourceKind::ManualOverrides, overrides);
        let cache = crate::cache::SourceCache::from_frames(frames);

        let mut df = df!(
            "setCode" => ["DDG", "DDG"],
            "number" => ["1", "40"],
            "_idf_multiverseId" => [None::<&str>, None],
        )
        .unwrap();
        derived_fields(&mut df, &cache).unwrap();
        let duel = df.column("duelDeck").unwrap().str().unwrap();
        assert_eq!(duel.get(0), Some("a"));
        assert_eq!(duel.get(1), None);
    }
}
