//! Stage 13: sink.
//!
//! Deduplicates each face to its default language, computes within-set
//! variations, links foil/non-foil twins in the handful of sets that print
//! them as distinct cards, splits card rows from token rows, and writes
//! per-set hive partitions. Rows are sorted by (name, number, side) before
//! write so partitions are diff-stable.

use mtgdb_common::{MtgdbError, Result};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

use super::relationships::is_token_row;
use super::util::{list_str_col, list_str_series, set_column, str_col_opt};
use crate::pipeline::stages::BASIC_LAND_NAMES;

/// Sets where foil and non-foil versions are distinct physical cards.
const FOIL_TWIN_SETS: &[&str] = &["CN2", "FRF", "ONS", "10E", "UNH"];

/// Sets whose variation key includes finishes.
const FINISH_KEYED_SETS: &[&str] = &["UNH", "10E"];

/// Keep one row per `(setCode, number, side)`, preferring English. Sort
/// first, keep first: the determinism rule for every dedup in the pipeline.
pub fn dedup_default_language(df: DataFrame) -> Result<DataFrame> {
    let df = df
        .lazy()
        .with_columns([(col("language").neq(lit("English")))
            .cast(DataType::Int32)
            .alias("_lang_rank")])
        .sort_by_exprs(
            vec![
                col("setCode"),
                col("number"),
                col("side").fill_null(lit("")),
                col("_lang_rank"),
                col("language"),
            ],
            SortMultipleOptions::default(),
        )
        .collect()?;

    let set_codes = str_col_opt(&df, "setCode");
    let numbers = str_col_opt(&df, "number");
    let sides = str_col_opt(&df, "side");

    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    let mask: BooleanChunked = (0..df.height())
        .map(|i| {
            let key = (
                set_codes[i].clone().unwrap_or_default(),
                numbers[i].clone().unwrap_or_default(),
                sides[i].clone().unwrap_or_default(),
            );
            seen.insert(key)
        })
        .collect();

    let mut out = df.filter(&mask).map_err(MtgdbError::from)?;
    out = out.drop("_lang_rank").map_err(MtgdbError::from)?;
    Ok(out)
}

/// Variations: faces sharing `(setCode, base name, faceName)` but differing
/// in collector number. Alternatives are the non-first members of a
/// duplicate printing key; basic lands never count.
pub fn add_variations(df: &mut DataFrame) -> Result<()> {
    let n = df.height();
    let set_codes = str_col_opt(df, "setCode");
    let names = str_col_opt(df, "name");
    let face_names = str_col_opt(df, "faceName");
    let numbers = str_col_opt(df, "number");
    let uuids = str_col_opt(df, "uuid");
    let borders = str_col_opt(df, "borderColor");
    let frames = str_col_opt(df, "frameVersion");
    let sides = str_col_opt(df, "side");
    let frame_effects = list_str_col(df, "frameEffects");
    let finishes = list_str_col(df, "finishes");

    // Base name strips parenthesized variant tags.
    let base_name = |name: &str| -> String {
        name.split(" (").next().unwrap_or(name).to_string()
    };

    let mut groups: HashMap<(String, String, String), Vec<(String, String)>> = HashMap::new();
    for i in 0..n {
        let (Some(set), Some(name), Some(uuid)) = (
            set_codes[i].as_deref(),
            names[i].as_deref(),
            uuids[i].as_deref(),
        ) else {
            continue;
        };
        let key = (
            set.to_string(),
            base_name(name),
            face_names[i].clone().unwrap_or_default(),
        );
        groups
            .entry(key)
            .or_default()
            .push((uuid.to_string(), numbers[i].clone().unwrap_or_default()));
    }

    let mut variations: Vec<Vec<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let (Some(set), Some(name), Some(uuid)) = (
            set_codes[i].as_deref(),
            names[i].as_deref(),
            uuids[i].as_deref(),
        ) else {
            variations.push(Vec::new());
            continue;
        };
        let key = (
            set.to_string(),
            base_name(name),
            face_names[i].clone().unwrap_or_default(),
        );
        let own_number = numbers[i].as_deref().unwrap_or("");
        let mut others: Vec<String> = groups
            .get(&key)
            .map(|members| {
                members
                    .iter()
                    .filter(|(u, num)| u != uuid && num != own_number)
                    .map(|(u, _)| u.clone())
                    .collect()
            })
            .unwrap_or_default();
        others.sort();
        others.dedup();
        variations.push(others);
    }

    // Printing key for isAlternative: first occurrence in sorted order is
    // canonical, later duplicates are alternatives.
    let mut first_by_key: HashMap<String, String> = HashMap::new();
    let mut keys: Vec<Option<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let name = names[i].as_deref().unwrap_or("");
        if variations[i].is_empty() || BASIC_LAND_NAMES.contains(&name) {
            keys.push(None);
            continue;
        }
        let mut key = format!(
            "{name}|{}|{}|{}|{}",
            borders[i].as_deref().unwrap_or(""),
            frames[i].as_deref().unwrap_or(""),
            frame_effects[i].join(","),
            sides[i].as_deref().unwrap_or(""),
        );
        if FINISH_KEYED_SETS.contains(&set_codes[i].as_deref().unwrap_or("")) {
            key.push('|');
            key.push_str(&finishes[i].join(","));
        }
        keys.push(Some(key));
    }
    // Resolve first occurrences against sorted UUID order for determinism.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| uuids[a].cmp(&uuids[b]));
    for &i in &order {
        if let (Some(key), Some(uuid)) = (keys[i].as_deref(), uuids[i].as_deref()) {
            first_by_key
                .entry(key.to_string())
                .or_insert_with(|| uuid.to_string());
        }
    }

    let is_alternative: Vec<Option<bool>> = (0..n)
        .map(|i| match (keys[i].as_deref(), uuids[i].as_deref()) {
            (Some(key), Some(uuid)) => {
                (first_by_key.get(key).map(String::as_str) != Some(uuid)).then_some(true)
            }
            _ => None,
        })
        .collect();

    set_column(df, list_str_series("variations", variations))?;
    set_column(df, Series::new("isAlternative".into(), is_alternative))?;
    Ok(())
}

/// Foil/non-foil twin linkage via shared illustration, pair sets only.
pub fn link_foil_twins(df: &mut DataFrame) -> Result<()> {
    let n = df.height();
    let set_codes = str_col_opt(df, "setCode");
    let uuids = str_col_opt(df, "uuid");
    let finishes = list_str_col(df, "finishes");

    let illustration: Vec<Option<String>> = {
        let ids = df
            .column("identifiers")
            .ok()
            .and_then(|c| c.struct_().ok().map(|st| st.field_by_name("scryfallIllustrationId")));
        match ids {
            Some(Ok(series)) => series
                .str()
                .map(|ca| ca.into_iter().map(|v| v.map(str::to_string)).collect())
                .unwrap_or_else(|_| vec![None; n]),
            _ => vec![None; n],
        }
    };

    let mut groups: HashMap<(String, String), Vec<usize>> = HashMap::new();
    for i in 0..n {
        let set = set_codes[i].as_deref().unwrap_or("");
        if !FOIL_TWIN_SETS.contains(&set) {
            continue;
        }
        if let Some(ill) = illustration[i].as_deref() {
            groups
                .entry((set.to_string(), ill.to_string()))
                .or_default()
                .push(i);
        }
    }

    let mut foil_version: Vec<Option<String>> = vec![None; n];
    let mut nonfoil_version: Vec<Option<String>> = vec![None; n];
    for members in groups.values() {
        if members.len() != 2 {
            continue;
        }
        let (a, b) = (members[0], members[1]);
        let a_foil = !finishes[a].iter().any(|f| f == "nonfoil");
        let b_foil = !finishes[b].iter().any(|f| f == "nonfoil");
        let (foil_idx, nonfoil_idx) = match (a_foil, b_foil) {
            (true, false) => (a, b),
            (false, true) => (b, a),
            _ => continue,
        };
        foil_version[nonfoil_idx] = uuids[foil_idx].clone();
        nonfoil_version[foil_idx] = uuids[nonfoil_idx].clone();
    }

    set_column(df, Series::new("mtgjsonFoilVersionId".into(), foil_version))?;
    set_column(df, Series::new("mtgjsonNonFoilVersionId".into(), nonfoil_version))?;
    Ok(())
}

/// Split card rows from token rows.
pub fn split_tokens(df: &DataFrame) -> Result<(DataFrame, DataFrame)> {
    let layouts = str_col_opt(df, "layout");
    let types = str_col_opt(df, "type");
    let mask: BooleanChunked = (0..df.height())
        .map(|i| {
            is_token_row(
                layouts[i].as_deref().unwrap_or(""),
                types[i].as_deref().unwrap_or(""),
            )
        })
        .collect();

    let tokens = df.filter(&mask).map_err(MtgdbError::from)?;
    let cards = df.filter(&!mask).map_err(MtgdbError::from)?;
    Ok((cards, tokens))
}

/// Write per-set partitions under `root/setCode=<CODE>/0.parquet`, each
/// sorted by (name, number, side).
pub fn write_partitions(df: &DataFrame, root: &Path) -> Result<Vec<String>> {
    std::fs::create_dir_all(root)?;
    let mut written = Vec::new();
    if df.height() == 0 {
        return Ok(written);
    }

    let parts = df
        .partition_by_stable(["setCode"], true)
        .map_err(MtgdbError::from)?;
    for part in parts {
        let set_code = part
            .column("setCode")
            .map_err(MtgdbError::from)?
            .str()
            .map_err(MtgdbError::from)?
            .get(0)
            .unwrap_or("UNKNOWN")
            .to_string();

        let mut sorted = part
            .lazy()
            .sort_by_exprs(
                vec![col("name"), col("number"), col("side").fill_null(lit(""))],
                SortMultipleOptions::default(),
            )
            .collect()?;

        let dir = root.join(format!("setCode={set_code}"));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("0.parquet");
        let file = std::fs::File::create(&path)?;
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Zstd(None))
            .finish(&mut sorted)
            .map_err(MtgdbError::from)?;
        written.push(set_code);
    }
    info!(partitions = written.len(), root = %root.display(), "partitions written");
    Ok(written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn dedup_prefers_english() {
        let df = df!(
            "setCode" => ["REN", "REN"],
            "number" => ["1", "1"],
            "side" => [None::<&str>, None],
            "language" => ["French", "English"],
            "uuid" => ["u-fr", "u-en"],
        )
        .unwrap();
        let out = dedup_default_language(df).unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(
            out.column("uuid").unwrap().str().unwrap().get(0),
            Some("u-en")
        );
    }

    #[test]
    fn dedup_keeps_foreign_only_faces() {
        let df = df!(
            "setCode" => ["REN"],
            "number" => ["2"],
            "side" => [None::<&str>],
            "language" => ["French"],
            "uuid" => ["u-fr"],
        )
        .unwrap();
        let out = dedup_default_language(df).unwrap();
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn variations_exclude_same_number() {
        let mut df = df!(
            "setCode" => ["UST", "UST", "UST"],
            "name" => ["Very Cryptic Command", "Very Cryptic Command", "Other"],
            "faceName" => [None::<&str>, None, None],
            "number" => ["49a", "49b", "1"],
            "uuid" => ["u-a", "u-b", "u-c"],
            "borderColor" => ["black", "black", "black"],
            "frameVersion" => ["2015", "2015", "2015"],
            "side" => [None::<&str>, None, None],
        )
        .unwrap();
        add_variations(&mut df).unwrap();
        let rows = list_str_col(&df, "variations");
        assert_eq!(rows[0], vec!["u-b"]);
        assert_eq!(rows[1], vec!["u-a"]);
        assert!(rows[2].is_empty());
    }

    #[test]
    fn tokens_split_from_cards() {
        let df = df!(
            "layout" => ["normal", "token", "normal"],
            "type" => ["Instant", "Token Creature", "Dungeon"],
        )
        .unwrap();
        let (cards, tokens) = split_tokens(&df).unwrap();
        assert_eq!(cards.height(), 1);
        assert_eq!(tokens.height(), 2, "dungeons emit with tokens");
    }

    #[test]
    fn partitions_land_per_set() {
        let dir = tempfile::tempdir().unwrap();
        let df = df!(
            "setCode" => ["LEA", "NEO"],
            "name" => ["Bolt", "Kami"],
            "number" => ["161", "1"],
            "side" => [None::<&str>, None],
        )
        .unwrap();
        let written = write_partitions(&df, dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("setCode=LEA/0.parquet").exists());
        assert!(dir.path().join("setCode=NEO/0.parquet").exists());
    }
}
