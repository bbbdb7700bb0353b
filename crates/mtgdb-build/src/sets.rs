//! Set metadata and per-set object composition.

use mtgdb_common::Result;
use polars::prelude::*;
use std::collections::BTreeMap;

use crate::assemble::model::{CardFace, SetListEntry, SetObject};
use crate::cache::SourceCache;
use crate::pipeline::util::{bool_col, i64_col, str_col_opt};
use crate::{decks, sealed};

/// Sets released after this date count only non-booster-fun faces toward
/// `baseSetSize`. Observed release date of the first set with booster-fun
/// inserts (Throne of Eldraine).
pub const BOOSTER_FUN_CUTOFF: &str = "2019-10-04";

/// Raw set metadata pulled from the sets source for one code.
#[derive(Debug, Clone, Default)]
pub struct SetMeta {
    pub name: String,
    pub release_date: String,
    pub set_type: String,
    pub parent_code: Option<String>,
    pub block: Option<String>,
    pub keyrune_code: Option<String>,
    pub mtgo_code: Option<String>,
    pub tcgplayer_group_id: Option<i64>,
    pub is_foil_only: bool,
    pub is_non_foil_only: bool,
    pub is_online_only: bool,
}

/// Load metadata for every set in the sets source, keyed by uppercase code.
pub fn load_set_meta(cache: &SourceCache) -> Result<BTreeMap<String, SetMeta>> {
    let df = cache.sets_meta().collect()?;
    let mut out = BTreeMap::new();
    if df.height() == 0 {
        return Ok(out);
    }
    let codes = str_col_opt(&df, "code");
    let names = str_col_opt(&df, "name");
    let released = str_col_opt(&df, "released_at");
    let types = str_col_opt(&df, "set_type");
    let parents = str_col_opt(&df, "parent_set_code");
    let blocks = str_col_opt(&df, "block");
    let keyrunes = str_col_opt(&df, "keyrune_code");
    let mtgo_codes = str_col_opt(&df, "mtgo_code");
    let tcg_groups = i64_col(&df, "tcgplayer_id");
    let foil_only = bool_col(&df, "foil_only");
    let nonfoil_only = bool_col(&df, "nonfoil_only");
    let digital = bool_col(&df, "digital");

    for i in 0..df.height() {
        let Some(code) = codes[i].as_deref() else {
            continue;
        };
        out.insert(
            code.to_uppercase(),
            SetMeta {
                name: names[i].clone().unwrap_or_default(),
                release_date: released[i].clone().unwrap_or_default(),
                set_type: types[i].clone().unwrap_or_default(),
                parent_code: parents[i].as_deref().map(str::to_uppercase),
                block: blocks[i].clone(),
                keyrune_code: keyrunes[i].as_deref().map(str::to_uppercase),
                mtgo_code: mtgo_codes[i].clone(),
                tcgplayer_group_id: tcg_groups[i],
                is_foil_only: foil_only[i].unwrap_or(false),
                is_non_foil_only: nonfoil_only[i].unwrap_or(false),
                is_online_only: digital[i].unwrap_or(false),
            },
        );
    }
    Ok(out)
}

/// Base size counts non-booster-fun faces for sets released after the
/// cutoff; earlier sets never carried bonus inserts, so base equals total.
pub fn set_sizes(cards: &[CardFace], release_date: &str) -> (i64, i64) {
    let total = cards.len() as i64;
    if release_date.is_empty() || release_date < BOOSTER_FUN_CUTOFF {
        return (total, total);
    }
    let base = cards
        .iter()
        .filter(|c| !c.promo_types.iter().any(|p| p == "boosterfun"))
        .count() as i64;
    (base, total)
}

/// Compose one wire-format set object from its card/token faces and the
/// independent metadata sources.
pub fn build_set_object(
    cache: &SourceCache,
    code: &str,
    meta: Option<&SetMeta>,
    cards: Vec<CardFace>,
    tokens: Vec<CardFace>,
    has_token_partition: bool,
) -> Result<SetObject> {
    let meta = meta.cloned().unwrap_or_default();
    let (base_set_size, total_set_size) = set_sizes(&cards, &meta.release_date);

    let booster = load_booster_config(cache, code)?;
    let decks = decks::decks_for_set(cache, code)?;
    let sealed_product = sealed::sealed_for_set(cache, code)?;

    let (mcm_id, mcm_name) = marketplace_meta(cache, code)?;

    Ok(SetObject {
        base_set_size,
        block: meta.block,
        booster,
        cards,
        code: code.to_string(),
        decks,
        is_foil_only: meta.is_foil_only,
        is_non_foil_only: meta.is_non_foil_only,
        is_online_only: meta.is_online_only,
        keyrune_code: meta.keyrune_code,
        mcm_id,
        mcm_name,
        mtgo_code: meta.mtgo_code,
        name: meta.name,
        parent_code: meta.parent_code,
        release_date: meta.release_date,
        sealed_product,
        tcgplayer_group_id: meta.tcgplayer_group_id,
        token_set_code: has_token_partition.then(|| format!("T{code}")),
        tokens,
        total_set_size,
        translations: BTreeMap::new(),
        set_type: meta.set_type,
    })
}

pub fn set_list_entry(code: &str, meta: &SetMeta, base: i64, total: i64) -> SetListEntry {
    SetListEntry {
        base_set_size: base,
        code: code.to_string(),
        keyrune_code: meta.keyrune_code.clone(),
        name: meta.name.clone(),
        parent_code: meta.parent_code.clone(),
        release_date: meta.release_date.clone(),
        total_set_size: total,
        set_type: meta.set_type.clone(),
    }
}

fn load_booster_config(cache: &SourceCache, code: &str) -> Result<Option<serde_json::Value>> {
    let df = cache.booster_configs().collect()?;
    if df.height() == 0 {
        return Ok(None);
    }
    let codes = str_col_opt(&df, "set_code");
    let configs = str_col_opt(&df, "config_json");
    for i in 0..df.height() {
        if codes[i].as_deref().map(str::to_uppercase).as_deref() == Some(code) {
            if let Some(raw) = configs[i].as_deref() {
                return Ok(serde_json::from_str(raw).ok());
            }
        }
    }
    Ok(None)
}

fn marketplace_meta(cache: &SourceCache, code: &str) -> Result<(Option<i64>, Option<String>)> {
    let df = cache.marketplace_ids().collect()?;
    if df.height() == 0 {
        return Ok((None, None));
    }
    let codes = str_col_opt(&df, "set_code");
    let ids = i64_col(&df, "mcm_set_id");
    let names = str_col_opt(&df, "mcm_set_name");
    for i in 0..df.height() {
        if codes[i].as_deref().map(str::to_uppercase).as_deref() == Some(code) {
            return Ok((ids[i], names[i].clone()));
        }
    }
    Ok((None, None))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn face(promo_types: &[&str]) -> CardFace {
        CardFace {
            promo_types: promo_types.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn old_sets_count_everything() {
        let cards = vec![face(&[]), face(&["boosterfun"])];
        let (base, total) = set_sizes(&cards, "1993-08-05");
        assert_eq!((base, total), (2, 2));
    }

    #[test]
    fn post_cutoff_sets_exclude_booster_fun() {
        let cards = vec![face(&[]), face(&[]), face(&["boosterfun"])];
        let (base, total) = set_sizes(&cards, "2021-02-05");
        assert_eq!(base, 2);
        assert_eq!(total, 3);
        assert!(total >= base);
    }
}
