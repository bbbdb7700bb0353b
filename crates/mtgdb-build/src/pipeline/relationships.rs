//! Stage 9: relationship edges and flags that need cross-row context.
//!
//! Everything here runs between checkpoints 3 and 4 against the materialized
//! frame: sibling-face links, token back-references, leadership rules, salt
//! propagation, related-card context, and the purchase-URL seeds. Every
//! emitted list is sorted so rebuilds are byte-identical.

use mtgdb_common::{uuid5, Result};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};

use super::util::{
    f64_col, i64_col, list_str_col, list_str_series, opt_list_str_series, set_column, str_col_opt,
};
use crate::cache::SourceCache;

/// Cards exempt from the four-copy deck limit.
const UNLIMITED_COPY_CARDS: &[&str] = &[
    "Dragon's Approach",
    "Hare Apparent",
    "Persistent Petitioners",
    "Rat Colony",
    "Relentless Rats",
    "Seven Dwarves",
    "Shadowborn Apostle",
    "Slime Against Humanity",
    "Tempest Hawk",
];

/// Cards that can always be a commander regardless of the type-line rules.
const COMMANDER_OVERRIDES: &[&str] = &["Grist, the Hunger Tide"];

const TOKEN_LAYOUTS: &[&str] = &["token", "double_faced_token", "emblem", "art_series"];

pub fn is_token_row(layout: &str, type_line: &str) -> bool {
    TOKEN_LAYOUTS.contains(&layout) || type_line == "Dungeon" || type_line.contains("Token")
}

/// `otherFaceIds`: each face of a multi-faced source card links to the UUIDs
/// of its siblings, symmetric within the group.
pub fn add_other_face_ids(df: &mut DataFrame) -> Result<()> {
    let n = df.height();
    let row_ids = i64_col(df, "_row_id");
    let uuids = str_col_opt(df, "uuid");

    let mut groups: HashMap<i64, Vec<String>> = HashMap::new();
    for i in 0..n {
        if let (Some(rid), Some(uuid)) = (row_ids[i], uuids[i].as_deref()) {
            groups.entry(rid).or_default().push(uuid.to_string());
        }
    }

    let mut out: Vec<Vec<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut siblings: Vec<String> = match (row_ids[i], uuids[i].as_deref()) {
            (Some(rid), Some(own)) => groups
                .get(&rid)
                .map(|g| g.iter().filter(|u| u.as_str() != own).cloned().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        siblings.sort();
        out.push(siblings);
    }
    set_column(df, list_str_series("otherFaceIds", out))?;
    Ok(())
}

/// `leadershipSkills`: commander, oathbreaker, and brawl eligibility.
pub fn add_leadership_skills(df: &mut DataFrame, cache: &SourceCache) -> Result<()> {
    let n = df.height();
    let standard_sets: HashSet<String> = {
        let frame = cache.standard_sets().collect()?;
        str_col_opt(&frame, "set_code")
            .into_iter()
            .flatten()
            .map(|s| s.to_uppercase())
            .collect()
    };

    let names = str_col_opt(df, "name");
    let types = str_col_opt(df, "type");
    let texts = str_col_opt(df, "text");
    let powers = str_col_opt(df, "power");
    let toughnesses = str_col_opt(df, "toughness");
    let sides = str_col_opt(df, "side");
    let set_codes = str_col_opt(df, "setCode");

    let mut brawl = Vec::with_capacity(n);
    let mut commander = Vec::with_capacity(n);
    let mut oathbreaker = Vec::with_capacity(n);
    let mut any = Vec::with_capacity(n);
    for i in 0..n {
        let type_line = types[i].as_deref().unwrap_or("");
        let text = texts[i].as_deref().unwrap_or("");
        let name = names[i].as_deref().unwrap_or("");

        let is_legendary = type_line.contains("Legendary");
        let is_creature = type_line.contains("Creature");
        let is_crewed = type_line.contains("Vehicle") || type_line.contains("Spacecraft");
        let has_pt = powers[i].is_some() && toughnesses[i].is_some();
        let is_front = matches!(sides[i].as_deref(), None | Some("a"));

        let is_commander = COMMANDER_OVERRIDES.contains(&name)
            || (is_legendary && (is_creature || (is_crewed && has_pt)) && is_front)
            || text.contains("can be your commander");
        let is_oathbreaker = type_line.contains("Planeswalker");
        let in_standard = set_codes[i]
            .as_deref()
            .map(|s| standard_sets.contains(s))
            .unwrap_or(false);
        let is_brawl = in_standard && (is_commander || is_oathbreaker);

        brawl.push(is_brawl);
        commander.push(is_commander);
        oathbreaker.push(is_oathbreaker);
        any.push(is_commander || is_oathbreaker || is_brawl);
    }

    set_column(df, Series::new("_ls_brawl".into(), brawl))?;
    set_column(df, Series::new("_ls_commander".into(), commander))?;
    set_column(df, Series::new("_ls_oathbreaker".into(), oathbreaker))?;
    set_column(df, Series::new("_ls_any".into(), any))?;
    Ok(())
}

/// `reverseRelated`: for tokens, the names of the cards that create or
/// reference them, from the source's related-parts lists.
pub fn add_reverse_related(df: &mut DataFrame) -> Result<()> {
    let n = df.height();
    let names = str_col_opt(df, "name");
    let parts = all_parts_names(df);

    let mut out: Vec<Vec<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let own = names[i].as_deref().unwrap_or("");
        let mut related: Vec<String> = parts[i]
            .iter()
            .filter(|p| p.as_str() != own)
            .cloned()
            .collect();
        related.sort();
        related.dedup();
        out.push(related);
    }
    set_column(df, list_str_series("reverseRelated", out))?;
    Ok(())
}

fn all_parts_names(df: &DataFrame) -> Vec<Vec<String>> {
    let Ok(s) = df.column("all_parts") else {
        return vec![Vec::new(); df.height()];
    };
    let Ok(ca) = s.list() else {
        return vec![Vec::new(); df.height()];
    };
    (0..df.height())
        .map(|i| {
            ca.get_as_series(i)
                .and_then(|inner| {
                    let st = inner.struct_().ok()?;
                    let names = st.field_by_name("name").ok()?;
                    let names = names.str().ok()?;
                    Some(
                        names
                            .into_iter()
                            .flatten()
                            .map(str::to_string)
                            .collect::<Vec<_>>(),
                    )
                })
                .unwrap_or_default()
        })
        .collect()
}

/// `tokenIds`: non-token faces link to the token faces they create, matched
/// by name within the set's associated token set (`T` + set code, or the set
/// itself). `reverseRelated` disambiguates when text parsing is ambiguous.
pub fn add_token_ids(df: &mut DataFrame) -> Result<()> {
    let n = df.height();
    let layouts = str_col_opt(df, "layout");
    let types = str_col_opt(df, "type");
    let names = str_col_opt(df, "name");
    let texts = str_col_opt(df, "text");
    let uuids = str_col_opt(df, "uuid");
    let set_codes = str_col_opt(df, "setCode");
    let reverse_related = list_str_col(df, "reverseRelated");

    // Token index: set code -> [(token name, token uuid, creator names)]
    let mut tokens_by_set: HashMap<String, Vec<(String, String, Vec<String>)>> = HashMap::new();
    for i in 0..n {
        let layout = layouts[i].as_deref().unwrap_or("");
        let type_line = types[i].as_deref().unwrap_or("");
        if !is_token_row(layout, type_line) {
            continue;
        }
        if let (Some(set), Some(name), Some(uuid)) = (
            set_codes[i].as_deref(),
            names[i].as_deref(),
            uuids[i].as_deref(),
        ) {
            tokens_by_set.entry(set.to_string()).or_default().push((
                name.to_string(),
                uuid.to_string(),
                reverse_related[i].clone(),
            ));
        }
    }

    let mut out: Vec<Vec<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let layout = layouts[i].as_deref().unwrap_or("");
        let type_line = types[i].as_deref().unwrap_or("");
        if is_token_row(layout, type_line) {
            out.push(Vec::new());
            continue;
        }
        let (Some(set), Some(name)) = (set_codes[i].as_deref(), names[i].as_deref()) else {
            out.push(Vec::new());
            continue;
        };
        let text = texts[i].as_deref().unwrap_or("");

        let mut linked: Vec<String> = Vec::new();
        for token_set in [format!("T{set}"), set.to_string()] {
            if let Some(tokens) = tokens_by_set.get(&token_set) {
                for (token_name, token_uuid, creators) in tokens {
                    let named_in_text = text.contains(token_name.as_str());
                    let back_reference = creators.iter().any(|c| c == name);
                    if named_in_text || back_reference {
                        linked.push(token_uuid.clone());
                    }
                }
            }
        }
        linked.sort();
        linked.dedup();
        out.push(linked);
    }
    set_column(df, list_str_series("tokenIds", out))?;
    Ok(())
}

/// Tokens inherit the highest saltiness of the spells that create them.
pub fn propagate_salt_to_tokens(df: &mut DataFrame) -> Result<()> {
    let n = df.height();
    let layouts = str_col_opt(df, "layout");
    let types = str_col_opt(df, "type");
    let names = str_col_opt(df, "name");
    let mut salt = f64_col(df, "edhrecSaltiness");
    let reverse_related = list_str_col(df, "reverseRelated");

    let mut salt_by_name: HashMap<String, f64> = HashMap::new();
    for i in 0..n {
        if let (Some(name), Some(s)) = (names[i].as_deref(), salt[i]) {
            let entry = salt_by_name.entry(name.to_string()).or_insert(s);
            if s > *entry {
                *entry = s;
            }
        }
    }

    for i in 0..n {
        let layout = layouts[i].as_deref().unwrap_or("");
        let type_line = types[i].as_deref().unwrap_or("");
        if !is_token_row(layout, type_line) || salt[i].is_some() {
            continue;
        }
        let inherited = reverse_related[i]
            .iter()
            .filter_map(|creator| salt_by_name.get(creator))
            .cloned()
            .fold(None::<f64>, |acc, s| {
                Some(acc.map_or(s, |a| a.max(s)))
            });
        salt[i] = inherited;
    }
    set_column(df, Series::new("edhrecSaltiness".into(), salt))?;
    Ok(())
}

/// Related-cards context from the combo/synergy source. Null when a card has
/// no entries, never an empty struct.
pub fn add_related_cards(df: &mut DataFrame, cache: &SourceCache) -> Result<()> {
    let combos = cache.combos().collect()?;
    let mut spellbook: HashMap<String, Vec<String>> = HashMap::new();
    if combos.height() > 0 {
        let names = str_col_opt(&combos, "name");
        let related = str_col_opt(&combos, "related_name");
        for i in 0..combos.height() {
            if let (Some(name), Some(rel)) = (names[i].clone(), related[i].clone()) {
                spellbook.entry(name).or_default().push(rel);
            }
        }
        for list in spellbook.values_mut() {
            list.sort();
            list.dedup();
        }
    }

    let names = str_col_opt(df, "name");
    let out: Vec<Option<Vec<String>>> = names
        .iter()
        .map(|name| {
            name.as_deref()
                .and_then(|n| spellbook.get(n))
                .cloned()
        })
        .collect();
    set_column(df, opt_list_str_series("_related_spellbook", out))?;
    Ok(())
}

/// Flags: alternative deck limit, funny-set membership, timeshifted frames.
pub fn add_flags(df: &mut DataFrame) -> Result<()> {
    let n = df.height();
    let names = str_col_opt(df, "name");
    let funny_set = super::util::bool_col(df, "_is_funny_set");
    let stamps = str_col_opt(df, "securityStamp");
    let frames = str_col_opt(df, "frameVersion");
    let set_codes = str_col_opt(df, "setCode");

    let mut alt_limit: Vec<Option<bool>> = Vec::with_capacity(n);
    let mut is_funny: Vec<Option<bool>> = Vec::with_capacity(n);
    let mut is_timeshifted: Vec<Option<bool>> = Vec::with_capacity(n);
    for i in 0..n {
        let name = names[i].as_deref().unwrap_or("");
        alt_limit.push(UNLIMITED_COPY_CARDS.contains(&name).then_some(true));

        let funny = if funny_set[i].unwrap_or(false) {
            // Un-set with an acorn stamp split: only the acorn half is funny.
            if set_codes[i].as_deref() == Some("UNF") {
                (stamps[i].as_deref() == Some("acorn")).then_some(true)
            } else {
                Some(true)
            }
        } else {
            None
        };
        is_funny.push(funny);

        let timeshifted = frames[i].as_deref() == Some("future")
            || set_codes[i].as_deref() == Some("TSB");
        is_timeshifted.push(timeshifted.then_some(true));
    }

    set_column(df, Series::new("hasAlternativeDeckLimit".into(), alt_limit))?;
    set_column(df, Series::new("isFunny".into(), is_funny))?;
    set_column(df, Series::new("isTimeshifted".into(), is_timeshifted))?;
    Ok(())
}

const LINKS_PREFIX: &str = "https://mtgjson.com/links/";
const MCM_BUFFER: &str = "10101";

/// Purchase-URL keys. Each known marketplace listing yields a deterministic
/// 16-hex redirect key; faces with no listing get nulls so the struct is
/// absent from output rather than empty.
pub fn add_purchase_urls(df: &mut DataFrame) -> Result<()> {
    let n = df.height();
    let uuids = str_col_opt(df, "uuid");
    let tcg_ids = i64_col(df, "tcgplayer_id");
    let tcg_etched_ids = i64_col(df, "tcgplayer_etched_id");
    let mcm_ids = i64_col(df, "cardmarket_id");
    let mcm_meta = str_col_opt(df, "_mcmMetaId");
    let ck_urls = str_col_opt(df, "cardKingdomUrl");
    let ck_foil_urls = str_col_opt(df, "cardKingdomFoilUrl");
    let ck_etched_urls = str_col_opt(df, "cardKingdomEtchedUrl");

    let hash = |seed: Option<String>| -> Option<String> {
        seed.map(|s| format!("{LINKS_PREFIX}{}", uuid5::url_hash(&s)))
    };

    let mut tcg = Vec::with_capacity(n);
    let mut tcg_etched = Vec::with_capacity(n);
    let mut ck = Vec::with_capacity(n);
    let mut ck_foil = Vec::with_capacity(n);
    let mut ck_etched = Vec::with_capacity(n);
    let mut mcm = Vec::with_capacity(n);
    for i in 0..n {
        let Some(uuid) = uuids[i].as_deref() else {
            tcg.push(None);
            tcg_etched.push(None);
            ck.push(None);
            ck_foil.push(None);
            ck_etched.push(None);
            mcm.push(None);
            continue;
        };
        tcg.push(hash(tcg_ids[i].map(|id| format!("{id}{uuid}"))));
        tcg_etched.push(hash(tcg_etched_ids[i].map(|id| format!("{id}{uuid}"))));
        ck.push(hash(ck_urls[i].as_deref().map(|u| format!("{u}{uuid}"))));
        ck_foil.push(hash(ck_foil_urls[i].as_deref().map(|u| format!("{u}{uuid}"))));
        ck_etched.push(hash(
            ck_etched_urls[i].as_deref().map(|u| format!("{u}{uuid}")),
        ));
        mcm.push(hash(mcm_ids[i].map(|id| {
            format!(
                "{id}{uuid}{MCM_BUFFER}{}",
                mcm_meta[i].as_deref().unwrap_or("")
            )
        })));
    }

    set_column(df, Series::new("_purl_tcgplayer".into(), tcg))?;
    set_column(df, Series::new("_purl_tcgplayerEtched".into(), tcg_etched))?;
    set_column(df, Series::new("_purl_cardKingdom".into(), ck))?;
    set_column(df, Series::new("_purl_cardKingdomFoil".into(), ck_foil))?;
    set_column(df, Series::new("_purl_cardKingdomEtched".into(), ck_etched))?;
    set_column(df, Series::new("_purl_cardmarket".into(), mcm))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    #[test]
    fn other_face_ids_are_symmetric() {
        let mut df = df!(
            "_row_id" => [0i64, 0, 1],
            "uuid" => ["u-a", "u-b", "u-solo"],
        )
        .unwrap();
        add_other_face_ids(&mut df).unwrap();
        let rows = list_str_col(&df, "otherFaceIds");
        assert_eq!(rows[0], vec!["u-b"]);
        assert_eq!(rows[1], vec!["u-a"]);
        assert!(rows[2].is_empty());
    }

    #[test]
    fn token_links_resolve_within_token_set() {
        let mut df = df!(
            "_row_id" => [0i64, 1],
            "layout" => ["normal", "token"],
            "type" => ["Sorcery", "Token Creature \u{2014} Goblin"],
            "name" => ["Hordeling Outburst", "Goblin"],
            "text" => ["Create three 1/1 red Goblin creature tokens.", ""],
            "uuid" => ["u-spell", "u-token"],
            "setCode" => ["KTK", "TKTK"],
        )
        .unwrap();
        df.with_column(list_str_series(
            "reverseRelated",
            vec![vec![], vec!["Hordeling Outburst".into()]],
        ))
        .unwrap();
        add_token_ids(&mut df).unwrap();
        let rows = list_str_col(&df, "tokenIds");
        assert_eq!(rows[0], vec!["u-token"]);
        assert!(rows[1].is_empty(), "tokens do not link to tokens");
    }

    #[test]
    fn salt_flows_from_creator_to_token() {
        let mut df = df!(
            "layout" => ["normal", "token"],
            "type" => ["Sorcery", "Token"],
            "name" => ["Army Maker", "Soldier"],
            "edhrecSaltiness" => [Some(2.5f64), None],
        )
        .unwrap();
        df.with_column(list_str_series(
            "reverseRelated",
            vec![vec![], vec!["Army Maker".into()]],
        ))
        .unwrap();
        propagate_salt_to_tokens(&mut df).unwrap();
        let salt = df.column("edhrecSaltiness").unwrap().f64().unwrap();
        assert_eq!(salt.get(1), Some(2.5));
    }

    #[test]
    fn leadership_rules() {
        let frames: Map<crate::cache::registry::SourceKind, DataFrame> = Map::new();
        let cache = crate::cache::SourceCache::from_frames(frames);
        let mut df = df!(
            "name" => ["Atraxa, Praetors' Voice", "Lightning Bolt", "Back Face"],
            "type" => ["Legendary Creature \u{2014} Phyrexian Angel", "Instant", "Legendary Creature"],
            "text" => ["", "", ""],
            "power" => [Some("4"), None, Some("4")],
            "toughness" => [Some("4"), None, Some("4")],
            "side" => [None::<&str>, None, Some("b")],
            "setCode" => ["C16", "LEA", "XXX"],
        )
        .unwrap();
        add_leadership_skills(&mut df, &cache).unwrap();
        let commander = df.column("_ls_commander").unwrap().bool().unwrap();
        assert_eq!(commander.get(0), Some(true));
        assert_eq!(commander.get(1), Some(false));
        assert_eq!(commander.get(2), Some(false), "back faces cannot lead");
    }

    #[test]
    fn purchase_urls_absent_without_listings() {
        let mut df = df!(
            "uuid" => ["u-1"],
            "tcgplayer_id" => [None::<i64>],
            "tcgplayer_etched_id" => [None::<i64>],
            "cardmarket_id" => [None::<i64>],
            "_mcmMetaId" => [None::<&str>],
            "cardKingdomUrl" => [None::<&str>],
            "cardKingdomFoilUrl" => [None::<&str>],
            "cardKingdomEtchedUrl" => [None::<&str>],
        )
        .unwrap();
        add_purchase_urls(&mut df).unwrap();
        assert!(df.column("_purl_tcgplayer").unwrap().str().unwrap().get(0).is_none());
    }

    #[test]
    fn purchase_url_hash_is_deterministic() {
        let mut df = df!(
            "uuid" => ["u-1", "u-1"],
            "tcgplayer_id" => [Some(42i64), Some(42)],
            "tcgplayer_etched_id" => [None::<i64>, None],
            "cardmarket_id" => [None::<i64>, None],
            "_mcmMetaId" => [None::<&str>, None],
            "cardKingdomUrl" => [None::<&str>, None],
            "cardKingdomFoilUrl" => [None::<&str>, None],
            "cardKingdomEtchedUrl" => [None::<&str>, None],
        )
        .unwrap();
        add_purchase_urls(&mut df).unwrap();
        let col = df.column("_purl_tcgplayer").unwrap();
        let col = col.str().unwrap();
        assert_eq!(col.get(0), col.get(1));
        assert!(col.get(0).unwrap().starts_with(LINKS_PREFIX));
    }
}
