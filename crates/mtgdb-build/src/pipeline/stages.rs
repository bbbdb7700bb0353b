//! Stages 1–2: load/filter and per-face transforms.
//!
//! Stage 1 filters the card bulk to the requested scope under the language
//! policy: every English printing is kept, plus non-English printings whose
//! oracle has no English printing in scope.
//!
//! Stage 2 explodes multi-faced rows and derives the per-face fields. The
//! face idiom throughout is coalesce(face-level field, card-level field):
//! many fields are null on the face and meaningful only at the card level.
//! The lazy half runs up to the first checkpoint; the materialized half
//! finishes the row-wise derivations on the collected frame.

use mtgdb_common::{ascii, finishes, mana, Result};
use polars::prelude::*;
use regex::Regex;
use std::collections::HashSet;

use super::util::{
    bool_col, f64_col, list_str_col, list_str_series, opt_list_str_series, set_column,
    str_col_opt,
};
use crate::cache::SourceCache;

/// Formats tracked in the legalities struct.
pub const LEGALITY_FORMATS: &[&str] = &[
    "alchemy",
    "brawl",
    "commander",
    "duel",
    "explorer",
    "future",
    "gladiator",
    "historic",
    "legacy",
    "modern",
    "oathbreaker",
    "oldschool",
    "pauper",
    "paupercommander",
    "penny",
    "pioneer",
    "predh",
    "premodern",
    "standard",
    "standardbrawl",
    "timeless",
    "vintage",
];

pub const SUPER_TYPES: &[&str] = &["Basic", "Host", "Legendary", "Ongoing", "Snow", "World"];

pub const BASIC_LAND_NAMES: &[&str] = &["Plains", "Island", "Swamp", "Mountain", "Forest"];

/// Stage 1: scope filter + language policy + set metadata join.
pub fn load_and_filter(cache: &SourceCache) -> Result<LazyFrame> {
    let bulk = cache.card_bulk();

    let english = bulk.clone().filter(col("lang").eq(lit("en")));
    let english_oracles = english
        .clone()
        .select([col("oracle_id")])
        .unique_stable(None, UniqueKeepStrategy::First);

    // Non-English rows survive only when their oracle never appears in
    // English within scope.
    let non_english_only = bulk
        .filter(col("lang").neq(lit("en")))
        .join(
            english_oracles,
            [col("oracle_id")],
            [col("oracle_id")],
            JoinArgs::new(JoinType::Anti),
        );

    let scoped = concat(
        [english, non_english_only],
        UnionArgs {
            diagonal: true,
            ..Default::default()
        },
    )?;

    let sets = cache.sets_meta().select([
        col("code").str().to_uppercase().alias("_set_join"),
        col("name").alias("_set_name"),
        col("released_at").alias("_set_release_date"),
        col("set_type").alias("_set_type"),
        col("parent_set_code").alias("_set_parent"),
    ]);

    Ok(scoped
        .with_columns([col("set").str().to_uppercase().alias("setCode")])
        .join(
            sets,
            [col("setCode")],
            [col("_set_join")],
            JoinArgs::new(JoinType::Left),
        ))
}

/// Stage 2 (lazy half): explode faces and coalesce face-level fields.
pub fn face_transforms_lazy(mut lf: LazyFrame) -> Result<LazyFrame> {
    let schema = lf.collect_schema()?;
    let lf = lf.with_row_index("_row_id", None);

    let has_faces = schema
        .iter_names()
        .any(|n| n.as_str() == "card_faces")
        && matches!(
            schema.get("card_faces"),
            Some(DataType::List(inner)) if matches!(**inner, DataType::Struct(_))
        );

    let lf = if has_faces {
        lf.explode(["card_faces"])
    } else {
        lf
    };

    let face = |field: &str, fallback: &str| -> Expr {
        if has_faces {
            coalesce(&[
                col("card_faces").struct_().field_by_name(field),
                col(fallback),
            ])
        } else {
            col(fallback)
        }
    };
    let face_only = |field: &str| -> Expr {
        if has_faces {
            col("card_faces").struct_().field_by_name(field)
        } else {
            lit(NULL).cast(DataType::String)
        }
    };

    let mut exprs = vec![
        face("name", "name").alias("name"),
        face_only("name").alias("faceName"),
        col("collector_number").alias("number"),
        face("mana_cost", "mana_cost").alias("manaCost"),
        col("mana_cost").alias("_card_mana_cost"),
        face("type_line", "type_line").fill_null(lit("Card")).alias("_type_line"),
        face("oracle_text", "oracle_text").fill_null(lit("")).alias("text"),
        face("flavor_text", "flavor_text").alias("flavorText"),
        face("power", "power").alias("power"),
        face("toughness", "toughness").alias("toughness"),
        face("loyalty", "loyalty").alias("loyalty"),
        face("defense", "defense").alias("defense"),
        face("artist", "artist").fill_null(lit("")).alias("artist"),
        face("watermark", "watermark").alias("watermark"),
        face("oracle_id", "oracle_id").alias("oracle_id"),
        face("illustration_id", "illustration_id").alias("_illustration_id"),
        col("rarity"),
        col("border_color").alias("borderColor"),
        col("frame").alias("frameVersion"),
        col("security_stamp").alias("securityStamp"),
        col("hand_modifier").alias("hand"),
        col("life_modifier").alias("life"),
        col("content_warning").alias("hasContentWarning"),
        col("full_art").alias("isFullArt"),
        col("digital").alias("isOnlineOnly"),
        col("oversized").alias("isOversized"),
        col("promo").alias("isPromo"),
        col("reprint").alias("isReprint"),
        col("reserved").alias("isReserved"),
        col("story_spotlight").alias("isStorySpotlight"),
        col("textless").alias("isTextless"),
        col("game_changer").fill_null(lit(false)).alias("isGameChanger"),
        col("edhrec_rank").alias("edhrecRank"),
        col("printed_name").alias("printedName"),
        col("printed_type_line").alias("printedType"),
        col("printed_text").alias("printedText"),
        coalesce(&[col("flavor_name"), col("printed_name")]).alias("flavorName"),
        (col("_set_type").eq(lit("funny"))).alias("_is_funny_set"),
        when(
            col("_set_release_date")
                .is_not_null()
                .and(col("released_at").neq(col("_set_release_date"))),
        )
        .then(col("released_at"))
        .otherwise(lit(NULL))
        .alias("originalReleaseDate"),
    ];

    // Legalities arrive as a struct; flatten to per-format columns with the
    // closed status vocabulary. Only formats present upstream flatten;
    // memorabilia sets carry no legalities.
    if let Some(DataType::Struct(fields)) = schema.get("legalities") {
        let present: HashSet<&str> = fields.iter().map(|f| f.name().as_str()).collect();
        for &fmt in LEGALITY_FORMATS.iter().filter(|f| present.contains(**f)) {
            let field = col("legalities").struct_().field_by_name(fmt);
            exprs.push(
                when(col("_set_type").eq(lit("memorabilia")))
                    .then(lit(NULL).cast(DataType::String))
                    .otherwise(
                        when(field.clone().eq(lit("legal")))
                            .then(lit("Legal"))
                            .when(field.clone().eq(lit("restricted")))
                            .then(lit("Restricted"))
                            .when(field.eq(lit("banned")))
                            .then(lit("Banned"))
                            .otherwise(lit(NULL).cast(DataType::String)),
                    )
                    .alias(format!("legality_{fmt}").as_str()),
            );
        }
    }

    Ok(lf.with_columns(exprs))
}

/// Stage 2 (materialized half): row-wise derivations on the collected frame.
///
/// `meld_results` is the set of meld-result names from the curated triplet
/// table; parts get side "a", results side "b".
pub fn face_transforms_finish(df: &mut DataFrame, meld_results: &HashSet<String>) -> Result<()> {
    let n = df.height();

    let row_ids = super::util::i64_col(df, "_row_id");
    let layouts = str_col_opt(df, "layout");
    let names = str_col_opt(df, "name");
    let texts = str_col_opt(df, "text");
    let type_lines = str_col_opt(df, "_type_line");
    let mana_costs = str_col_opt(df, "manaCost");
    let card_mana_costs = str_col_opt(df, "_card_mana_cost");
    let langs = str_col_opt(df, "lang");
    let raw_colors = list_str_col(df, "colors");
    let raw_identity = list_str_col(df, "color_identity");
    let raw_finishes = list_str_col(df, "finishes");
    let raw_keywords = list_str_col(df, "keywords");
    let raw_promo_types = list_str_col(df, "promo_types");
    let raw_frame_effects = list_str_col(df, "frame_effects");
    let raw_games = list_str_col(df, "games");
    let in_booster = bool_col(df, "booster");
    let card_cmc = f64_col(df, "cmc");

    // Side letters: exploded faces of one source row are adjacent, so the
    // run position within each _row_id is the face index.
    let mut sides: Vec<Option<String>> = Vec::with_capacity(n);
    let mut face_idx_in_row: Vec<usize> = Vec::with_capacity(n);
    let mut prev_row: Option<i64> = None;
    let mut run = 0usize;
    let mut row_counts: std::collections::HashMap<i64, usize> = std::collections::HashMap::new();
    for rid in row_ids.iter().flatten() {
        *row_counts.entry(*rid).or_insert(0) += 1;
    }
    for rid in &row_ids {
        match (prev_row, rid) {
            (Some(p), Some(r)) if p == *r => run += 1,
            _ => run = 0,
        }
        prev_row = *rid;
        face_idx_in_row.push(run);
        let multi = rid.map(|r| row_counts.get(&r).copied().unwrap_or(1) > 1).unwrap_or(false);
        if multi {
            sides.push(Some(
                char::from(b'a' + (run.min(25)) as u8).to_string(),
            ));
        } else {
            sides.push(None);
        }
    }

    // Meld sides: the two parts are "a", the melded result is "b".
    let mut layouts_out: Vec<Option<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let layout = layouts[i].as_deref().unwrap_or("");
        if layout == "meld" {
            let is_result = names[i]
                .as_deref()
                .map(|name| meld_results.contains(name))
                .unwrap_or(false);
            sides[i] = Some(if is_result { "b" } else { "a" }.to_string());
        }
        // Aftermath decks report as split upstream; the keyword disambiguates.
        if layout == "split"
            && raw_keywords[i].iter().any(|k| k == "Aftermath")
        {
            layouts_out.push(Some("aftermath".to_string()));
        } else {
            layouts_out.push(layouts[i].clone());
        }
    }

    // Type line parse.
    let mut type_full: Vec<Option<String>> = Vec::with_capacity(n);
    let mut supertypes: Vec<Vec<String>> = Vec::with_capacity(n);
    let mut types: Vec<Vec<String>> = Vec::with_capacity(n);
    let mut subtypes: Vec<Vec<String>> = Vec::with_capacity(n);
    for line in &type_lines {
        let line = line.as_deref().unwrap_or("Card");
        type_full.push(Some(line.to_string()));
        let (left, right) = match line.split_once(" \u{2014} ") {
            Some((l, r)) => (l, Some(r)),
            None => (line, None),
        };
        let mut sup = Vec::new();
        let mut typ = Vec::new();
        for word in left.split_whitespace() {
            if SUPER_TYPES.contains(&word) {
                sup.push(word.to_string());
            } else {
                typ.push(word.to_string());
            }
        }
        supertypes.push(sup);
        types.push(typ);
        subtypes.push(
            right
                .map(|r| r.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        );
    }

    // Mana value: card-level cost drives manaValue, the face cost drives
    // faceManaValue for multi-face layouts. Upstream cmc is the fallback for
    // costless layouts whose value is defined by rule (e.g. suspend cards).
    let mut mana_values: Vec<f64> = Vec::with_capacity(n);
    let mut face_mana_values: Vec<Option<f64>> = Vec::with_capacity(n);
    for i in 0..n {
        let card_cost = card_mana_costs[i].as_deref().unwrap_or("");
        let value = if card_cost.is_empty() {
            card_cmc[i].unwrap_or(0.0)
        } else {
            mana::mana_value(card_cost)
        };
        mana_values.push(value);
        let multi = sides[i].is_some() && layouts_out[i].as_deref() != Some("meld");
        if multi {
            let face_cost = mana_costs[i].as_deref().unwrap_or("");
            face_mana_values.push(Some(mana::mana_value(face_cost)));
        } else {
            face_mana_values.push(None);
        }
    }

    // Colors: the source list when present, else extracted from the cost;
    // always W-U-B-R-G ordered.
    let mut colors: Vec<Vec<String>> = Vec::with_capacity(n);
    let mut color_identity: Vec<Vec<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let c = if raw_colors[i].is_empty() {
            mana::colors_in_cost(mana_costs[i].as_deref().unwrap_or(""))
        } else {
            mana::sort_colors(&raw_colors[i])
        };
        colors.push(c);
        color_identity.push(mana::sort_colors(&raw_identity[i]));
    }

    // Finishes ordered nonfoil < foil < etched.
    let sorted_finishes: Vec<Vec<String>> = raw_finishes
        .iter()
        .map(|f| finishes::sort_finishes(f))
        .collect();
    let has_foil: Vec<bool> = sorted_finishes
        .iter()
        .map(|f| f.iter().any(|x| x == "foil"))
        .collect();
    let has_non_foil: Vec<bool> = sorted_finishes
        .iter()
        .map(|f| f.iter().any(|x| x == "nonfoil"))
        .collect();

    // Keywords filtered to the face's own text.
    let mut keywords: Vec<Vec<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let text_lower = texts[i].as_deref().unwrap_or("").to_lowercase();
        let mut kept: Vec<String> = raw_keywords[i]
            .iter()
            .filter(|k| text_lower.contains(&k.to_lowercase()))
            .cloned()
            .collect();
        kept.sort();
        keywords.push(kept);
    }

    // Planeswalker text: loyalty activations rendered as [+1]: style.
    let loyalty_re = Regex::new(r"(?m)^([+\u{2212}\-]?(?:\d+|X))(: )")
        .map_err(|e| mtgdb_common::MtgdbError::parse("loyalty regex", e.to_string()))?;
    let mut texts_out: Vec<Option<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let is_planeswalker = types[i].iter().any(|t| t == "Planeswalker");
        let text = texts[i].clone().unwrap_or_default();
        if is_planeswalker && !text.is_empty() {
            texts_out.push(Some(loyalty_re.replace_all(&text, "[$1]$2").into_owned()));
        } else {
            texts_out.push(Some(text));
        }
    }

    // Booster types.
    let deck_promos = ["starterdeck", "planeswalkerdeck"];
    let mut booster_types: Vec<Vec<String>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut bt = Vec::new();
        if in_booster[i].unwrap_or(false) {
            bt.push("default".to_string());
        }
        if raw_promo_types[i].iter().any(|p| deck_promos.contains(&p.as_str())) {
            bt.push("deck".to_string());
        }
        booster_types.push(bt);
    }

    // ASCII names: absent when already ASCII.
    let ascii_names: Vec<Option<String>> = names
        .iter()
        .map(|name| name.as_deref().and_then(ascii::ascii_name))
        .collect();

    // Language names.
    let languages: Vec<Option<String>> = langs
        .iter()
        .map(|l| {
            l.as_deref()
                .map(|code| crate::lookups::language_name(code).to_string())
        })
        .collect();

    let frame_effects_sorted: Vec<Vec<String>> = raw_frame_effects
        .iter()
        .map(|fe| {
            let mut fe = fe.clone();
            fe.sort();
            fe
        })
        .collect();

    let availability: Vec<Vec<String>> = raw_games
        .iter()
        .map(|g| {
            let mut g = g.clone();
            g.sort();
            g
        })
        .collect();

    let face_idx: Vec<i64> = face_idx_in_row.iter().map(|&i| i as i64).collect();
    set_column(df, Series::new("_face_idx".into(), face_idx))?;
    set_column(df, Series::new("side".into(), sides))?;
    set_column(df, Series::new("layout".into(), layouts_out))?;
    set_column(df, Series::new("type".into(), type_full))?;
    set_column(df, list_str_series("supertypes", supertypes))?;
    set_column(df, list_str_series("types", types))?;
    set_column(df, list_str_series("subtypes", subtypes))?;
    set_column(df, Series::new("manaValue".into(), mana_values.clone()))?;
    set_column(df, Series::new("convertedManaCost".into(), mana_values))?;
    set_column(df, Series::new("faceManaValue".into(), face_mana_values))?;
    set_column(df, list_str_series("colors", colors))?;
    set_column(df, list_str_series("colorIdentity", color_identity))?;
    set_column(df, list_str_series("finishes", sorted_finishes))?;
    set_column(df, Series::new("hasFoil".into(), has_foil))?;
    set_column(df, Series::new("hasNonFoil".into(), has_non_foil))?;
    set_column(df, list_str_series("keywords", keywords))?;
    set_column(df, Series::new("text".into(), texts_out))?;
    set_column(df, list_str_series("boosterTypes", booster_types))?;
    set_column(df, list_str_series("promoTypes", raw_promo_types))?;
    set_column(df, list_str_series("frameEffects", frame_effects_sorted))?;
    set_column(df, list_str_series("availability", availability))?;
    set_column(df, Series::new("asciiName".into(), ascii_names))?;
    set_column(df, Series::new("language".into(), languages))?;
    set_column(
        df,
        opt_list_str_series(
            "artistIds",
            list_str_col(df, "artist_ids")
                .into_iter()
                .map(Some)
                .collect(),
        ),
    )?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_frame() -> DataFrame {
        df!(
            "_row_id" => [0i64, 1, 1],
            "layout" => ["normal", "transform", "transform"],
            "name" => ["Lightning Bolt", "Delver of Secrets", "Insectile Aberration"],
            "text" => ["Deal 3 damage.", "At the beginning of your upkeep, flip.", "Flying"],
            "_type_line" => ["Instant", "Creature \u{2014} Human Wizard", "Creature \u{2014} Human Insect"],
            "manaCost" => [Some("{R}"), Some("{U}"), None],
            "_card_mana_cost" => [Some("{R}"), Some("{U}"), Some("{U}")],
            "lang" => ["en", "en", "en"],
        )
        .unwrap()
    }

    #[test]
    fn sides_assigned_per_run() {
        let mut df = base_frame();
        face_transforms_finish(&mut df, &HashSet::new()).unwrap();
        let sides = df.column("side").unwrap().str().unwrap();
        assert_eq!(sides.get(0), None, "single-faced card has no side");
        assert_eq!(sides.get(1), Some("a"));
        assert_eq!(sides.get(2), Some("b"));
    }

    #[test]
    fn meld_result_gets_side_b() {
        let mut df = df!(
            "_row_id" => [0i64, 1, 2],
            "layout" => ["meld", "meld", "meld"],
            "name" => ["Bruna, the Fading Light", "Gisela, the Broken Blade", "Brisela, Voice of Nightmares"],
            "text" => ["", "", ""],
            "_type_line" => ["Creature", "Creature", "Creature"],
            "manaCost" => [Some("{5}{W}{W}"), Some("{2}{W}{W}"), None],
            "_card_mana_cost" => [Some("{5}{W}{W}"), Some("{2}{W}{W}"), None],
            "lang" => ["en", "en", "en"],
        )
        .unwrap();
        let results: HashSet<String> =
            ["Brisela, Voice of Nightmares".to_string()].into_iter().collect();
        face_transforms_finish(&mut df, &results).unwrap();
        let sides = df.column("side").unwrap().str().unwrap();
        assert_eq!(sides.get(0), Some("a"));
        assert_eq!(sides.get(1), Some("a"));
        assert_eq!(sides.get(2), Some("b"));
    }

    #[test]
    fn type_line_parses() {
        let mut df = base_frame();
        face_transforms_finish(&mut df, &HashSet::new()).unwrap();
        let types = list_str_col(&df, "types");
        assert_eq!(types[0], vec!["Instant"]);
        assert_eq!(types[1], vec!["Creature"]);
        let subs = list_str_col(&df, "subtypes");
        assert_eq!(subs[1], vec!["Human", "Wizard"]);
    }

    #[test]
    fn supertypes_split_from_types() {
        let mut df = df!(
            "_row_id" => [0i64],
            "layout" => ["normal"],
            "name" => ["Nissa, Vastwood Seer"],
            "text" => [""],
            "_type_line" => ["Legendary Creature \u{2014} Elf Scout"],
            "manaCost" => [Some("{2}{G}")],
            "_card_mana_cost" => [Some("{2}{G}")],
            "lang" => ["en"],
        )
        .unwrap();
        face_transforms_finish(&mut df, &HashSet::new()).unwrap();
        assert_eq!(list_str_col(&df, "supertypes")[0], vec!["Legendary"]);
        assert_eq!(list_str_col(&df, "types")[0], vec!["Creature"]);
    }

    #[test]
    fn mana_value_from_formula() {
        let mut df = base_frame();
        face_transforms_finish(&mut df, &HashSet::new()).unwrap();
        let mv = df.column("manaValue").unwrap().f64().unwrap();
        assert_eq!(mv.get(0), Some(1.0));
    }

    #[test]
    fn planeswalker_text_is_bracketed() {
        let mut df = df!(
            "_row_id" => [0i64],
            "layout" => ["normal"],
            "name" => ["Jace"],
            "text" => ["+1: Draw a card.\n\u{2212}3: Return target creature."],
            "_type_line" => ["Legendary Planeswalker \u{2014} Jace"],
            "manaCost" => [Some("{2}{U}{U}")],
            "_card_mana_cost" => [Some("{2}{U}{U}")],
            "lang" => ["en"],
        )
        .unwrap();
        face_transforms_finish(&mut df, &HashSet::new()).unwrap();
        let text = df.column("text").unwrap().str().unwrap().get(0).unwrap();
        assert!(text.starts_with("[+1]: Draw"));
        assert!(text.contains("[\u{2212}3]: Return"));
    }
}
