//! Relational flattening.
//!
//! Nested wire structs become flat columns: `identifiers.scryfallId` ->
//! `scryfallId`, `legalities.standard` -> `legalities_standard`, list fields
//! join with ", ". `foreignData` and `rulings` become child tables keyed by
//! the card UUID. Every relational writer keys off this one flattening.

use crate::assemble::model::CardFace;
use crate::pipeline::stages::LEGALITY_FORMATS;

/// A single flattened cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Real(f64),
    Int(i64),
    Bool(bool),
}

impl SqlValue {
    pub fn from_opt_string(v: Option<&String>) -> Self {
        match v {
            Some(s) => SqlValue::Text(s.clone()),
            None => SqlValue::Null,
        }
    }

    fn from_list(v: &[String]) -> Self {
        if v.is_empty() {
            SqlValue::Null
        } else {
            SqlValue::Text(v.join(", "))
        }
    }

    fn from_opt_bool(v: Option<bool>) -> Self {
        match v {
            Some(b) => SqlValue::Bool(b),
            None => SqlValue::Null,
        }
    }
}

/// SQL column type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Real,
    Integer,
    Boolean,
}

/// Column plan for the `cards` (and `tokens`) tables.
pub fn card_columns() -> Vec<(String, SqlType)> {
    let mut cols: Vec<(String, SqlType)> = vec![
        ("artist".into(), SqlType::Text),
        ("artistIds".into(), SqlType::Text),
        ("asciiName".into(), SqlType::Text),
        ("availability".into(), SqlType::Text),
        ("boosterTypes".into(), SqlType::Text),
        ("borderColor".into(), SqlType::Text),
        ("cardParts".into(), SqlType::Text),
        ("colorIdentity".into(), SqlType::Text),
        ("colors".into(), SqlType::Text),
        ("convertedManaCost".into(), SqlType::Real),
        ("defense".into(), SqlType::Text),
        ("duelDeck".into(), SqlType::Text),
        ("edhrecRank".into(), SqlType::Integer),
        ("edhrecSaltiness".into(), SqlType::Real),
        ("faceConvertedManaCost".into(), SqlType::Real),
        ("faceManaValue".into(), SqlType::Real),
        ("faceName".into(), SqlType::Text),
        ("finishes".into(), SqlType::Text),
        ("flavorName".into(), SqlType::Text),
        ("flavorText".into(), SqlType::Text),
        ("frameEffects".into(), SqlType::Text),
        ("frameVersion".into(), SqlType::Text),
        ("hand".into(), SqlType::Text),
        ("hasAlternativeDeckLimit".into(), SqlType::Boolean),
        ("hasContentWarning".into(), SqlType::Boolean),
        ("hasFoil".into(), SqlType::Boolean),
        ("hasNonFoil".into(), SqlType::Boolean),
        ("isAlternative".into(), SqlType::Boolean),
        ("isFullArt".into(), SqlType::Boolean),
        ("isFunny".into(), SqlType::Boolean),
        ("isGameChanger".into(), SqlType::Boolean),
        ("isOnlineOnly".into(), SqlType::Boolean),
        ("isOversized".into(), SqlType::Boolean),
        ("isPromo".into(), SqlType::Boolean),
        ("isReprint".into(), SqlType::Boolean),
        ("isReserved".into(), SqlType::Boolean),
        ("isStorySpotlight".into(), SqlType::Boolean),
        ("isTextless".into(), SqlType::Boolean),
        ("isTimeshifted".into(), SqlType::Boolean),
        ("keywords".into(), SqlType::Text),
        ("language".into(), SqlType::Text),
        ("layout".into(), SqlType::Text),
        ("leadershipSkills".into(), SqlType::Text),
    ];
    for fmt in LEGALITY_FORMATS {
        cols.push((format!("legalities_{fmt}"), SqlType::Text));
    }
    cols.extend(
        [
            ("life", SqlType::Text),
            ("loyalty", SqlType::Text),
            ("manaCost", SqlType::Text),
            ("manaValue", SqlType::Real),
            ("name", SqlType::Text),
            ("number", SqlType::Text),
            ("orientation", SqlType::Text),
            ("originalPrintings", SqlType::Text),
            ("originalReleaseDate", SqlType::Text),
            ("originalText", SqlType::Text),
            ("originalType", SqlType::Text),
            ("otherFaceIds", SqlType::Text),
            ("power", SqlType::Text),
            ("printedName", SqlType::Text),
            ("printedText", SqlType::Text),
            ("printedType", SqlType::Text),
            ("printings", SqlType::Text),
            ("promoTypes", SqlType::Text),
            ("purchaseUrls", SqlType::Text),
            ("rarity", SqlType::Text),
            ("rebalancedPrintings", SqlType::Text),
            ("relatedCards", SqlType::Text),
            ("reverseRelated", SqlType::Text),
            ("securityStamp", SqlType::Text),
            ("setCode", SqlType::Text),
            ("side", SqlType::Text),
            ("signature", SqlType::Text),
            ("sourceProducts", SqlType::Text),
            ("subsets", SqlType::Text),
            ("subtypes", SqlType::Text),
            ("supertypes", SqlType::Text),
            ("text", SqlType::Text),
            ("tokenIds", SqlType::Text),
            ("toughness", SqlType::Text),
            ("type", SqlType::Text),
            ("types", SqlType::Text),
            ("uuid", SqlType::Text),
            ("variations", SqlType::Text),
            ("watermark", SqlType::Text),
        ]
        .into_iter()
        .map(|(n, t)| (n.to_string(), t)),
    );
    // Identifier columns are flattened at the end of the row.
    for id_col in identifier_columns() {
        cols.push((id_col.to_string(), SqlType::Text));
    }
    cols
}

pub fn identifier_columns() -> &'static [&'static str] {
    &[
        "cardKingdomEtchedId",
        "cardKingdomFoilId",
        "cardKingdomId",
        "cardsphereFoilId",
        "cardsphereId",
        "deckboxId",
        "mcmId",
        "mcmMetaId",
        "mtgArenaId",
        "mtgjsonFoilVersionId",
        "mtgjsonNonFoilVersionId",
        "mtgjsonV4Id",
        "mtgoFoilId",
        "mtgoId",
        "multiverseId",
        "scryfallCardBackId",
        "scryfallId",
        "scryfallIllustrationId",
        "scryfallOracleId",
        "tcgplayerEtchedProductId",
        "tcgplayerProductId",
    ]
}

/// One flattened row, in [`card_columns`] order.
pub fn card_values(card: &CardFace) -> Vec<SqlValue> {
    let json_or_null = |v: Option<serde_json::Value>| -> SqlValue {
        match v {
            Some(value) => SqlValue::Text(value.to_string()),
            None => SqlValue::Null,
        }
    };

    let mut values = vec![
        SqlValue::Text(card.artist.clone()),
        SqlValue::from_list(&card.artist_ids),
        SqlValue::from_opt_string(card.ascii_name.as_ref()),
        SqlValue::from_list(&card.availability),
        SqlValue::from_list(&card.booster_types),
        SqlValue::Text(card.border_color.clone()),
        SqlValue::from_list(&card.card_parts),
        SqlValue::from_list(&card.color_identity),
        SqlValue::from_list(&card.colors),
        SqlValue::Real(card.converted_mana_cost),
        SqlValue::from_opt_string(card.defense.as_ref()),
        SqlValue::from_opt_string(card.duel_deck.as_ref()),
        card.edhrec_rank.map(SqlValue::Int).unwrap_or(SqlValue::Null),
        card.edhrec_saltiness
            .map(SqlValue::Real)
            .unwrap_or(SqlValue::Null),
        card.face_converted_mana_cost
            .map(SqlValue::Real)
            .unwrap_or(SqlValue::Null),
        card.face_mana_value
            .map(SqlValue::Real)
            .unwrap_or(SqlValue::Null),
        SqlValue::from_opt_string(card.face_name.as_ref()),
        SqlValue::from_list(&card.finishes),
        SqlValue::from_opt_string(card.flavor_name.as_ref()),
        SqlValue::from_opt_string(card.flavor_text.as_ref()),
        SqlValue::from_list(&card.frame_effects),
        SqlValue::Text(card.frame_version.clone()),
        SqlValue::from_opt_string(card.hand.as_ref()),
        SqlValue::from_opt_bool(card.has_alternative_deck_limit),
        SqlValue::from_opt_bool(card.has_content_warning),
        SqlValue::Bool(card.has_foil),
        SqlValue::Bool(card.has_non_foil),
        SqlValue::from_opt_bool(card.is_alternative),
        SqlValue::from_opt_bool(card.is_full_art),
        SqlValue::from_opt_bool(card.is_funny),
        SqlValue::from_opt_bool(card.is_game_changer),
        SqlValue::from_opt_bool(card.is_online_only),
        SqlValue::from_opt_bool(card.is_oversized),
        SqlValue::from_opt_bool(card.is_promo),
        SqlValue::from_opt_bool(card.is_reprint),
        SqlValue::from_opt_bool(card.is_reserved),
        SqlValue::from_opt_bool(card.is_story_spotlight),
        SqlValue::from_opt_bool(card.is_textless),
        SqlValue::from_opt_bool(card.is_timeshifted),
        SqlValue::from_list(&card.keywords),
        SqlValue::Text(card.language.clone()),
        SqlValue::Text(card.layout.clone()),
        json_or_null(
            card.leadership_skills
                .as_ref()
                .and_then(|l| serde_json::to_value(l).ok()),
        ),
    ];

    for fmt in LEGALITY_FORMATS {
        values.push(match card.legalities.get(*fmt) {
            Some(status) => SqlValue::Text(status.clone()),
            None => SqlValue::Null,
        });
    }

    values.extend([
        SqlValue::from_opt_string(card.life.as_ref()),
        SqlValue::from_opt_string(card.loyalty.as_ref()),
        SqlValue::from_opt_string(card.mana_cost.as_ref()),
        SqlValue::Real(card.mana_value),
        SqlValue::Text(card.name.clone()),
        SqlValue::Text(card.number.clone()),
        SqlValue::from_opt_string(card.orientation.as_ref()),
        SqlValue::from_list(&card.original_printings),
        SqlValue::from_opt_string(card.original_release_date.as_ref()),
        SqlValue::from_opt_string(card.original_text.as_ref()),
        SqlValue::from_opt_string(card.original_type.as_ref()),
        SqlValue::from_list(&card.other_face_ids),
        SqlValue::from_opt_string(card.power.as_ref()),
        SqlValue::from_opt_string(card.printed_name.as_ref()),
        SqlValue::from_opt_string(card.printed_text.as_ref()),
        SqlValue::from_opt_string(card.printed_type.as_ref()),
        SqlValue::from_list(&card.printings),
        SqlValue::from_list(&card.promo_types),
        json_or_null(
            card.purchase_urls
                .as_ref()
                .and_then(|p| serde_json::to_value(p).ok()),
        ),
        SqlValue::Text(card.rarity.clone()),
        SqlValue::from_list(&card.rebalanced_printings),
        json_or_null(
            card.related_cards
                .as_ref()
                .and_then(|r| serde_json::to_value(r).ok()),
        ),
        SqlValue::from_list(&card.reverse_related),
        SqlValue::from_opt_string(card.security_stamp.as_ref()),
        SqlValue::Text(card.set_code.clone()),
        SqlValue::from_opt_string(card.side.as_ref()),
        SqlValue::from_opt_string(card.signature.as_ref()),
        json_or_null(
            card.source_products
                .as_ref()
                .and_then(|s| serde_json::to_value(s).ok()),
        ),
        SqlValue::from_list(&card.subsets),
        SqlValue::from_list(&card.subtypes),
        SqlValue::from_list(&card.supertypes),
        SqlValue::Text(card.text.clone()),
        SqlValue::from_list(&card.token_ids),
        SqlValue::from_opt_string(card.toughness.as_ref()),
        SqlValue::Text(card.type_line.clone()),
        SqlValue::from_list(&card.types),
        SqlValue::Text(card.uuid.clone()),
        SqlValue::from_list(&card.variations),
        SqlValue::from_opt_string(card.watermark.as_ref()),
    ]);

    let ids = &card.identifiers;
    for value in [
        &ids.card_kingdom_etched_id,
        &ids.card_kingdom_foil_id,
        &ids.card_kingdom_id,
        &ids.cardsphere_foil_id,
        &ids.cardsphere_id,
        &ids.deckbox_id,
        &ids.mcm_id,
        &ids.mcm_meta_id,
        &ids.mtg_arena_id,
        &ids.mtgjson_foil_version_id,
        &ids.mtgjson_non_foil_version_id,
        &ids.mtgjson_v4_id,
        &ids.mtgo_foil_id,
        &ids.mtgo_id,
        &ids.multiverse_id,
        &ids.scryfall_card_back_id,
        &ids.scryfall_id,
        &ids.scryfall_illustration_id,
        &ids.scryfall_oracle_id,
        &ids.tcgplayer_etched_product_id,
        &ids.tcgplayer_product_id,
    ] {
        values.push(SqlValue::from_opt_string(value.as_ref()));
    }

    values
}

/// Child-table row plans.
pub fn foreign_data_columns() -> &'static [&'static str] {
    &[
        "uuid",
        "language",
        "name",
        "faceName",
        "flavorText",
        "text",
        "type",
        "multiverseId",
        "scryfallId",
    ]
}

pub fn foreign_data_rows(card: &CardFace) -> Vec<Vec<SqlValue>> {
    card.foreign_data
        .iter()
        .map(|fd| {
            vec![
                SqlValue::Text(card.uuid.clone()),
                SqlValue::Text(fd.language.clone()),
                SqlValue::Text(fd.name.clone()),
                SqlValue::from_opt_string(fd.face_name.as_ref()),
                SqlValue::from_opt_string(fd.flavor_text.as_ref()),
                SqlValue::from_opt_string(fd.text.as_ref()),
                SqlValue::from_opt_string(fd.type_line.as_ref()),
                SqlValue::from_opt_string(fd.multiverse_id.as_ref()),
                SqlValue::from_opt_string(fd.identifiers.scryfall_id.as_ref()),
            ]
        })
        .collect()
}

pub fn ruling_columns() -> &'static [&'static str] {
    &["uuid", "date", "text"]
}

pub fn ruling_rows(card: &CardFace) -> Vec<Vec<SqlValue>> {
    card.rulings
        .iter()
        .map(|r| {
            vec![
                SqlValue::Text(card.uuid.clone()),
                SqlValue::Text(r.date.clone()),
                SqlValue::Text(r.text.clone()),
            ]
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn values_match_columns() {
        let card = CardFace::default();
        assert_eq!(card_values(&card).len(), card_columns().len());
    }

    #[test]
    fn identifier_flattening() {
        let mut card = CardFace::default();
        card.identifiers.scryfall_id = Some("abc".to_string());
        let columns = card_columns();
        let values = card_values(&card);
        let idx = columns.iter().position(|(n, _)| n == "scryfallId").unwrap();
        assert_eq!(values[idx], SqlValue::Text("abc".to_string()));
    }

    #[test]
    fn legality_flattening() {
        let mut card = CardFace::default();
        card.legalities
            .insert("standard".to_string(), "Legal".to_string());
        let columns = card_columns();
        let values = card_values(&card);
        let idx = columns
            .iter()
            .position(|(n, _)| n == "legalities_standard")
            .unwrap();
        assert_eq!(values[idx], SqlValue::Text("Legal".to_string()));
    }
}
