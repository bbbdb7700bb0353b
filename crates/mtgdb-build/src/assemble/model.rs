//! Wire-format model.
//!
//! The serde shapes written to every JSON artifact. Field order is
//! alphabetical within each struct (the wire format's key order), optional
//! fields are absent when null, and list fields that are semantically
//! always-present serialize as empty arrays.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn is_false(v: &bool) -> bool {
    !v
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub date: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifiers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_kingdom_etched_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_kingdom_foil_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_kingdom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cardsphere_foil_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cardsphere_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deckbox_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcm_meta_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtg_arena_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtgjson_foil_version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtgjson_non_foil_version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtgjson_v4_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtgo_foil_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtgo_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiverse_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scryfall_card_back_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scryfall_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scryfall_illustration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scryfall_oracle_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcgplayer_etched_product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcgplayer_product_id: Option<String>,
}

// Serde renames are camelCase on the wire.
impl Identifiers {
    pub fn is_empty(&self) -> bool {
        serde_json::to_value(self)
            .map(|v| v.as_object().map(|o| o.is_empty()).unwrap_or(true))
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseUrls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_kingdom: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_kingdom_etched: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_kingdom_foil: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cardmarket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcgplayer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcgplayer_etched: Option<String>,
}

impl PurchaseUrls {
    pub fn is_empty(&self) -> bool {
        self.card_kingdom.is_none()
            && self.card_kingdom_etched.is_none()
            && self.card_kingdom_foil.is_none()
            && self.cardmarket.is_none()
            && self.tcgplayer.is_none()
            && self.tcgplayer_etched.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadershipSkills {
    pub brawl: bool,
    pub commander: bool,
    pub oathbreaker: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ruling {
    pub date: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor_text: Option<String>,
    pub identifiers: Identifiers,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiverse_id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedCards {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub reverse_related: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub spellbook: Vec<String>,
}

impl RelatedCards {
    pub fn is_empty(&self) -> bool {
        self.reverse_related.is_empty() && self.spellbook.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceProducts {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub etched: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub foil: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub nonfoil: Vec<String>,
}

impl SourceProducts {
    pub fn is_empty(&self) -> bool {
        self.etched.is_empty() && self.foil.is_empty() && self.nonfoil.is_empty()
    }
}

/// One card face on the wire. Shared by set cards and tokens; token-only
/// and card-only fields are optional and absent where inapplicable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardFace {
    pub artist: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub artist_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ascii_name: Option<String>,
    pub availability: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub booster_types: Vec<String>,
    pub border_color: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub card_parts: Vec<String>,
    pub color_identity: Vec<String>,
    pub colors: Vec<String>,
    pub converted_mana_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defense: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duel_deck: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edhrec_rank: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edhrec_saltiness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_converted_mana_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_mana_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_name: Option<String>,
    pub finishes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor_text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub foreign_data: Vec<ForeignData>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub frame_effects: Vec<String>,
    pub frame_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_alternative_deck_limit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_content_warning: Option<bool>,
    #[serde(skip_serializing_if = "is_false")]
    pub has_foil: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub has_non_foil: bool,
    pub identifiers: Identifiers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_alternative: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_full_art: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_funny: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_game_changer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_online_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_oversized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_promo: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_reprint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_reserved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_story_spotlight: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_textless: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_timeshifted: Option<bool>,
    pub keywords: Vec<String>,
    pub language: String,
    pub layout: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leadership_skills: Option<LeadershipSkills>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub legalities: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub life: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loyalty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mana_cost: Option<String>,
    pub mana_value: f64,
    pub name: String,
    pub number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub original_printings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub other_face_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub printings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printed_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printed_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printed_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub promo_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_urls: Option<PurchaseUrls>,
    pub rarity: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rebalanced_printings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_cards: Option<RelatedCards>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub reverse_related: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rulings: Vec<Ruling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_stamp: Option<String>,
    pub set_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_products: Option<SourceProducts>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub subsets: Vec<String>,
    pub subtypes: Vec<String>,
    pub supertypes: Vec<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub token_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toughness: Option<String>,
    #[serde(rename = "type")]
    pub type_line: String,
    pub types: Vec<String>,
    pub uuid: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub variations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckCard {
    pub count: i64,
    pub finish: String,
    pub uuid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub code: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub commander: Vec<DeckCard>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub display_commander: Vec<DeckCard>,
    pub main_board: Vec<DeckCard>,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub planes: Vec<DeckCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub schemes: Vec<DeckCard>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub side_board: Vec<DeckCard>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tokens: Vec<DeckCard>,
    #[serde(rename = "type")]
    pub deck_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedProduct {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub identifiers: Identifiers,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_urls: Option<PurchaseUrls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub uuid: String,
}

/// One set on the wire: metadata plus its cards, tokens, decks, sealed
/// products, and booster configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetObject {
    pub base_set_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booster: Option<serde_json::Value>,
    pub cards: Vec<CardFace>,
    pub code: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub decks: Vec<Deck>,
    #[serde(skip_serializing_if = "is_false")]
    pub is_foil_only: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_non_foil_only: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_online_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyrune_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcm_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcm_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtgo_code: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_code: Option<String>,
    pub release_date: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sealed_product: Vec<SealedProduct>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcgplayer_group_id: Option<i64>,
    pub tokens: Vec<CardFace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_set_code: Option<String>,
    pub total_set_size: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub translations: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub set_type: String,
}

/// Set metadata alone, for the set-list artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetListEntry {
    pub base_set_size: i64,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyrune_code: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_code: Option<String>,
    pub release_date: String,
    pub total_set_size: i64,
    #[serde(rename = "type")]
    pub set_type: String,
}
