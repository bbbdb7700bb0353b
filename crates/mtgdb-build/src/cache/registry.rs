//! Registry of external sources.
//!
//! Each source is downloaded once per run (when stale), materialized to a
//! local zstd parquet file, and re-opened as a lazy scan. The registry is
//! the single place that knows source names, endpoints, and payload shapes.

use serde::{Deserialize, Serialize};

/// Every external source the build can consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Primary card catalog bulk export (multi-GB raw)
    CardBulk,
    /// Oracle rulings
    Rulings,
    /// Set metadata (codes, release dates, types, parents)
    SetsMeta,
    /// Retail inventory with pricing and URL paths
    RetailInventory,
    /// Marketplace product/meta identifier mapping
    MarketplaceIds,
    /// Commander-format saltiness scores
    SaltScores,
    /// Combo / synergy lists
    Combos,
    /// Curated meld triplet table
    MeldTriplets,
    /// Secret-lair subset metadata
    SecretLairDrops,
    /// Marketplace SKU listing (includes group-id to set-code table)
    MarketplaceSkus,
    /// Official-database page IDs and original text
    GathererPages,
    /// Art-series image orientation table
    Orientations,
    /// Third-party id bridge (cardsphere, deckbox)
    MultiverseBridge,
    /// Sealed product listings
    SealedProducts,
    /// Sealed product contents (card lists, sub-packs, variable pools)
    SealedContents,
    /// Preconstructed deck lists
    DeckLists,
    /// Booster pack configurations
    BoosterConfigs,
    /// Token-to-product mappings
    TokenProducts,
    /// Manual override tables (joined at the enrichment stage)
    ManualOverrides,
    /// Watermark corrections
    WatermarkOverrides,
    /// Face-specific flavor-name aliases
    FaceFlavorNames,
    /// World Championship signature table
    Signatures,
    /// Sets currently legal in Standard (for brawl eligibility)
    StandardSets,
}

/// Payload shape of a raw source download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// A JSON array of records, possibly gzip-compressed
    JsonArray,
    /// Newline-delimited JSON records
    NdJson,
    /// CSV with a header row
    Csv,
}

pub struct SourceSpec {
    pub kind: SourceKind,
    pub name: &'static str,
    pub url: &'static str,
    pub format: SourceFormat,
}

impl SourceKind {
    /// Stable on-disk name: `cache/sources/<name>.parquet`.
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn spec(self) -> SourceSpec {
        use SourceFormat::*;
        use SourceKind::*;
        let (name, url, format) = match self {
            CardBulk => ("card_bulk", "https://data.scryfall.io/all-cards/all-cards.json", JsonArray),
            Rulings => ("rulings", "https://data.scryfall.io/rulings/rulings.json", JsonArray),
            SetsMeta => ("sets_meta", "https://api.scryfall.com/sets", JsonArray),
            RetailInventory => ("retail_inventory", "https://api.cardkingdom.com/api/v2/pricelist", JsonArray),
            MarketplaceIds => ("marketplace_ids", "https://api.cardmarket.com/ws/v2.0/products", Csv),
            SaltScores => ("salt_scores", "https://edhrec.com/api/salt", JsonArray),
            Combos => ("combos", "https://commanderspellbook.com/api/combos", JsonArray),
            MeldTriplets => ("meld_triplets", "https://mtgjson.com/resources/meld_triplets.json", JsonArray),
            SecretLairDrops => ("secret_lair_drops", "https://mtg.wiki/api/secret_lair", JsonArray),
            MarketplaceSkus => ("marketplace_skus", "https://tcgcsv.com/tcgplayer/skus", Csv),
            GathererPages => ("gatherer_pages", "https://gatherer.wizards.com/export/pages.json", JsonArray),
            Orientations => ("orientations", "https://api.scryfall.com/art-series/orientations", JsonArray),
            MultiverseBridge => ("multiverse_bridge", "https://www.multiversebridge.com/api/v1/cards", JsonArray),
            SealedProducts => ("sealed_products", "https://mtgjson.com/resources/sealed_products.json", JsonArray),
            SealedContents => ("sealed_contents", "https://mtgjson.com/resources/sealed_contents.json", JsonArray),
            DeckLists => ("deck_lists", "https://mtgjson.com/resources/decks.json", JsonArray),
            BoosterConfigs => ("booster_configs", "https://mtgjson.com/resources/boosters.json", JsonArray),
            TokenProducts => ("token_products", "https://mtgjson.com/resources/token_products.json", JsonArray),
            ManualOverrides => ("manual_overrides", "https://mtgjson.com/resources/manual_overrides.json", JsonArray),
            WatermarkOverrides => ("watermark_overrides", "https://mtgjson.com/resources/watermark_overrides.json", JsonArray),
            FaceFlavorNames => ("face_flavor_names", "https://mtgjson.com/resources/face_flavor_names.json", JsonArray),
            Signatures => ("signatures", "https://mtgjson.com/resources/world_championship_signatures.json", JsonArray),
            StandardSets => ("standard_sets", "https://whatsinstandard.com/api/v6/standard.json", JsonArray),
        };
        SourceSpec {
            kind: self,
            name,
            url,
            format,
        }
    }

    /// Every source, in load order. The card bulk goes first so its
    /// materialization overlaps the small downloads.
    pub fn all() -> &'static [SourceKind] {
        use SourceKind::*;
        &[
            CardBulk,
            Rulings,
            SetsMeta,
            RetailInventory,
            MarketplaceIds,
            SaltScores,
            Combos,
            MeldTriplets,
            SecretLairDrops,
            MarketplaceSkus,
            GathererPages,
            Orientations,
            MultiverseBridge,
            SealedProducts,
            SealedContents,
            DeckLists,
            BoosterConfigs,
            TokenProducts,
            ManualOverrides,
            WatermarkOverrides,
            FaceFlavorNames,
            Signatures,
            StandardSets,
        ]
    }
}

impl SourceKind {
    /// Typed empty frame for a source. Consumers see declared columns with
    /// zero rows when a source is absent, so lookup joins null-propagate
    /// instead of failing on missing columns.
    pub fn empty_frame(self) -> polars::prelude::DataFrame {
        use polars::prelude::*;
        use SourceKind::*;

        let columns: Vec<(&str, DataType)> = match self {
            CardBulk => vec![
                ("id", DataType::String),
                ("oracle_id", DataType::String),
                ("name", DataType::String),
                ("lang", DataType::String),
                ("set", DataType::String),
                ("collector_number", DataType::String),
                ("layout", DataType::String),
                ("mana_cost", DataType::String),
                ("cmc", DataType::Float64),
                ("colors", DataType::List(Box::new(DataType::String))),
                ("color_identity", DataType::List(Box::new(DataType::String))),
                ("type_line", DataType::String),
                ("oracle_text", DataType::String),
                ("flavor_text", DataType::String),
                ("power", DataType::String),
                ("toughness", DataType::String),
                ("loyalty", DataType::String),
                ("defense", DataType::String),
                ("artist", DataType::String),
                ("artist_ids", DataType::List(Box::new(DataType::String))),
                ("watermark", DataType::String),
                ("illustration_id", DataType::String),
                ("rarity", DataType::String),
                ("border_color", DataType::String),
                ("frame", DataType::String),
                ("frame_effects", DataType::List(Box::new(DataType::String))),
                ("security_stamp", DataType::String),
                ("hand_modifier", DataType::String),
                ("life_modifier", DataType::String),
                ("content_warning", DataType::Boolean),
                ("full_art", DataType::Boolean),
                ("digital", DataType::Boolean),
                ("oversized", DataType::Boolean),
                ("promo", DataType::Boolean),
                ("reprint", DataType::Boolean),
                ("reserved", DataType::Boolean),
                ("story_spotlight", DataType::Boolean),
                ("textless", DataType::Boolean),
                ("game_changer", DataType::Boolean),
                ("booster", DataType::Boolean),
                ("edhrec_rank", DataType::Int64),
                ("printed_name", DataType::String),
                ("printed_type_line", DataType::String),
                ("printed_text", DataType::String),
                ("flavor_name", DataType::String),
                ("released_at", DataType::String),
                ("promo_types", DataType::List(Box::new(DataType::String))),
                ("keywords", DataType::List(Box::new(DataType::String))),
                ("finishes", DataType::List(Box::new(DataType::String))),
                ("games", DataType::List(Box::new(DataType::String))),
                ("multiverse_ids", DataType::List(Box::new(DataType::Int64))),
                ("attraction_lights", DataType::List(Box::new(DataType::Int64))),
                ("mtgo_id", DataType::Int64),
                ("mtgo_foil_id", DataType::Int64),
                ("arena_id", DataType::Int64),
                ("tcgplayer_id", DataType::Int64),
                ("tcgplayer_etched_id", DataType::Int64),
                ("cardmarket_id", DataType::Int64),
                ("card_back_id", DataType::String),
                ("set_type", DataType::String),
            ],
            Rulings => vec![
                ("oracle_id", DataType::String),
                ("published_at", DataType::String),
                ("comment", DataType::String),
            ],
            SetsMeta => vec![
                ("code", DataType::String),
                ("name", DataType::String),
                ("released_at", DataType::String),
                ("set_type", DataType::String),
                ("parent_set_code", DataType::String),
                ("block", DataType::String),
                ("keyrune_code", DataType::String),
                ("mtgo_code", DataType::String),
                ("arena_code", DataType::String),
                ("tcgplayer_id", DataType::Int64),
                ("nonfoil_only", DataType::Boolean),
                ("foil_only", DataType::Boolean),
                ("digital", DataType::Boolean),
            ],
            RetailInventory => vec![
                ("scryfall_id", DataType::String),
                ("ck_id", DataType::String),
                ("is_foil", DataType::Boolean),
                ("is_etched", DataType::Boolean),
                ("url", DataType::String),
                ("price_retail", DataType::Float64),
                ("price_buy", DataType::Float64),
            ],
            MarketplaceIds => vec![
                ("set_code", DataType::String),
                ("mcm_set_id", DataType::Int64),
                ("mcm_set_name", DataType::String),
                ("number", DataType::String),
                ("id_metaproduct", DataType::String),
            ],
            SaltScores => vec![
                ("oracle_id", DataType::String),
                ("salt", DataType::Float64),
                ("rank", DataType::Int64),
            ],
            Combos => vec![
                ("name", DataType::String),
                ("related_name", DataType::String),
            ],
            MeldTriplets => vec![
                ("part_a", DataType::String),
                ("part_b", DataType::String),
                ("result", DataType::String),
            ],
            SecretLairDrops => vec![
                ("number", DataType::String),
                ("drop_name", DataType::String),
            ],
            MarketplaceSkus => vec![
                ("group_id", DataType::String),
                ("set_code", DataType::String),
                ("product_id", DataType::String),
                ("sku", DataType::String),
            ],
            GathererPages => vec![
                ("multiverse_id", DataType::String),
                ("original_text", DataType::String),
                ("original_type", DataType::String),
            ],
            Orientations => vec![
                ("scryfall_id", DataType::String),
                ("orientation", DataType::String),
            ],
            MultiverseBridge => vec![
                ("scryfall_id", DataType::String),
                ("cardsphere_id", DataType::String),
                ("cardsphere_foil_id", DataType::String),
                ("deckbox_id", DataType::String),
            ],
            SealedProducts => vec![
                ("name", DataType::String),
                ("set_code", DataType::String),
                ("category", DataType::String),
                ("subtype", DataType::String),
                ("release_date", DataType::String),
                ("tcgplayer_product_id", DataType::String),
                ("ck_url", DataType::String),
            ],
            SealedContents => vec![
                ("product_name", DataType::String),
                ("set_code", DataType::String),
                ("card_uuid", DataType::String),
                ("finish", DataType::String),
                ("count", DataType::Int64),
            ],
            DeckLists => vec![
                ("deck_name", DataType::String),
                ("deck_code", DataType::String),
                ("set_code", DataType::String),
                ("release_date", DataType::String),
                ("deck_type", DataType::String),
                ("board", DataType::String),
                ("card_uuid", DataType::String),
                ("count", DataType::Int64),
                ("finish", DataType::String),
            ],
            BoosterConfigs => vec![
                ("set_code", DataType::String),
                ("config_json", DataType::String),
            ],
            TokenProducts => vec![
                ("set_code", DataType::String),
                ("token_name", DataType::String),
                ("product_name", DataType::String),
            ],
            ManualOverrides => vec![
                ("uuid", DataType::String),
                ("set_code", DataType::String),
                ("number", DataType::String),
                ("field", DataType::String),
                ("value", DataType::String),
            ],
            WatermarkOverrides => vec![
                ("scryfall_id", DataType::String),
                ("watermark", DataType::String),
            ],
            FaceFlavorNames => vec![
                ("scryfall_id", DataType::String),
                ("face_name", DataType::String),
                ("flavor_name", DataType::String),
            ],
            Signatures => vec![
                ("set_code", DataType::String),
                ("number_prefix", DataType::String),
                ("signature", DataType::String),
            ],
            StandardSets => vec![("set_code", DataType::String)],
        };

        let series: Vec<Column> = columns
            .iter()
            .map(|(name, dtype)| Series::new_empty((*name).into(), dtype).into_column())
            .collect();
        DataFrame::new(series).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_frames_have_columns() {
        let df = SourceKind::Rulings.empty_frame();
        assert_eq!(df.height(), 0);
        assert!(df.column("oracle_id").is_ok());
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<&str> = SourceKind::all().iter().map(|k| k.name()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
