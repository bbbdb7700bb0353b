//! Assembly: partitioned parquet back into wire-format objects.
//!
//! Each output format is a stateless writer keyed off the same in-memory
//! per-set assembly. Only one set's rows are resident at a time; the
//! combined JSON writer streams set objects in lexicographic set-code order.

pub mod csv;
pub mod flat;
pub mod json;
pub mod model;
pub mod parquet;
pub mod sql;
pub mod sqlite;

use chrono::Utc;
use mtgdb_common::{MtgdbError, Result};
use model::{CardFace, ForeignData, Identifiers, LeadershipSkills, Meta, PurchaseUrls,
    RelatedCards, Ruling, SourceProducts};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::pipeline::stages::LEGALITY_FORMATS;
use crate::pipeline::util::{bool_col, f64_col, i64_col, list_str_col, str_col_opt};

/// List the set codes that have a partition under `root`.
pub fn partitioned_set_codes(root: &Path) -> Result<Vec<String>> {
    let mut codes = Vec::new();
    if !root.exists() {
        return Ok(codes);
    }
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(code) = name.strip_prefix("setCode=") {
            codes.push(code.to_string());
        }
    }
    codes.sort();
    Ok(codes)
}

/// Load one set's partition as a frame. Missing partitions are empty.
pub fn load_partition(root: &Path, set_code: &str) -> Result<DataFrame> {
    let path: PathBuf = root.join(format!("setCode={set_code}")).join("0.parquet");
    if !path.exists() {
        return Ok(DataFrame::empty());
    }
    let df = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())?.collect()?;
    Ok(df)
}

/// Convert a partition frame into wire-format card faces, in stored order.
pub fn cards_from_partition(df: &DataFrame) -> Result<Vec<CardFace>> {
    if df.height() == 0 {
        return Ok(Vec::new());
    }
    let reader = RowReader::new(df)?;
    Ok((0..df.height()).map(|i| reader.card(i)).collect())
}

/// Column-major view over a partition frame, extracted once.
struct RowReader {
    n: usize,
    strings: BTreeMap<&'static str, Vec<Option<String>>>,
    lists: BTreeMap<&'static str, Vec<Vec<String>>>,
    floats: BTreeMap<&'static str, Vec<Option<f64>>>,
    ints: BTreeMap<&'static str, Vec<Option<i64>>>,
    bools: BTreeMap<&'static str, Vec<Option<bool>>>,
    legalities: BTreeMap<String, Vec<Option<String>>>,
    identifiers: Vec<Identifiers>,
    rulings: Vec<Vec<Ruling>>,
    foreign: Vec<Vec<ForeignData>>,
}

const STRING_COLS: &[&str] = &[
    "name", "faceName", "asciiName", "setCode", "number", "side", "layout", "language",
    "manaCost", "text", "flavorText", "flavorName", "printedName", "printedType",
    "printedText", "originalReleaseDate", "originalText", "originalType", "power",
    "toughness", "loyalty", "defense", "hand", "life", "rarity", "artist", "borderColor",
    "frameVersion", "securityStamp", "watermark", "duelDeck", "signature", "orientation",
    "uuid", "mtgjsonFoilVersionId", "mtgjsonNonFoilVersionId", "_purl_tcgplayer",
    "_purl_tcgplayerEtched", "_purl_cardKingdom", "_purl_cardKingdomFoil",
    "_purl_cardKingdomEtched", "_purl_cardmarket",
];

const LIST_COLS: &[&str] = &[
    "colors", "colorIdentity", "finishes", "types", "supertypes", "subtypes", "keywords",
    "availability", "boosterTypes", "promoTypes", "frameEffects", "artistIds", "printings",
    "otherFaceIds", "variations", "reverseRelated", "tokenIds", "cardParts", "subsets",
    "rebalancedPrintings", "originalPrintings", "_sp_nonfoil", "_sp_foil", "_sp_etched",
    "_related_spellbook",
];

const FLOAT_COLS: &[&str] = &["manaValue", "convertedManaCost", "faceManaValue", "edhrecSaltiness"];

const INT_COLS: &[&str] = &["edhrecRank"];

const BOOL_COLS: &[&str] = &[
    "hasFoil", "hasNonFoil", "hasContentWarning", "isFullArt", "isOnlineOnly", "isOversized",
    "isPromo", "isReprint", "isReserved", "isStorySpotlight", "isTextless", "isGameChanger",
    "isAlternative", "isFunny", "isTimeshifted", "hasAlternativeDeckLimit", "_ls_brawl",
    "_ls_commander", "_ls_oathbreaker", "_ls_any",
];

impl RowReader {
    fn new(df: &DataFrame) -> Result<Self> {
        let n = df.height();
        let mut strings = BTreeMap::new();
        for &name in STRING_COLS {
            strings.insert(name, str_col_opt(df, name));
        }
        let mut lists = BTreeMap::new();
        for &name in LIST_COLS {
            lists.insert(name, list_str_col(df, name));
        }
        let mut floats = BTreeMap::new();
        for &name in FLOAT_COLS {
            floats.insert(name, f64_col(df, name));
        }
        let mut ints = BTreeMap::new();
        for &name in INT_COLS {
            ints.insert(name, i64_col(df, name));
        }
        let mut bools = BTreeMap::new();
        for &name in BOOL_COLS {
            bools.insert(name, bool_col(df, name));
        }
        let mut legalities = BTreeMap::new();
        for fmt in LEGALITY_FORMATS {
            let column = format!("legality_{fmt}");
            if df.column(&column).is_ok() {
                legalities.insert((*fmt).to_string(), str_col_opt(df, &column));
            }
        }

        Ok(Self {
            n,
            strings,
            lists,
            floats,
            ints,
            bools,
            legalities,
            identifiers: read_identifiers(df)?,
            rulings: read_rulings(df),
            foreign: read_foreign_data(df),
        })
    }

    fn s(&self, name: &str, i: usize) -> Option<String> {
        self.strings.get(name).and_then(|v| v[i].clone())
    }

    fn l(&self, name: &str, i: usize) -> Vec<String> {
        self.lists.get(name).map(|v| v[i].clone()).unwrap_or_default()
    }

    fn f(&self, name: &str, i: usize) -> Option<f64> {
        self.floats.get(name).and_then(|v| v[i])
    }

    fn b(&self, name: &str, i: usize) -> Option<bool> {
        self.bools.get(name).and_then(|v| v[i])
    }

    fn card(&self, i: usize) -> CardFace {
        debug_assert!(i < self.n);

        let purchase_urls = PurchaseUrls {
            card_kingdom: self.s("_purl_cardKingdom", i),
            card_kingdom_etched: self.s("_purl_cardKingdomEtched", i),
            card_kingdom_foil: self.s("_purl_cardKingdomFoil", i),
            cardmarket: self.s("_purl_cardmarket", i),
            tcgplayer: self.s("_purl_tcgplayer", i),
            tcgplayer_etched: self.s("_purl_tcgplayerEtched", i),
        };

        let source_products = SourceProducts {
            etched: self.l("_sp_etched", i),
            foil: self.l("_sp_foil", i),
            nonfoil: self.l("_sp_nonfoil", i),
        };

        let related_cards = RelatedCards {
            reverse_related: Vec::new(),
            spellbook: self.l("_related_spellbook", i),
        };

        let leadership = if self.b("_ls_any", i).unwrap_or(false) {
            Some(LeadershipSkills {
                brawl: self.b("_ls_brawl", i).unwrap_or(false),
                commander: self.b("_ls_commander", i).unwrap_or(false),
                oathbreaker: self.b("_ls_oathbreaker", i).unwrap_or(false),
            })
        } else {
            None
        };

        let mut legalities = BTreeMap::new();
        for (fmt, values) in &self.legalities {
            if let Some(status) = values[i].clone() {
                legalities.insert(fmt.clone(), status);
            }
        }

        let mut identifiers = self.identifiers[i].clone();
        identifiers.mtgjson_foil_version_id = self.s("mtgjsonFoilVersionId", i);
        identifiers.mtgjson_non_foil_version_id = self.s("mtgjsonNonFoilVersionId", i);

        let face_mana_value = self.f("faceManaValue", i);

        CardFace {
            artist: self.s("artist", i).unwrap_or_default(),
            artist_ids: self.l("artistIds", i),
            ascii_name: self.s("asciiName", i),
            availability: self.l("availability", i),
            booster_types: self.l("boosterTypes", i),
            border_color: self.s("borderColor", i).unwrap_or_default(),
            card_parts: self.l("cardParts", i),
            color_identity: self.l("colorIdentity", i),
            colors: self.l("colors", i),
            converted_mana_cost: self.f("convertedManaCost", i).unwrap_or(0.0),
            defense: self.s("defense", i),
            duel_deck: self.s("duelDeck", i),
            edhrec_rank: self.ints.get("edhrecRank").and_then(|v| v[i]),
            edhrec_saltiness: self.f("edhrecSaltiness", i),
            face_converted_mana_cost: face_mana_value,
            face_mana_value,
            face_name: self.s("faceName", i),
            finishes: self.l("finishes", i),
            flavor_name: self.s("flavorName", i),
            flavor_text: self.s("flavorText", i),
            foreign_data: self.foreign[i].clone(),
            frame_effects: self.l("frameEffects", i),
            frame_version: self.s("frameVersion", i).unwrap_or_default(),
            hand: self.s("hand", i),
            has_alternative_deck_limit: self.b("hasAlternativeDeckLimit", i),
            has_content_warning: self.b("hasContentWarning", i).filter(|v| *v),
            has_foil: self.b("hasFoil", i).unwrap_or(false),
            has_non_foil: self.b("hasNonFoil", i).unwrap_or(false),
            identifiers,
            is_alternative: self.b("isAlternative", i),
            is_full_art: self.b("isFullArt", i).filter(|v| *v),
            is_funny: self.b("isFunny", i),
            is_game_changer: self.b("isGameChanger", i).filter(|v| *v),
            is_online_only: self.b("isOnlineOnly", i).filter(|v| *v),
            is_oversized: self.b("isOversized", i).filter(|v| *v),
            is_promo: self.b("isPromo", i).filter(|v| *v),
            is_reprint: self.b("isReprint", i).filter(|v| *v),
            is_reserved: self.b("isReserved", i).filter(|v| *v),
            is_story_spotlight: self.b("isStorySpotlight", i).filter(|v| *v),
            is_textless: self.b("isTextless", i).filter(|v| *v),
            is_timeshifted: self.b("isTimeshifted", i),
            keywords: self.l("keywords", i),
            language: self.s("language", i).unwrap_or_else(|| "English".to_string()),
            layout: self.s("layout", i).unwrap_or_default(),
            leadership_skills: leadership,
            legalities,
            life: self.s("life", i),
            loyalty: self.s("loyalty", i),
            mana_cost: self.s("manaCost", i),
            mana_value: self.f("manaValue", i).unwrap_or(0.0),
            name: self.s("name", i).unwrap_or_default(),
            number: self.s("number", i).unwrap_or_default(),
            orientation: self.s("orientation", i),
            original_printings: self.l("originalPrintings", i),
            original_release_date: self.s("originalReleaseDate", i),
            original_text: self.s("originalText", i),
            original_type: self.s("originalType", i),
            other_face_ids: self.l("otherFaceIds", i),
            power: self.s("power", i),
            printings: self.l("printings", i),
            printed_name: self.s("printedName", i),
            printed_text: self.s("printedText", i),
            printed_type: self.s("printedType", i),
            promo_types: self.l("promoTypes", i),
            purchase_urls: (!purchase_urls.is_empty()).then_some(purchase_urls),
            rarity: self.s("rarity", i).unwrap_or_default(),
            rebalanced_printings: self.l("rebalancedPrintings", i),
            related_cards: (!related_cards.is_empty()).then_some(related_cards),
            reverse_related: self.l("reverseRelated", i),
            rulings: self.rulings[i].clone(),
            security_stamp: self.s("securityStamp", i),
            set_code: self.s("setCode", i).unwrap_or_default(),
            side: self.s("side", i),
            signature: self.s("signature", i),
            source_products: (!source_products.is_empty()).then_some(source_products),
            subsets: self.l("subsets", i),
            subtypes: self.l("subtypes", i),
            supertypes: self.l("supertypes", i),
            text: self.s("text", i).unwrap_or_default(),
            token_ids: self.l("tokenIds", i),
            toughness: self.s("toughness", i),
            type_line: self.s("type", i).unwrap_or_default(),
            types: self.l("types", i),
            uuid: self.s("uuid", i).unwrap_or_default(),
            variations: self.l("variations", i),
            watermark: self.s("watermark", i),
        }
    }
}

fn read_identifiers(df: &DataFrame) -> Result<Vec<Identifiers>> {
    let n = df.height();
    let Ok(column) = df.column("identifiers") else {
        return Ok(vec![Identifiers::default(); n]);
    };
    let st = column.struct_().map_err(MtgdbError::from)?;

    let field = |name: &str| -> Vec<Option<String>> {
        st.field_by_name(name)
            .ok()
            .and_then(|s| {
                s.str()
                    .map(|ca| ca.into_iter().map(|v| v.map(str::to_string)).collect())
                    .ok()
            })
            .unwrap_or_else(|| vec![None; n])
    };

    let scryfall_id = field("scryfallId");
    let scryfall_oracle_id = field("scryfallOracleId");
    let scryfall_illustration_id = field("scryfallIllustrationId");
    let scryfall_card_back_id = field("scryfallCardBackId");
    let mcm_id = field("mcmId");
    let mcm_meta_id = field("mcmMetaId");
    let mtg_arena_id = field("mtgArenaId");
    let mtgo_id = field("mtgoId");
    let mtgo_foil_id = field("mtgoFoilId");
    let multiverse_id = field("multiverseId");
    let tcgplayer_product_id = field("tcgplayerProductId");
    let tcgplayer_etched_product_id = field("tcgplayerEtchedProductId");
    let card_kingdom_id = field("cardKingdomId");
    let card_kingdom_foil_id = field("cardKingdomFoilId");
    let card_kingdom_etched_id = field("cardKingdomEtchedId");
    let mtgjson_v4_id = field("mtgjsonV4Id");
    let cardsphere_id = field("cardsphereId");
    let cardsphere_foil_id = field("cardsphereFoilId");
    let deckbox_id = field("deckboxId");

    Ok((0..n)
        .map(|i| Identifiers {
            card_kingdom_etched_id: card_kingdom_etched_id[i].clone(),
            card_kingdom_foil_id: card_kingdom_foil_id[i].clone(),
            card_kingdom_id: card_kingdom_id[i].clone(),
            cardsphere_foil_id: cardsphere_foil_id[i].clone(),
            cardsphere_id: cardsphere_id[i].clone(),
            deckbox_id: deckbox_id[i].clone(),
            mcm_id: mcm_id[i].clone(),
            mcm_meta_id: mcm_meta_id[i].clone(),
            mtg_arena_id: mtg_arena_id[i].clone(),
            mtgjson_foil_version_id: None,
            mtgjson_non_foil_version_id: None,
            mtgjson_v4_id: mtgjson_v4_id[i].clone(),
            mtgo_foil_id: mtgo_foil_id[i].clone(),
            mtgo_id: mtgo_id[i].clone(),
            multiverse_id: multiverse_id[i].clone(),
            scryfall_card_back_id: scryfall_card_back_id[i].clone(),
            scryfall_id: scryfall_id[i].clone(),
            scryfall_illustration_id: scryfall_illustration_id[i].clone(),
            scryfall_oracle_id: scryfall_oracle_id[i].clone(),
            tcgplayer_etched_product_id: tcgplayer_etched_product_id[i].clone(),
            tcgplayer_product_id: tcgplayer_product_id[i].clone(),
        })
        .collect())
}

fn read_rulings(df: &DataFrame) -> Vec<Vec<Ruling>> {
    let n = df.height();
    let Ok(column) = df.column("rulings") else {
        return vec![Vec::new(); n];
    };
    let Ok(list) = column.list() else {
        return vec![Vec::new(); n];
    };
    (0..n)
        .map(|i| {
            list.get_as_series(i)
                .and_then(|inner| {
                    let st = inner.struct_().ok()?;
                    let dates = st.field_by_name("date").ok()?;
                    let dates = dates.str().ok()?.clone();
                    let texts = st.field_by_name("text").ok()?;
                    let texts = texts.str().ok()?.clone();
                    Some(
                        dates
                            .into_iter()
                            .zip(&texts)
                            .filter_map(|(d, t)| {
                                Some(Ruling {
                                    date: d?.to_string(),
                                    text: t?.to_string(),
                                })
                            })
                            .collect::<Vec<_>>(),
                    )
                })
                .unwrap_or_default()
        })
        .collect()
}

fn read_foreign_data(df: &DataFrame) -> Vec<Vec<ForeignData>> {
    let n = df.height();
    let Ok(column) = df.column("foreignData") else {
        return vec![Vec::new(); n];
    };
    let Ok(list) = column.list() else {
        return vec![Vec::new(); n];
    };
    (0..n)
        .map(|i| {
            list.get_as_series(i)
                .and_then(|inner| {
                    let st = inner.struct_().ok()?;
                    let get = |name: &str| -> Vec<Option<String>> {
                        st.field_by_name(name)
                            .ok()
                            .and_then(|s| {
                                s.cast(&DataType::String).ok().and_then(|c| {
                                    c.str()
                                        .map(|ca| {
                                            ca.into_iter()
                                                .map(|v| v.map(str::to_string))
                                                .collect()
                                        })
                                        .ok()
                                })
                            })
                            .unwrap_or_default()
                    };
                    let languages = get("language");
                    let names = get("name");
                    let texts = get("text");
                    let types = get("type");
                    let flavors = get("flavorText");
                    let scryfall_ids = get("scryfallId");
                    let multiverse_ids = get("multiverseId");
                    let uuids = get("uuid");
                    let rows = names.len();
                    Some(
                        (0..rows)
                            .filter(|&j| names.get(j).cloned().flatten().is_some())
                            .map(|j| ForeignData {
                                face_name: None,
                                flavor_text: flavors.get(j).cloned().flatten(),
                                identifiers: Identifiers {
                                    multiverse_id: multiverse_ids.get(j).cloned().flatten(),
                                    scryfall_id: scryfall_ids.get(j).cloned().flatten(),
                                    ..Default::default()
                                },
                                language: languages
                                    .get(j)
                                    .cloned()
                                    .flatten()
                                    .unwrap_or_default(),
                                multiverse_id: multiverse_ids.get(j).cloned().flatten(),
                                name: names.get(j).cloned().flatten().unwrap_or_default(),
                                text: texts.get(j).cloned().flatten(),
                                type_line: types.get(j).cloned().flatten(),
                                uuid: uuids.get(j).cloned().flatten(),
                            })
                            .collect::<Vec<_>>(),
                    )
                })
                .unwrap_or_default()
        })
        .collect()
}

/// Shared composition state for every output writer.
pub struct Assembler<'a> {
    pub cache: &'a crate::cache::SourceCache,
    pub config: &'a crate::config::BuildConfig,
    pub report: &'a crate::report::BuildReport,
    pub set_meta: BTreeMap<String, crate::sets::SetMeta>,
    pub meta: Meta,
}

impl<'a> Assembler<'a> {
    pub fn new(
        cache: &'a crate::cache::SourceCache,
        config: &'a crate::config::BuildConfig,
        report: &'a crate::report::BuildReport,
    ) -> Result<Self> {
        Ok(Self {
            cache,
            config,
            report,
            set_meta: crate::sets::load_set_meta(cache)?,
            meta: Meta {
                date: Utc::now().format("%Y-%m-%d").to_string(),
                version: crate::config::MTGDB_VERSION.to_string(),
            },
        })
    }

    /// Set codes with card or token partitions, lexicographic.
    pub fn set_codes(&self) -> Result<Vec<String>> {
        let mut codes = partitioned_set_codes(&self.config.cards_partition_root())?;
        for token_code in partitioned_set_codes(&self.config.tokens_partition_root())? {
            // Token partitions for "TNEO" belong to "NEO"'s object; a set
            // with only tokens still emits (empty cards, valid metadata).
            let owner = token_code
                .strip_prefix('T')
                .filter(|stripped| self.set_meta.contains_key(*stripped))
                .unwrap_or(&token_code)
                .to_string();
            if !codes.contains(&owner) {
                codes.push(owner);
            }
        }
        codes.sort();
        codes.dedup();
        Ok(codes)
    }

    /// Compose one set object: cards, tokens, decks, sealed, metadata.
    pub fn set_object(&self, code: &str) -> Result<model::SetObject> {
        let cards_df = load_partition(&self.config.cards_partition_root(), code)?;
        let cards = cards_from_partition(&cards_df)?;

        let token_root = self.config.tokens_partition_root();
        let token_code = format!("T{code}");
        let (tokens_df, has_token_partition) = {
            let own = load_partition(&token_root, code)?;
            if own.height() > 0 {
                (own, true)
            } else {
                let prefixed = load_partition(&token_root, &token_code)?;
                let has = prefixed.height() > 0;
                (prefixed, has)
            }
        };
        let tokens = cards_from_partition(&tokens_df)?;

        crate::sets::build_set_object(
            self.cache,
            code,
            self.set_meta.get(code),
            cards,
            tokens,
            has_token_partition,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_partition_yields_no_cards() {
        let cards = cards_from_partition(&DataFrame::empty()).unwrap();
        assert!(cards.is_empty());
    }

    #[test]
    fn minimal_partition_round_trips() {
        let df = df!(
            "name" => ["Lightning Bolt"],
            "uuid" => ["u-1"],
            "setCode" => ["LEA"],
            "number" => ["161"],
            "layout" => ["normal"],
            "manaValue" => [1.0f64],
            "rarity" => ["common"],
        )
        .unwrap();
        let cards = cards_from_partition(&df).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].name, "Lightning Bolt");
        assert_eq!(cards[0].mana_value, 1.0);
        assert!(cards[0].purchase_urls.is_none(), "no listings means absent");
    }

    #[test]
    fn set_codes_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for code in ["NEO", "LEA"] {
            std::fs::create_dir_all(dir.path().join(format!("setCode={code}"))).unwrap();
        }
        let codes = partitioned_set_codes(dir.path()).unwrap();
        assert_eq!(codes, vec!["LEA", "NEO"]);
    }
}
