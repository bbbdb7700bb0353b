//! Price-build context: provider-native id to UUID resolution.
//!
//! Built from the bridge frames the card pipeline persists. A native id that
//! resolves to several UUIDs duplicates its price row across all of them.

use mtgdb_build::lookups::IdBridges;
use mtgdb_common::Result;
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

pub type IdMap = HashMap<String, BTreeSet<String>>;

#[derive(Debug, Default)]
pub struct PriceContext {
    pub tcg_to_uuid: IdMap,
    pub tcg_etched_to_uuid: IdMap,
    pub mtgo_to_uuid: IdMap,
    pub scryfall_to_uuid: IdMap,
}

impl PriceContext {
    /// Load from the persisted bridges under the cache directory.
    pub fn load(cache_dir: &Path) -> Result<Self> {
        let bridges = IdBridges::load(cache_dir);
        Ok(Self {
            tcg_to_uuid: collect_map(bridges.tcgplayer, "tcgplayerProductId")?,
            tcg_etched_to_uuid: collect_map(bridges.tcgplayer_etched, "tcgplayerEtchedProductId")?,
            mtgo_to_uuid: collect_map(bridges.mtgo, "mtgoId")?,
            scryfall_to_uuid: collect_map(bridges.scryfall, "scryfallId")?,
        })
    }

    /// Test constructor from literal pairs.
    pub fn from_pairs(
        tcg: &[(&str, &str)],
        tcg_etched: &[(&str, &str)],
        mtgo: &[(&str, &str)],
        scryfall: &[(&str, &str)],
    ) -> Self {
        let build = |pairs: &[(&str, &str)]| -> IdMap {
            let mut map: IdMap = HashMap::new();
            for (id, uuid) in pairs {
                map.entry((*id).to_string())
                    .or_default()
                    .insert((*uuid).to_string());
            }
            map
        };
        Self {
            tcg_to_uuid: build(tcg),
            tcg_etched_to_uuid: build(tcg_etched),
            mtgo_to_uuid: build(mtgo),
            scryfall_to_uuid: build(scryfall),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tcg_to_uuid.is_empty()
            && self.tcg_etched_to_uuid.is_empty()
            && self.mtgo_to_uuid.is_empty()
            && self.scryfall_to_uuid.is_empty()
    }
}

fn collect_map(lf: LazyFrame, id_column: &str) -> Result<IdMap> {
    let mut map: IdMap = HashMap::new();
    let df = lf.collect()?;
    if df.height() == 0 || df.column(id_column).is_err() {
        return Ok(map);
    }
    let ids = df
        .column(id_column)
        .map_err(mtgdb_common::MtgdbError::from)?
        .cast(&DataType::String)
        .map_err(mtgdb_common::MtgdbError::from)?;
    let ids = ids.str().map_err(mtgdb_common::MtgdbError::from)?;
    let uuids = df
        .column("uuid")
        .map_err(mtgdb_common::MtgdbError::from)?
        .str()
        .map_err(mtgdb_common::MtgdbError::from)?
        .clone();

    for (id, uuid) in ids.into_iter().zip(&uuids) {
        if let (Some(id), Some(uuid)) = (id, uuid) {
            map.entry(id.to_string())
                .or_default()
                .insert(uuid.to_string());
        }
    }
    Ok(map)
}
