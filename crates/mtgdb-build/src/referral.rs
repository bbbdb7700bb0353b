//! Referral map.
//!
//! A flat redirect table consumed by the front-end: each line maps a
//! 16-hex key to a destination URL in nginx map format. The keys are the
//! same hashes embedded in `purchaseUrls`, so a card's printed link and the
//! redirect map always agree.

use mtgdb_common::{uuid5, Result};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::cache::SourceCache;
use crate::config::BuildConfig;
use crate::pipeline::util::str_col_opt;

const CK_BASE: &str = "https://www.cardkingdom.com";
const CK_REFERRAL: &str =
    "?partner=mtgjson&utm_source=mtgjson&utm_medium=affiliate&utm_campaign=mtgjson";
const TCG_REFERRAL_PREFIX: &str = "https://partner.tcgplayer.com/c/mtgjson/product/";
const TCG_REFERRAL_SUFFIX: &str = "?utm_campaign=affiliate&utm_medium=mtgjson&utm_source=mtgjson";
const MCM_PREFIX: &str = "https://www.cardmarket.com/en/Magic/Products/Search?idProduct=";
const MCM_BUFFER: &str = "10101";

/// Build the full map: card entries from the emitted partitions, sealed
/// entries from the sealed-product source. Deduplicated on the hash key,
/// sorted for stable output.
pub fn build_referral_map(config: &BuildConfig, cache: &SourceCache) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();

    let pattern = config.cards_partition_root().join("setCode=*").join("*.parquet");
    if let Ok(lf) = LazyFrame::scan_parquet(pattern, ScanArgsParquet::default()) {
        let df = lf
            .select([
                col("uuid"),
                col("identifiers").struct_().field_by_name("tcgplayerProductId"),
                col("identifiers").struct_().field_by_name("mcmId"),
                col("identifiers").struct_().field_by_name("mcmMetaId"),
                col("cardKingdomUrl"),
                col("cardKingdomFoilUrl"),
                col("cardKingdomEtchedUrl"),
            ])
            .collect()?;

        let uuids = str_col_opt(&df, "uuid");
        let tcg_ids = str_col_opt(&df, "tcgplayerProductId");
        let mcm_ids = str_col_opt(&df, "mcmId");
        let mcm_meta = str_col_opt(&df, "mcmMetaId");
        let ck_urls = str_col_opt(&df, "cardKingdomUrl");
        let ck_foil = str_col_opt(&df, "cardKingdomFoilUrl");
        let ck_etched = str_col_opt(&df, "cardKingdomEtchedUrl");

        for i in 0..df.height() {
            let Some(uuid) = uuids[i].as_deref() else {
                continue;
            };
            for path in [&ck_urls[i], &ck_foil[i], &ck_etched[i]] {
                if let Some(path) = path.as_deref() {
                    let hash = uuid5::url_hash(&format!("{CK_BASE}{path}{uuid}"));
                    map.entry(hash)
                        .or_insert_with(|| format!("{CK_BASE}{path}{CK_REFERRAL}"));
                }
            }
            if let Some(tcg) = tcg_ids[i].as_deref() {
                let hash = uuid5::url_hash(&format!("{tcg}{uuid}"));
                map.entry(hash).or_insert_with(|| {
                    format!("{TCG_REFERRAL_PREFIX}{tcg}{TCG_REFERRAL_SUFFIX}")
                });
            }
            if let Some(mcm) = mcm_ids[i].as_deref() {
                let meta = mcm_meta[i].as_deref().unwrap_or("");
                let hash = uuid5::url_hash(&format!("{mcm}{uuid}{MCM_BUFFER}{meta}"));
                map.entry(hash)
                    .or_insert_with(|| format!("{MCM_PREFIX}{mcm}"));
            }
        }
    }

    // Sealed products contribute TCGplayer entries.
    let sealed = cache.sealed_products().collect()?;
    if sealed.height() > 0 {
        let names = str_col_opt(&sealed, "name");
        let tcg_ids = str_col_opt(&sealed, "tcgplayer_product_id");
        for i in 0..sealed.height() {
            let (Some(name), Some(tcg)) = (names[i].as_deref(), tcg_ids[i].as_deref()) else {
                continue;
            };
            let uuid = uuid5::sealed_product_uuid(name);
            let hash = uuid5::url_hash(&format!("{tcg}{uuid}"));
            map.entry(hash).or_insert_with(|| {
                format!("{TCG_REFERRAL_PREFIX}{tcg}{TCG_REFERRAL_SUFFIX}")
            });
        }
    }

    Ok(map)
}

/// Write the nginx map file: `/links/{hash}\t{url};` per line, hash order.
pub fn write_referral_map(map: &BTreeMap<String, String>, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join("ReferralMap.json");
    let tmp = path.with_extension("json.tmp");
    {
        let file = std::fs::File::create(&tmp)?;
        let mut out = std::io::BufWriter::new(file);
        for (hash, url) in map {
            writeln!(out, "/links/{hash}\t{url};")?;
        }
        out.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    info!(entries = map.len(), "referral map written");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cache::registry::SourceKind;
    use std::collections::HashMap;

    #[test]
    fn sealed_entries_hash_deterministically() {
        let sealed = df!(
            "name" => ["Commander Legends Draft Booster Box"],
            "set_code" => ["CMR"],
            "category" => [Some("booster_box")],
            "subtype" => [None::<&str>],
            "release_date" => [None::<&str>],
            "tcgplayer_product_id" => [Some("224886")],
        )
        .unwrap();
        let mut frames = HashMap::new();
        frames.insert(SourceKind::SealedProducts, sealed);
        let cache = SourceCache::from_frames(frames);
        let config = BuildConfig::new();

        let map_a = build_referral_map(&config, &cache).unwrap();
        let map_b = build_referral_map(&config, &cache).unwrap();
        assert_eq!(map_a, map_b);
        assert_eq!(map_a.len(), 1);
        let (hash, url) = map_a.iter().next().unwrap();
        assert_eq!(hash.len(), 16);
        assert!(url.starts_with(TCG_REFERRAL_PREFIX));
    }

    #[test]
    fn map_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = BTreeMap::new();
        map.insert("abcdef0123456789".to_string(), "https://example.com/x".to_string());
        write_referral_map(&map, dir.path()).unwrap();
        let raw = std::fs::read_to_string(dir.path().join("ReferralMap.json")).unwrap();
        assert_eq!(raw, "/links/abcdef0123456789\thttps://example.com/x;\n");
    }
}
