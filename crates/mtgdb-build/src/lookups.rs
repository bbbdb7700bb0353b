//! Lookup consolidation.
//!
//! Nine reusable lookup frames derived once per run from the source cache,
//! each joined by the pipeline at its declared key. Consolidating here keeps
//! the stage chain at one join per lookup instead of re-deriving per set.

use mtgdb_common::uuid5;
use mtgdb_common::Result;
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

use crate::cache::SourceCache;

/// Scryfall language code -> output language name.
pub const LANGUAGE_MAP: &[(&str, &str)] = &[
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese (Brazil)"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("ru", "Russian"),
    ("zhs", "Chinese Simplified"),
    ("zht", "Chinese Traditional"),
    ("he", "Hebrew"),
    ("la", "Latin"),
    ("grc", "Ancient Greek"),
    ("ar", "Arabic"),
    ("sa", "Sanskrit"),
    ("ph", "Phyrexian"),
    ("px", "Phyrexian"),
];

pub fn language_name(code: &str) -> &str {
    LANGUAGE_MAP
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, n)| *n)
        .unwrap_or("Unknown")
}

/// The consolidated lookups, built once per run.
pub struct Lookups {
    /// `(scryfallId, side)` -> cachedUuid, Card Kingdom ids + url paths,
    /// orientation. Full-outer across the id cache and the retail side so
    /// retail-only rows are retained.
    pub identifiers: LazyFrame,
    /// `oracleId` -> edhrecSaltiness, edhrecRank, rulings[], printings[]
    pub oracle: LazyFrame,
    /// `(setCode, number)` -> foreignData[] (non-English printings grouped
    /// with stable UUIDs)
    pub set_number: LazyFrame,
    /// `name` -> cardParts[] (meld triplet membership, self excluded)
    pub by_name: LazyFrame,
    /// `scryfallId` -> signature
    pub signatures: LazyFrame,
    /// `scryfallId` -> corrected watermark
    pub watermarks: LazyFrame,
    /// `(scryfallId, faceName)` -> flavorName
    pub face_flavors: LazyFrame,
    /// `setCode` -> marketplace set metadata
    pub marketplace_sets: LazyFrame,
}

impl Lookups {
    pub fn build(cache: &SourceCache) -> Result<Self> {
        info!("consolidating lookup frames");
        Ok(Self {
            identifiers: build_identifiers(cache)?,
            oracle: build_oracle(cache)?,
            set_number: build_set_number(cache)?,
            by_name: build_by_name(cache)?,
            signatures: build_signatures(cache)?,
            watermarks: build_watermarks(cache),
            face_flavors: build_face_flavors(cache),
            marketplace_sets: build_marketplace_sets(cache)?,
        })
    }
}

/// Identifiers lookup. Retail rows arrive one per (id, finish); pivot to one
/// row per scryfall id with normal/foil/etched columns, then full-join the
/// UUID cache so either side alone still produces a row.
fn build_identifiers(cache: &SourceCache) -> Result<LazyFrame> {
    let retail = cache.retail_inventory();
    let retail_pivoted = retail
        .select([
            col("scryfall_id").alias("scryfallId"),
            col("ck_id"),
            col("is_foil"),
            col("is_etched"),
            col("url"),
        ])
        .sort_by_exprs(
            vec![col("scryfallId"), col("ck_id")],
            SortMultipleOptions::default(),
        )
        .group_by_stable([col("scryfallId")])
        .agg([
            col("ck_id")
                .filter(col("is_foil").not().and(col("is_etched").not()))
                .first()
                .alias("cardKingdomId"),
            col("ck_id")
                .filter(col("is_foil"))
                .first()
                .alias("cardKingdomFoilId"),
            col("ck_id")
                .filter(col("is_etched"))
                .first()
                .alias("cardKingdomEtchedId"),
            col("url")
                .filter(col("is_foil").not().and(col("is_etched").not()))
                .first()
                .alias("cardKingdomUrl"),
            col("url")
                .filter(col("is_foil"))
                .first()
                .alias("cardKingdomFoilUrl"),
            col("url")
                .filter(col("is_etched"))
                .first()
                .alias("cardKingdomEtchedUrl"),
        ]);

    // Persisted UUID cache from prior builds; empty when first run.
    let uuid_cache = load_uuid_cache(cache);

    let orientations = cache
        .orientations()
        .select([
            col("scryfall_id").alias("scryfallId"),
            col("orientation"),
        ]);

    let joined = uuid_cache
        .join(
            retail_pivoted,
            [col("scryfallId")],
            [col("scryfallId")],
            JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
        )
        .join(
            orientations,
            [col("scryfallId")],
            [col("scryfallId")],
            JoinArgs::new(JoinType::Left),
        );

    Ok(joined)
}

fn load_uuid_cache(cache: &SourceCache) -> LazyFrame {
    let path = cache.cache_path().join("sources").join("uuid_cache.parquet");
    if path.exists() {
        if let Ok(lf) = LazyFrame::scan_parquet(&path, ScanArgsParquet::default()) {
            debug!(path = %path.display(), "loaded UUID cache");
            return lf;
        }
    }
    df!(
        "scryfallId" => Vec::<String>::new(),
        "side" => Vec::<String>::new(),
        "cachedUuid" => Vec::<String>::new(),
    )
    .map(DataFrame::lazy)
    .unwrap_or_else(|_| DataFrame::empty().lazy())
}

/// Oracle lookup: saltiness, popularity rank, rulings, and the set-code list
/// where each oracle appears. Every aggregated list is sorted so rebuilds
/// stay byte-identical.
fn build_oracle(cache: &SourceCache) -> Result<LazyFrame> {
    let salt = cache.salt_scores().select([
        col("oracle_id"),
        col("salt").alias("edhrecSaltiness"),
        col("rank").alias("edhrecRank"),
    ]);

    let rulings = cache
        .rulings()
        .select([
            col("oracle_id"),
            col("published_at").alias("date"),
            col("comment").alias("text"),
        ])
        .sort_by_exprs(
            vec![col("oracle_id"), col("date"), col("text")],
            SortMultipleOptions::default(),
        )
        .group_by_stable([col("oracle_id")])
        .agg([as_struct(vec![col("date"), col("text")]).alias("rulings")]);

    let printings = cache
        .card_bulk()
        .select([
            col("oracle_id"),
            col("set").str().to_uppercase().alias("setCode"),
        ])
        .unique_stable(None, UniqueKeepStrategy::First)
        .sort_by_exprs(
            vec![col("oracle_id"), col("setCode")],
            SortMultipleOptions::default(),
        )
        .group_by_stable([col("oracle_id")])
        .agg([col("setCode").alias("printings")]);

    Ok(salt
        .join(
            rulings,
            [col("oracle_id")],
            [col("oracle_id")],
            JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
        )
        .join(
            printings,
            [col("oracle_id")],
            [col("oracle_id")],
            JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
        ))
}

/// Set+number lookup: groups all non-English printings of the same physical
/// card, derives their stable UUIDs, and packs them as a foreignData list.
fn build_set_number(cache: &SourceCache) -> Result<LazyFrame> {
    // Language mapping as a join table keeps this fully columnar.
    let langs = df!(
        "lang" => LANGUAGE_MAP.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
        "language" => LANGUAGE_MAP.iter().map(|(_, n)| *n).collect::<Vec<_>>(),
    )
    .map_err(mtgdb_common::MtgdbError::from)?;

    let foreign = cache
        .frame(crate::cache::registry::SourceKind::CardBulk)
        .filter(col("lang").neq(lit("en")))
        .join(
            langs.lazy(),
            [col("lang")],
            [col("lang")],
            JoinArgs::new(JoinType::Left),
        )
        .with_columns([
            col("language").fill_null(lit("Unknown")),
            col("set").str().to_uppercase().alias("setCode"),
            col("collector_number").alias("number"),
            // Stable UUID for each localized printing.
            concat_str([col("id"), lit("a")], "", true)
                .map(uuid5_batch, GetOutput::from_type(DataType::String))
                .alias("foreignUuid"),
            col("multiverse_ids").list().first().alias("multiverseId"),
            coalesce(&[col("printed_name"), col("name")]).alias("foreignName"),
        ])
        .sort_by_exprs(
            vec![col("setCode"), col("number"), col("language")],
            SortMultipleOptions::default(),
        )
        .group_by_stable([col("setCode"), col("number")])
        .agg([as_struct(vec![
            col("language"),
            col("foreignName").alias("name"),
            col("printed_text").alias("text"),
            col("printed_type_line").alias("type"),
            col("flavor_text").alias("flavorText"),
            col("id").alias("scryfallId"),
            col("multiverseId"),
            col("foreignUuid").alias("uuid"),
        ])
        .alias("foreignData")]);

    Ok(foreign)
}

/// By-name lookup: meld triplet membership. Each member's `cardParts` is the
/// other members of its triplet (the result keeps both parts, each part keeps
/// its sibling and the result).
fn build_by_name(cache: &SourceCache) -> Result<LazyFrame> {
    let triplets = cache.meld_triplets().collect()?;
    if triplets.height() == 0 {
        let empty = df!(
            "name" => Vec::<String>::new(),
        )
        .map_err(mtgdb_common::MtgdbError::from)?;
        return Ok(empty
            .lazy()
            .with_columns([lit(NULL).cast(DataType::List(Box::new(DataType::String))).alias("cardParts")]));
    }

    let part_a = triplets.column("part_a")?.str()?;
    let part_b = triplets.column("part_b")?.str()?;
    let result = triplets.column("result")?.str()?;

    let mut names: Vec<String> = Vec::new();
    let mut parts: Vec<Series> = Vec::new();
    for i in 0..triplets.height() {
        let (Some(a), Some(b), Some(r)) = (part_a.get(i), part_b.get(i), result.get(i)) else {
            continue;
        };
        for (member, others) in [(a, [b, r]), (b, [a, r]), (r, [a, b])] {
            names.push(member.to_string());
            parts.push(Series::new("".into(), others.to_vec()));
        }
    }

    let mut df = df!("name" => names).map_err(mtgdb_common::MtgdbError::from)?;
    let parts_series = Series::new("cardParts".into(), parts);
    df.with_column(parts_series)
        .map_err(mtgdb_common::MtgdbError::from)?;
    Ok(df.lazy())
}

/// Signatures lookup: World Championship signature rows keyed by set code and
/// collector-number prefix are resolved against the bulk to scryfall ids.
fn build_signatures(cache: &SourceCache) -> Result<LazyFrame> {
    let sigs = cache.signatures().select([
        col("set_code").str().to_uppercase().alias("_sig_set"),
        col("number_prefix").alias("_sig_prefix"),
        col("signature"),
    ]);

    let bulk = cache
        .frame(crate::cache::registry::SourceKind::CardBulk)
        .select([
            col("id").alias("scryfallId"),
            col("set").str().to_uppercase().alias("_sig_set"),
            col("collector_number")
                .str()
                .extract(lit(r"^([^0-9]+)"), 1)
                .alias("_sig_prefix"),
            col("border_color").alias("_sig_border"),
        ]);

    Ok(bulk
        .join(
            sigs,
            [col("_sig_set"), col("_sig_prefix")],
            [col("_sig_set"), col("_sig_prefix")],
            JoinArgs::new(JoinType::Left),
        )
        .filter(
            col("signature")
                .is_not_null()
                .and(col("_sig_border").eq(lit("gold"))),
        )
        .select([col("scryfallId"), col("signature")]))
}

fn build_watermarks(cache: &SourceCache) -> LazyFrame {
    cache.watermark_overrides().select([
        col("scryfall_id").alias("scryfallId"),
        col("watermark").alias("watermarkOverride"),
    ])
}

fn build_face_flavors(cache: &SourceCache) -> LazyFrame {
    cache.face_flavor_names().select([
        col("scryfall_id").alias("scryfallId"),
        col("face_name").alias("faceName"),
        col("flavor_name").alias("faceFlavorName"),
    ])
}

fn build_marketplace_sets(cache: &SourceCache) -> Result<LazyFrame> {
    Ok(cache
        .marketplace_ids()
        .select([
            col("set_code").str().to_uppercase().alias("setCode"),
            col("mcm_set_id"),
            col("mcm_set_name"),
        ])
        .unique_stable(None, UniqueKeepStrategy::First))
}

/// Row-wise v5 UUID over an already-concatenated seed column. Runs inside a
/// lazy plan via `Expr::map`.
pub fn uuid5_batch(s: Column) -> PolarsResult<Option<Column>> {
    let ca = s.str()?;
    let out: StringChunked = ca
        .into_iter()
        .map(|opt| opt.map(uuid5::uuid5))
        .collect();
    Ok(Some(out.into_column()))
}

// ---------------------------------------------------------------------------
// ID-to-UUID bridges (price engine)
// ---------------------------------------------------------------------------

/// Four inverted indexes mapping provider-native ids to face UUIDs.
/// Persisted alongside the sources so a standalone price run can load them
/// without a card build.
pub struct IdBridges {
    pub tcgplayer: LazyFrame,
    pub tcgplayer_etched: LazyFrame,
    pub mtgo: LazyFrame,
    pub scryfall: LazyFrame,
}

const BRIDGE_NAMES: [(&str, &str, &str); 4] = [
    ("bridge_tcgplayer", "tcgplayerProductId", "uuid"),
    ("bridge_tcgplayer_etched", "tcgplayerEtchedProductId", "uuid"),
    ("bridge_mtgo", "mtgoId", "uuid"),
    ("bridge_scryfall", "scryfallId", "uuid"),
];

impl IdBridges {
    /// Derive the bridges from the card partitions emitted by the pipeline,
    /// then persist them for standalone price runs.
    pub fn build_and_persist(cards_root: &Path, cache_dir: &Path) -> Result<Self> {
        let pattern = cards_root.join("setCode=*").join("*.parquet");
        let scan = LazyFrame::scan_parquet(pattern, ScanArgsParquet::default())?;

        let base = scan.select([
            col("uuid"),
            col("identifiers").struct_().field_by_name("tcgplayerProductId"),
            col("identifiers")
                .struct_()
                .field_by_name("tcgplayerEtchedProductId"),
            col("identifiers").struct_().field_by_name("mtgoId"),
            col("identifiers").struct_().field_by_name("scryfallId"),
        ]);
        let base = base.collect()?;

        let mut frames = Vec::with_capacity(4);
        for (file, id_col, uuid_col) in BRIDGE_NAMES {
            let mut bridge = base
                .clone()
                .lazy()
                .select([col(id_col), col("uuid").alias(uuid_col)])
                .filter(col(id_col).is_not_null())
                .unique_stable(None, UniqueKeepStrategy::First)
                .sort_by_exprs(
                    vec![col(id_col), col(uuid_col)],
                    SortMultipleOptions::default(),
                )
                .collect()?;

            let path = cache_dir.join("sources").join(format!("{file}.parquet"));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let f = std::fs::File::create(&path)?;
            ParquetWriter::new(f)
                .with_compression(ParquetCompression::Zstd(None))
                .finish(&mut bridge)?;
            frames.push(bridge.lazy());
        }

        let mut it = frames.into_iter();
        Ok(Self {
            tcgplayer: it.next().unwrap_or_else(|| DataFrame::empty().lazy()),
            tcgplayer_etched: it.next().unwrap_or_else(|| DataFrame::empty().lazy()),
            mtgo: it.next().unwrap_or_else(|| DataFrame::empty().lazy()),
            scryfall: it.next().unwrap_or_else(|| DataFrame::empty().lazy()),
        })
    }

    /// Load previously persisted bridges. Missing files become empty frames;
    /// the price engine then simply resolves nothing for that provider.
    pub fn load(cache_dir: &Path) -> Self {
        let mut frames = Vec::with_capacity(4);
        for (file, _, _) in BRIDGE_NAMES {
            let path = cache_dir.join("sources").join(format!("{file}.parquet"));
            let lf = if path.exists() {
                LazyFrame::scan_parquet(&path, ScanArgsParquet::default())
                    .unwrap_or_else(|_| DataFrame::empty().lazy())
            } else {
                DataFrame::empty().lazy()
            };
            frames.push(lf);
        }
        let mut it = frames.into_iter();
        Self {
            tcgplayer: it.next().unwrap_or_else(|| DataFrame::empty().lazy()),
            tcgplayer_etched: it.next().unwrap_or_else(|| DataFrame::empty().lazy()),
            mtgo: it.next().unwrap_or_else(|| DataFrame::empty().lazy()),
            scryfall: it.next().unwrap_or_else(|| DataFrame::empty().lazy()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cache::registry::SourceKind;
    use std::collections::HashMap;

    #[test]
    fn language_mapping() {
        assert_eq!(language_name("zhs"), "Chinese Simplified");
        assert_eq!(language_name("px"), "Phyrexian");
        assert_eq!(language_name("xx"), "Unknown");
    }

    #[test]
    fn by_name_excludes_self_from_card_parts() {
        let triplets = df!(
            "part_a" => ["Bruna, the Fading Light"],
            "part_b" => ["Gisela, the Broken Blade"],
            "result" => ["Brisela, Voice of Nightmares"],
        )
        .unwrap();
        let mut frames = HashMap::new();
        frames.insert(SourceKind::MeldTriplets, triplets);
        let cache = SourceCache::from_frames(frames);

        let df = build_by_name(&cache).unwrap().collect().unwrap();
        assert_eq!(df.height(), 3);

        let names = df.column("name").unwrap().str().unwrap();
        let parts = df.column("cardParts").unwrap().list().unwrap();
        for i in 0..df.height() {
            let name = names.get(i).unwrap();
            let row_parts = parts.get_as_series(i).unwrap();
            let row_parts = row_parts.str().unwrap();
            assert_eq!(row_parts.len(), 2);
            for j in 0..2 {
                assert_ne!(row_parts.get(j).unwrap(), name, "cardParts must exclude self");
            }
        }
    }

    #[test]
    fn oracle_printings_are_sorted_set_codes() {
        let bulk = df!(
            "id" => ["1", "2", "3"],
            "oracle_id" => ["o1", "o1", "o1"],
            "set" => ["neo", "lea", "lea"],
        )
        .unwrap();
        let rulings = df!(
            "oracle_id" => Vec::<String>::new(),
            "published_at" => Vec::<String>::new(),
            "comment" => Vec::<String>::new(),
        )
        .unwrap();
        let salt = df!(
            "oracle_id" => ["o1"],
            "salt" => [1.5f64],
            "rank" => [100i64],
        )
        .unwrap();

        let mut frames = HashMap::new();
        frames.insert(SourceKind::CardBulk, bulk);
        frames.insert(SourceKind::Rulings, rulings);
        frames.insert(SourceKind::SaltScores, salt);
        let cache = SourceCache::from_frames(frames);

        let df = build_oracle(&cache).unwrap().collect().unwrap();
        assert_eq!(df.height(), 1);
        let printings = df.column("printings").unwrap().list().unwrap();
        let row = printings.get_as_series(0).unwrap();
        let row = row.str().unwrap();
        assert_eq!(row.get(0).unwrap(), "LEA");
        assert_eq!(row.get(1).unwrap(), "NEO");
    }
}
