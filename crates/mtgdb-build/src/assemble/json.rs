//! JSON writers.
//!
//! The combined file streams set objects one at a time in lexicographic
//! set-code order: `{"meta":…,"data":{` then `"CODE": <set>` entries, never
//! materializing the full map. Individual set files run on a bounded worker
//! pool; a failing set aborts only its own file. Every writer emits to a
//! temp path and renames on completion, and `meta` always precedes `data`.

use mtgdb_common::{MtgdbError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

use super::{Assembler, model};

/// Workers for individual set emission.
const SET_WRITER_POOL: usize = 30;

/// Fields dropped from atomic (rules-identity) card objects.
const ATOMIC_EXCLUDE: &[&str] = &[
    "artist",
    "artistIds",
    "availability",
    "boosterTypes",
    "borderColor",
    "duelDeck",
    "finishes",
    "flavorName",
    "flavorText",
    "frameEffects",
    "frameVersion",
    "hasFoil",
    "hasNonFoil",
    "isAlternative",
    "isFullArt",
    "isOnlineOnly",
    "isOversized",
    "isPromo",
    "isReprint",
    "isStorySpotlight",
    "isTextless",
    "isTimeshifted",
    "language",
    "number",
    "orientation",
    "originalReleaseDate",
    "originalText",
    "originalType",
    "otherFaceIds",
    "promoTypes",
    "rarity",
    "rebalancedPrintings",
    "securityStamp",
    "setCode",
    "signature",
    "sourceProducts",
    "subsets",
    "tokenIds",
    "uuid",
    "variations",
    "watermark",
];

fn serialize<T: Serialize>(value: &T, pretty: bool) -> Result<Vec<u8>> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };
    Ok(bytes)
}

/// `{"meta":…,"data":<payload>}` with the guaranteed key order.
pub fn write_envelope<T: Serialize>(
    path: &Path,
    meta: &model::Meta,
    data: &T,
    pretty: bool,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        let file = std::fs::File::create(&tmp)?;
        let mut out = std::io::BufWriter::new(file);
        out.write_all(b"{\"meta\":")?;
        out.write_all(&serialize(meta, pretty)?)?;
        out.write_all(b",\"data\":")?;
        out.write_all(&serialize(data, pretty)?)?;
        out.write_all(b"}")?;
        out.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Combined nested JSON. Iterates set codes lexicographically, composing
/// and releasing one set at a time.
pub fn write_all_printings(assembler: &Assembler<'_>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        let file = std::fs::File::create(&tmp)?;
        let mut out = std::io::BufWriter::new(file);
        out.write_all(b"{\"meta\":")?;
        out.write_all(&serialize(&assembler.meta, false)?)?;
        out.write_all(b",\"data\":{")?;

        let mut first = true;
        for code in assembler.set_codes()? {
            let set = assembler.set_object(&code)?;
            if !first {
                out.write_all(b",")?;
            }
            first = false;
            out.write_all(serde_json::to_string(&code)?.as_bytes())?;
            out.write_all(b":")?;
            out.write_all(&serialize(&set, false)?)?;
        }
        out.write_all(b"}}")?;
        out.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    info!(path = %path.display(), "combined printings written");
    Ok(())
}

/// Per-set JSON files on a bounded worker pool. A set that fails to write
/// is recorded and skipped; resume mode skips files that already exist.
pub fn write_individual_sets(assembler: &Assembler<'_>, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let codes = assembler.set_codes()?;
    let queue: Mutex<VecDeque<String>> = Mutex::new(codes.into());

    std::thread::scope(|scope| {
        for _ in 0..SET_WRITER_POOL {
            scope.spawn(|| loop {
                let code = {
                    let mut q = queue.lock().unwrap_or_else(|e| e.into_inner());
                    q.pop_front()
                };
                let Some(code) = code else {
                    break;
                };
                if let Err(e) = write_one_set(assembler, dir, &code) {
                    warn!(set = %code, error = %e, "set file failed");
                    assembler.report.record_failed_set(&code);
                }
            });
        }
    });
    Ok(())
}

fn write_one_set(assembler: &Assembler<'_>, dir: &Path, code: &str) -> Result<()> {
    let path = dir.join(format!("{code}.json"));
    if path.exists() {
        if assembler.config.resume {
            return Ok(());
        }
        return Err(MtgdbError::write_conflict(path.display().to_string()));
    }
    let set = assembler.set_object(code)?;
    write_envelope(&path, &assembler.meta, &set, assembler.config.pretty)
}

/// Atomic cards: faces grouped by name, one entry per rules identity, with
/// printing-specific fields removed. Names iterate alphabetically.
pub fn write_atomic_cards(assembler: &Assembler<'_>, path: &Path) -> Result<()> {
    let mut by_name: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
    let mut seen: std::collections::HashSet<(String, String)> = std::collections::HashSet::new();

    for code in assembler.set_codes()? {
        let df = super::load_partition(&assembler.config.cards_partition_root(), &code)?;
        for card in super::cards_from_partition(&df)? {
            let oracle_key = (
                card.name.clone(),
                card.identifiers
                    .scryfall_oracle_id
                    .clone()
                    .unwrap_or_default()
                    + card.face_name.as_deref().unwrap_or(""),
            );
            if !seen.insert(oracle_key) {
                continue;
            }
            let mut value = serde_json::to_value(&card)?;
            if let Some(obj) = value.as_object_mut() {
                for field in ATOMIC_EXCLUDE {
                    obj.remove(*field);
                }
            }
            by_name.entry(card.name.clone()).or_default().push(value);
        }
    }

    write_envelope(path, &assembler.meta, &by_name, assembler.config.pretty)
}

/// Set metadata only, no cards.
pub fn write_set_list(assembler: &Assembler<'_>, path: &Path) -> Result<()> {
    let mut entries = Vec::new();
    for code in assembler.set_codes()? {
        let df = super::load_partition(&assembler.config.cards_partition_root(), &code)?;
        let cards = super::cards_from_partition(&df)?;
        let Some(meta) = assembler.set_meta.get(&code) else {
            continue;
        };
        let (base, total) = crate::sets::set_sizes(&cards, &meta.release_date);
        entries.push(crate::sets::set_list_entry(&code, meta, base, total));
    }
    write_envelope(path, &assembler.meta, &entries, assembler.config.pretty)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn envelope_orders_meta_before_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let meta = model::Meta {
            date: "2024-02-07".to_string(),
            version: "5.3.0".to_string(),
        };
        write_envelope(&path, &meta, &serde_json::json!({"x": 1}), false).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let meta_pos = raw.find("\"meta\"").unwrap();
        let data_pos = raw.find("\"data\"").unwrap();
        assert!(meta_pos < data_pos, "meta must precede data");

        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["data"]["x"], 1);
        assert_eq!(parsed["meta"]["date"], "2024-02-07");
    }
}
