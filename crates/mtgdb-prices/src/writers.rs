//! Price output writers.
//!
//! The nested snapshot is too large to hold as one map, so the JSON writer
//! partitions UUIDs by hex prefix (0-f): each group is filtered, collected,
//! sorted, folded into the nested shape, written, and released. Never more
//! than one group's rows are resident.
//!
//! Nested shape:
//! `{uuid: {source: {provider: {price_type: {finish: {date: price}},
//! currency}}}}`

use mtgdb_common::{MtgdbError, Result};
use polars::prelude::*;
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::schema::{frame_to_rows, PriceRow};

const PREFIXES: &str = "0123456789abcdef";

/// Stream the nested snapshot to `path` by UUID prefix group.
pub fn stream_prices_json(lf: LazyFrame, path: &Path, meta_date: &str, version: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        let file = std::fs::File::create(&tmp)?;
        let mut out = std::io::BufWriter::new(file);
        out.write_all(b"{\"meta\":")?;
        out.write_all(&serde_json::to_vec(&json!({
            "date": meta_date,
            "version": version,
        }))?)?;
        out.write_all(b",\"data\":{")?;

        let mut total = 0usize;
        let mut first = true;
        for prefix in PREFIXES.chars() {
            let chunk = lf
                .clone()
                .filter(col("uuid").str().starts_with(lit(prefix.to_string())))
                .collect()?;
            if chunk.height() == 0 {
                continue;
            }
            let chunk = chunk
                .lazy()
                .sort_by_exprs(
                    vec![
                        col("uuid"),
                        col("source"),
                        col("provider"),
                        col("price_type"),
                        col("finish"),
                        col("date"),
                    ],
                    SortMultipleOptions::default(),
                )
                .collect()?;

            total += write_chunk(&mut out, &chunk, &mut first)?;
            debug!(prefix = %prefix, total, "prefix group streamed");
        }

        out.write_all(b"}}")?;
        out.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    info!(path = %path.display(), "nested price snapshot written");
    Ok(())
}

/// Fold one sorted chunk into nested objects and write them. Returns the
/// number of UUIDs emitted.
fn write_chunk(out: &mut impl Write, chunk: &DataFrame, first: &mut bool) -> Result<usize> {
    let rows = frame_to_rows(chunk)?;
    let mut written = 0usize;

    let mut current_uuid: Option<String> = None;
    let mut uuid_data = Map::new();

    let mut flush = |out: &mut dyn Write,
                     uuid: &str,
                     data: &Map<String, Value>,
                     first: &mut bool|
     -> Result<()> {
        if !*first {
            out.write_all(b",")?;
        }
        *first = false;
        out.write_all(serde_json::to_string(uuid)?.as_bytes())?;
        out.write_all(b":")?;
        out.write_all(&serde_json::to_vec(&Value::Object(data.clone()))?)?;
        Ok(())
    };

    for row in &rows {
        if current_uuid.as_deref() != Some(row.uuid.as_str()) {
            if let Some(uuid) = current_uuid.take() {
                flush(out, &uuid, &uuid_data, first)?;
                written += 1;
            }
            current_uuid = Some(row.uuid.clone());
            uuid_data = Map::new();
        }
        insert_row(&mut uuid_data, row);
    }
    if let Some(uuid) = current_uuid {
        flush(out, &uuid, &uuid_data, first)?;
        written += 1;
    }
    Ok(written)
}

fn insert_row(uuid_data: &mut Map<String, Value>, row: &PriceRow) {
    let source = uuid_data
        .entry(row.source.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(source) = source.as_object_mut() else {
        return;
    };
    let provider = source.entry(row.provider.clone()).or_insert_with(|| {
        json!({
            "buylist": {},
            "retail": {},
            "currency": row.currency,
        })
    });
    let Some(provider) = provider.as_object_mut() else {
        return;
    };
    let Some(price_type) = provider
        .get_mut(row.price_type.as_str())
        .and_then(Value::as_object_mut)
    else {
        return;
    };
    let finish = price_type
        .entry(row.finish.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(finish) = finish.as_object_mut() {
        finish.insert(row.date.clone(), json!(row.price));
    }
}

// ---------------------------------------------------------------------------
// Relational writers: single `prices` table, one row per flat tuple.
// ---------------------------------------------------------------------------

const SQL_COLUMNS: &[&str] = &[
    "uuid", "date", "source", "provider", "priceType", "finish", "price", "currency",
];

const INSERT_BATCH: usize = 10_000;

pub fn write_prices_sqlite(df: &DataFrame, path: &Path, meta_date: &str, version: &str) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path).map_err(db_err)?;
    conn.execute_batch(
        "CREATE TABLE prices (uuid TEXT, date TEXT, source TEXT, provider TEXT, \
         priceType TEXT, finish TEXT, price REAL, currency TEXT);\n\
         CREATE TABLE meta (date TEXT, version TEXT);",
    )
    .map_err(db_err)?;

    let rows = frame_to_rows(df)?;
    for chunk in rows.chunks(INSERT_BATCH) {
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO prices (uuid, date, source, provider, priceType, finish, \
                     price, currency) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(db_err)?;
            for row in chunk {
                stmt.execute(rusqlite::params![
                    row.uuid,
                    row.date,
                    row.source.as_str(),
                    row.provider,
                    row.price_type.as_str(),
                    row.finish.as_str(),
                    row.price,
                    row.currency,
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
    }

    conn.execute(
        "INSERT INTO meta (date, version) VALUES (?1, ?2)",
        rusqlite::params![meta_date, version],
    )
    .map_err(db_err)?;
    conn.execute_batch(
        "CREATE INDEX idx_prices_uuid ON prices (uuid);\n\
         CREATE INDEX idx_prices_date ON prices (date);\n\
         CREATE INDEX idx_prices_provider ON prices (provider);",
    )
    .map_err(db_err)?;
    info!(path = %path.display(), rows = rows.len(), "price sqlite written");
    Ok(())
}

pub fn write_prices_sql(df: &DataFrame, path: &Path, meta_date: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rows = frame_to_rows(df)?;
    let file = std::fs::File::create(path)?;
    let mut out = std::io::BufWriter::new(file);

    writeln!(out, "-- mtgdb price SQL dump\n-- Generated: {meta_date}")?;
    writeln!(out, "SET names 'utf8mb4';\nSTART TRANSACTION;\n")?;
    writeln!(out, "DROP TABLE IF EXISTS `prices`;")?;
    writeln!(
        out,
        "CREATE TABLE `prices` (\n    `id` INTEGER PRIMARY KEY AUTO_INCREMENT,\n    \
         `uuid` TEXT,\n    `date` TEXT,\n    `source` TEXT,\n    `provider` TEXT,\n    \
         `priceType` TEXT,\n    `finish` TEXT,\n    `price` FLOAT,\n    `currency` TEXT\n\
         ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;\n"
    )?;

    let col_list: String = SQL_COLUMNS
        .iter()
        .map(|c| format!("`{c}`"))
        .collect::<Vec<_>>()
        .join(", ");
    for chunk in rows.chunks(INSERT_BATCH) {
        if chunk.is_empty() {
            continue;
        }
        writeln!(out, "INSERT INTO `prices` ({col_list}) VALUES")?;
        for (i, row) in chunk.iter().enumerate() {
            let terminator = if i + 1 == chunk.len() { ";" } else { "," };
            writeln!(
                out,
                "('{}', '{}', '{}', '{}', '{}', '{}', {}, '{}'){terminator}",
                row.uuid,
                row.date,
                row.source,
                row.provider,
                row.price_type,
                row.finish,
                row.price,
                row.currency,
            )?;
        }
    }

    writeln!(out, "CREATE INDEX `idx_prices_uuid` ON `prices` (`uuid`(36));")?;
    writeln!(out, "CREATE INDEX `idx_prices_date` ON `prices` (`date`(10));")?;
    writeln!(out, "CREATE INDEX `idx_prices_provider` ON `prices` (`provider`(32));")?;
    writeln!(out, "\nCOMMIT;")?;
    out.flush()?;
    info!(path = %path.display(), rows = rows.len(), "price sql dump written");
    Ok(())
}

pub fn write_prices_psql(df: &DataFrame, path: &Path, meta_date: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rows = frame_to_rows(df)?;
    let file = std::fs::File::create(path)?;
    let mut out = std::io::BufWriter::new(file);

    writeln!(out, "-- mtgdb price PostgreSQL dump\n-- Generated: {meta_date}")?;
    writeln!(out, "BEGIN;\n")?;
    writeln!(
        out,
        "CREATE TABLE IF NOT EXISTS \"prices\" (\n    \"uuid\" TEXT,\n    \"date\" TEXT,\n    \
         \"source\" TEXT,\n    \"provider\" TEXT,\n    \"priceType\" TEXT,\n    \
         \"finish\" TEXT,\n    \"price\" DOUBLE PRECISION,\n    \"currency\" TEXT\n);\n"
    )?;
    let col_list: String = SQL_COLUMNS
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(out, "COPY \"prices\" ({col_list}) FROM stdin;")?;
    for row in &rows {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.uuid,
            row.date,
            row.source,
            row.provider,
            row.price_type,
            row.finish,
            row.price,
            row.currency,
        )?;
    }
    writeln!(out, "\\.\n")?;
    writeln!(out, "CREATE INDEX IF NOT EXISTS \"idx_prices_uuid\" ON \"prices\" (\"uuid\");")?;
    writeln!(out, "CREATE INDEX IF NOT EXISTS \"idx_prices_date\" ON \"prices\" (\"date\");")?;
    writeln!(
        out,
        "CREATE INDEX IF NOT EXISTS \"idx_prices_provider\" ON \"prices\" (\"provider\");"
    )?;
    writeln!(out, "\nCOMMIT;")?;
    out.flush()?;
    info!(path = %path.display(), rows = rows.len(), "price psql dump written");
    Ok(())
}

/// Legacy-named flat CSV: `cardFinish, currency, date, gameAvailability,
/// price, priceProvider, providerListing, uuid`.
pub fn write_prices_csv(df: &DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rows = frame_to_rows(df)?;
    let file = std::fs::File::create(path)?;
    let mut out = std::io::BufWriter::new(file);
    writeln!(
        out,
        "cardFinish,currency,date,gameAvailability,price,priceProvider,providerListing,uuid"
    )?;
    for row in &rows {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{}",
            row.finish,
            row.currency,
            row.date,
            row.source,
            row.price,
            row.provider,
            row.price_type,
            row.uuid,
        )?;
    }
    out.flush()?;
    info!(path = %path.display(), rows = rows.len(), "price csv written");
    Ok(())
}

fn db_err(e: rusqlite::Error) -> MtgdbError {
    MtgdbError::parse("sqlite", e.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::rows_to_frame;
    use mtgdb_common::types::{Finish, PriceSource, PriceType};

    fn row(uuid: &str, provider: &str, price_type: PriceType, price: f64, currency: &str) -> PriceRow {
        PriceRow {
            uuid: uuid.to_string(),
            date: "2024-02-07".to_string(),
            source: PriceSource::Paper,
            provider: provider.to_string(),
            price_type,
            finish: Finish::Normal,
            price,
            currency: currency.to_string(),
        }
    }

    #[test]
    fn nested_shape_matches_contract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AllPricesToday.json");
        let df = rows_to_frame(&[
            row("a1", "tcgplayer", PriceType::Retail, 1.50, "USD"),
            row("a1", "cardmarket", PriceType::Retail, 1.20, "EUR"),
            row("a1", "cardmarket", PriceType::Buylist, 0.90, "EUR"),
        ])
        .unwrap();

        stream_prices_json(df.lazy(), &path, "2024-02-07", "5.3.0").unwrap();

        let parsed: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            parsed["data"]["a1"]["paper"]["tcgplayer"]["retail"]["normal"]["2024-02-07"],
            json!(1.50)
        );
        assert_eq!(
            parsed["data"]["a1"]["paper"]["cardmarket"]["currency"],
            json!("EUR")
        );
        assert_eq!(
            parsed["data"]["a1"]["paper"]["cardmarket"]["buylist"]["normal"]["2024-02-07"],
            json!(0.90)
        );
        // meta precedes data in the byte stream.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.find("\"meta\"").unwrap() < raw.find("\"data\"").unwrap());
    }

    #[test]
    fn streaming_round_trips_all_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AllPrices.json");
        // Distinct first hex characters to exercise the prefix grouping.
        let df = rows_to_frame(&[
            row("0abc", "tcgplayer", PriceType::Retail, 1.0, "USD"),
            row("fabc", "tcgplayer", PriceType::Retail, 2.0, "USD"),
            row("8abc", "tcgplayer", PriceType::Retail, 3.0, "USD"),
        ])
        .unwrap();

        stream_prices_json(df.lazy(), &path, "2024-02-07", "5.3.0").unwrap();
        let parsed: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["data"].as_object().unwrap().len(), 3);
    }

    #[test]
    fn empty_frame_still_emits_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AllPricesToday.json");
        stream_prices_json(crate::schema::empty_frame().lazy(), &path, "2024-02-07", "5.3.0")
            .unwrap();
        let parsed: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed["data"].as_object().unwrap().is_empty());
    }

    #[test]
    fn sqlite_writer_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AllPricesToday.sqlite");
        let df = rows_to_frame(&[row("a1", "tcgplayer", PriceType::Retail, 1.5, "USD")]).unwrap();
        write_prices_sqlite(&df, &path, "2024-02-07", "5.3.0").unwrap();

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM prices", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let price: f64 = conn
            .query_row("SELECT price FROM prices WHERE uuid = 'a1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(price, 1.5);
    }

    #[test]
    fn csv_uses_legacy_column_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cardPrices.csv");
        let df = rows_to_frame(&[row("a1", "tcgplayer", PriceType::Retail, 1.5, "USD")]).unwrap();
        write_prices_csv(&df, &path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("cardFinish,currency,date,gameAvailability"));
        assert!(raw.contains("normal,USD,2024-02-07,paper,1.5,tcgplayer,retail,a1"));
    }
}
