//! SQLite output.
//!
//! One database with `sets`, `cards`, `tokens`, `cardForeignData`,
//! `cardRulings`, and `meta` tables, indexed on uuid, name, and setCode.
//! Inserts run in batched transactions.

use mtgdb_common::{MtgdbError, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

use super::flat::{self, SqlType, SqlValue};
use super::Assembler;

fn sql_type_name(t: SqlType) -> &'static str {
    match t {
        SqlType::Text => "TEXT",
        SqlType::Real => "REAL",
        SqlType::Integer => "INTEGER",
        SqlType::Boolean => "BOOLEAN",
    }
}

fn bind(value: &SqlValue) -> rusqlite::types::Value {
    use rusqlite::types::Value;
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Real(f) => Value::Real(*f),
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
    }
}

pub fn write_sqlite(assembler: &Assembler<'_>, path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("sqlite.tmp");
    if tmp.exists() {
        std::fs::remove_file(&tmp)?;
    }

    let mut conn = Connection::open(&tmp).map_err(to_db_err)?;
    create_schema(&conn)?;

    let card_columns = flat::card_columns();
    let placeholders: String = std::iter::repeat("?")
        .take(card_columns.len())
        .collect::<Vec<_>>()
        .join(", ");
    let column_names: String = card_columns
        .iter()
        .map(|(n, _)| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ");

    for code in assembler.set_codes()? {
        let set = assembler.set_object(&code)?;
        let tx = conn.transaction().map_err(to_db_err)?;

        tx.execute(
            "INSERT INTO sets (baseSetSize, code, isFoilOnly, isOnlineOnly, keyruneCode, \
             mcmId, mcmName, mtgoCode, name, parentCode, releaseDate, tcgplayerGroupId, \
             tokenSetCode, totalSetSize, type) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            rusqlite::params![
                set.base_set_size,
                set.code,
                set.is_foil_only,
                set.is_online_only,
                set.keyrune_code,
                set.mcm_id,
                set.mcm_name,
                set.mtgo_code,
                set.name,
                set.parent_code,
                set.release_date,
                set.tcgplayer_group_id,
                set.token_set_code,
                set.total_set_size,
                set.set_type,
            ],
        )
        .map_err(to_db_err)?;

        for (table, faces) in [("cards", &set.cards), ("tokens", &set.tokens)] {
            let insert = format!("INSERT INTO \"{table}\" ({column_names}) VALUES ({placeholders})");
            let mut stmt = tx.prepare_cached(&insert).map_err(to_db_err)?;
            for card in faces {
                let values: Vec<rusqlite::types::Value> =
                    flat::card_values(card).iter().map(bind).collect();
                stmt.execute(rusqlite::params_from_iter(values))
                    .map_err(to_db_err)?;

                for row in flat::foreign_data_rows(card) {
                    let values: Vec<rusqlite::types::Value> = row.iter().map(bind).collect();
                    tx.execute(
                        "INSERT INTO cardForeignData (uuid, language, name, faceName, \
                         flavorText, text, type, multiverseId, scryfallId) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        rusqlite::params_from_iter(values),
                    )
                    .map_err(to_db_err)?;
                }
                for row in flat::ruling_rows(card) {
                    let values: Vec<rusqlite::types::Value> = row.iter().map(bind).collect();
                    tx.execute(
                        "INSERT INTO cardRulings (uuid, date, text) VALUES (?1, ?2, ?3)",
                        rusqlite::params_from_iter(values),
                    )
                    .map_err(to_db_err)?;
                }
            }
        }

        tx.commit().map_err(to_db_err)?;
    }

    conn.execute(
        "INSERT INTO meta (date, version) VALUES (?1, ?2)",
        rusqlite::params![assembler.meta.date, assembler.meta.version],
    )
    .map_err(to_db_err)?;

    create_indexes(&conn)?;
    drop(conn);
    std::fs::rename(&tmp, path)?;
    info!(path = %path.display(), "sqlite database written");
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<()> {
    let card_cols: String = flat::card_columns()
        .iter()
        .map(|(n, t)| format!("\"{n}\" {}", sql_type_name(*t)))
        .collect::<Vec<_>>()
        .join(", ");

    conn.execute_batch(&format!(
        "CREATE TABLE meta (date TEXT, version TEXT);\n\
         CREATE TABLE sets (baseSetSize INTEGER, code TEXT, isFoilOnly BOOLEAN, \
         isOnlineOnly BOOLEAN, keyruneCode TEXT, mcmId INTEGER, mcmName TEXT, \
         mtgoCode TEXT, name TEXT, parentCode TEXT, releaseDate TEXT, \
         tcgplayerGroupId INTEGER, tokenSetCode TEXT, totalSetSize INTEGER, type TEXT);\n\
         CREATE TABLE cards ({card_cols});\n\
         CREATE TABLE tokens ({card_cols});\n\
         CREATE TABLE cardForeignData (uuid TEXT, language TEXT, name TEXT, \
         faceName TEXT, flavorText TEXT, text TEXT, type TEXT, multiverseId TEXT, \
         scryfallId TEXT);\n\
         CREATE TABLE cardRulings (uuid TEXT, date TEXT, text TEXT);"
    ))
    .map_err(to_db_err)?;
    Ok(())
}

fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE INDEX idx_cards_uuid ON cards (uuid);\n\
         CREATE INDEX idx_cards_name ON cards (name);\n\
         CREATE INDEX idx_cards_setCode ON cards (setCode);\n\
         CREATE INDEX idx_tokens_uuid ON tokens (uuid);\n\
         CREATE INDEX idx_tokens_setCode ON tokens (setCode);\n\
         CREATE INDEX idx_foreign_uuid ON cardForeignData (uuid);\n\
         CREATE INDEX idx_rulings_uuid ON cardRulings (uuid);\n\
         CREATE INDEX idx_sets_code ON sets (code);",
    )
    .map_err(to_db_err)?;
    Ok(())
}

fn to_db_err(e: rusqlite::Error) -> MtgdbError {
    MtgdbError::parse("sqlite", e.to_string())
}
