//! SQL text dumps: MySQL INSERT format and PostgreSQL COPY format.

use mtgdb_common::Result;
use std::io::Write;
use std::path::Path;
use tracing::info;

use super::flat::{self, SqlType, SqlValue};
use super::Assembler;

/// Rows per INSERT batch in the MySQL dump.
const INSERT_BATCH: usize = 10_000;

pub fn escape_mysql(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Text(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''")),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
    }
}

pub fn escape_postgres(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "\\N".to_string(),
        SqlValue::Text(s) => s
            .replace('\\', "\\\\")
            .replace('\t', "\\t")
            .replace('\n', "\\n")
            .replace('\r', "\\r"),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
    }
}

fn mysql_type(t: SqlType) -> &'static str {
    match t {
        SqlType::Text => "TEXT",
        SqlType::Real => "FLOAT",
        SqlType::Integer => "INTEGER",
        SqlType::Boolean => "TINYINT(1)",
    }
}

fn pg_type(t: SqlType) -> &'static str {
    match t {
        SqlType::Text => "TEXT",
        SqlType::Real => "DOUBLE PRECISION",
        SqlType::Integer => "BIGINT",
        SqlType::Boolean => "BOOLEAN",
    }
}

/// MySQL-style dump with batched INSERT statements.
pub fn write_sql_dump(assembler: &Assembler<'_>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("sql.tmp");
    {
        let file = std::fs::File::create(&tmp)?;
        let mut out = std::io::BufWriter::new(file);

        writeln!(out, "-- mtgdb SQL dump")?;
        writeln!(out, "-- Generated: {}", assembler.meta.date)?;
        writeln!(out, "SET names 'utf8mb4';")?;
        writeln!(out, "START TRANSACTION;\n")?;

        let columns = flat::card_columns();
        let col_defs: String = columns
            .iter()
            .map(|(n, t)| format!("    `{n}` {}", mysql_type(*t)))
            .collect::<Vec<_>>()
            .join(",\n");
        let col_names: String = columns
            .iter()
            .map(|(n, _)| format!("`{n}`"))
            .collect::<Vec<_>>()
            .join(", ");

        for table in ["cards", "tokens"] {
            writeln!(out, "DROP TABLE IF EXISTS `{table}`;")?;
            writeln!(
                out,
                "CREATE TABLE `{table}` (\n    `id` INTEGER PRIMARY KEY AUTO_INCREMENT,\n{col_defs}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;\n"
            )?;
        }

        for code in assembler.set_codes()? {
            let set = assembler.set_object(&code)?;
            for (table, faces) in [("cards", &set.cards), ("tokens", &set.tokens)] {
                for chunk in faces.chunks(INSERT_BATCH) {
                    if chunk.is_empty() {
                        continue;
                    }
                    writeln!(out, "INSERT INTO `{table}` ({col_names}) VALUES")?;
                    for (i, card) in chunk.iter().enumerate() {
                        let values: String = flat::card_values(card)
                            .iter()
                            .map(escape_mysql)
                            .collect::<Vec<_>>()
                            .join(", ");
                        let terminator = if i + 1 == chunk.len() { ";" } else { "," };
                        writeln!(out, "({values}){terminator}")?;
                    }
                }
            }
        }

        for table in ["cards", "tokens"] {
            writeln!(out, "CREATE INDEX `idx_{table}_uuid` ON `{table}` (`uuid`(36));")?;
            writeln!(out, "CREATE INDEX `idx_{table}_name` ON `{table}` (`name`(255));")?;
            writeln!(
                out,
                "CREATE INDEX `idx_{table}_setCode` ON `{table}` (`setCode`(8));"
            )?;
        }
        writeln!(out, "\nCOMMIT;")?;
        out.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    info!(path = %path.display(), "sql dump written");
    Ok(())
}

/// PostgreSQL dump using COPY FROM stdin blocks.
pub fn write_psql_dump(assembler: &Assembler<'_>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("psql.tmp");
    {
        let file = std::fs::File::create(&tmp)?;
        let mut out = std::io::BufWriter::new(file);

        writeln!(out, "-- mtgdb PostgreSQL dump")?;
        writeln!(out, "-- Generated: {}", assembler.meta.date)?;
        writeln!(out, "BEGIN;\n")?;

        let columns = flat::card_columns();
        let col_defs: String = columns
            .iter()
            .map(|(n, t)| format!("    \"{n}\" {}", pg_type(*t)))
            .collect::<Vec<_>>()
            .join(",\n");
        let col_names: String = columns
            .iter()
            .map(|(n, _)| format!("\"{n}\""))
            .collect::<Vec<_>>()
            .join(", ");

        for table in ["cards", "tokens"] {
            writeln!(out, "CREATE TABLE IF NOT EXISTS \"{table}\" (\n{col_defs}\n);\n")?;
            writeln!(out, "COPY \"{table}\" ({col_names}) FROM stdin;")?;
            for code in assembler.set_codes()? {
                let set = assembler.set_object(&code)?;
                let faces = if table == "cards" { &set.cards } else { &set.tokens };
                for card in faces {
                    let row: String = flat::card_values(card)
                        .iter()
                        .map(escape_postgres)
                        .collect::<Vec<_>>()
                        .join("\t");
                    writeln!(out, "{row}")?;
                }
            }
            writeln!(out, "\\.\n")?;
        }

        for table in ["cards", "tokens"] {
            writeln!(
                out,
                "CREATE INDEX IF NOT EXISTS \"idx_{table}_uuid\" ON \"{table}\" (\"uuid\");"
            )?;
            writeln!(
                out,
                "CREATE INDEX IF NOT EXISTS \"idx_{table}_name\" ON \"{table}\" (\"name\");"
            )?;
            writeln!(
                out,
                "CREATE INDEX IF NOT EXISTS \"idx_{table}_setCode\" ON \"{table}\" (\"setCode\");"
            )?;
        }
        writeln!(out, "\nCOMMIT;")?;
        out.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    info!(path = %path.display(), "psql dump written");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn mysql_escaping() {
        assert_eq!(
            escape_mysql(&SqlValue::Text("it's".to_string())),
            "'it''s'"
        );
        assert_eq!(escape_mysql(&SqlValue::Null), "NULL");
        assert_eq!(escape_mysql(&SqlValue::Bool(true)), "1");
    }

    #[test]
    fn postgres_escaping() {
        assert_eq!(escape_postgres(&SqlValue::Null), "\\N");
        assert_eq!(
            escape_postgres(&SqlValue::Text("a\tb\nc".to_string())),
            "a\\tb\\nc"
        );
        assert_eq!(escape_postgres(&SqlValue::Bool(false)), "f");
    }
}
