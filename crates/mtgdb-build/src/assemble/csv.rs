//! CSV output: one file per logical table under `csv/`.

use mtgdb_common::Result;
use std::io::Write;
use std::path::Path;
use tracing::info;

use super::flat::{self, SqlValue};
use super::Assembler;

fn escape_csv(value: &SqlValue) -> String {
    let raw = match value {
        SqlValue::Null => return String::new(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
    };
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw
    }
}

fn write_rows(
    path: &Path,
    header: &[String],
    rows: impl Iterator<Item = Vec<SqlValue>>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let file = std::fs::File::create(&tmp)?;
        let mut out = std::io::BufWriter::new(file);
        writeln!(out, "{}", header.join(","))?;
        for row in rows {
            let line: String = row.iter().map(escape_csv).collect::<Vec<_>>().join(",");
            writeln!(out, "{line}")?;
        }
        out.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn write_csv(assembler: &Assembler<'_>, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let card_header: Vec<String> = flat::card_columns().into_iter().map(|(n, _)| n).collect();
    let foreign_header: Vec<String> = flat::foreign_data_columns()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let ruling_header: Vec<String> = flat::ruling_columns()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut card_rows: Vec<Vec<SqlValue>> = Vec::new();
    let mut token_rows: Vec<Vec<SqlValue>> = Vec::new();
    let mut foreign_rows: Vec<Vec<SqlValue>> = Vec::new();
    let mut ruling_rows: Vec<Vec<SqlValue>> = Vec::new();
    let mut set_rows: Vec<Vec<SqlValue>> = Vec::new();

    for code in assembler.set_codes()? {
        let set = assembler.set_object(&code)?;
        set_rows.push(vec![
            SqlValue::Int(set.base_set_size),
            SqlValue::Text(set.code.clone()),
            SqlValue::Text(set.name.clone()),
            SqlValue::Text(set.release_date.clone()),
            SqlValue::Int(set.total_set_size),
            SqlValue::Text(set.set_type.clone()),
        ]);
        for card in &set.cards {
            card_rows.push(flat::card_values(card));
            foreign_rows.extend(flat::foreign_data_rows(card));
            ruling_rows.extend(flat::ruling_rows(card));
        }
        for token in &set.tokens {
            token_rows.push(flat::card_values(token));
        }
    }

    write_rows(&dir.join("cards.csv"), &card_header, card_rows.into_iter())?;
    write_rows(&dir.join("tokens.csv"), &card_header, token_rows.into_iter())?;
    write_rows(
        &dir.join("cardForeignData.csv"),
        &foreign_header,
        foreign_rows.into_iter(),
    )?;
    write_rows(
        &dir.join("cardRulings.csv"),
        &ruling_header,
        ruling_rows.into_iter(),
    )?;
    write_rows(
        &dir.join("sets.csv"),
        &[
            "baseSetSize".to_string(),
            "code".to_string(),
            "name".to_string(),
            "releaseDate".to_string(),
            "totalSetSize".to_string(),
            "type".to_string(),
        ],
        set_rows.into_iter(),
    )?;

    info!(dir = %dir.display(), "csv tables written");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn csv_escaping() {
        assert_eq!(escape_csv(&SqlValue::Null), "");
        assert_eq!(
            escape_csv(&SqlValue::Text("a,b".to_string())),
            "\"a,b\""
        );
        assert_eq!(
            escape_csv(&SqlValue::Text("say \"hi\"".to_string())),
            "\"say \"\"hi\"\"\""
        );
    }
}
