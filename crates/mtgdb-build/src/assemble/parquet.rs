//! Columnar output.
//!
//! Two modes: nested mirrors the partition schema (one file for cards, one
//! for tokens, struct columns intact); normalized emits one flat file per
//! logical table built from the same flattening as the SQL writers.

use mtgdb_common::{MtgdbError, Result};
use polars::prelude::*;
use std::path::Path;
use tracing::info;

use super::flat::{self, SqlValue};
use super::Assembler;

fn write_parquet_file(path: &Path, mut df: DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("parquet.tmp");
    let file = std::fs::File::create(&tmp)?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .finish(&mut df)
        .map_err(MtgdbError::from)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Nested mode: concatenate the per-set partitions into one file each for
/// cards and tokens, preserving nested columns.
pub fn write_nested(assembler: &Assembler<'_>, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for (root, file) in [
        (assembler.config.cards_partition_root(), "cards.parquet"),
        (assembler.config.tokens_partition_root(), "tokens.parquet"),
    ] {
        let pattern = root.join("setCode=*").join("*.parquet");
        let Ok(lf) = LazyFrame::scan_parquet(pattern, ScanArgsParquet::default()) else {
            continue;
        };
        let df = lf.collect()?;
        if df.height() == 0 {
            continue;
        }
        write_parquet_file(&dir.join(file), df)?;
    }
    info!(dir = %dir.display(), "nested parquet written");
    Ok(())
}

fn to_string_column(name: &str, rows: &[Vec<SqlValue>], idx: usize) -> Column {
    let values: Vec<Option<String>> = rows
        .iter()
        .map(|row| match &row[idx] {
            SqlValue::Null => None,
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Real(f) => Some(f.to_string()),
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        })
        .collect();
    Series::new(name.into(), values).into_column()
}

fn table_frame(columns: &[String], rows: &[Vec<SqlValue>]) -> Result<DataFrame> {
    let series: Vec<Column> = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| to_string_column(name, rows, idx))
        .collect();
    DataFrame::new(series).map_err(MtgdbError::from)
}

/// Normalized mode: one flat file per logical table.
pub fn write_normalized(assembler: &Assembler<'_>, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let card_header: Vec<String> = flat::card_columns().into_iter().map(|(n, _)| n).collect();
    let mut card_rows = Vec::new();
    let mut token_rows = Vec::new();
    let mut foreign_rows = Vec::new();
    let mut ruling_rows = Vec::new();

    for code in assembler.set_codes()? {
        let set = assembler.set_object(&code)?;
        for card in &set.cards {
            card_rows.push(flat::card_values(card));
            foreign_rows.extend(flat::foreign_data_rows(card));
            ruling_rows.extend(flat::ruling_rows(card));
        }
        for token in &set.tokens {
            token_rows.push(flat::card_values(token));
        }
    }

    if !card_rows.is_empty() {
        write_parquet_file(&dir.join("cards.parquet"), table_frame(&card_header, &card_rows)?)?;
    }
    if !token_rows.is_empty() {
        write_parquet_file(
            &dir.join("tokens.parquet"),
            table_frame(&card_header, &token_rows)?,
        )?;
    }
    if !foreign_rows.is_empty() {
        let header: Vec<String> = flat::foreign_data_columns()
            .iter()
            .map(|s| s.to_string())
            .collect();
        write_parquet_file(
            &dir.join("cardForeignData.parquet"),
            table_frame(&header, &foreign_rows)?,
        )?;
    }
    if !ruling_rows.is_empty() {
        let header: Vec<String> = flat::ruling_columns().iter().map(|s| s.to_string()).collect();
        write_parquet_file(
            &dir.join("cardRulings.parquet"),
            table_frame(&header, &ruling_rows)?,
        )?;
    }

    info!(dir = %dir.display(), "normalized parquet written");
    Ok(())
}
