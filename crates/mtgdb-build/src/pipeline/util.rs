//! Column access and construction helpers for materialized stages.
//!
//! Stages that run between checkpoints operate on collected frames; these
//! helpers keep the row-wise code free of repeated downcasting.

use mtgdb_common::{MtgdbError, Result};
use polars::prelude::*;

pub fn str_col(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let s = df.column(name)?;
    let ca = s.str()?;
    Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Like [`str_col`] but tolerates a missing column, yielding all-null.
pub fn str_col_opt(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    match df.column(name) {
        Ok(s) => s
            .str()
            .map(|ca| ca.into_iter().map(|v| v.map(str::to_string)).collect())
            .unwrap_or_else(|_| vec![None; df.height()]),
        Err(_) => vec![None; df.height()],
    }
}

pub fn bool_col(df: &DataFrame, name: &str) -> Vec<Option<bool>> {
    match df.column(name) {
        Ok(s) => s
            .bool()
            .map(|ca| ca.into_iter().collect())
            .unwrap_or_else(|_| vec![None; df.height()]),
        Err(_) => vec![None; df.height()],
    }
}

pub fn f64_col(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    match df.column(name) {
        Ok(s) => s
            .cast(&DataType::Float64)
            .ok()
            .and_then(|c| c.f64().map(|ca| ca.into_iter().collect()).ok())
            .unwrap_or_else(|| vec![None; df.height()]),
        Err(_) => vec![None; df.height()],
    }
}

pub fn i64_col(df: &DataFrame, name: &str) -> Vec<Option<i64>> {
    match df.column(name) {
        Ok(s) => s
            .cast(&DataType::Int64)
            .ok()
            .and_then(|c| c.i64().map(|ca| ca.into_iter().collect()).ok())
            .unwrap_or_else(|| vec![None; df.height()]),
        Err(_) => vec![None; df.height()],
    }
}

/// A list-of-strings column as owned rows. Missing column or null rows
/// become empty vectors (the declared default for list fields).
pub fn list_str_col(df: &DataFrame, name: &str) -> Vec<Vec<String>> {
    let Ok(s) = df.column(name) else {
        return vec![Vec::new(); df.height()];
    };
    let Ok(ca) = s.list() else {
        return vec![Vec::new(); df.height()];
    };
    (0..df.height())
        .map(|i| {
            ca.get_as_series(i)
                .and_then(|inner| {
                    inner.str().ok().map(|sc| {
                        sc.into_iter()
                            .flatten()
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                })
                .unwrap_or_default()
        })
        .collect()
}

/// Build a `List[String]` column from owned rows.
pub fn list_str_series(name: &str, rows: Vec<Vec<String>>) -> Series {
    let inner: Vec<Series> = rows
        .into_iter()
        .map(|row| Series::new("".into(), row))
        .collect();
    Series::new(name.into(), inner)
}

/// Build a nullable `List[String]` column; `None` rows stay null so the
/// field serializes as absent rather than `[]`.
pub fn opt_list_str_series(name: &str, rows: Vec<Option<Vec<String>>>) -> Series {
    let inner: Vec<Option<Series>> = rows
        .into_iter()
        .map(|row| row.map(|r| Series::new("".into(), r)))
        .collect();
    Series::new(name.into(), inner)
}

/// Replace (or add) a column on a materialized frame.
pub fn set_column(df: &mut DataFrame, series: Series) -> Result<()> {
    df.with_column(series).map_err(MtgdbError::from)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn list_round_trip() {
        let rows = vec![vec!["a".to_string(), "b".to_string()], vec![]];
        let s = list_str_series("x", rows.clone());
        let mut df = df!("k" => ["1", "2"]).unwrap();
        df.with_column(s).unwrap();
        assert_eq!(list_str_col(&df, "x"), rows);
    }

    #[test]
    fn missing_columns_default() {
        let df = df!("k" => ["1"]).unwrap();
        assert_eq!(list_str_col(&df, "absent"), vec![Vec::<String>::new()]);
        assert_eq!(str_col_opt(&df, "absent"), vec![None]);
    }
}
