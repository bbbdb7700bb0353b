//! Checkpoints.
//!
//! A checkpoint materializes the current lazy plan and re-wraps the result
//! as lazy. The optimizer's plan grows super-linearly with each join; without
//! these resets the planner thrashes on the later self-join stages. Do not
//! remove them: their placement is load-bearing (one before the multi-row
//! joins, one after, one before the relationship self-joins, one after).
//!
//! Checkpoints are also the fast-fail point for schema drift: a column whose
//! collected dtype no longer coerces to the canonical dtype aborts the run.

use mtgdb_common::{MtgdbError, Result};
use polars::prelude::*;
use tracing::{debug, info};

/// Canonical dtypes validated at each boundary. Only columns present in the
/// frame are checked; lookup-joined columns appear as the stages add them.
fn canonical_dtype(column: &str) -> Option<DataType> {
    match column {
        "id" | "name" | "setCode" | "number" | "layout" | "uuid" | "side" | "faceName"
        | "language" | "manaCost" | "text" | "rarity" | "artist" | "borderColor"
        | "frameVersion" | "type" | "power" | "toughness" | "loyalty" | "watermark" => {
            Some(DataType::String)
        }
        "manaValue" | "faceManaValue" | "convertedManaCost" | "edhrecSaltiness" => {
            Some(DataType::Float64)
        }
        "edhrecRank" => Some(DataType::Int64),
        "colors" | "colorIdentity" | "finishes" | "types" | "supertypes" | "subtypes"
        | "keywords" | "printings" | "availability" | "boosterTypes" | "promoTypes" => {
            Some(DataType::List(Box::new(DataType::String)))
        }
        _ => None,
    }
}

/// Materialize, validate, and re-laze.
pub fn checkpoint(stage: &str, lf: LazyFrame) -> Result<DataFrame> {
    debug!(stage, "collecting checkpoint");
    let df = lf.collect()?;
    validate_schema(stage, &df)?;
    info!(stage, rows = df.height(), "checkpoint materialized");
    Ok(df)
}

/// Validate a frame that is already materialized (stage groups that operate
/// row-wise still pass through the same schema gate).
pub fn validate_schema(stage: &str, df: &DataFrame) -> Result<()> {
    for column in df.get_column_names() {
        let Some(expected) = canonical_dtype(column.as_str()) else {
            continue;
        };
        let actual = df
            .column(column.as_str())
            .map_err(MtgdbError::from)?
            .dtype()
            .clone();
        if actual == DataType::Null {
            // An all-null column carries no type information yet.
            continue;
        }
        if actual != expected {
            return Err(MtgdbError::schema_mismatch(
                stage,
                column.to_string(),
                format!("{expected:?}"),
                format!("{actual:?}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn passes_canonical_frame() {
        let df = df!(
            "name" => ["Lightning Bolt"],
            "manaValue" => [1.0f64],
        )
        .unwrap();
        assert!(validate_schema("test", &df).is_ok());
    }

    #[test]
    fn rejects_coercion_failure() {
        // manaValue arriving as a string is exactly the upstream drift the
        // checkpoint exists to catch.
        let df = df!(
            "name" => ["Lightning Bolt"],
            "manaValue" => ["1"],
        )
        .unwrap();
        let err = validate_schema("test", &df).unwrap_err();
        assert!(matches!(err, MtgdbError::SchemaMismatch { .. }));
    }

    #[test]
    fn ignores_unknown_columns() {
        let df = df!("_internal" => [1i32]).unwrap();
        assert!(validate_schema("test", &df).is_ok());
    }

    #[test]
    fn checkpoint_relazes() {
        let df = df!("name" => ["x"]).unwrap();
        let out = checkpoint("test", df.lazy()).unwrap();
        assert_eq!(out.height(), 1);
    }
}
