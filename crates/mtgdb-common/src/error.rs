//! Error types for mtgdb
//!
//! Fatal errors unwind to the top-level dispatcher, which removes partial
//! outputs and exits non-zero. Non-fatal conditions (missed lookups, partial
//! meld triplets, provider outages) are not errors at all; they are tallied
//! in the build report and logged as warnings.

use thiserror::Error;

/// Result type alias for mtgdb operations
pub type Result<T> = std::result::Result<T, MtgdbError>;

/// Main error type for mtgdb
#[derive(Error, Debug)]
pub enum MtgdbError {
    /// File system operations failed (read, write, create directory, etc.)
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("Failed to process JSON data: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A source download failed after exhausting retries
    #[error("Fetch of source '{source_name}' from '{url}' failed: {reason}")]
    SourceFetch {
        source_name: String,
        url: String,
        reason: String,
    },

    /// Upstream data no longer matches the canonical schema. Fatal at the
    /// next checkpoint boundary.
    #[error("Schema mismatch in '{frame}': column '{column}' expected {expected}, got {actual}")]
    SchemaMismatch {
        frame: String,
        column: String,
        expected: String,
        actual: String,
    },

    /// Output file already exists and the run is not in resume mode
    #[error("Output '{path}' already exists; re-run with --resume-build to skip emitted files")]
    WriteConflict { path: String },

    /// Partition upload failed after all retries. Non-fatal for the build;
    /// the next run re-uploads.
    #[error("Object-store upload of '{key}' failed after {attempts} attempts: {reason}")]
    ObjectStoreUpload {
        key: String,
        attempts: u32,
        reason: String,
    },

    /// Configuration is missing or invalid
    #[error("Configuration error: {message}. {suggestion}")]
    Config { message: String, suggestion: String },

    /// Failed to parse input data
    #[error("Failed to parse {data_type}: {reason}")]
    Parse { data_type: String, reason: String },

    /// Columnar engine failure
    #[error("Frame operation failed: {0}")]
    Frame(String),
}

impl MtgdbError {
    /// Create a source fetch error
    pub fn source_fetch(
        source: impl Into<String>,
        url: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SourceFetch {
            source_name: source.into(),
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a schema mismatch error
    pub fn schema_mismatch(
        frame: impl Into<String>,
        column: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::SchemaMismatch {
            frame: frame.into(),
            column: column.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a write conflict error
    pub fn write_conflict(path: impl Into<String>) -> Self {
        Self::WriteConflict { path: path.into() }
    }

    /// Create an object-store upload error
    pub fn object_store_upload(
        key: impl Into<String>,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::ObjectStoreUpload {
            key: key.into(),
            attempts,
            reason: reason.into(),
        }
    }

    /// Create a configuration error with suggestion
    pub fn config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a parse error
    pub fn parse(data_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            data_type: data_type.into(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for MtgdbError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::Frame(err.to_string())
    }
}
