//! Error types for the tnseq-qc library.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum QcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Malformed control reference {path:?} at line {line}: {reason}")]
    MalformedReference {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Missing column '{column}' in {table}")]
    MissingColumn { column: String, table: String },

    #[error("Invalid count value '{value}' in {path:?} at row {row}")]
    InvalidCount {
        value: String,
        path: PathBuf,
        row: usize,
    },

    #[error("Ambiguous counts for barcode '{barcode}' in sample '{sample_id}': {counts:?}")]
    PivotCollision {
        barcode: String,
        sample_id: String,
        counts: Vec<u64>,
    },

    #[error("Empty selection: {0}")]
    EmptySelection(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid sample role pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QcError {
    /// Attach a file path to an I/O error.
    pub fn read(path: &Path, source: std::io::Error) -> Self {
        QcError::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Attach a file path to a CSV error.
    pub fn parse(path: &Path, source: csv::Error) -> Self {
        QcError::Parse {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Shorthand for a [`QcError::MissingColumn`].
    pub fn missing_column(column: &str, table: impl Into<String>) -> Self {
        QcError::MissingColumn {
            column: column.to_string(),
            table: table.into(),
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, QcError>;
