//! Structured error types for the cleaning pipeline.
//!
//! Every failure aborts the run and reaches the caller unchanged. There is
//! no partial-success mode: either every discovered file is cleaned and
//! merged, or the run returns one of these.

use super::schema::SchemaError;
use crate::config::ConfigError;
use polars::prelude::PolarsError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("no CSV files found in {}", dir.display())]
    NotFound { dir: PathBuf },

    #[error("malformed date in '{symbol}' at row {row}: {value:?}")]
    MalformedDate {
        symbol: String,
        row: usize,
        value: String,
    },

    #[error("'{symbol}' has no '{column}' column")]
    MissingDateColumn { symbol: String, column: String },

    #[error("'{symbol}': more than one column normalizes to '{column}'")]
    DuplicateColumn { symbol: String, column: String },

    #[error("'{symbol}': price column '{column}' is not numeric ({dtype})")]
    NonNumericPriceColumn {
        symbol: String,
        column: String,
        dtype: String,
    },

    #[error("nothing to consolidate: no cleaned record sets")]
    EmptyInput,

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("parquet I/O error on {}: {source}", path.display())]
    Parquet {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("artifact schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("frame operation failed: {0}")]
    Frame(#[from] PolarsError),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DataError::Io {
            path: path.into(),
            source,
        }
    }

    /// Symbol of the file that caused the failure, when the error is file-scoped.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            DataError::MalformedDate { symbol, .. }
            | DataError::MissingDateColumn { symbol, .. }
            | DataError::DuplicateColumn { symbol, .. }
            | DataError::NonNumericPriceColumn { symbol, .. } => Some(symbol),
            _ => None,
        }
    }
}
