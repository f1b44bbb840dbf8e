//! Cleaning configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.
//! Process-wide state is confined to this struct: the pipeline reads nothing
//! from the environment.

use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Parquet compression codec for the consolidated artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Uncompressed,
    Snappy,
    #[default]
    Zstd,
    Lz4,
}

impl Compression {
    pub fn to_parquet(self) -> ParquetCompression {
        match self {
            Compression::Uncompressed => ParquetCompression::Uncompressed,
            Compression::Snappy => ParquetCompression::Snappy,
            Compression::Zstd => ParquetCompression::Zstd(None),
            Compression::Lz4 => ParquetCompression::Lz4Raw,
        }
    }
}

/// Configuration for one cleaning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanConfig {
    /// Name of the calendar-date column in the raw files (matched after name
    /// normalization, so `Date` and `date` are the same column).
    pub date_column: String,

    /// Columns subject to IQR outlier rejection, intersected with the
    /// columns actually present in each file.
    pub price_columns: Vec<String>,

    /// Quantile used as Q1.
    pub lower_quantile: f64,

    /// Quantile used as Q3.
    pub upper_quantile: f64,

    /// Multiplier `k` in `[Q1 - k*IQR, Q3 + k*IQR]`.
    pub iqr_multiplier: f64,

    /// Number of rows the CSV reader scans to infer column types.
    pub infer_schema_rows: usize,

    /// Normalize files on the rayon pool instead of sequentially.
    pub parallel: bool,

    pub compression: Compression,

    /// Write a `{stem}.meta.json` sidecar next to the Parquet file.
    pub write_metadata: bool,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            date_column: "date".into(),
            price_columns: vec![
                "open".into(),
                "high".into(),
                "low".into(),
                "close".into(),
            ],
            lower_quantile: 0.25,
            upper_quantile: 0.75,
            iqr_multiplier: 1.5,
            infer_schema_rows: 1000,
            parallel: false,
            compression: Compression::default(),
            write_metadata: true,
        }
    }
}

impl CleanConfig {
    /// Load a config from a TOML file and validate it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string and validate it.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.date_column.trim().is_empty() {
            return Err(ConfigError::Invalid("date_column must not be empty".into()));
        }
        for (name, q) in [
            ("lower_quantile", self.lower_quantile),
            ("upper_quantile", self.upper_quantile),
        ] {
            if !(0.0..=1.0).contains(&q) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {q}"
                )));
            }
        }
        if self.lower_quantile > self.upper_quantile {
            return Err(ConfigError::Invalid(format!(
                "lower_quantile ({}) exceeds upper_quantile ({})",
                self.lower_quantile, self.upper_quantile
            )));
        }
        if !self.iqr_multiplier.is_finite() || self.iqr_multiplier < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "iqr_multiplier must be a non-negative number, got {}",
                self.iqr_multiplier
            )));
        }
        if self.infer_schema_rows == 0 {
            return Err(ConfigError::Invalid(
                "infer_schema_rows must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
