//! StockPrep Core: cleaning and consolidation of per-symbol daily price CSVs.
//!
//! A directory of `SYMBOL.csv` files goes in; one Parquet table comes out:
//! - Discovery and CSV ingestion with type inference
//! - Column-name normalization and date parsing
//! - Forward fill, then IQR outlier rejection on the price columns
//! - Symbol tagging and row-wise consolidation
//! - Atomic Parquet persistence with an optional metadata sidecar
//! - Moving averages and per-symbol summaries over the result

pub mod analytics;
pub mod config;
pub mod data;
pub mod pipeline;

pub use config::{CleanConfig, Compression, ConfigError};
pub use data::{ConsolidatedTable, DataError};
pub use pipeline::{clean_data, clean_dir};
