//! Ingestion, normalization, consolidation and persistence of price CSVs.

pub mod canonicalize;
pub mod error;
pub mod ingest;
pub mod merge;
pub mod outlier;
pub mod persist;
pub mod schema;

pub use canonicalize::{normalize, CleanRecordSet, CleanStats};
pub use error::DataError;
pub use ingest::{discover, DataIngestor, RawRecordSet};
pub use merge::{consolidate, ConsolidatedTable};
pub use outlier::{IqrBounds, IqrFilter};
pub use persist::{persist, read_consolidated, read_meta, OutputMeta, PersistOptions};
pub use schema::{CleanSchema, SchemaError};
