//! Public entry points: directory of CSVs in, consolidated table out.
//!
//! discover → normalize each file → consolidate in discovery order →
//! persist. Normalization of one file never looks at another, so with
//! `parallel` set the files are cleaned on the rayon pool; results are still
//! merged in discovery order and the first failure aborts the run.

use crate::config::CleanConfig;
use crate::data::canonicalize::{normalize, CleanRecordSet};
use crate::data::error::DataError;
use crate::data::ingest::{DataIngestor, RawRecordSet};
use crate::data::merge::{consolidate, ConsolidatedTable};
use crate::data::persist::{persist, PersistOptions};
use rayon::prelude::*;
use std::path::Path;
use tracing::info;

fn normalize_all(
    raw: Vec<RawRecordSet>,
    config: &CleanConfig,
) -> Result<Vec<CleanRecordSet>, DataError> {
    if config.parallel {
        raw.into_par_iter()
            .map(|set| normalize(set, config))
            .collect()
    } else {
        raw.into_iter().map(|set| normalize(set, config)).collect()
    }
}

/// Clean every CSV in `input_dir` and return the consolidated table without
/// writing anything. The config is validated before any file is read.
pub fn clean_dir(input_dir: &Path, config: &CleanConfig) -> Result<ConsolidatedTable, DataError> {
    config.validate()?;
    let raw = DataIngestor::from_config(config).discover(input_dir)?;
    let rows_in: usize = raw.iter().map(RawRecordSet::row_count).sum();

    let cleaned = normalize_all(raw, config)?;
    let table = consolidate(cleaned)?;

    info!(
        rows_in,
        rows_out = table.height(),
        symbols = table.symbols().len(),
        "cleaned input directory"
    );
    Ok(table)
}

/// Clean every CSV in `input_dir`, persist the result to `output_path` as
/// Parquet, and return the in-memory table.
///
/// Nothing is written when discovery or normalization fails.
pub fn clean_data(
    input_dir: &Path,
    output_path: &Path,
    config: &CleanConfig,
) -> Result<ConsolidatedTable, DataError> {
    let table = clean_dir(input_dir, config)?;
    persist(&table, output_path, &PersistOptions::from(config))?;
    Ok(table)
}
