//! Input discovery and CSV parsing.
//!
//! Discovery is non-recursive: only regular files directly inside the input
//! directory whose extension is `csv` (any ASCII case) are considered. Files
//! are returned sorted by name so the merge order is the same on every
//! platform.

use super::error::DataError;
use crate::config::CleanConfig;
use polars::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One parsed input file, before any cleaning.
#[derive(Debug, Clone)]
pub struct RawRecordSet {
    /// Source identifier: the file name with its extension stripped.
    pub symbol: String,
    pub path: PathBuf,
    pub frame: DataFrame,
}

impl RawRecordSet {
    pub fn row_count(&self) -> usize {
        self.frame.height()
    }
}

/// List the `.csv` files directly inside `dir`, sorted by file name.
///
/// Fails with [`DataError::NotFound`] when the directory does not exist or
/// holds no matching file.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(DataError::NotFound {
                dir: dir.to_path_buf(),
            })
        }
        Err(e) => return Err(DataError::io(dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| DataError::io(dir, e))?.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(DataError::NotFound {
            dir: dir.to_path_buf(),
        });
    }

    files.sort();
    Ok(files)
}

/// Source identifier for an input file.
pub fn symbol_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// CSV reader for raw price files.
#[derive(Debug, Clone)]
pub struct DataIngestor {
    infer_schema_rows: usize,
}

impl DataIngestor {
    pub fn new(infer_schema_rows: usize) -> Self {
        Self { infer_schema_rows }
    }

    pub fn from_config(config: &CleanConfig) -> Self {
        Self::new(config.infer_schema_rows)
    }

    /// Parse one CSV file. The first row is the header; empty cells are null.
    pub fn read_csv(&self, path: &Path) -> Result<RawRecordSet, DataError> {
        let file = fs::File::open(path).map_err(|e| DataError::io(path, e))?;
        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_rows))
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|source| DataError::Csv {
                path: path.to_path_buf(),
                source,
            })?;

        let symbol = symbol_for(path);
        debug!(
            symbol = %symbol,
            rows = frame.height(),
            columns = frame.width(),
            "parsed CSV"
        );

        Ok(RawRecordSet {
            symbol,
            path: path.to_path_buf(),
            frame,
        })
    }

    /// Discover every CSV in `dir` and parse each one, in discovery order.
    ///
    /// The empty-input check happens before any file is opened.
    pub fn discover(&self, dir: &Path) -> Result<Vec<RawRecordSet>, DataError> {
        let files = list_csv_files(dir)?;
        info!(dir = %dir.display(), files = files.len(), "discovered CSV files");
        files.iter().map(|path| self.read_csv(path)).collect()
    }
}

impl Default for DataIngestor {
    fn default() -> Self {
        Self::from_config(&CleanConfig::default())
    }
}

/// Discover and parse every CSV in `dir` using `config`'s reader settings.
pub fn discover(dir: &Path, config: &CleanConfig) -> Result<Vec<RawRecordSet>, DataError> {
    DataIngestor::from_config(config).discover(dir)
}
