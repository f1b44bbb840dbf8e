//! Durable Parquet output for the consolidated table.
//!
//! Writes are atomic: the artifact is written to a temporary sibling
//! (`{name}.tmp`), synced, then renamed over the target. A failed write
//! removes the temporary file and leaves whatever was at the target before.
//! An optional JSON sidecar (`{stem}.meta.json`) records provenance and a
//! BLAKE3 hash of the Parquet bytes.

use super::error::DataError;
use super::merge::ConsolidatedTable;
use super::schema::DATE_COLUMN;
use crate::config::{CleanConfig, Compression};
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersistOptions {
    pub compression: Compression,
    pub write_metadata: bool,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self::from(&CleanConfig::default())
    }
}

impl From<&CleanConfig> for PersistOptions {
    fn from(config: &CleanConfig) -> Self {
        Self {
            compression: config.compression,
            write_metadata: config.write_metadata,
        }
    }
}

/// Metadata sidecar for a persisted table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMeta {
    pub symbols: Vec<String>,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub data_hash: String,
    pub tool_version: String,
    pub written_at: NaiveDateTime,
}

/// Path of the metadata sidecar for `output`.
pub fn meta_path(output: &Path) -> PathBuf {
    output.with_extension("meta.json")
}

fn temp_path(path: &Path) -> Result<PathBuf, DataError> {
    let mut name = path
        .file_name()
        .ok_or_else(|| {
            DataError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "output path has no file name"),
            )
        })?
        .to_os_string();
    name.push(".tmp");
    Ok(path.with_file_name(name))
}

/// Rename `tmp` over `path`, removing `tmp` if the rename fails.
fn publish(tmp: &Path, path: &Path) -> Result<(), DataError> {
    fs::rename(tmp, path).map_err(|e| {
        let _ = fs::remove_file(tmp);
        DataError::io(path, e)
    })
}

fn write_parquet(df: &DataFrame, path: &Path, compression: Compression) -> Result<(), DataError> {
    let parquet_err = |source| DataError::Parquet {
        path: path.to_path_buf(),
        source,
    };

    let mut file = fs::File::create(path).map_err(|e| DataError::io(path, e))?;
    ParquetWriter::new(&mut file)
        .with_compression(compression.to_parquet())
        .finish(&mut df.clone())
        .map_err(parquet_err)?;
    file.sync_all().map_err(|e| DataError::io(path, e))?;
    Ok(())
}

fn date_range(df: &DataFrame) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>), DataError> {
    let Ok(dates) = df.column(DATE_COLUMN) else {
        return Ok((None, None));
    };
    let millis = dates.cast(&DataType::Int64)?;
    let values = millis.i64()?;
    let to_naive = |ms: i64| DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc());

    let start = values.into_iter().flatten().min().and_then(to_naive);
    let end = values.into_iter().flatten().max().and_then(to_naive);
    Ok((start, end))
}

fn build_meta(table: &ConsolidatedTable, parquet_bytes: &[u8]) -> Result<OutputMeta, DataError> {
    let (start, end) = date_range(table.frame())?;
    Ok(OutputMeta {
        symbols: table.symbols().to_vec(),
        row_count: table.height(),
        columns: table
            .frame()
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect(),
        start,
        end,
        data_hash: blake3::hash(parquet_bytes).to_hex().to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        written_at: chrono::Utc::now().naive_utc(),
    })
}

/// Hash the Parquet bytes at `tmp` and write the sidecar to its own
/// temporary file. Returns the metadata and that file's path.
fn stage_meta(
    table: &ConsolidatedTable,
    tmp: &Path,
    sidecar: &Path,
) -> Result<(OutputMeta, PathBuf), DataError> {
    let bytes = fs::read(tmp).map_err(|e| DataError::io(tmp, e))?;
    let meta = build_meta(table, &bytes)?;
    let json = serde_json::to_string_pretty(&meta)
        .map_err(|e| DataError::Metadata(format!("serialize sidecar: {e}")))?;

    let sidecar_tmp = temp_path(sidecar)?;
    if let Err(e) = fs::write(&sidecar_tmp, json) {
        let _ = fs::remove_file(&sidecar_tmp);
        return Err(DataError::io(&sidecar_tmp, e));
    }
    Ok((meta, sidecar_tmp))
}

fn remove_sidecar(sidecar: &Path) -> Result<(), DataError> {
    match fs::remove_file(sidecar) {
        Ok(()) => {
            debug!(path = %sidecar.display(), "removed previous metadata sidecar");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DataError::io(sidecar, e)),
    }
}

/// Write `table` to `output` as Parquet, creating parent directories first.
///
/// Returns the sidecar metadata when `options.write_metadata` is set. Any
/// previous sidecar is removed before the new artifact is published, so a
/// sidecar never describes a different file.
pub fn persist(
    table: &ConsolidatedTable,
    output: &Path,
    options: &PersistOptions,
) -> Result<Option<OutputMeta>, DataError> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
    }

    let tmp = temp_path(output)?;
    let sidecar = meta_path(output);

    let staged = write_parquet(table.frame(), &tmp, options.compression).and_then(|()| {
        options
            .write_metadata
            .then(|| stage_meta(table, &tmp, &sidecar))
            .transpose()
    });
    let staged = match staged {
        Ok(staged) => staged,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
    };
    debug!(path = %tmp.display(), "wrote temporary parquet");

    if let Err(e) = remove_sidecar(&sidecar).and_then(|()| publish(&tmp, output)) {
        let _ = fs::remove_file(&tmp);
        if let Some((_, sidecar_tmp)) = &staged {
            let _ = fs::remove_file(sidecar_tmp);
        }
        return Err(e);
    }

    let meta = match staged {
        Some((meta, sidecar_tmp)) => {
            publish(&sidecar_tmp, &sidecar)?;
            Some(meta)
        }
        None => None,
    };

    info!(
        path = %output.display(),
        rows = table.height(),
        "persisted consolidated table"
    );
    Ok(meta)
}

/// Read a persisted artifact back into a consolidated table.
pub fn read_consolidated(path: &Path) -> Result<ConsolidatedTable, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::io(path, e))?;
    let frame = ParquetReader::new(file)
        .finish()
        .map_err(|source| DataError::Parquet {
            path: path.to_path_buf(),
            source,
        })?;
    ConsolidatedTable::from_frame(frame)
}

/// Read the metadata sidecar written next to `output`.
pub fn read_meta(output: &Path) -> Result<OutputMeta, DataError> {
    let path = meta_path(output);
    let content = fs::read_to_string(&path).map_err(|e| DataError::io(&path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| DataError::Metadata(format!("parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::canonicalize::{CleanRecordSet, CleanStats};
    use crate::data::merge::consolidate;
    use crate::data::schema::date_dtype;

    fn sample_table() -> ConsolidatedTable {
        let date = Column::new(DATE_COLUMN.into(), &[1_704_153_600_000i64, 1_704_240_000_000])
            .cast(&date_dtype())
            .unwrap();
        let close = Column::new("close".into(), &[101.0, 102.0]);
        let volume = Column::new("volume".into(), &[Some(1000i64), None]);
        let symbol = Column::new("symbol".into(), &["SPY", "SPY"]);
        let frame = DataFrame::new(vec![date, close, volume, symbol]).unwrap();

        consolidate(vec![CleanRecordSet {
            symbol: "SPY".into(),
            frame,
            stats: CleanStats {
                rows_in: 2,
                rows_out: 2,
                filled_cells: 0,
                bounds: Vec::new(),
            },
        }])
        .unwrap()
    }

    #[test]
    fn write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clean.parquet");
        let table = sample_table();

        persist(&table, &output, &PersistOptions::default()).unwrap();
        let loaded = read_consolidated(&output).unwrap();

        assert!(loaded.frame().equals_missing(table.frame()));
        assert_eq!(loaded.symbols(), ["SPY"]);
        assert!(!temp_path(&output).unwrap().exists());
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a/b/c/clean.parquet");

        persist(&sample_table(), &output, &PersistOptions::default()).unwrap();
        assert!(output.exists());
    }

    #[test]
    fn sidecar_records_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clean.parquet");

        let written = persist(&sample_table(), &output, &PersistOptions::default())
            .unwrap()
            .unwrap();
        let meta = read_meta(&output).unwrap();

        assert_eq!(meta, written);
        assert_eq!(meta.symbols, ["SPY"]);
        assert_eq!(meta.row_count, 2);
        assert_eq!(meta.columns, ["date", "close", "volume", "symbol"]);
        assert_eq!(
            meta.start.unwrap().date(),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert_eq!(
            meta.data_hash,
            blake3::hash(&fs::read(&output).unwrap()).to_hex().to_string()
        );
    }

    #[test]
    fn disabling_metadata_removes_stale_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clean.parquet");
        persist(&sample_table(), &output, &PersistOptions::default()).unwrap();
        assert!(meta_path(&output).exists());

        let options = PersistOptions {
            write_metadata: false,
            ..PersistOptions::default()
        };
        assert!(persist(&sample_table(), &output, &options).unwrap().is_none());
        assert!(!meta_path(&output).exists());
    }

    #[test]
    fn failed_publish_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the target path makes the final rename fail.
        let output = dir.path().join("clean.parquet");
        fs::create_dir(&output).unwrap();
        fs::write(output.join("keep"), "x").unwrap();

        let options = PersistOptions {
            write_metadata: false,
            ..PersistOptions::default()
        };
        let err = persist(&sample_table(), &output, &options).unwrap_err();

        assert!(matches!(err, DataError::Io { .. }));
        assert!(output.is_dir());
        assert!(!temp_path(&output).unwrap().exists());
    }

    #[test]
    fn failed_sidecar_write_removes_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clean.parquet");
        // A directory where the sidecar's temporary file goes makes the write fail.
        let sidecar_tmp = temp_path(&meta_path(&output)).unwrap();
        fs::create_dir(&sidecar_tmp).unwrap();

        let err = persist(&sample_table(), &output, &PersistOptions::default()).unwrap_err();

        assert!(matches!(err, DataError::Io { .. }));
        assert!(!output.exists());
        assert!(!temp_path(&output).unwrap().exists());
    }

    #[test]
    fn unreplaceable_sidecar_keeps_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clean.parquet");
        persist(&sample_table(), &output, &PersistOptions::default()).unwrap();
        let before = fs::read(&output).unwrap();

        let sidecar = meta_path(&output);
        fs::remove_file(&sidecar).unwrap();
        fs::create_dir(&sidecar).unwrap();
        fs::write(sidecar.join("keep"), "x").unwrap();

        let options = PersistOptions {
            compression: Compression::Uncompressed,
            write_metadata: true,
        };
        let err = persist(&sample_table(), &output, &options).unwrap_err();

        assert!(matches!(err, DataError::Io { .. }));
        assert_eq!(fs::read(&output).unwrap(), before);
        assert!(!temp_path(&output).unwrap().exists());
        assert!(!temp_path(&sidecar).unwrap().exists());
    }

    #[test]
    fn parent_that_is_a_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let err = persist(
            &sample_table(),
            &blocker.join("clean.parquet"),
            &PersistOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
    }

    #[test]
    fn every_codec_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        for compression in [
            Compression::Uncompressed,
            Compression::Snappy,
            Compression::Zstd,
            Compression::Lz4,
        ] {
            let output = dir.path().join(format!("{compression:?}.parquet"));
            let options = PersistOptions {
                compression,
                write_metadata: false,
            };
            persist(&sample_table(), &output, &options).unwrap();
            assert_eq!(read_consolidated(&output).unwrap().height(), 2);
        }
    }
}
