//! Per-file normalization: raw CSV frame in, clean frame out.
//!
//! Steps run in a fixed order:
//! 1. column names lowercased, spaces to underscores
//! 2. date column parsed to a timestamp
//! 3. forward fill of nulls (no backward fill)
//! 4. IQR outlier rejection across the price columns
//! 5. `symbol` column set to the file's source identifier

use super::error::DataError;
use super::ingest::RawRecordSet;
use super::outlier::{IqrBounds, IqrFilter};
use super::schema::{normalize_column_names, parse_date_column, SYMBOL_COLUMN};
use crate::config::CleanConfig;
use polars::prelude::*;
use tracing::{info, warn};

/// What normalization did to one file.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanStats {
    pub rows_in: usize,
    pub rows_out: usize,
    /// Null cells replaced by forward fill.
    pub filled_cells: usize,
    pub bounds: Vec<IqrBounds>,
}

impl CleanStats {
    pub fn rows_rejected(&self) -> usize {
        self.rows_in - self.rows_out
    }
}

/// The normalized form of one input file.
#[derive(Debug, Clone)]
pub struct CleanRecordSet {
    pub symbol: String,
    pub frame: DataFrame,
    pub stats: CleanStats,
}

impl CleanRecordSet {
    pub fn row_count(&self) -> usize {
        self.frame.height()
    }
}

fn null_cells(df: &DataFrame) -> usize {
    df.get_columns().iter().map(|c| c.null_count()).sum()
}

/// Replace every null with the nearest preceding non-null value in its column.
///
/// Leading nulls have no predecessor and stay null.
pub fn forward_fill(df: &DataFrame) -> Result<DataFrame, DataError> {
    Ok(df.fill_null(FillNullStrategy::Forward(None))?)
}

/// Set (or overwrite) the `symbol` column to `symbol` on every row.
pub fn tag_symbol(mut df: DataFrame, symbol: &str) -> Result<DataFrame, DataError> {
    let tag = Column::new(SYMBOL_COLUMN.into(), vec![symbol; df.height()]);
    df.with_column(tag)?;
    Ok(df)
}

/// Run the full normalization sequence on one raw file.
#[tracing::instrument(skip_all, fields(symbol = %raw.symbol))]
pub fn normalize(raw: RawRecordSet, config: &CleanConfig) -> Result<CleanRecordSet, DataError> {
    let RawRecordSet { symbol, frame, .. } = raw;
    let rows_in = frame.height();

    let frame = normalize_column_names(frame, &symbol)?;
    let frame = parse_date_column(frame, &config.date_column, &symbol)?;

    let nulls_before = null_cells(&frame);
    let frame = forward_fill(&frame)?;
    let filled_cells = nulls_before - null_cells(&frame);

    let (frame, bounds) =
        IqrFilter::from_config(config).apply(frame, &config.price_columns, &symbol)?;
    let frame = tag_symbol(frame, &symbol)?;

    let stats = CleanStats {
        rows_in,
        rows_out: frame.height(),
        filled_cells,
        bounds,
    };
    if stats.rows_rejected() > 0 {
        warn!(
            rejected = stats.rows_rejected(),
            rows_in, "dropped outlier rows"
        );
    }
    info!(
        rows = stats.rows_out,
        filled = stats.filled_cells,
        "normalized"
    );

    Ok(CleanRecordSet {
        symbol,
        frame,
        stats,
    })
}
