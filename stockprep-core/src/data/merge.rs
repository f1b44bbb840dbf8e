//! Row-wise consolidation of cleaned record sets.
//!
//! Frames are stacked in input order and aligned by column name. The output
//! column order is first-seen order across the inputs; a frame lacking a
//! column contributes nulls for it. When the same column has different
//! dtypes in different files, numeric pairs widen to `Float64` and any other
//! mismatch falls back to `String`. A column that is entirely null in one
//! file takes its dtype from the others.

use super::canonicalize::CleanRecordSet;
use super::error::DataError;
use super::schema::{is_numeric, CleanSchema, SYMBOL_COLUMN};
use polars::prelude::*;
use tracing::info;

/// The merged dataset spanning every input symbol.
#[derive(Debug, Clone)]
pub struct ConsolidatedTable {
    frame: DataFrame,
    symbols: Vec<String>,
}

impl ConsolidatedTable {
    /// Wrap a frame read back from disk. Symbols are taken in first-seen order.
    pub fn from_frame(frame: DataFrame) -> Result<Self, DataError> {
        CleanSchema::validate(&frame)?;
        let mut symbols: Vec<String> = Vec::new();
        for symbol in frame.column(SYMBOL_COLUMN)?.str()?.into_iter().flatten() {
            if !symbols.iter().any(|s| s == symbol) {
                symbols.push(symbol.to_string());
            }
        }
        Ok(Self { frame, symbols })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    /// Source symbols in merge order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Rows tagged with `symbol`, in their original order.
    pub fn rows_for(&self, symbol: &str) -> Result<DataFrame, DataError> {
        let symbols = self.frame.column(SYMBOL_COLUMN)?.str()?;
        let mask: BooleanChunked = symbols
            .into_iter()
            .map(|s| s == Some(symbol))
            .collect();
        Ok(self.frame.filter(&mask)?)
    }
}

fn unify(a: &DataType, b: &DataType) -> DataType {
    if a == b {
        a.clone()
    } else if is_numeric(a) && is_numeric(b) {
        DataType::Float64
    } else {
        DataType::String
    }
}

/// Column names in first-seen order, with the dtype each resolves to.
fn column_union(sets: &[CleanRecordSet]) -> Vec<(String, Option<DataType>)> {
    let mut union: Vec<(String, Option<DataType>)> = Vec::new();

    for set in sets {
        for column in set.frame.get_columns() {
            let name = column.name().as_str();
            // Empty or all-null columns carry no dtype information.
            let all_null = column.null_count() == column.len();
            let dtype = (!all_null).then(|| column.dtype().clone());

            match union.iter_mut().find(|(n, _)| n.as_str() == name) {
                Some((_, slot)) => {
                    *slot = match (slot.take(), dtype) {
                        (Some(current), Some(next)) => Some(unify(&current, &next)),
                        (current, next) => current.or(next),
                    };
                }
                None => union.push((name.to_string(), dtype)),
            }
        }
    }

    // Columns that were all-null everywhere keep their first dtype.
    for (name, slot) in union.iter_mut() {
        if slot.is_none() {
            *slot = sets
                .iter()
                .find_map(|s| s.frame.column(name).ok().map(|c| c.dtype().clone()));
        }
    }
    union
}

/// Concatenate cleaned sets row-wise, in the order given.
pub fn consolidate(sets: Vec<CleanRecordSet>) -> Result<ConsolidatedTable, DataError> {
    if sets.is_empty() {
        return Err(DataError::EmptyInput);
    }

    let union = column_union(&sets);
    let mut merged: Option<DataFrame> = None;
    let mut symbols = Vec::with_capacity(sets.len());

    for set in sets {
        let height = set.frame.height();
        let mut columns = Vec::with_capacity(union.len());
        for (name, dtype) in &union {
            let dtype = dtype.clone().unwrap_or(DataType::Null);
            let column = match set.frame.column(name) {
                Ok(c) if c.dtype() == &dtype => c.clone(),
                Ok(c) => c.cast(&dtype)?,
                Err(_) => Column::full_null(name.as_str().into(), height, &dtype),
            };
            columns.push(column);
        }
        let aligned = DataFrame::new(columns)?;

        match merged.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&aligned)?;
            }
            None => merged = Some(aligned),
        }
        symbols.push(set.symbol);
    }

    let frame = merged.ok_or(DataError::EmptyInput)?;

    info!(
        symbols = symbols.len(),
        rows = frame.height(),
        columns = frame.width(),
        "consolidated"
    );

    Ok(ConsolidatedTable { frame, symbols })
}
