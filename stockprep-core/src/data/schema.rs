//! Column naming, date typing and the schema every cleaned frame satisfies.

use super::error::DataError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::HashSet;

/// Name of the parsed calendar column in every cleaned frame.
pub const DATE_COLUMN: &str = "date";

/// Name of the source-identity column added to every cleaned frame.
pub const SYMBOL_COLUMN: &str = "symbol";

/// Date-only layouts, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d", "%d-%b-%Y"];

/// Date-and-time layouts, tried after the date-only ones.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Temporal dtype of the `date` column.
pub fn date_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// Integer and floating-point dtypes, the ones outlier bounds and merge
/// widening treat as numbers.
pub fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Lowercase a column name and replace every space with `_`.
///
/// Idempotent: the output contains no uppercase ASCII and no spaces.
pub fn normalize_column_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Rename every column of `df` to its normalized form.
pub fn normalize_column_names(df: DataFrame, symbol: &str) -> Result<DataFrame, DataError> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(df.width());

    for column in df.get_columns() {
        let name = normalize_column_name(column.name().as_str());
        if !seen.insert(name.clone()) {
            return Err(DataError::DuplicateColumn {
                symbol: symbol.to_string(),
                column: name,
            });
        }
        columns.push(column.clone().with_name(name.into()));
    }

    Ok(DataFrame::new(columns)?)
}

/// Parse a single date or timestamp string into milliseconds since the epoch.
///
/// Naive values are taken as UTC. Returns `None` when no layout matches.
pub fn parse_timestamp_millis(value: &str) -> Option<i64> {
    let value = value.trim();

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis());
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

fn parse_strings(values: &StringChunked, symbol: &str) -> Result<Vec<Option<i64>>, DataError> {
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse_timestamp_millis(raw).map(Some).ok_or_else(|| {
                DataError::MalformedDate {
                    symbol: symbol.to_string(),
                    row,
                    value: raw.to_string(),
                }
            }),
        })
        .collect()
}

/// Replace the configured date column with a typed `date` column.
///
/// `df` must already have normalized names; `date_column` is normalized
/// here before lookup. The parsed column keeps its position and is always
/// named [`DATE_COLUMN`]. Nulls stay null; any other unparseable value is a
/// [`DataError::MalformedDate`] for the whole file.
pub fn parse_date_column(
    df: DataFrame,
    date_column: &str,
    symbol: &str,
) -> Result<DataFrame, DataError> {
    let source = normalize_column_name(date_column);
    let column = df
        .column(&source)
        .map_err(|_| DataError::MissingDateColumn {
            symbol: symbol.to_string(),
            column: source.clone(),
        })?;

    if source != DATE_COLUMN && df.column(DATE_COLUMN).is_ok() {
        return Err(DataError::DuplicateColumn {
            symbol: symbol.to_string(),
            column: DATE_COLUMN.to_string(),
        });
    }

    let parsed = match column.dtype() {
        DataType::Date | DataType::Datetime(_, _) => column.cast(&date_dtype())?,
        DataType::String => {
            let millis = parse_strings(column.str()?, symbol)?;
            Column::new(DATE_COLUMN.into(), millis).cast(&date_dtype())?
        }
        _ => {
            let as_text = column.cast(&DataType::String)?;
            let millis = parse_strings(as_text.str()?, symbol)?;
            Column::new(DATE_COLUMN.into(), millis).cast(&date_dtype())?
        }
    }
    .with_name(DATE_COLUMN.into());

    let columns: Vec<Column> = df
        .get_columns()
        .iter()
        .map(|c| {
            if c.name().as_str() == source {
                parsed.clone()
            } else {
                c.clone()
            }
        })
        .collect();

    Ok(DataFrame::new(columns)?)
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("type mismatch in column {column}: expected {expected}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: DataType,
    },
}

/// Columns every cleaned or consolidated frame carries.
pub struct CleanSchema;

impl CleanSchema {
    /// Check that `df` has a temporal `date` column and a string `symbol` column.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let date = df
            .column(DATE_COLUMN)
            .map_err(|_| SchemaError::MissingColumn(DATE_COLUMN.into()))?;
        if !matches!(date.dtype(), DataType::Datetime(_, _) | DataType::Date) {
            return Err(SchemaError::TypeMismatch {
                column: DATE_COLUMN.into(),
                expected: "temporal",
                actual: date.dtype().clone(),
            });
        }

        let symbol = df
            .column(SYMBOL_COLUMN)
            .map_err(|_| SchemaError::MissingColumn(SYMBOL_COLUMN.into()))?;
        if symbol.dtype() != &DataType::String {
            return Err(SchemaError::TypeMismatch {
                column: SYMBOL_COLUMN.into(),
                expected: "string",
                actual: symbol.dtype().clone(),
            });
        }

        Ok(())
    }
}
