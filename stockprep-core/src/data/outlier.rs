//! Interquartile-range outlier rejection.
//!
//! For each price column present, the acceptable range is
//! `[Q1 - k*IQR, Q3 + k*IQR]` computed over that column's values. A row is
//! kept only if every present price column's value is inside its own range.
//! A null or NaN price is never inside a range, and a column with no values
//! at all has no range, so every row of it is rejected.

use super::error::DataError;
use super::schema::{is_numeric, normalize_column_name};
use crate::config::CleanConfig;
use polars::prelude::*;
use tracing::debug;

/// Acceptable range for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct IqrBounds {
    pub column: String,
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Quantile of an ascending, NaN-free slice, interpolating linearly between
/// the two nearest order statistics.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrFilter {
    pub lower_quantile: f64,
    pub upper_quantile: f64,
    pub multiplier: f64,
}

impl Default for IqrFilter {
    fn default() -> Self {
        Self {
            lower_quantile: 0.25,
            upper_quantile: 0.75,
            multiplier: 1.5,
        }
    }
}

impl IqrFilter {
    pub fn from_config(config: &CleanConfig) -> Self {
        Self {
            lower_quantile: config.lower_quantile,
            upper_quantile: config.upper_quantile,
            multiplier: config.iqr_multiplier,
        }
    }

    /// Bounds for `values`, ignoring nulls and NaN. `None` if nothing remains.
    pub fn bounds(&self, column: &str, values: &[Option<f64>]) -> Option<IqrBounds> {
        let mut sorted: Vec<f64> = values
            .iter()
            .flatten()
            .copied()
            .filter(|v| !v.is_nan())
            .collect();
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile(&sorted, self.lower_quantile)?;
        let q3 = quantile(&sorted, self.upper_quantile)?;
        let iqr = q3 - q1;
        Some(IqrBounds {
            column: column.to_string(),
            q1,
            q3,
            lower: q1 - self.multiplier * iqr,
            upper: q3 + self.multiplier * iqr,
        })
    }

    /// Drop every row with a price outside its column's bounds.
    ///
    /// `price_columns` are normalized and intersected with the columns of
    /// `df`; with no overlap the frame is returned unchanged. Returns the
    /// filtered frame and the bounds of each column that had values.
    pub fn apply(
        &self,
        mut df: DataFrame,
        price_columns: &[String],
        symbol: &str,
    ) -> Result<(DataFrame, Vec<IqrBounds>), DataError> {
        let present = present_price_columns(&df, price_columns);
        if present.is_empty() {
            return Ok((df, Vec::new()));
        }

        let mut keep = vec![true; df.height()];
        let mut all_bounds = Vec::with_capacity(present.len());

        for name in &present {
            if let Some(blank) = blank_as_float(df.column(name)?)? {
                df.with_column(blank)?;
            }
            let column = df.column(name)?;
            if !is_numeric(column.dtype()) {
                return Err(DataError::NonNumericPriceColumn {
                    symbol: symbol.to_string(),
                    column: name.clone(),
                    dtype: column.dtype().to_string(),
                });
            }

            let as_f64 = column.cast(&DataType::Float64)?;
            let values: Vec<Option<f64>> = as_f64.f64()?.into_iter().collect();

            match self.bounds(name, &values) {
                Some(bounds) => {
                    debug!(
                        symbol,
                        column = %name,
                        lower = bounds.lower,
                        upper = bounds.upper,
                        "IQR bounds"
                    );
                    for (k, v) in keep.iter_mut().zip(&values) {
                        *k &= v.is_some_and(|v| bounds.contains(v));
                    }
                    all_bounds.push(bounds);
                }
                None => keep.iter_mut().for_each(|k| *k = false),
            }
        }

        let mask: BooleanChunked = keep.into_iter().collect();
        Ok((df.filter(&mask)?, all_bounds))
    }
}

/// A column with no values at all is read from CSV as text; retype it as
/// an all-null `Float64` so it rejects its rows instead of failing the file.
fn blank_as_float(column: &Column) -> Result<Option<Column>, DataError> {
    let blank = matches!(column.dtype(), DataType::String | DataType::Null)
        && column.null_count() == column.len();
    if !blank {
        return Ok(None);
    }
    Ok(Some(column.cast(&DataType::Float64)?))
}

/// Configured price columns that exist in `df`, normalized, in config order.
pub fn present_price_columns(df: &DataFrame, price_columns: &[String]) -> Vec<String> {
    let mut present: Vec<String> = Vec::new();
    for name in price_columns.iter().map(|c| normalize_column_name(c)) {
        if df.column(&name).is_ok() && !present.contains(&name) {
            present.push(name);
        }
    }
    present
}
