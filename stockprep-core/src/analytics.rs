//! Simple analytics over the consolidated table.
//!
//! These consume the cleaned output; none of them feed back into cleaning.
//! Per-symbol computations follow row order within each symbol and never
//! let a window or statistic span two symbols.

use crate::data::error::DataError;
use crate::data::merge::ConsolidatedTable;
use crate::data::schema::SYMBOL_COLUMN;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("moving-average window must be at least 1")]
    InvalidWindow,

    #[error("column '{0}' is not numeric")]
    NonNumeric(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Frame(#[from] PolarsError),
}

/// Trailing simple moving average.
///
/// Position `i` holds the mean of `values[i + 1 - window ..= i]`. Positions
/// before the window is full, and windows containing a null, are `None`.
pub fn moving_average(
    values: &[Option<f64>],
    window: usize,
) -> Result<Vec<Option<f64>>, AnalyticsError> {
    if window == 0 {
        return Err(AnalyticsError::InvalidWindow);
    }

    let out = (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let sum: Option<f64> = slice.iter().copied().sum();
            sum.map(|s| s / window as f64)
        })
        .collect();
    Ok(out)
}

/// Numeric values of `column` and the symbol of each row.
fn symbol_values(
    table: &ConsolidatedTable,
    column: &str,
) -> Result<Vec<(String, Option<f64>)>, AnalyticsError> {
    let frame = table.frame();
    let values = frame.column(column)?;
    if !crate::data::schema::is_numeric(values.dtype()) {
        return Err(AnalyticsError::NonNumeric(column.to_string()));
    }
    let values = values.cast(&DataType::Float64)?;
    let symbols = frame.column(SYMBOL_COLUMN)?.str()?;

    Ok(symbols
        .into_iter()
        .zip(values.f64()?.into_iter())
        .map(|(s, v)| (s.unwrap_or_default().to_string(), v))
        .collect())
}

/// Per-symbol moving average of `column`, aligned with the table's rows.
///
/// The returned series is named `{column}_ma{window}`.
pub fn moving_average_column(
    table: &ConsolidatedTable,
    column: &str,
    window: usize,
) -> Result<Series, AnalyticsError> {
    let rows = symbol_values(table, column)?;

    let mut by_symbol: HashMap<&str, Vec<(usize, Option<f64>)>> = HashMap::new();
    for (i, (symbol, value)) in rows.iter().enumerate() {
        by_symbol.entry(symbol.as_str()).or_default().push((i, *value));
    }

    let mut out = vec![None; rows.len()];
    for entries in by_symbol.values() {
        let values: Vec<Option<f64>> = entries.iter().map(|(_, v)| *v).collect();
        for ((i, _), avg) in entries.iter().zip(moving_average(&values, window)?) {
            out[*i] = avg;
        }
    }

    Ok(Series::new(format!("{column}_ma{window}").into(), out))
}

/// Descriptive statistics of one column for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolSummary {
    pub symbol: String,
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation; `None` with fewer than two values.
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub first: Option<f64>,
    pub last: Option<f64>,
    /// Percent change from `first` to `last`.
    pub change_pct: Option<f64>,
}

fn summarize(symbol: &str, values: &[f64]) -> SymbolSummary {
    let count = values.len();
    let mean = (count > 0).then(|| values.iter().sum::<f64>() / count as f64);
    let std = mean.filter(|_| count > 1).map(|m| {
        let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (count - 1) as f64;
        var.sqrt()
    });
    let first = values.first().copied();
    let last = values.last().copied();

    SymbolSummary {
        symbol: symbol.to_string(),
        count,
        mean,
        std,
        min: values.iter().copied().reduce(f64::min),
        max: values.iter().copied().reduce(f64::max),
        first,
        last,
        change_pct: match (first, last) {
            (Some(f), Some(l)) if f != 0.0 => Some((l - f) / f * 100.0),
            _ => None,
        },
    }
}

/// Summary of `column` for every symbol, in the table's symbol order.
/// Nulls and NaN are skipped.
pub fn summary_by_symbol(
    table: &ConsolidatedTable,
    column: &str,
) -> Result<Vec<SymbolSummary>, AnalyticsError> {
    let rows = symbol_values(table, column)?;

    let mut grouped: HashMap<&str, Vec<f64>> = HashMap::new();
    for (symbol, value) in &rows {
        let entry = grouped.entry(symbol.as_str()).or_default();
        if let Some(v) = value.filter(|v| !v.is_nan()) {
            entry.push(v);
        }
    }

    Ok(table
        .symbols()
        .iter()
        .map(|s| summarize(s, grouped.get(s.as_str()).map_or(&[][..], Vec::as_slice)))
        .collect())
}

/// Best and worst symbols by percent change of a column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movers {
    /// Highest change first.
    pub top: Vec<(String, f64)>,
    /// Lowest change first.
    pub bottom: Vec<(String, f64)>,
}

/// Rank symbols by first-to-last percent change of `column`.
///
/// Symbols without a defined change are left out.
pub fn top_bottom_movers(
    table: &ConsolidatedTable,
    column: &str,
    n: usize,
) -> Result<Movers, AnalyticsError> {
    let mut ranked: Vec<(String, f64)> = summary_by_symbol(table, column)?
        .into_iter()
        .filter_map(|s| s.change_pct.map(|c| (s.symbol, c)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let top = ranked.iter().take(n).cloned().collect();
    let bottom = ranked.iter().rev().take(n).cloned().collect();
    Ok(Movers { top, bottom })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::canonicalize::{CleanRecordSet, CleanStats};
    use crate::data::merge::consolidate;

    fn set(symbol: &str, closes: &[f64]) -> CleanRecordSet {
        let frame = df!(
            "close" => closes,
            "symbol" => vec![symbol; closes.len()],
        )
        .unwrap();
        CleanRecordSet {
            symbol: symbol.into(),
            frame,
            stats: CleanStats {
                rows_in: closes.len(),
                rows_out: closes.len(),
                filled_cells: 0,
                bounds: Vec::new(),
            },
        }
    }

    fn table() -> ConsolidatedTable {
        consolidate(vec![
            set("up", &[100.0, 150.0, 200.0]),
            set("down", &[100.0, 90.0, 50.0]),
            set("flat", &[10.0, 10.0]),
        ])
        .unwrap()
    }

    #[test]
    fn moving_average_matches_trailing_mean() {
        let values: Vec<Option<f64>> = [100.0, 200.0, 300.0, 400.0, 500.0]
            .into_iter()
            .map(Some)
            .collect();
        let ma = moving_average(&values, 3).unwrap();
        assert_eq!(ma, [None, None, Some(200.0), Some(300.0), Some(400.0)]);
    }

    #[test]
    fn moving_average_with_too_few_values_is_all_none() {
        let ma = moving_average(&[Some(150.0), Some(152.0)], 3).unwrap();
        assert!(ma.iter().all(Option::is_none));
    }

    #[test]
    fn moving_average_window_with_null_is_none() {
        let ma = moving_average(&[Some(1.0), None, Some(3.0), Some(5.0)], 2).unwrap();
        assert_eq!(ma, [None, None, None, Some(4.0)]);
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(matches!(
            moving_average(&[Some(1.0)], 0),
            Err(AnalyticsError::InvalidWindow)
        ));
    }

    #[test]
    fn column_moving_average_restarts_per_symbol() {
        let ma = moving_average_column(&table(), "close", 2).unwrap();
        assert_eq!(ma.name().as_str(), "close_ma2");
        let values: Vec<Option<f64>> = ma.f64().unwrap().into_iter().collect();
        assert_eq!(
            values,
            [
                None,
                Some(125.0),
                Some(175.0),
                None,
                Some(95.0),
                Some(70.0),
                None,
                Some(10.0)
            ]
        );
    }

    #[test]
    fn summary_reports_each_symbol() {
        let summary = summary_by_symbol(&table(), "close").unwrap();
        assert_eq!(summary.len(), 3);

        let up = &summary[0];
        assert_eq!(up.symbol, "up");
        assert_eq!(up.count, 3);
        assert_eq!(up.mean, Some(150.0));
        assert_eq!(up.std, Some(50.0));
        assert_eq!(up.min, Some(100.0));
        assert_eq!(up.max, Some(200.0));
        assert_eq!(up.change_pct, Some(100.0));
    }

    #[test]
    fn movers_rank_by_change() {
        let movers = top_bottom_movers(&table(), "close", 1).unwrap();
        assert_eq!(movers.top, [("up".to_string(), 100.0)]);
        assert_eq!(movers.bottom, [("down".to_string(), -50.0)]);
    }

    #[test]
    fn text_column_is_not_summarized() {
        let err = summary_by_symbol(&table(), "symbol").unwrap_err();
        assert!(matches!(err, AnalyticsError::NonNumeric(_)));
    }
}
