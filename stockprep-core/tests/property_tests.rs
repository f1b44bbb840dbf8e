//! Property tests for cleaning invariants.
//!
//! Uses proptest to verify:
//! 1. Name normalization is idempotent
//! 2. Forward fill carries the last seen value and never fills backward
//! 3. Every row that survives IQR rejection lies inside the bounds
//! 4. Quantiles stay within the data range and grow with q

use polars::prelude::*;
use proptest::prelude::*;
use stockprep_core::data::canonicalize::forward_fill;
use stockprep_core::data::outlier::{quantile, IqrFilter};
use stockprep_core::data::schema::normalize_column_name;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_column_name() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 _]{0,24}"
}

fn arb_price() -> impl Strategy<Value = f64> {
    (0.01..1000.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_sparse_series() -> impl Strategy<Value = Vec<Option<i64>>> {
    prop::collection::vec(prop::option::of(-1000i64..1000), 0..60)
}

// ── 1. Name Normalization ────────────────────────────────────────────

proptest! {
    #[test]
    fn normalization_is_idempotent(name in arb_column_name()) {
        let once = normalize_column_name(&name);
        prop_assert_eq!(normalize_column_name(&once), once.clone());
        prop_assert!(!once.contains(' '));
        prop_assert!(!once.chars().any(|c| c.is_ascii_uppercase()));
    }
}

// ── 2. Forward Fill ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn forward_fill_carries_last_value(values in arb_sparse_series()) {
        let df = DataFrame::new(vec![Column::new("x".into(), values.clone())]).unwrap();
        let filled = forward_fill(&df).unwrap();
        let out: Vec<Option<i64>> = filled.column("x").unwrap().i64().unwrap().into_iter().collect();

        let mut last = None;
        for (input, output) in values.iter().zip(&out) {
            if input.is_some() {
                last = *input;
            }
            prop_assert_eq!(*output, last);
        }
    }
}

// ── 3. IQR Rejection ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn kept_rows_are_within_bounds(
        closes in prop::collection::vec(arb_price(), 1..80),
        opens in prop::collection::vec(arb_price(), 80),
    ) {
        let opens = &opens[..closes.len()];
        let df = DataFrame::new(vec![
            Column::new("open".into(), opens),
            Column::new("close".into(), &closes),
        ])
        .unwrap();
        let columns = vec!["open".to_string(), "close".to_string()];

        let (kept, bounds) = IqrFilter::default().apply(df, &columns, "PROP").unwrap();

        prop_assert_eq!(bounds.len(), 2);
        prop_assert!(kept.height() <= closes.len());
        for b in &bounds {
            let values = kept.column(&b.column).unwrap().f64().unwrap();
            for v in values.into_iter() {
                let v = v.unwrap();
                prop_assert!(b.contains(v), "{} = {} outside [{}, {}]", b.column, v, b.lower, b.upper);
            }
        }
    }

    #[test]
    fn values_inside_both_bounds_are_never_dropped(
        closes in prop::collection::vec(arb_price(), 1..80),
    ) {
        let df = DataFrame::new(vec![Column::new("close".into(), &closes)]).unwrap();
        let columns = vec!["close".to_string()];

        let (kept, bounds) = IqrFilter::default().apply(df, &columns, "PROP").unwrap();

        let expected = closes.iter().filter(|&&c| bounds[0].contains(c)).count();
        prop_assert_eq!(kept.height(), expected);
    }
}

// ── 4. Quantiles ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn quantile_is_bounded_and_monotone(
        mut values in prop::collection::vec(arb_price(), 1..50),
        a in 0.0..=1.0_f64,
        b in 0.0..=1.0_f64,
    ) {
        values.sort_by(f64::total_cmp);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

        let q_lo = quantile(&values, lo).unwrap();
        let q_hi = quantile(&values, hi).unwrap();

        prop_assert!(q_lo <= q_hi + 1e-9);
        prop_assert!(q_lo >= values[0] - 1e-9);
        prop_assert!(q_hi <= values[values.len() - 1] + 1e-9);
    }
}
