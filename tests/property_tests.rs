//! Property-based tests for the metric transforms
//!
//! Mathematical invariants the engine guarantees:
//! - Smoothing preserves series length for every window kind
//! - Sub-3 windows make smoothing the identity
//! - Block statistics respect their sentinels
//! - Report calculation is deterministic

use proptest::prelude::*;

use medir::smoothing::{smooth, WindowKind};
use medir::stats::{block_saturation, terminal_perf};

const ALL_WINDOWS: [WindowKind; 5] = [
    WindowKind::Flat,
    WindowKind::Hanning,
    WindowKind::Hamming,
    WindowKind::Bartlett,
    WindowKind::Blackman,
];

fn arb_series(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(-1000.0f64..1000.0, 3..max_len)
}

fn arb_window_kind() -> impl Strategy<Value = WindowKind> {
    proptest::sample::select(ALL_WINDOWS.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Smoothing Properties
    // ========================================================================

    /// Property: output length equals input length for every window kind
    /// and every valid window length.
    #[test]
    fn prop_smooth_preserves_length(
        series in arb_series(300),
        kind in arb_window_kind(),
        window in 3usize..50,
    ) {
        let window = window.min(series.len());
        let smoothed = smooth(&series, Some(window), kind).unwrap();
        prop_assert_eq!(smoothed.len(), series.len());
    }

    /// Property: a window below 3 is the identity.
    #[test]
    fn prop_small_window_is_identity(
        series in arb_series(100),
        kind in arb_window_kind(),
        window in 0usize..3,
    ) {
        let smoothed = smooth(&series, Some(window), kind).unwrap();
        prop_assert_eq!(smoothed, series);
    }

    /// Property: smoothing never exceeds the input's value envelope.
    #[test]
    fn prop_smooth_stays_in_envelope(
        series in arb_series(200),
        kind in arb_window_kind(),
    ) {
        let min = series.iter().copied().fold(f64::INFINITY, f64::min);
        let max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let smoothed = smooth(&series, Some(series.len().min(10)), kind).unwrap();
        for v in smoothed {
            prop_assert!(v >= min - 1e-9 && v <= max + 1e-9);
        }
    }

    // ========================================================================
    // Block Statistics Properties
    // ========================================================================

    /// Property: without a prior baseline the recovery sentinel is always
    /// the raw row count + 1.
    #[test]
    fn prop_recovery_sentinel_without_prior(series in arb_series(200)) {
        let rows: Vec<(u64, f64)> = series
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as u64, v))
            .collect();
        let perf = block_saturation(&rows, None, None, None).unwrap();
        prop_assert_eq!(perf.episodes_to_recovery, rows.len() + 1);
        prop_assert!(!perf.recovered());
    }

    /// Property: the saturation value is an element of the smoothed curve,
    /// so for unsmoothed data it never exceeds the raw maximum.
    #[test]
    fn prop_saturation_bounded_by_raw_max(series in arb_series(200)) {
        let rows: Vec<(u64, f64)> = series
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as u64, v))
            .collect();
        let raw_max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let perf = block_saturation(&rows, None, None, None).unwrap();
        prop_assert!(perf.value <= raw_max + 1e-9);
        prop_assert!(perf.episodes_to < series.len());
    }

    /// Property: the terminal index always lands inside the series and the
    /// terminal value inside its envelope.
    #[test]
    fn prop_terminal_index_in_bounds(series in arb_series(200)) {
        let rows: Vec<(u64, f64)> = series
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as u64, v))
            .collect();
        let perf = terminal_perf(&rows, None, None, None, 0.1).unwrap();
        prop_assert!(perf.episodes_to <= series.len());
        let min = series.iter().copied().fold(f64::INFINITY, f64::min);
        let max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(perf.value >= min - 1e-9 && perf.value <= max + 1e-9);
    }
}

// ============================================================================
// Deterministic Scenarios
// ============================================================================

#[test]
fn test_increasing_series_saturates_at_the_end() {
    let rows: Vec<(u64, f64)> = (0..50).map(|i| (i, f64::from(i as u8))).collect();
    let perf = block_saturation(&rows, None, Some(WindowKind::Flat), Some(10)).unwrap();
    assert_eq!(perf.episodes_to, 49);
    assert_eq!(perf.episodes_to_recovery, 51);
}

#[test]
fn test_constant_series_with_window_ten() {
    let rows: Vec<(u64, f64)> = (0..100).map(|i| (i, 1.0)).collect();
    let perf = block_saturation(&rows, None, Some(WindowKind::Flat), Some(10)).unwrap();
    assert!((perf.value - 1.0).abs() < 1e-12);
    assert_eq!(perf.episodes_to, 0);
}
