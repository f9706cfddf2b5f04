//! Block statistics extraction
//!
//! Turns the raw `(exp_num, value)` rows of a single regime into the scalar
//! learning-curve statistics the metric modules build on: saturation value
//! and episodes-to-saturation, terminal performance, and time-to-recovery
//! against a prior baseline.

use crate::smoothing::{smooth, WindowKind};
use crate::{Error, Result};

/// Fraction of the series tail averaged for terminal performance.
pub const DEFAULT_TERMINAL_WINDOW_RATIO: f64 = 0.1;

/// Scalar statistics for one block of episodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockPerf {
    /// Peak (saturation) or tail-mean (terminal) of the smoothed curve
    pub value: f64,
    /// Episode index where the value was reached
    pub episodes_to: usize,
    /// Episode index of first recovery to the prior baseline.
    ///
    /// The sentinel `raw row count + 1` means "no prior baseline given" or
    /// "never recovered"; see [`BlockPerf::recovered`].
    pub episodes_to_recovery: usize,
    /// Sentinel value for `episodes_to_recovery`
    recovery_sentinel: usize,
}

impl BlockPerf {
    /// Whether the block reached the prior baseline at all.
    #[must_use]
    pub const fn recovered(&self) -> bool {
        self.episodes_to_recovery < self.recovery_sentinel
    }
}

/// Mean of the performance column per distinct episode index, in episode order.
///
/// Rows of a regime are contiguous and already ordered by `exp_num`, so
/// grouping reduces to collapsing consecutive runs of equal indices.
fn mean_per_episode(rows: &[(u64, f64)]) -> Result<Vec<f64>> {
    if rows.is_empty() {
        return Err(Error::Shape(
            "cannot compute block statistics over zero rows".to_string(),
        ));
    }

    let mut means = Vec::new();
    let mut current_exp = rows[0].0;
    let mut sum = 0.0;
    let mut count = 0usize;
    for &(exp_num, value) in rows {
        if exp_num != current_exp {
            means.push(sum / count as f64);
            current_exp = exp_num;
            sum = 0.0;
            count = 0;
        }
        sum += value;
        count += 1;
    }
    means.push(sum / count as f64);
    Ok(means)
}

/// Saturation statistics for one block.
///
/// The per-episode means are smoothed (unless `window` is `None`), the
/// saturation value is the NaN-aware maximum of the smoothed curve, and
/// episodes-to-saturation is the index of its first occurrence.
///
/// `episodes_to_recovery` is the index of the first smoothed value at or
/// above `prior_value`; without a prior, or when the block never reaches it,
/// the sentinel `rows.len() + 1` is returned.
///
/// Callers must treat `episodes_to == 0` on short series as "not
/// meaningfully computed" and skip the dependent metric, not as a valid zero.
///
/// # Errors
///
/// Returns [`Error::Shape`] when `rows` is empty.
pub fn block_saturation(
    rows: &[(u64, f64)],
    prior_value: Option<f64>,
    window: Option<WindowKind>,
    window_len: Option<usize>,
) -> Result<BlockPerf> {
    let mean_data = mean_per_episode(rows)?;
    let smoothed = match window {
        Some(kind) => smooth(&mean_data, window_len, kind)?,
        None => mean_data,
    };

    let value = smoothed
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    let episodes_to = smoothed.iter().position(|&v| v == value).unwrap_or(0);

    let recovery_sentinel = rows.len() + 1;
    let episodes_to_recovery = prior_value
        .and_then(|prior| smoothed.iter().position(|&v| v >= prior))
        .unwrap_or(recovery_sentinel);

    Ok(BlockPerf {
        value,
        episodes_to,
        episodes_to_recovery,
        recovery_sentinel,
    })
}

/// Terminal-performance statistics for one block.
///
/// The terminal value is the mean of the last `terminal_window_ratio`
/// fraction of the (optionally smoothed) per-episode means;
/// episodes-to-terminal is `trunc((1 - ratio/2) * length)`. Recovery is
/// defined exactly as in [`block_saturation`], relative to `prior_value`.
///
/// # Errors
///
/// Returns [`Error::Shape`] when `rows` is empty.
pub fn terminal_perf(
    rows: &[(u64, f64)],
    prior_value: Option<f64>,
    window: Option<WindowKind>,
    window_len: Option<usize>,
    terminal_window_ratio: f64,
) -> Result<BlockPerf> {
    let mean_data = mean_per_episode(rows)?;
    let data = match window {
        Some(kind) => smooth(&mean_data, window_len, kind)?,
        None => mean_data,
    };

    let len = data.len();
    let tail_start = ((1.0 - terminal_window_ratio) * len as f64) as usize;
    let tail = &data[tail_start..];
    let value = tail.iter().sum::<f64>() / tail.len() as f64;
    let episodes_to = ((1.0 - terminal_window_ratio / 2.0) * len as f64) as usize;

    let recovery_sentinel = rows.len() + 1;
    let episodes_to_recovery = prior_value
        .and_then(|prior| data.iter().position(|&v| v >= prior))
        .unwrap_or(recovery_sentinel);

    Ok(BlockPerf {
        value,
        episodes_to,
        episodes_to_recovery,
        recovery_sentinel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<(u64, f64)> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as u64, v))
            .collect()
    }

    #[test]
    fn test_increasing_series_saturates_at_last_index() {
        let rows = series(&(0..100).map(f64::from).collect::<Vec<_>>());
        let perf = block_saturation(&rows, None, Some(WindowKind::Flat), Some(10)).unwrap();
        assert_eq!(perf.episodes_to, 99);
        assert_eq!(perf.episodes_to_recovery, 101);
        assert!(!perf.recovered());
    }

    #[test]
    fn test_constant_series_saturates_immediately() {
        let rows = series(&[1.0; 100]);
        let perf = block_saturation(&rows, None, Some(WindowKind::Flat), Some(10)).unwrap();
        assert!((perf.value - 1.0).abs() < 1e-12);
        assert_eq!(perf.episodes_to, 0);
    }

    #[test]
    fn test_recovery_index_against_prior() {
        // Reaches the prior of 5.0 at episode 5.
        let rows = series(&(0..20).map(f64::from).collect::<Vec<_>>());
        let perf = block_saturation(&rows, Some(5.0), None, None).unwrap();
        assert_eq!(perf.episodes_to_recovery, 5);
        assert!(perf.recovered());
    }

    #[test]
    fn test_unreachable_prior_yields_sentinel() {
        let rows = series(&[1.0; 10]);
        let perf = block_saturation(&rows, Some(100.0), None, None).unwrap();
        assert_eq!(perf.episodes_to_recovery, 11);
        assert!(!perf.recovered());
    }

    #[test]
    fn test_repeated_exp_nums_are_averaged() {
        let rows = vec![(0, 0.0), (0, 2.0), (1, 4.0), (1, 6.0)];
        let perf = block_saturation(&rows, None, None, None).unwrap();
        // Episode means are [1.0, 5.0]; no smoothing for a 2-point series.
        assert!((perf.value - 5.0).abs() < 1e-12);
        assert_eq!(perf.episodes_to, 1);
        // Sentinel counts raw rows, not grouped episodes.
        assert_eq!(perf.episodes_to_recovery, 5);
    }

    #[test]
    fn test_terminal_perf_tail_mean() {
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        let rows = series(&values);
        let perf =
            terminal_perf(&rows, None, None, None, DEFAULT_TERMINAL_WINDOW_RATIO).unwrap();
        // Tail is the last 10 values: 90..=99.
        assert!((perf.value - 94.5).abs() < 1e-12);
        assert_eq!(perf.episodes_to, 95);
    }

    #[test]
    fn test_terminal_perf_recovery_uses_prior() {
        let values: Vec<f64> = (0..50).map(f64::from).collect();
        let rows = series(&values);
        let perf = terminal_perf(&rows, Some(10.0), None, None, 0.1).unwrap();
        assert_eq!(perf.episodes_to_recovery, 10);
    }

    #[test]
    fn test_empty_rows_fail() {
        let err = block_saturation(&[], None, None, None).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }
}
