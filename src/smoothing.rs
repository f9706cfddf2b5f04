//! Windowed smoothing of per-episode performance series
//!
//! **Problem**: raw per-episode reward curves are too noisy to read saturation
//! points off directly.
//!
//! **Solution**: reflect-pad the series at both ends, convolve with a
//! normalized window kernel, and slice the result back to the input length so
//! downstream episode indices stay valid.
//!
//! The index arithmetic in [`smooth`] is load-bearing: the slice offsets into
//! the valid convolution output are what keep `len(output) == len(input)` for
//! every window length. Changing them by one changes the output length.

use std::f64::consts::PI;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest window a series can default to, regardless of its length.
const MAX_DEFAULT_WINDOW: usize = 100;

/// Fraction of the series length used for the adaptive default window.
const DEFAULT_WINDOW_RATIO: f64 = 0.2;

/// Shape of the smoothing kernel.
///
/// `Flat` is a uniform moving average; the rest are the classic symmetric
/// FIR tapers with their textbook coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// Uniform moving average
    Flat,
    /// Raised cosine, zero at the edges
    Hanning,
    /// Raised cosine on a pedestal
    Hamming,
    /// Triangular taper
    Bartlett,
    /// Three-term cosine taper
    Blackman,
}

impl WindowKind {
    /// Kernel coefficient at position `i` of a window of length `len`.
    fn coefficient(self, i: usize, len: usize) -> f64 {
        debug_assert!(len >= 2);
        let m = (len - 1) as f64;
        let x = i as f64;
        match self {
            Self::Flat => 1.0,
            Self::Hanning => 0.5 - 0.5 * (2.0 * PI * x / m).cos(),
            Self::Hamming => 0.54 - 0.46 * (2.0 * PI * x / m).cos(),
            Self::Bartlett => (2.0 / m) * (m / 2.0 - (x - m / 2.0).abs()),
            Self::Blackman => {
                0.42 - 0.5 * (2.0 * PI * x / m).cos() + 0.08 * (4.0 * PI * x / m).cos()
            }
        }
    }

    /// Name as accepted on the configuration surface.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Hanning => "hanning",
            Self::Hamming => "hamming",
            Self::Bartlett => "bartlett",
            Self::Blackman => "blackman",
        }
    }
}

impl FromStr for WindowKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flat" => Ok(Self::Flat),
            "hanning" => Ok(Self::Hanning),
            "hamming" => Ok(Self::Hamming),
            "bartlett" => Ok(Self::Bartlett),
            "blackman" => Ok(Self::Blackman),
            other => Err(Error::InvalidWindow(other.to_string())),
        }
    }
}

impl std::fmt::Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Smooth a 1-D performance series, preserving its length.
///
/// If `window_len` is unset or exceeds the series length, it defaults to
/// `min(0.2 * len, 100)` (truncated). A resolved window below 3 makes
/// smoothing a no-op: the input is returned unchanged. This is the low-data
/// escape hatch, not an error.
///
/// # Errors
///
/// Returns [`Error::Shape`] for an empty series.
///
/// # Examples
///
/// ```rust
/// use medir::smoothing::{smooth, WindowKind};
///
/// let noisy: Vec<f64> = (0..50).map(|i| f64::from(i % 7)).collect();
/// let smoothed = smooth(&noisy, Some(5), WindowKind::Flat)?;
/// assert_eq!(smoothed.len(), noisy.len());
/// # Ok::<(), medir::Error>(())
/// ```
pub fn smooth(x: &[f64], window_len: Option<usize>, window: WindowKind) -> Result<Vec<f64>> {
    if x.is_empty() {
        return Err(Error::Shape("cannot smooth an empty series".to_string()));
    }

    let n = x.len();
    let window_len = match window_len {
        Some(w) if w <= n => w,
        _ => MAX_DEFAULT_WINDOW.min((n as f64 * DEFAULT_WINDOW_RATIO) as usize),
    };

    if window_len < 3 {
        return Ok(x.to_vec());
    }

    // Reflect window_len - 1 samples at each end to suppress edge transients.
    let mut padded = Vec::with_capacity(n + 2 * (window_len - 1));
    for i in (1..window_len).rev() {
        padded.push(x[i]);
    }
    padded.extend_from_slice(x);
    for i in ((n - window_len)..=(n - 2)).rev() {
        padded.push(x[i]);
    }

    let kernel: Vec<f64> = (0..window_len)
        .map(|i| window.coefficient(i, window_len))
        .collect();
    let kernel_sum: f64 = kernel.iter().sum();

    // Valid-mode convolution: output length is padded - window + 1.
    let valid_len = padded.len() - window_len + 1;
    let mut y = Vec::with_capacity(valid_len);
    for k in 0..valid_len {
        let mut acc = 0.0;
        for (j, w) in kernel.iter().enumerate() {
            acc += w * padded[k + window_len - 1 - j];
        }
        y.push(acc / kernel_sum);
    }

    // Slice back down to the input length. These offsets are exact:
    // floor(wl/2 - 1) from the front, ceil(wl/2) off the back.
    let start = (window_len as f64 / 2.0 - 1.0).floor() as usize;
    let end = (window_len as f64 / 2.0).ceil() as usize;
    Ok(y[start..y.len() - end].to_vec())
}
