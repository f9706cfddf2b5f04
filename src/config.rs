//! Configuration surface for metric computation
//!
//! Every multi-valued option is a dedicated enum with `FromStr`/`Display`
//! round-tripping, so the CLI, saved settings files, and library callers all
//! share one validated vocabulary.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::smoothing::WindowKind;
use crate::{Error, Result};

/// How task variants (e.g. `task_42`) map onto task identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantMode {
    /// Every variant is its own task
    #[default]
    Aware,
    /// Variants collapse onto the base task name
    Agnostic,
}

/// How multiple STE runs of the same task are reduced to one baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SteAveragingMethod {
    /// Compute the metric per STE run, then average the metrics
    #[default]
    Metrics,
    /// Truncate the runs to equal length, average the raw series, then
    /// compute the metric once
    Time,
}

/// Reduction used for within-lifetime scalar summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    /// Arithmetic mean
    #[default]
    Mean,
    /// Median
    Median,
}

impl AggregationMethod {
    /// Reduce a value list; `None` when the list is empty.
    #[must_use]
    pub fn aggregate(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Self::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Self::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
                } else {
                    Some(sorted[mid])
                }
            }
        }
    }
}

/// Reference used by the performance-maintenance module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceMethod {
    /// Most recent learning *evaluation* performance (saturation values)
    #[default]
    Mrlep,
    /// Most recent *terminal* learning performance (terminal values)
    Mrtlp,
    /// Compute both columns
    Both,
}

impl MaintenanceMethod {
    /// Whether the mrlep column is requested.
    #[must_use]
    pub const fn wants_mrlep(self) -> bool {
        matches!(self, Self::Mrlep | Self::Both)
    }

    /// Whether the mrtlp column is requested.
    #[must_use]
    pub const fn wants_mrtlp(self) -> bool {
        matches!(self, Self::Mrtlp | Self::Both)
    }
}

/// Formula used for forward/backward transfer between task pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    /// `after / before`
    #[default]
    Ratio,
    /// `(after - before) / (after + before)`
    Contrast,
    /// Compute both columns
    Both,
}

impl TransferMethod {
    /// Whether the ratio column is requested.
    #[must_use]
    pub const fn wants_ratio(self) -> bool {
        matches!(self, Self::Ratio | Self::Both)
    }

    /// Whether the contrast column is requested.
    #[must_use]
    pub const fn wants_contrast(self) -> bool {
        matches!(self, Self::Contrast | Self::Both)
    }
}

/// Scope of the performance range used for normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMethod {
    /// Per-task range
    #[default]
    Task,
    /// Whole-run range
    Run,
    /// No normalization
    None,
}

/// Smoothing applied to performance curves before statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingMethod {
    /// Uniform moving average
    #[default]
    Flat,
    /// Hanning taper
    Hanning,
    /// Hamming taper
    Hamming,
    /// Bartlett taper
    Bartlett,
    /// Blackman taper
    Blackman,
    /// Smoothing disabled
    None,
}

impl SmoothingMethod {
    /// The window kernel to use, or `None` when smoothing is disabled.
    #[must_use]
    pub const fn window_kind(self) -> Option<WindowKind> {
        match self {
            Self::Flat => Some(WindowKind::Flat),
            Self::Hanning => Some(WindowKind::Hanning),
            Self::Hamming => Some(WindowKind::Hamming),
            Self::Bartlett => Some(WindowKind::Bartlett),
            Self::Blackman => Some(WindowKind::Blackman),
            Self::None => None,
        }
    }
}

macro_rules! impl_option_strings {
    ($($ty:ident { $($name:literal => $variant:ident),+ $(,)? })+) => {
        $(
            impl FromStr for $ty {
                type Err = Error;

                fn from_str(s: &str) -> Result<Self> {
                    match s {
                        $($name => Ok(Self::$variant),)+
                        other => Err(Error::InvalidConfig(format!(
                            concat!("unknown ", stringify!($ty), " value: {}"),
                            other
                        ))),
                    }
                }
            }

            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    let s = match self {
                        $(Self::$variant => $name,)+
                    };
                    f.write_str(s)
                }
            }
        )+
    };
}

impl_option_strings! {
    VariantMode { "aware" => Aware, "agnostic" => Agnostic }
    SteAveragingMethod { "metrics" => Metrics, "time" => Time }
    AggregationMethod { "mean" => Mean, "median" => Median }
    MaintenanceMethod { "mrlep" => Mrlep, "mrtlp" => Mrtlp, "both" => Both }
    TransferMethod { "ratio" => Ratio, "contrast" => Contrast, "both" => Both }
    NormalizationMethod { "task" => Task, "run" => Run, "none" => None }
    SmoothingMethod {
        "flat" => Flat,
        "hanning" => Hanning,
        "hamming" => Hamming,
        "bartlett" => Bartlett,
        "blackman" => Blackman,
        "none" => None,
    }
}

/// Performance range of a task, used for normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataRange {
    /// Lowest expected performance value
    pub min: f64,
    /// Highest expected performance value
    pub max: f64,
}

/// Full configuration for one metrics computation.
///
/// Serializable so evaluation settings round-trip to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Task-variant identity handling
    pub variant_mode: VariantMode,
    /// STE baseline reduction policy
    pub ste_averaging_method: SteAveragingMethod,
    /// Name of the performance-measure column
    pub perf_measure: String,
    /// Within-lifetime aggregation
    pub aggregation_method: AggregationMethod,
    /// Performance-maintenance reference policy
    pub maintenance_method: MaintenanceMethod,
    /// Transfer computation policy
    pub transfer_method: TransferMethod,
    /// Normalization scope
    pub normalization_method: NormalizationMethod,
    /// Smoothing window shape
    pub smoothing_method: SmoothingMethod,
    /// Smoothing window length; adaptive default when unset
    pub window_length: Option<usize>,
    /// Clamp the performance measure to its [0.1, 0.9] quantiles
    pub clamp_outliers: bool,
    /// Externally supplied per-task performance ranges for normalization
    pub data_range: Option<BTreeMap<String, DataRange>>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            variant_mode: VariantMode::default(),
            ste_averaging_method: SteAveragingMethod::default(),
            perf_measure: "reward".to_string(),
            aggregation_method: AggregationMethod::default(),
            maintenance_method: MaintenanceMethod::default(),
            transfer_method: TransferMethod::default(),
            normalization_method: NormalizationMethod::default(),
            smoothing_method: SmoothingMethod::default(),
            window_length: None,
            clamp_outliers: false,
            data_range: None,
        }
    }
}

impl MetricsConfig {
    /// Window kernel resolved from the smoothing method.
    #[must_use]
    pub const fn window_kind(&self) -> Option<WindowKind> {
        self.smoothing_method.window_kind()
    }
}
