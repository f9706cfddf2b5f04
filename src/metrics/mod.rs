//! Metric modules and their shared accumulator
//!
//! Each metric family is a [`Metric`] implementation that reads the episode
//! log and regime table and fills a sparse column of the shared
//! [`RunningMetrics`] accumulator. Modules run in a fixed order because
//! later modules read cells written by earlier ones (saturation first,
//! everything else after). Cells are explicit `Option`s: `None` always
//! means "not computed", never "computed as NaN".

mod maintenance;
mod recovery;
mod sample_efficiency;
mod saturation;
mod ste_relative;
mod transfer;

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::config::MetricsConfig;
use crate::data::{EpisodeLog, RegimeTable};
use crate::ste::SteStore;
use crate::Result;

pub use maintenance::PerformanceMaintenance;
pub use recovery::{PerformanceRecovery, RecoveryTime};
pub use sample_efficiency::SampleEfficiency;
pub use saturation::WithinBlockSaturation;
pub use ste_relative::SteRelativePerf;
pub use transfer::Transfer;

/// Read-only inputs shared by every metric module of one report.
#[derive(Clone, Copy)]
pub struct MetricContext<'a> {
    /// Preprocessed episode log of the run
    pub log: &'a EpisodeLog,
    /// Per-regime metadata derived from the log
    pub regimes: &'a RegimeTable,
    /// STE baselines, when loaded for this evaluation
    pub ste: Option<&'a SteStore>,
    /// Computation configuration
    pub config: &'a MetricsConfig,
}

/// A metric family computable over one run.
///
/// `fill` writes this module's cells into the accumulator and returns how
/// many values it wrote. A returned error means the module produced nothing;
/// the orchestrator discards any partial writes by restoring the accumulator
/// it held before the call.
pub trait Metric {
    /// Stable module name used in diagnostics and coverage summaries.
    fn name(&self) -> &'static str;

    /// Compute this module's values into `metrics`.
    ///
    /// # Errors
    ///
    /// Module-level preconditions (e.g. a missing STE baseline for a
    /// required task) surface as errors; per-regime or per-task gaps are
    /// skipped with a diagnostic instead.
    fn fill(&self, ctx: &MetricContext<'_>, metrics: &mut RunningMetrics) -> Result<usize>;
}

/// Direction of a transfer measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Training on the source task precedes the receiver's own training
    Forward,
    /// Training on the source task follows the receiver's own training
    Backward,
}

/// Formula of a transfer measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferVariant {
    /// `after / before`
    Ratio,
    /// `(after - before) / (after + before)`
    Contrast,
}

/// One computed transfer value between a task pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferRecord {
    /// Forward or backward
    pub direction: TransferDirection,
    /// Ratio or contrast
    pub variant: TransferVariant,
    /// Task whose training causes the transfer
    pub src_task: String,
    /// Task receiving the transfer
    pub dst_task: String,
    /// The "after" test regime the value is anchored to
    pub regime_num: usize,
    /// Computed transfer value
    pub value: f64,
}

/// Per-task value lists produced by the STE-relative module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SteTaskValues {
    /// STE-relative performance per test regime, in regime order
    pub rel_perf_vals: Vec<f64>,
    /// STE saturation per stored run
    pub saturation_vals: Vec<f64>,
    /// STE episodes-to-saturation per stored run
    pub exp_to_sat_vals: Vec<f64>,
}

/// Per-task value lists produced by the sample-efficiency module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeTaskValues {
    /// The task's own saturation over its concatenated training data
    pub task_saturation: Option<f64>,
    /// The task's own episodes-to-saturation
    pub task_exp_to_sat: Option<usize>,
    /// Saturation ratio per STE run
    pub saturation_vals: Vec<f64>,
    /// Episodes-to-saturation ratio per STE run
    pub exp_to_sat_vals: Vec<f64>,
    /// Sample efficiency per STE run
    pub sample_efficiency_vals: Vec<f64>,
}

/// One dense row of computed metrics for a regime.
///
/// Every cell is optional: a metric module only fills the regimes it
/// applies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsRow {
    /// Regime the row belongs to
    pub regime_num: usize,
    /// Within-block saturation value
    pub saturation: Option<f64>,
    /// Episodes to saturation
    pub eps_to_sat: Option<usize>,
    /// Terminal performance value
    pub term_perf: Option<f64>,
    /// Episodes to terminal performance
    pub eps_to_term: Option<usize>,
    /// Episodes to recovery of the previous training block's saturation
    pub recovery_time: Option<f64>,
    /// Maintenance against the prior training's saturation
    pub perf_maintenance_mrlep: Option<f64>,
    /// Maintenance against the prior training's terminal performance
    pub perf_maintenance_mrtlp: Option<f64>,
    /// Forward transfer, ratio form
    pub forward_transfer_ratio: Option<f64>,
    /// Forward transfer, contrast form
    pub forward_transfer_contrast: Option<f64>,
    /// Backward transfer, ratio form
    pub backward_transfer_ratio: Option<f64>,
    /// Backward transfer, contrast form
    pub backward_transfer_contrast: Option<f64>,
    /// Saturation relative to the task's STE baseline
    pub ste_rel_perf: Option<f64>,
    /// Sample-efficiency saturation ratio
    pub se_saturation: Option<f64>,
    /// Sample-efficiency episodes ratio
    pub se_eps_to_sat: Option<f64>,
    /// Combined sample efficiency
    pub sample_efficiency: Option<f64>,
}

/// Accumulator threaded through the metric modules of one report.
///
/// Owns the dense per-regime rows plus the run-level values that do not fit
/// a single regime cell (transfer pair records, recovery slopes, per-task
/// value lists for the nested summary).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunningMetrics {
    rows: Vec<MetricsRow>,
    index: FxHashMap<usize, usize>,
    transfers: Vec<TransferRecord>,
    perf_recovery: Option<f64>,
    perf_recovery_by_task: BTreeMap<String, f64>,
    ste_values: BTreeMap<String, SteTaskValues>,
    se_values: BTreeMap<String, SeTaskValues>,
}

impl RunningMetrics {
    /// Create an accumulator with one empty row per regime.
    #[must_use]
    pub fn new(regimes: &RegimeTable) -> Self {
        let mut rows = Vec::with_capacity(regimes.len());
        let mut index = FxHashMap::default();
        for regime in regimes.rows() {
            index.insert(regime.regime_num, rows.len());
            rows.push(MetricsRow {
                regime_num: regime.regime_num,
                ..MetricsRow::default()
            });
        }
        Self {
            rows,
            index,
            ..Self::default()
        }
    }

    /// All rows in regime appearance order.
    #[must_use]
    pub fn rows(&self) -> &[MetricsRow] {
        &self.rows
    }

    /// Row for a regime number.
    #[must_use]
    pub fn row(&self, regime_num: usize) -> Option<&MetricsRow> {
        self.index.get(&regime_num).map(|&i| &self.rows[i])
    }

    /// Mutable row for a regime number.
    pub fn row_mut(&mut self, regime_num: usize) -> Option<&mut MetricsRow> {
        self.index.get(&regime_num).map(|&i| &mut self.rows[i])
    }

    /// Non-empty values of one column, extracted in regime order.
    #[must_use]
    pub fn column_values<F>(&self, column: F) -> Vec<f64>
    where
        F: Fn(&MetricsRow) -> Option<f64>,
    {
        self.rows.iter().filter_map(column).collect()
    }

    /// Record a transfer pair value.
    pub fn push_transfer(&mut self, record: TransferRecord) {
        self.transfers.push(record);
    }

    /// All transfer pair records.
    #[must_use]
    pub fn transfers(&self) -> &[TransferRecord] {
        &self.transfers
    }

    /// Run-level performance recovery rate.
    #[must_use]
    pub const fn perf_recovery(&self) -> Option<f64> {
        self.perf_recovery
    }

    /// Set the run-level performance recovery rate.
    pub fn set_perf_recovery(&mut self, value: f64) {
        self.perf_recovery = Some(value);
    }

    /// Per-task performance recovery rates.
    #[must_use]
    pub const fn perf_recovery_by_task(&self) -> &BTreeMap<String, f64> {
        &self.perf_recovery_by_task
    }

    /// Set one task's performance recovery rate.
    pub fn set_task_perf_recovery(&mut self, task: &str, value: f64) {
        self.perf_recovery_by_task.insert(task.to_string(), value);
    }

    /// Per-task STE value lists.
    #[must_use]
    pub const fn ste_values(&self) -> &BTreeMap<String, SteTaskValues> {
        &self.ste_values
    }

    /// Mutable STE value lists for one task, created on first use.
    pub fn ste_values_mut(&mut self, task: &str) -> &mut SteTaskValues {
        self.ste_values.entry(task.to_string()).or_default()
    }

    /// Per-task sample-efficiency value lists.
    #[must_use]
    pub const fn se_values(&self) -> &BTreeMap<String, SeTaskValues> {
        &self.se_values
    }

    /// Mutable sample-efficiency values for one task, created on first use.
    pub fn se_values_mut(&mut self, task: &str) -> &mut SeTaskValues {
        self.se_values.entry(task.to_string()).or_default()
    }
}

/// Outcome of one module's run, for the report coverage summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// The module wrote at least one value
    Computed,
    /// The module ran but found nothing applicable
    Skipped,
    /// The module failed; the accumulator was left untouched by it
    Failed,
}

/// Per-module coverage entry.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    /// Module name
    pub module: &'static str,
    /// Computed / skipped / failed
    pub status: ModuleStatus,
    /// Number of values the module wrote
    pub values_written: usize,
    /// Failure detail, for failed modules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
