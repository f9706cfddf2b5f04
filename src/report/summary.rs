//! Lifetime summary shapes
//!
//! The flat scalar summary ([`LifetimeMetrics`]) is one row of the
//! run-per-row output table; the nested summary ([`LifetimeSummary`]) adds
//! per-task aggregates and value lists and serializes to the JSON artifact.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{AggregationMethod, DataRange, MetricsConfig};
use crate::data::{BlockType, EpisodeLog, RegimeTable};
use crate::metrics::{RunningMetrics, TransferDirection, TransferVariant};
use crate::io::ScenarioInfo;

/// Flat run-level scalar summary, one row per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifetimeMetrics {
    /// Run identifier
    pub run_id: String,
    /// Scenario taxonomy key the module list was selected from
    pub scenario_type: String,
    /// Scenario complexity tag
    pub complexity: String,
    /// Scenario difficulty tag
    pub difficulty: String,
    /// Performance measure the metrics were computed over
    pub metrics_column: String,
    /// Observed minimum of the measure after preprocessing
    pub min: Option<f64>,
    /// Observed maximum of the measure after preprocessing
    pub max: Option<f64>,
    /// Number of learning experiences in the run
    pub num_lx: usize,
    /// Number of evaluation experiences in the run
    pub num_ex: usize,
    /// Aggregated within-block saturation
    pub saturation: Option<f64>,
    /// Aggregated episodes-to-saturation
    pub eps_to_sat: Option<f64>,
    /// Aggregated terminal performance
    pub term_perf: Option<f64>,
    /// Aggregated episodes-to-terminal
    pub eps_to_term: Option<f64>,
    /// Aggregated recovery time
    pub recovery_time: Option<f64>,
    /// Run-level performance recovery rate
    pub perf_recovery: Option<f64>,
    /// Aggregated maintenance against prior saturation
    pub perf_maintenance_mrlep: Option<f64>,
    /// Aggregated maintenance against prior terminal performance
    pub perf_maintenance_mrtlp: Option<f64>,
    /// Aggregated forward transfer, ratio form
    pub forward_transfer_ratio: Option<f64>,
    /// Aggregated forward transfer, contrast form
    pub forward_transfer_contrast: Option<f64>,
    /// Aggregated backward transfer, ratio form
    pub backward_transfer_ratio: Option<f64>,
    /// Aggregated backward transfer, contrast form
    pub backward_transfer_contrast: Option<f64>,
    /// Aggregated STE-relative performance
    pub ste_rel_perf: Option<f64>,
    /// Aggregated sample efficiency
    pub sample_efficiency: Option<f64>,
}

/// Per-task slice of the nested summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Learning experiences of the task
    pub num_lx: usize,
    /// Evaluation experiences of the task
    pub num_ex: usize,
    /// Observed minimum of the measure for the task
    pub min: Option<f64>,
    /// Observed maximum of the measure for the task
    pub max: Option<f64>,
    /// Aggregated saturation over the task's regimes
    pub saturation: Option<f64>,
    /// Aggregated episodes-to-saturation
    pub eps_to_sat: Option<f64>,
    /// Aggregated terminal performance
    pub term_perf: Option<f64>,
    /// Recovery times in regime order
    pub recovery_times: Vec<f64>,
    /// Task-level performance recovery rate
    pub perf_recovery: Option<f64>,
    /// Aggregated maintenance against prior saturation
    pub perf_maintenance_mrlep: Option<f64>,
    /// Maintenance values (mrlep) in regime order
    pub maintenance_mrlep_vals: Vec<f64>,
    /// Aggregated maintenance against prior terminal performance
    pub perf_maintenance_mrtlp: Option<f64>,
    /// Maintenance values (mrtlp) in regime order
    pub maintenance_mrtlp_vals: Vec<f64>,
    /// Forward transfer ratios received, keyed by source task
    pub forward_transfer_ratio: BTreeMap<String, Vec<f64>>,
    /// Forward transfer contrasts received, keyed by source task
    pub forward_transfer_contrast: BTreeMap<String, Vec<f64>>,
    /// Backward transfer ratios received, keyed by source task
    pub backward_transfer_ratio: BTreeMap<String, Vec<f64>>,
    /// Backward transfer contrasts received, keyed by source task
    pub backward_transfer_contrast: BTreeMap<String, Vec<f64>>,
    /// Aggregated STE-relative performance
    pub ste_rel_perf: Option<f64>,
    /// STE-relative performance per evaluation regime
    pub ste_rel_perf_vals: Vec<f64>,
    /// STE saturation per stored run
    pub ste_saturation_vals: Vec<f64>,
    /// STE episodes-to-saturation per stored run
    pub ste_exp_to_sat_vals: Vec<f64>,
    /// Aggregated sample efficiency
    pub sample_efficiency: Option<f64>,
    /// Sample efficiency per STE run
    pub sample_efficiency_vals: Vec<f64>,
}

/// Nested per-run summary, mirroring the flat row plus per-task detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifetimeSummary {
    /// Run-level scalar fields
    #[serde(flatten)]
    pub metrics: LifetimeMetrics,
    /// Per-task ranges used for normalization, when normalization ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalization_data_range: Option<BTreeMap<String, DataRange>>,
    /// Per-task aggregates and value lists
    pub task_metrics: BTreeMap<String, TaskSummary>,
}

/// Count of (learning, evaluation) experiences in a record set.
fn experience_counts<'a, I>(records: I) -> (usize, usize)
where
    I: Iterator<Item = &'a crate::data::EpisodeRecord>,
{
    let mut num_lx = 0;
    let mut num_ex = 0;
    for record in records {
        match record.block_type {
            BlockType::Train => num_lx += 1,
            BlockType::Test => num_ex += 1,
        }
    }
    (num_lx, num_ex)
}

/// Build the flat run-level summary from the computed accumulator.
pub(super) fn lifetime_metrics(
    log: &EpisodeLog,
    metrics: &RunningMetrics,
    scenario: &ScenarioInfo,
    config: &MetricsConfig,
) -> LifetimeMetrics {
    let agg = config.aggregation_method;
    let range = log.measure_range(&config.perf_measure);
    let (num_lx, num_ex) = experience_counts(log.records().iter());

    let column = |f: fn(&crate::metrics::MetricsRow) -> Option<f64>| {
        agg.aggregate(&metrics.column_values(f))
    };

    LifetimeMetrics {
        run_id: scenario.run_id.clone(),
        scenario_type: scenario.scenario_type.clone(),
        complexity: scenario.complexity.clone(),
        difficulty: scenario.difficulty.clone(),
        metrics_column: config.perf_measure.clone(),
        min: range.map(|r| r.min),
        max: range.map(|r| r.max),
        num_lx,
        num_ex,
        saturation: column(|r| r.saturation),
        eps_to_sat: column(|r| r.eps_to_sat.map(|v| v as f64)),
        term_perf: column(|r| r.term_perf),
        eps_to_term: column(|r| r.eps_to_term.map(|v| v as f64)),
        recovery_time: column(|r| r.recovery_time),
        perf_recovery: metrics.perf_recovery(),
        perf_maintenance_mrlep: column(|r| r.perf_maintenance_mrlep),
        perf_maintenance_mrtlp: column(|r| r.perf_maintenance_mrtlp),
        forward_transfer_ratio: column(|r| r.forward_transfer_ratio),
        forward_transfer_contrast: column(|r| r.forward_transfer_contrast),
        backward_transfer_ratio: column(|r| r.backward_transfer_ratio),
        backward_transfer_contrast: column(|r| r.backward_transfer_contrast),
        ste_rel_perf: column(|r| r.ste_rel_perf),
        sample_efficiency: column(|r| r.sample_efficiency),
    }
}

/// Aggregate the non-empty cells of one column restricted to one task.
fn task_column(
    regimes: &RegimeTable,
    metrics: &RunningMetrics,
    task: &str,
    agg: AggregationMethod,
    column: impl Fn(&crate::metrics::MetricsRow) -> Option<f64>,
) -> (Vec<f64>, Option<f64>) {
    let values: Vec<f64> = regimes
        .rows()
        .iter()
        .filter(|r| r.task_name == task)
        .filter_map(|r| metrics.row(r.regime_num).and_then(&column))
        .collect();
    let aggregated = agg.aggregate(&values);
    (values, aggregated)
}

/// Build the nested summary from the computed accumulator.
pub(super) fn lifetime_summary(
    log: &EpisodeLog,
    regimes: &RegimeTable,
    metrics: &RunningMetrics,
    scenario: &ScenarioInfo,
    config: &MetricsConfig,
    normalization_data_range: Option<BTreeMap<String, DataRange>>,
) -> LifetimeSummary {
    let agg = config.aggregation_method;
    let mut task_metrics = BTreeMap::new();

    for task in regimes.task_names() {
        let (num_lx, num_ex) =
            experience_counts(log.records().iter().filter(|r| r.task_name == task));
        let range = log.task_measure_range(&task, &config.perf_measure);

        let (_, saturation) = task_column(regimes, metrics, &task, agg, |r| r.saturation);
        let (_, eps_to_sat) =
            task_column(regimes, metrics, &task, agg, |r| r.eps_to_sat.map(|v| v as f64));
        let (_, term_perf) = task_column(regimes, metrics, &task, agg, |r| r.term_perf);
        let (recovery_times, _) = task_column(regimes, metrics, &task, agg, |r| r.recovery_time);
        let (maintenance_mrlep_vals, perf_maintenance_mrlep) =
            task_column(regimes, metrics, &task, agg, |r| r.perf_maintenance_mrlep);
        let (maintenance_mrtlp_vals, perf_maintenance_mrtlp) =
            task_column(regimes, metrics, &task, agg, |r| r.perf_maintenance_mrtlp);

        let mut summary = TaskSummary {
            num_lx,
            num_ex,
            min: range.map(|r| r.min),
            max: range.map(|r| r.max),
            saturation,
            eps_to_sat,
            term_perf,
            recovery_times,
            perf_recovery: metrics.perf_recovery_by_task().get(&task).copied(),
            perf_maintenance_mrlep,
            maintenance_mrlep_vals,
            perf_maintenance_mrtlp,
            maintenance_mrtlp_vals,
            ..TaskSummary::default()
        };

        for record in metrics.transfers().iter().filter(|t| t.dst_task == task) {
            let map = match (record.direction, record.variant) {
                (TransferDirection::Forward, TransferVariant::Ratio) => {
                    &mut summary.forward_transfer_ratio
                }
                (TransferDirection::Forward, TransferVariant::Contrast) => {
                    &mut summary.forward_transfer_contrast
                }
                (TransferDirection::Backward, TransferVariant::Ratio) => {
                    &mut summary.backward_transfer_ratio
                }
                (TransferDirection::Backward, TransferVariant::Contrast) => {
                    &mut summary.backward_transfer_contrast
                }
            };
            map.entry(record.src_task.clone())
                .or_default()
                .push(record.value);
        }

        if let Some(values) = metrics.ste_values().get(&task) {
            summary.ste_rel_perf = agg.aggregate(&values.rel_perf_vals);
            summary.ste_rel_perf_vals = values.rel_perf_vals.clone();
            summary.ste_saturation_vals = values.saturation_vals.clone();
            summary.ste_exp_to_sat_vals = values.exp_to_sat_vals.clone();
        }
        if let Some(values) = metrics.se_values().get(&task) {
            summary.sample_efficiency = agg.aggregate(&values.sample_efficiency_vals);
            summary.sample_efficiency_vals = values.sample_efficiency_vals.clone();
        }

        task_metrics.insert(task, summary);
    }

    LifetimeSummary {
        metrics: lifetime_metrics(log, metrics, scenario, config),
        normalization_data_range,
        task_metrics,
    }
}
