//! Performance relative to the single-task expert
//!
//! Divides each evaluation block's saturation by the saturation the task
//! reaches when trained in isolation. Unlike sample efficiency, this module
//! requires a baseline for every task in the scenario: a single missing
//! baseline fails the whole module (the report itself continues).

use tracing::warn;

use crate::config::SteAveragingMethod;
use crate::data::EpisodeLog;
use crate::stats::block_saturation;
use crate::ste::SteStore;
use crate::{Error, Result};

use super::{Metric, MetricContext, RunningMetrics};

/// Saturation relative to the STE baseline, per evaluation regime.
#[derive(Debug)]
pub struct SteRelativePerf {
    averaging: SteAveragingMethod,
}

impl SteRelativePerf {
    /// Create the module with the configured STE averaging policy.
    #[must_use]
    pub const fn new(averaging: SteAveragingMethod) -> Self {
        Self { averaging }
    }
}

/// Per-run saturation statistics of a task's STE data.
pub(super) fn ste_run_stats(
    runs: &[EpisodeLog],
    ctx: &MetricContext<'_>,
) -> Result<Vec<(f64, usize)>> {
    let window = ctx.config.window_kind();
    let window_len = ctx.config.window_length;
    let measure = &ctx.config.perf_measure;

    runs.iter()
        .map(|run| {
            let rows = EpisodeLog::measure_rows(run.records(), measure);
            let perf = block_saturation(&rows, None, window, window_len)?;
            Ok((perf.value, perf.episodes_to))
        })
        .collect()
}

/// Element-wise mean of a task's STE runs, truncated to the shortest run.
pub(super) fn ste_time_average(runs: &[EpisodeLog], measure: &str) -> Vec<(u64, f64)> {
    let series: Vec<Vec<f64>> = runs
        .iter()
        .map(|run| {
            EpisodeLog::measure_rows(run.records(), measure)
                .into_iter()
                .map(|(_, v)| v)
                .collect()
        })
        .collect();
    let Some(min_len) = series.iter().map(Vec::len).min() else {
        return Vec::new();
    };

    (0..min_len)
        .map(|i| {
            let sum: f64 = series.iter().map(|s| s[i]).sum();
            (i as u64, sum / series.len() as f64)
        })
        .collect()
}

impl SteRelativePerf {
    /// The baseline saturation for one task, reduced per the averaging
    /// policy. `None` when the baseline cannot be computed.
    fn baseline_saturation(
        &self,
        task: &str,
        store: &SteStore,
        ctx: &MetricContext<'_>,
        metrics: &mut RunningMetrics,
    ) -> Result<Option<f64>> {
        let Some(runs) = store.get(task) else {
            return Ok(None);
        };

        match self.averaging {
            SteAveragingMethod::Metrics => {
                let stats = ste_run_stats(runs, ctx)?;
                if stats.is_empty() {
                    return Ok(None);
                }
                let values = metrics.ste_values_mut(task);
                for &(sat, eps) in &stats {
                    values.saturation_vals.push(sat);
                    values.exp_to_sat_vals.push(eps as f64);
                }
                Ok(Some(
                    stats.iter().map(|(sat, _)| sat).sum::<f64>() / stats.len() as f64,
                ))
            }
            SteAveragingMethod::Time => {
                let rows = ste_time_average(runs, &ctx.config.perf_measure);
                if rows.is_empty() {
                    return Ok(None);
                }
                let perf = block_saturation(
                    &rows,
                    None,
                    ctx.config.window_kind(),
                    ctx.config.window_length,
                )?;
                let values = metrics.ste_values_mut(task);
                values.saturation_vals.push(perf.value);
                values.exp_to_sat_vals.push(perf.episodes_to as f64);
                Ok(Some(perf.value))
            }
        }
    }
}

impl Metric for SteRelativePerf {
    fn name(&self) -> &'static str {
        "ste_relative_perf"
    }

    fn fill(&self, ctx: &MetricContext<'_>, metrics: &mut RunningMetrics) -> Result<usize> {
        let store = ctx
            .ste
            .ok_or_else(|| Error::MissingBaseline("no STE baselines loaded".to_string()))?;

        // Every task in the scenario needs a baseline.
        let tasks = ctx.regimes.task_names();
        for task in &tasks {
            if !store.contains(task) {
                return Err(Error::MissingBaseline(task.clone()));
            }
        }

        let mut written = 0;
        for task in &tasks {
            let Some(ste_sat) = self.baseline_saturation(task, store, ctx, metrics)? else {
                warn!(task, "no usable STE baseline saturation");
                continue;
            };
            if ste_sat == 0.0 {
                warn!(task, "STE baseline saturation is zero, skipping task");
                continue;
            }

            let test_regimes: Vec<usize> = ctx
                .regimes
                .rows()
                .iter()
                .filter(|r| r.task_name == *task && r.is_test())
                .map(|r| r.regime_num)
                .collect();
            for regime_num in test_regimes {
                let Some(sat) = metrics.row(regime_num).and_then(|r| r.saturation) else {
                    continue;
                };
                let rel = sat / ste_sat;
                if let Some(row) = metrics.row_mut(regime_num) {
                    row.ste_rel_perf = Some(rel);
                    written += 1;
                }
                metrics.ste_values_mut(task).rel_perf_vals.push(rel);
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::super::tests::{build_log, LogSpec};
    use super::*;
    use crate::data::{BlockType, EpisodeRecord, RegimeTable, WAKE_SUBTYPE};
    use crate::MetricsConfig;

    fn ste_store_with(entries: &[(&str, &[f64])]) -> SteStore {
        let mut store = SteStore::new();
        for &(task, values) in entries {
            let records: Vec<EpisodeRecord> = values
                .iter()
                .enumerate()
                .map(|(i, &v)| EpisodeRecord {
                    regime_num: 0,
                    exp_num: i as u64,
                    worker_id: "worker-default".to_string(),
                    block_num: 0,
                    block_type: BlockType::Train,
                    block_subtype: WAKE_SUBTYPE.to_string(),
                    phase_number: 0,
                    task_name: task.to_string(),
                    measures: BTreeMap::from([("reward".to_string(), v)]),
                })
                .collect();
            let log = EpisodeLog::new(records, "reward").unwrap();
            store.add_run(&log, "reward").unwrap();
        }
        store
    }

    fn scenario() -> (crate::data::EpisodeLog, RegimeTable) {
        let log = build_log(&[
            LogSpec {
                task: "a",
                block_type: BlockType::Train,
                phase: 0,
                values: vec![1.0; 10],
            },
            LogSpec {
                task: "a",
                block_type: BlockType::Test,
                phase: 0,
                values: vec![4.0; 10],
            },
        ]);
        let regimes = RegimeTable::from_log(&log);
        (log, regimes)
    }

    #[test]
    fn test_relative_perf_divides_by_ste_saturation() {
        let (log, regimes) = scenario();
        let store = ste_store_with(&[("a", &[8.0; 10])]);
        let config = MetricsConfig {
            smoothing_method: crate::config::SmoothingMethod::None,
            ..MetricsConfig::default()
        };
        let ctx = MetricContext {
            log: &log,
            regimes: &regimes,
            ste: Some(&store),
            config: &config,
        };
        let mut metrics = RunningMetrics::new(&regimes);
        metrics.row_mut(1).unwrap().saturation = Some(4.0);

        let written = SteRelativePerf::new(SteAveragingMethod::Metrics)
            .fill(&ctx, &mut metrics)
            .unwrap();
        assert_eq!(written, 1);
        assert!((metrics.row(1).unwrap().ste_rel_perf.unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(metrics.ste_values()["a"].rel_perf_vals, vec![0.5]);
    }

    #[test]
    fn test_any_missing_baseline_fails_module() {
        let (log, regimes) = scenario();
        let store = ste_store_with(&[("other", &[8.0; 10])]);
        let config = MetricsConfig::default();
        let ctx = MetricContext {
            log: &log,
            regimes: &regimes,
            ste: Some(&store),
            config: &config,
        };
        let mut metrics = RunningMetrics::new(&regimes);

        let err = SteRelativePerf::new(SteAveragingMethod::Metrics)
            .fill(&ctx, &mut metrics)
            .unwrap_err();
        assert!(matches!(err, Error::MissingBaseline(_)));
    }

    #[test]
    fn test_no_store_fails_module() {
        let (log, regimes) = scenario();
        let config = MetricsConfig::default();
        let ctx = MetricContext {
            log: &log,
            regimes: &regimes,
            ste: None,
            config: &config,
        };
        let mut metrics = RunningMetrics::new(&regimes);

        let err = SteRelativePerf::new(SteAveragingMethod::Metrics)
            .fill(&ctx, &mut metrics)
            .unwrap_err();
        assert!(matches!(err, Error::MissingBaseline(_)));
    }

    #[test]
    fn test_time_averaging_truncates_runs() {
        let (log, regimes) = scenario();
        let mut store = ste_store_with(&[("a", &[8.0; 10])]);
        // A second, shorter and weaker run drags the average to 6.0.
        let second = ste_store_with(&[("a", &[4.0; 5])]);
        let runs = second.get("a").unwrap();
        store.add_run(&runs[0], "reward").unwrap();

        let config = MetricsConfig {
            smoothing_method: crate::config::SmoothingMethod::None,
            ..MetricsConfig::default()
        };
        let ctx = MetricContext {
            log: &log,
            regimes: &regimes,
            ste: Some(&store),
            config: &config,
        };
        let mut metrics = RunningMetrics::new(&regimes);
        metrics.row_mut(1).unwrap().saturation = Some(3.0);

        SteRelativePerf::new(SteAveragingMethod::Time)
            .fill(&ctx, &mut metrics)
            .unwrap();
        assert!((metrics.row(1).unwrap().ste_rel_perf.unwrap() - 0.5).abs() < 1e-12);
    }
}
