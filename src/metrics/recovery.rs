//! Recovery time and performance recovery rate
//!
//! Recovery time measures how many episodes a re-training block needs to
//! climb back to the saturation of the task's previous training block.
//! Performance recovery reduces a task's ordered recovery times to the
//! negated slope of their least-squares fit: positive when the learner
//! recovers faster over successive revisits.

use tracing::{debug, warn};

use crate::stats::block_saturation;
use crate::Result;

use super::{Metric, MetricContext, RunningMetrics};

/// Episodes-to-recovery for repeated training blocks of a task.
#[derive(Debug, Default)]
pub struct RecoveryTime;

impl Metric for RecoveryTime {
    fn name(&self) -> &'static str {
        "recovery_time"
    }

    fn fill(&self, ctx: &MetricContext<'_>, metrics: &mut RunningMetrics) -> Result<usize> {
        let window = ctx.config.window_kind();
        let window_len = ctx.config.window_length;
        let measure = &ctx.config.perf_measure;

        let mut written = 0;
        for task in ctx.regimes.task_names() {
            let trains = ctx.regimes.wake_train_regimes(&task);
            for pair in trains.windows(2) {
                let (prev, current) = (pair[0], pair[1]);
                let Some(prior) = metrics.row(prev.regime_num).and_then(|r| r.saturation)
                else {
                    debug!(
                        task,
                        regime = prev.regime_num,
                        "no prior saturation, skipping recovery"
                    );
                    continue;
                };

                let rows = ctx.log.regime_rows(current.regime_num, measure);
                let perf = block_saturation(&rows, Some(prior), window, window_len)?;
                if !perf.recovered() {
                    warn!(
                        task,
                        regime = current.regime_num,
                        prior, "block never recovered prior saturation"
                    );
                    continue;
                }

                if let Some(row) = metrics.row_mut(current.regime_num) {
                    row.recovery_time = Some(perf.episodes_to_recovery as f64);
                    written += 1;
                }
            }
        }

        Ok(written)
    }
}

/// Slope of a least-squares line through `values` at unit x spacing.
fn slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    num / den
}

/// Negated trend of recovery times, per task and for the whole run.
#[derive(Debug, Default)]
pub struct PerformanceRecovery;

impl Metric for PerformanceRecovery {
    fn name(&self) -> &'static str {
        "performance_recovery"
    }

    fn fill(&self, ctx: &MetricContext<'_>, metrics: &mut RunningMetrics) -> Result<usize> {
        let mut written = 0;
        let mut all_times = Vec::new();

        for task in ctx.regimes.task_names() {
            let times: Vec<f64> = ctx
                .regimes
                .rows()
                .iter()
                .filter(|r| r.task_name == task)
                .filter_map(|r| metrics.row(r.regime_num).and_then(|m| m.recovery_time))
                .collect();
            all_times.extend_from_slice(&times);

            if times.len() < 2 {
                debug!(
                    task,
                    count = times.len(),
                    "not enough recovery times for a trend"
                );
                continue;
            }
            metrics.set_task_perf_recovery(&task, -slope(&times));
            written += 1;
        }

        if all_times.len() < 2 {
            warn!(
                count = all_times.len(),
                "not enough recovery times for run-level performance recovery"
            );
            return Ok(written);
        }
        metrics.set_perf_recovery(-slope(&all_times));
        Ok(written + 1)
    }
}
