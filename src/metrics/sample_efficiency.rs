//! Sample efficiency relative to the single-task expert
//!
//! How much learning experience the lifelong learner needs compared to an
//! expert trained on the task alone. Per task, the concatenated training
//! data is reduced to saturation statistics and set against the STE
//! baseline's:
//!
//! `(task_sat / ste_sat) * (ste_eps_to_sat / task_eps_to_sat)`
//!
//! A zero episodes-to-saturation on either side means saturation was never
//! meaningfully reached; that task is skipped with a diagnostic and the
//! module carries on with the rest.

use tracing::warn;

use crate::config::SteAveragingMethod;
use crate::stats::block_saturation;
use crate::{Error, Result};

use super::ste_relative::{ste_run_stats, ste_time_average};
use super::{Metric, MetricContext, RunningMetrics};

/// Sample efficiency per task, anchored at the task's last training regime.
#[derive(Debug)]
pub struct SampleEfficiency {
    averaging: SteAveragingMethod,
}

/// Per-STE-run efficiency ratios for one task.
struct EfficiencyRatios {
    saturation: Vec<f64>,
    eps_to_sat: Vec<f64>,
    efficiency: Vec<f64>,
}

impl SampleEfficiency {
    /// Create the module with the configured STE averaging policy.
    #[must_use]
    pub const fn new(averaging: SteAveragingMethod) -> Self {
        Self { averaging }
    }

    /// Ratios for one task against its STE runs, or `None` when no STE run
    /// reached saturation.
    fn ratios(
        &self,
        task: &str,
        task_sat: f64,
        task_eps: usize,
        ctx: &MetricContext<'_>,
        store: &crate::ste::SteStore,
    ) -> Result<Option<EfficiencyRatios>> {
        let Some(runs) = store.get(task) else {
            return Ok(None);
        };
        let task_eps = task_eps as f64;

        let stats = match self.averaging {
            SteAveragingMethod::Metrics => ste_run_stats(runs, ctx)?,
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
                vec![(perf.value, perf.episodes_to)]
            }
        };

        let mut ratios = EfficiencyRatios {
            saturation: Vec::new(),
            eps_to_sat: Vec::new(),
            efficiency: Vec::new(),
        };
        for (ste_sat, ste_eps) in stats {
            if ste_eps == 0 {
                warn!(task, "STE run never saturated, skipping it");
                continue;
            }
            let sat_ratio = task_sat / ste_sat;
            let eps_ratio = ste_eps as f64 / task_eps;
            ratios.saturation.push(sat_ratio);
            ratios.eps_to_sat.push(eps_ratio);
            ratios.efficiency.push(sat_ratio * eps_ratio);
        }
        Ok((!ratios.efficiency.is_empty()).then_some(ratios))
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

impl Metric for SampleEfficiency {
    fn name(&self) -> &'static str {
        "sample_efficiency"
    }

    fn fill(&self, ctx: &MetricContext<'_>, metrics: &mut RunningMetrics) -> Result<usize> {
        let store = ctx
            .ste
            .ok_or_else(|| Error::MissingBaseline("no STE baselines loaded".to_string()))?;

        let tasks = ctx.regimes.task_names();
        if !tasks.iter().any(|t| store.contains(t)) {
            return Err(Error::MissingBaseline(
                "no STE data available for any task".to_string(),
            ));
        }

        let mut written = 0;
        for task in &tasks {
            if !store.contains(task) {
                warn!(task, "no STE data for task, skipping sample efficiency");
                continue;
            }

            // Concatenate the task's primary learning regimes into one
            // training curve.
            let train_regimes = ctx.regimes.wake_train_regimes(task);
            let Some(last_regime) = train_regimes.last().map(|r| r.regime_num) else {
                warn!(task, "task has no training regimes, skipping sample efficiency");
                continue;
            };
            let mut rows = Vec::new();
            for regime in &train_regimes {
                rows.extend(ctx.log.regime_rows(regime.regime_num, &ctx.config.perf_measure));
            }

            let perf = block_saturation(
                &rows,
                None,
                ctx.config.window_kind(),
                ctx.config.window_length,
            )?;
            if perf.episodes_to == 0 {
                warn!(task, "saturation not achieved, skipping sample efficiency");
                continue;
            }

            let Some(ratios) = self.ratios(task, perf.value, perf.episodes_to, ctx, store)? else {
                warn!(task, "no usable STE runs, skipping sample efficiency");
                continue;
            };

            let values = metrics.se_values_mut(task);
            values.task_saturation = Some(perf.value);
            values.task_exp_to_sat = Some(perf.episodes_to);
            values.saturation_vals = ratios.saturation.clone();
            values.exp_to_sat_vals = ratios.eps_to_sat.clone();
            values.sample_efficiency_vals = ratios.efficiency.clone();

            if let Some(row) = metrics.row_mut(last_regime) {
                row.se_saturation = Some(mean(&ratios.saturation));
                row.se_eps_to_sat = Some(mean(&ratios.eps_to_sat));
                row.sample_efficiency = Some(mean(&ratios.efficiency));
                written += 3;
            }
        }

        Ok(written)
    }
}
