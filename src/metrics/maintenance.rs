//! Performance maintenance
//!
//! For each evaluation of a previously trained task, how much performance
//! was lost since that training. Two reference policies exist: `mrlep`
//! compares saturation values, `mrtlp` compares terminal performance.
//!
//! Only the FIRST prior training occurrence of a task is used as the
//! reference, even when the task was retrained in between. Comparing later
//! occurrences as well is an open question in the metric definition; this
//! implementation keeps the single-reference behavior.

use tracing::debug;

use crate::config::MaintenanceMethod;
use crate::Result;

use super::{Metric, MetricContext, RunningMetrics};

/// Maintenance of performance on previously trained tasks.
#[derive(Debug)]
pub struct PerformanceMaintenance {
    method: MaintenanceMethod,
}

impl PerformanceMaintenance {
    /// Create the module with the configured reference policy.
    #[must_use]
    pub const fn new(method: MaintenanceMethod) -> Self {
        Self { method }
    }
}

impl Metric for PerformanceMaintenance {
    fn name(&self) -> &'static str {
        "performance_maintenance"
    }

    fn fill(&self, ctx: &MetricContext<'_>, metrics: &mut RunningMetrics) -> Result<usize> {
        let mut phases: Vec<usize> = ctx.regimes.rows().iter().map(|r| r.phase_number).collect();
        phases.sort_unstable();
        phases.dedup();

        // (task, first training regime), appended in phase order.
        let mut trained: Vec<(String, usize)> = Vec::new();
        let mut written = 0;

        for phase in phases {
            for regime in ctx
                .regimes
                .rows()
                .iter()
                .filter(|r| r.phase_number == phase && r.is_train())
            {
                trained.push((regime.task_name.clone(), regime.regime_num));
            }

            for regime in ctx
                .regimes
                .rows()
                .iter()
                .filter(|r| r.phase_number == phase && r.is_test())
            {
                // First prior occurrence only.
                let Some(&(_, train_regime)) = trained
                    .iter()
                    .find(|(task, _)| *task == regime.task_name)
                else {
                    continue;
                };

                let (Some(train_row), Some(test_row)) =
                    (metrics.row(train_regime), metrics.row(regime.regime_num))
                else {
                    continue;
                };

                let mrlep = train_row
                    .saturation
                    .zip(test_row.saturation)
                    .map(|(reference, current)| reference - current);
                let mrtlp = train_row
                    .term_perf
                    .zip(test_row.term_perf)
                    .map(|(reference, current)| reference - current);

                if mrlep.is_none() && mrtlp.is_none() {
                    debug!(
                        task = %regime.task_name,
                        regime = regime.regime_num,
                        "no saturation cells to compare, skipping maintenance"
                    );
                    continue;
                }

                let wants_mrlep = self.method.wants_mrlep();
                let wants_mrtlp = self.method.wants_mrtlp();
                let Some(row) = metrics.row_mut(regime.regime_num) else {
                    continue;
                };
                if wants_mrlep {
                    if let Some(value) = mrlep {
                        row.perf_maintenance_mrlep = Some(value);
                        written += 1;
                    }
                }
                if wants_mrtlp {
                    if let Some(value) = mrtlp {
                        row.perf_maintenance_mrtlp = Some(value);
                        written += 1;
                    }
                }
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{build_log, LogSpec};
    use super::*;
    use crate::data::{BlockType, RegimeTable};
    use crate::MetricsConfig;

    fn two_phase_metrics(method: MaintenanceMethod) -> RunningMetrics {
        // Phase 0 trains x, phase 1 evaluates x.
        let log = build_log(&[
            LogSpec {
                task: "x",
                block_type: BlockType::Train,
                phase: 0,
                values: vec![5.0; 10],
            },
            LogSpec {
                task: "x",
                block_type: BlockType::Test,
                phase: 1,
                values: vec![3.0; 10],
            },
        ]);
        let regimes = RegimeTable::from_log(&log);
        let config = MetricsConfig::default();
        let ctx = MetricContext {
            log: &log,
            regimes: &regimes,
            ste: None,
            config: &config,
        };
        let mut metrics = RunningMetrics::new(&regimes);
        metrics.row_mut(0).unwrap().saturation = Some(5.0);
        metrics.row_mut(0).unwrap().term_perf = Some(4.5);
        metrics.row_mut(1).unwrap().saturation = Some(3.0);
        metrics.row_mut(1).unwrap().term_perf = Some(3.0);

        PerformanceMaintenance::new(method)
            .fill(&ctx, &mut metrics)
            .unwrap();
        metrics
    }

    #[test]
    fn test_mrlep_compares_saturations() {
        let metrics = two_phase_metrics(MaintenanceMethod::Mrlep);
        let row = metrics.row(1).unwrap();
        assert!((row.perf_maintenance_mrlep.unwrap() - 2.0).abs() < 1e-12);
        assert!(row.perf_maintenance_mrtlp.is_none());
    }

    #[test]
    fn test_mrtlp_compares_terminal_values() {
        let metrics = two_phase_metrics(MaintenanceMethod::Mrtlp);
        let row = metrics.row(1).unwrap();
        assert!((row.perf_maintenance_mrtlp.unwrap() - 1.5).abs() < 1e-12);
        assert!(row.perf_maintenance_mrlep.is_none());
    }

    #[test]
    fn test_both_fills_both_columns() {
        let metrics = two_phase_metrics(MaintenanceMethod::Both);
        let row = metrics.row(1).unwrap();
        assert!(row.perf_maintenance_mrlep.is_some());
        assert!(row.perf_maintenance_mrtlp.is_some());
    }

    #[test]
    fn test_untrained_task_is_skipped() {
        // y is evaluated without ever being trained.
        let log = build_log(&[
            LogSpec {
                task: "x",
                block_type: BlockType::Train,
                phase: 0,
                values: vec![5.0; 10],
            },
            LogSpec {
                task: "y",
                block_type: BlockType::Test,
                phase: 1,
                values: vec![3.0; 10],
            },
        ]);
        let regimes = RegimeTable::from_log(&log);
        let config = MetricsConfig::default();
        let ctx = MetricContext {
            log: &log,
            regimes: &regimes,
            ste: None,
            config: &config,
        };
        let mut metrics = RunningMetrics::new(&regimes);
        metrics.row_mut(0).unwrap().saturation = Some(5.0);
        metrics.row_mut(1).unwrap().saturation = Some(3.0);

        let written = PerformanceMaintenance::new(MaintenanceMethod::Mrlep)
            .fill(&ctx, &mut metrics)
            .unwrap();
        assert_eq!(written, 0);
        assert!(metrics.row(1).unwrap().perf_maintenance_mrlep.is_none());
    }

    #[test]
    fn test_first_prior_occurrence_is_the_reference() {
        // x trained in phases 0 and 1, evaluated in phase 2: the phase-0
        // training is the reference.
        let log = build_log(&[
            LogSpec {
                task: "x",
                block_type: BlockType::Train,
                phase: 0,
                values: vec![5.0; 10],
            },
            LogSpec {
                task: "x",
                block_type: BlockType::Train,
                phase: 1,
                values: vec![9.0; 10],
            },
            LogSpec {
                task: "x",
                block_type: BlockType::Test,
                phase: 2,
                values: vec![3.0; 10],
            },
        ]);
        let regimes = RegimeTable::from_log(&log);
        let config = MetricsConfig::default();
        let ctx = MetricContext {
            log: &log,
            regimes: &regimes,
            ste: None,
            config: &config,
        };
        let mut metrics = RunningMetrics::new(&regimes);
        metrics.row_mut(0).unwrap().saturation = Some(5.0);
        metrics.row_mut(1).unwrap().saturation = Some(9.0);
        metrics.row_mut(2).unwrap().saturation = Some(3.0);

        PerformanceMaintenance::new(MaintenanceMethod::Mrlep)
            .fill(&ctx, &mut metrics)
            .unwrap();
        assert!((metrics.row(2).unwrap().perf_maintenance_mrlep.unwrap() - 2.0).abs() < 1e-12);
    }
}
