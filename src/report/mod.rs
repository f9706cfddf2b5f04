//! Metrics report orchestration
//!
//! One [`MetricsReport`] per run. Construction validates and preprocesses
//! the episode log and fixes the metric module list from the scenario's
//! syllabus subtype; [`MetricsReport::calculate`] consumes the report, runs
//! the modules in declaration order against the shared accumulator, and
//! returns an immutable [`ComputedReport`]. Recomputation needs a fresh
//! instance, which the consuming signature enforces.
//!
//! A module failure never aborts the report: the orchestrator restores the
//! accumulator the module started from, records the failure in the coverage
//! summary, and moves on.

mod summary;

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{DataRange, MetricsConfig};
use crate::data::{EpisodeLog, RegimeTable};
use crate::io::ScenarioInfo;
use crate::metrics::{
    Metric, MetricContext, ModuleReport, ModuleStatus, PerformanceMaintenance,
    PerformanceRecovery, RecoveryTime, RunningMetrics, SampleEfficiency, SteRelativePerf,
    Transfer, WithinBlockSaturation,
};
use crate::ste::SteStore;
use crate::{Error, Result};

pub use summary::{LifetimeMetrics, LifetimeSummary, TaskSummary};

/// Scenario taxonomy key selecting the applicable metric modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyllabusSubtype {
    /// Plain continual-learning syllabus, no STE comparison
    #[serde(rename = "CL")]
    Cl,
    /// Adapting-to-new-tasks syllabus, full module list
    #[serde(rename = "ANT_A")]
    AntA,
    /// Adapting-to-new-tasks syllabus, saturation and STE comparison only
    #[serde(rename = "ANT_B")]
    AntB,
    /// Like `ANT_B`, reserved for harder task orderings
    #[serde(rename = "ANT_C")]
    AntC,
}

impl SyllabusSubtype {
    /// Name as it appears in scenario info files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cl => "CL",
            Self::AntA => "ANT_A",
            Self::AntB => "ANT_B",
            Self::AntC => "ANT_C",
        }
    }

    /// The fixed, ordered module list for this subtype.
    fn modules(self, config: &MetricsConfig) -> Vec<Box<dyn Metric>> {
        match self {
            Self::Cl => vec![
                Box::new(WithinBlockSaturation) as Box<dyn Metric>,
                Box::new(RecoveryTime),
                Box::new(PerformanceRecovery),
                Box::new(PerformanceMaintenance::new(config.maintenance_method)),
                Box::new(Transfer::new(config.transfer_method)),
            ],
            Self::AntA => vec![
                Box::new(WithinBlockSaturation) as Box<dyn Metric>,
                Box::new(RecoveryTime),
                Box::new(PerformanceRecovery),
                Box::new(PerformanceMaintenance::new(config.maintenance_method)),
                Box::new(SteRelativePerf::new(config.ste_averaging_method)),
                Box::new(SampleEfficiency::new(config.ste_averaging_method)),
            ],
            Self::AntB | Self::AntC => vec![
                Box::new(WithinBlockSaturation) as Box<dyn Metric>,
                Box::new(SteRelativePerf::new(config.ste_averaging_method)),
                Box::new(SampleEfficiency::new(config.ste_averaging_method)),
            ],
        }
    }
}

impl FromStr for SyllabusSubtype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CL" => Ok(Self::Cl),
            "ANT_A" => Ok(Self::AntA),
            "ANT_B" => Ok(Self::AntB),
            "ANT_C" => Ok(Self::AntC),
            _ => Err(Error::UnsupportedScenario(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyllabusSubtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run's metrics computation, between data loading and calculation.
#[derive(Debug)]
pub struct MetricsReport {
    log: EpisodeLog,
    regimes: RegimeTable,
    scenario: ScenarioInfo,
    subtype: SyllabusSubtype,
    config: MetricsConfig,
    ste: Option<Arc<SteStore>>,
    normalization_ranges: Option<BTreeMap<String, DataRange>>,
}

impl MetricsReport {
    /// Load a run into a report: preprocess the log, derive the regime
    /// table, and fix the module list from the scenario type.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedScenario`] for an unrecognized scenario type
    /// - [`Error::InvalidConfig`] from preprocessing (degenerate data range)
    pub fn new(
        mut log: EpisodeLog,
        scenario: ScenarioInfo,
        config: MetricsConfig,
        ste: Option<Arc<SteStore>>,
    ) -> Result<Self> {
        let subtype: SyllabusSubtype = scenario.scenario_type.parse()?;
        let normalization_ranges = log.preprocess(&config)?;
        let regimes = RegimeTable::from_log(&log);
        debug!(
            run_id = %scenario.run_id,
            subtype = %subtype,
            regimes = regimes.len(),
            "report loaded"
        );
        Ok(Self {
            log,
            regimes,
            scenario,
            subtype,
            config,
            ste,
            normalization_ranges,
        })
    }

    /// The preprocessed episode log.
    #[must_use]
    pub const fn log_data(&self) -> &EpisodeLog {
        &self.log
    }

    /// The per-regime metadata table.
    #[must_use]
    pub const fn regimes(&self) -> &RegimeTable {
        &self.regimes
    }

    /// Run all applicable metric modules, in order, and freeze the result.
    ///
    /// Modules run strictly sequentially; each one receives the accumulator
    /// the previous module returned. A failing module is logged, recorded in
    /// the coverage summary, and leaves the accumulator untouched.
    #[must_use]
    pub fn calculate(self) -> ComputedReport {
        let mut metrics = RunningMetrics::new(&self.regimes);
        let mut coverage = Vec::new();
        let ctx = MetricContext {
            log: &self.log,
            regimes: &self.regimes,
            ste: self.ste.as_deref(),
            config: &self.config,
        };

        for module in self.subtype.modules(&self.config) {
            let snapshot = metrics.clone();
            let report = match module.fill(&ctx, &mut metrics) {
                Ok(0) => ModuleReport {
                    module: module.name(),
                    status: ModuleStatus::Skipped,
                    values_written: 0,
                    detail: None,
                },
                Ok(written) => ModuleReport {
                    module: module.name(),
                    status: ModuleStatus::Computed,
                    values_written: written,
                    detail: None,
                },
                Err(e) => {
                    warn!(module = module.name(), error = %e, "metric module failed");
                    metrics = snapshot;
                    ModuleReport {
                        module: module.name(),
                        status: ModuleStatus::Failed,
                        values_written: 0,
                        detail: Some(e.to_string()),
                    }
                }
            };
            debug!(
                module = report.module,
                status = ?report.status,
                values = report.values_written,
                "module finished"
            );
            coverage.push(report);
        }

        let lifetime = summary::lifetime_metrics(&self.log, &metrics, &self.scenario, &self.config);
        let summary = summary::lifetime_summary(
            &self.log,
            &self.regimes,
            &metrics,
            &self.scenario,
            &self.config,
            self.normalization_ranges,
        );
        info!(
            run_id = %self.scenario.run_id,
            computed = coverage
                .iter()
                .filter(|r| r.status == ModuleStatus::Computed)
                .count(),
            failed = coverage
                .iter()
                .filter(|r| r.status == ModuleStatus::Failed)
                .count(),
            "report calculated"
        );

        ComputedReport {
            log: self.log,
            regimes: self.regimes,
            scenario: self.scenario,
            metrics,
            coverage,
            lifetime,
            summary,
        }
    }
}

/// An immutable, fully calculated report.
#[derive(Debug)]
pub struct ComputedReport {
    log: EpisodeLog,
    regimes: RegimeTable,
    scenario: ScenarioInfo,
    metrics: RunningMetrics,
    coverage: Vec<ModuleReport>,
    lifetime: LifetimeMetrics,
    summary: LifetimeSummary,
}

impl ComputedReport {
    /// Flat run-level scalar summary.
    #[must_use]
    pub const fn lifetime_metrics(&self) -> &LifetimeMetrics {
        &self.lifetime
    }

    /// Nested per-task summary, JSON-serializable.
    #[must_use]
    pub const fn lifetime_summary(&self) -> &LifetimeSummary {
        &self.summary
    }

    /// Dense per-regime metric cells.
    #[must_use]
    pub const fn regime_metrics(&self) -> &RunningMetrics {
        &self.metrics
    }

    /// Per-regime metadata matching [`Self::regime_metrics`].
    #[must_use]
    pub const fn regimes(&self) -> &RegimeTable {
        &self.regimes
    }

    /// The merged, preprocessed episode log the metrics were computed from.
    #[must_use]
    pub const fn log_data(&self) -> &EpisodeLog {
        &self.log
    }

    /// Scenario identity of the run.
    #[must_use]
    pub const fn scenario(&self) -> &ScenarioInfo {
        &self.scenario
    }

    /// Per-module computation coverage.
    #[must_use]
    pub fn coverage(&self) -> &[ModuleReport] {
        &self.coverage
    }
}
