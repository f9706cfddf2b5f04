//! Batch evaluation over many runs
//!
//! Walks an evaluation directory laid out as
//! `eval_dir/agent_config*/ll_logs/[<scenario_group>/]<run>`, computes one
//! report per run directory, and writes the aggregated artifacts. Reports
//! are independent, so runs are computed in parallel at run granularity; a
//! failed run is logged and skipped, the batch continues.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::MetricsConfig;
use crate::io::{self, ScenarioInfo};
use crate::report::{ComputedReport, LifetimeSummary, MetricsReport};
use crate::ste::SteStore;
use crate::Result;

/// Subdirectory of an agent config holding lifelong-learning runs.
const LL_LOGS_DIR: &str = "ll_logs";
/// Subdirectory of an agent config holding single-task-expert runs.
const STE_LOGS_DIR: &str = "ste_logs";
/// Output subdirectory the STE store is persisted to.
const TASK_INFO_DIR: &str = "taskinfo";

/// What to evaluate and where to put the results.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Evaluation directory containing `agent_config*` subdirectories
    pub eval_dir: PathBuf,
    /// Restrict evaluation to one agent config directory name; empty = all
    pub agent_config_dir: String,
    /// Restrict STE storing to one agent config directory name; empty = all
    pub ste_dir: String,
    /// Store STE data found under `ste_logs` directories
    pub do_store_ste: bool,
    /// Directory the output artifacts are written to
    pub output_dir: PathBuf,
    /// Base name of the output artifacts
    pub output_name: String,
    /// Write the evaluation settings next to the artifacts
    pub save_settings: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            eval_dir: PathBuf::new(),
            agent_config_dir: String::new(),
            ste_dir: String::new(),
            do_store_ste: true,
            output_dir: PathBuf::from("results"),
            output_name: "ll_metrics".to_string(),
            save_settings: true,
        }
    }
}

/// One successfully computed run.
pub struct RunResult {
    /// Scenario identity, including batch-assigned group and agent config
    pub scenario: ScenarioInfo,
    /// The frozen report
    pub report: ComputedReport,
}

/// Outcome of a batch evaluation.
pub struct BatchSummary {
    /// Computed runs, sorted by scenario identity
    pub runs: Vec<RunResult>,
    /// Number of run directories that failed and were skipped
    pub failed: usize,
}

/// One run directory found by the walker.
struct RunEntry {
    agent_config: String,
    sg_name: String,
    dir: PathBuf,
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Agent config directories under the evaluation directory, honoring the
/// name filter.
fn agent_config_dirs(eval_dir: &Path, filter: &str) -> Result<Vec<PathBuf>> {
    Ok(subdirs(eval_dir)?
        .into_iter()
        .filter(|d| dir_name(d).starts_with("agent_config"))
        .filter(|d| filter.is_empty() || dir_name(d) == filter)
        .collect())
}

/// Find every run directory under the agent configs' `ll_logs` trees.
///
/// A run directory either sits directly under `ll_logs` or one level deeper
/// under a scenario-group directory, which then names the group.
fn collect_runs(eval_dir: &Path, agent_config_filter: &str) -> Result<Vec<RunEntry>> {
    let mut runs = Vec::new();
    for agent_dir in agent_config_dirs(eval_dir, agent_config_filter)? {
        let ll_logs = agent_dir.join(LL_LOGS_DIR);
        if !ll_logs.is_dir() {
            warn!(agent_config = %dir_name(&agent_dir), "no ll_logs directory, skipping");
            continue;
        }
        for path in subdirs(&ll_logs)? {
            if io::is_run_dir(&path) {
                runs.push(RunEntry {
                    agent_config: dir_name(&agent_dir),
                    sg_name: dir_name(&path),
                    dir: path,
                });
            } else {
                for sub in subdirs(&path)? {
                    if io::is_run_dir(&sub) {
                        runs.push(RunEntry {
                            agent_config: dir_name(&agent_dir),
                            sg_name: dir_name(&path),
                            dir: sub,
                        });
                    }
                }
            }
        }
    }
    Ok(runs)
}

/// Build the STE store from every `ste_logs` run found under the agent
/// configs, honoring the STE directory filter.
fn build_ste_store(
    eval_dir: &Path,
    ste_filter: &str,
    perf_measure: &str,
) -> Result<SteStore> {
    let mut store = SteStore::new();
    for agent_dir in agent_config_dirs(eval_dir, ste_filter)? {
        let ste_logs = agent_dir.join(STE_LOGS_DIR);
        if !ste_logs.is_dir() {
            continue;
        }
        for path in subdirs(&ste_logs)? {
            if !io::is_run_dir(&path) {
                continue;
            }
            match io::read_log_dir(&path, perf_measure) {
                Ok((log, _)) => {
                    if let Err(e) = store.add_run(&log, perf_measure) {
                        warn!(dir = %path.display(), error = %e, "skipping STE run");
                    }
                }
                Err(e) => warn!(dir = %path.display(), error = %e, "skipping STE run"),
            }
        }
    }
    Ok(store)
}

/// Compute one run directory into a result.
fn compute_run(
    entry: &RunEntry,
    config: &MetricsConfig,
    ste: Option<Arc<SteStore>>,
) -> Result<RunResult> {
    let (log, mut scenario) = io::read_log_dir(&entry.dir, &config.perf_measure)?;
    scenario.sg_name = entry.sg_name.clone();
    scenario.agent_config = entry.agent_config.clone();

    let report = MetricsReport::new(log, scenario.clone(), config.clone(), ste)?.calculate();
    Ok(RunResult { scenario, report })
}

/// Evaluate every run under the evaluation directory and write the output
/// artifacts.
///
/// # Errors
///
/// Directory walking and artifact writing errors are fatal; individual run
/// failures are logged and counted, not propagated.
pub fn evaluate_batch(options: &BatchOptions, config: &MetricsConfig) -> Result<BatchSummary> {
    let ste = build_ste_store(&options.eval_dir, &options.ste_dir, &config.perf_measure)?;
    let ste = (!ste.is_empty()).then(|| Arc::new(ste));

    if options.do_store_ste {
        if let Some(store) = &ste {
            store.save_dir(&options.output_dir.join(TASK_INFO_DIR))?;
        }
    }

    let entries = collect_runs(&options.eval_dir, &options.agent_config_dir)?;
    info!(runs = entries.len(), "computing batch metrics");

    let results: Vec<Option<RunResult>> = entries
        .par_iter()
        .map(|entry| match compute_run(entry, config, ste.clone()) {
            Ok(result) => Some(result),
            Err(e) => {
                error!(dir = %entry.dir.display(), error = %e, "run failed, skipping");
                None
            }
        })
        .collect();

    let failed = results.iter().filter(|r| r.is_none()).count();
    let mut runs: Vec<RunResult> = results.into_iter().flatten().collect();
    runs.sort_by(|a, b| {
        let key = |s: &ScenarioInfo| {
            (
                s.scenario_type.clone(),
                s.complexity.clone(),
                s.difficulty.clone(),
                s.agent_config.clone(),
                s.run_id.clone(),
            )
        };
        key(&a.scenario).cmp(&key(&b.scenario))
    });

    write_artifacts(options, config, &runs)?;
    info!(
        computed = runs.len(),
        failed, "batch evaluation finished"
    );
    Ok(BatchSummary { runs, failed })
}

fn opt_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(Into::into)
}

fn write_lifetime_tsv(path: &Path, runs: &[RunResult]) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record([
        "sg_name",
        "agent_config",
        "run_id",
        "scenario_type",
        "complexity",
        "difficulty",
        "metrics_column",
        "min",
        "max",
        "num_lx",
        "num_ex",
        "saturation",
        "eps_to_sat",
        "term_perf",
        "eps_to_term",
        "recovery_time",
        "perf_recovery",
        "perf_maintenance_mrlep",
        "perf_maintenance_mrtlp",
        "forward_transfer_ratio",
        "forward_transfer_contrast",
        "backward_transfer_ratio",
        "backward_transfer_contrast",
        "ste_rel_perf",
        "sample_efficiency",
    ])?;
    for run in runs {
        let m = run.report.lifetime_metrics();
        writer.write_record([
            run.scenario.sg_name.clone(),
            run.scenario.agent_config.clone(),
            m.run_id.clone(),
            m.scenario_type.clone(),
            m.complexity.clone(),
            m.difficulty.clone(),
            m.metrics_column.clone(),
            opt_cell(m.min),
            opt_cell(m.max),
            m.num_lx.to_string(),
            m.num_ex.to_string(),
            opt_cell(m.saturation),
            opt_cell(m.eps_to_sat),
            opt_cell(m.term_perf),
            opt_cell(m.eps_to_term),
            opt_cell(m.recovery_time),
            opt_cell(m.perf_recovery),
            opt_cell(m.perf_maintenance_mrlep),
            opt_cell(m.perf_maintenance_mrtlp),
            opt_cell(m.forward_transfer_ratio),
            opt_cell(m.forward_transfer_contrast),
            opt_cell(m.backward_transfer_ratio),
            opt_cell(m.backward_transfer_contrast),
            opt_cell(m.ste_rel_perf),
            opt_cell(m.sample_efficiency),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_regime_tsv(path: &Path, runs: &[RunResult]) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record([
        "sg_name",
        "agent_config",
        "run_id",
        "regime_num",
        "block_num",
        "block_type",
        "block_subtype",
        "phase_number",
        "task_name",
        "episode_count",
        "saturation",
        "eps_to_sat",
        "term_perf",
        "eps_to_term",
        "recovery_time",
        "perf_maintenance_mrlep",
        "perf_maintenance_mrtlp",
        "forward_transfer_ratio",
        "forward_transfer_contrast",
        "backward_transfer_ratio",
        "backward_transfer_contrast",
        "ste_rel_perf",
        "se_saturation",
        "se_eps_to_sat",
        "sample_efficiency",
    ])?;
    for run in runs {
        let metrics = run.report.regime_metrics();
        for regime in run.report.regimes().rows() {
            let Some(row) = metrics.row(regime.regime_num) else {
                continue;
            };
            writer.write_record([
                run.scenario.sg_name.clone(),
                run.scenario.agent_config.clone(),
                run.scenario.run_id.clone(),
                regime.regime_num.to_string(),
                regime.block_num.to_string(),
                regime.block_type.to_string(),
                regime.block_subtype.clone(),
                regime.phase_number.to_string(),
                regime.task_name.clone(),
                regime.episode_count.to_string(),
                opt_cell(row.saturation),
                opt_cell(row.eps_to_sat.map(|v| v as f64)),
                opt_cell(row.term_perf),
                opt_cell(row.eps_to_term.map(|v| v as f64)),
                opt_cell(row.recovery_time),
                opt_cell(row.perf_maintenance_mrlep),
                opt_cell(row.perf_maintenance_mrtlp),
                opt_cell(row.forward_transfer_ratio),
                opt_cell(row.forward_transfer_contrast),
                opt_cell(row.backward_transfer_ratio),
                opt_cell(row.backward_transfer_contrast),
                opt_cell(row.ste_rel_perf),
                opt_cell(row.se_saturation),
                opt_cell(row.se_eps_to_sat),
                opt_cell(row.sample_efficiency),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_data_tsv(path: &Path, runs: &[RunResult], perf_measure: &str) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record([
        "sg_name",
        "agent_config",
        "run_id",
        "regime_num",
        "exp_num",
        "worker_id",
        "block_num",
        "block_type",
        "block_subtype",
        "phase_number",
        "task_name",
        perf_measure,
    ])?;
    for run in runs {
        for record in run.report.log_data().records() {
            writer.write_record([
                run.scenario.sg_name.clone(),
                run.scenario.agent_config.clone(),
                run.scenario.run_id.clone(),
                record.regime_num.to_string(),
                record.exp_num.to_string(),
                record.worker_id.clone(),
                record.block_num.to_string(),
                record.block_type.to_string(),
                record.block_subtype.clone(),
                record.phase_number.to_string(),
                record.task_name.clone(),
                opt_cell(record.measure(perf_measure)),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct SummaryEntry<'a> {
    sg_name: &'a str,
    agent_config: &'a str,
    #[serde(flatten)]
    summary: &'a LifetimeSummary,
}

fn write_summary_json(path: &Path, runs: &[RunResult]) -> Result<()> {
    let entries: Vec<SummaryEntry<'_>> = runs
        .iter()
        .map(|run| SummaryEntry {
            sg_name: &run.scenario.sg_name,
            agent_config: &run.scenario.agent_config,
            summary: run.report.lifetime_summary(),
        })
        .collect();
    let file = std::fs::File::create(path)?;
    serde_json::to_writer(file, &entries)?;
    Ok(())
}

/// Write the four aggregated artifacts plus the settings file.
fn write_artifacts(
    options: &BatchOptions,
    config: &MetricsConfig,
    runs: &[RunResult],
) -> Result<()> {
    std::fs::create_dir_all(&options.output_dir)?;
    let base = options.output_dir.join(&options.output_name);

    write_lifetime_tsv(&base.with_extension("tsv"), runs)?;
    write_summary_json(&base.with_extension("json"), runs)?;
    write_regime_tsv(
        &options
            .output_dir
            .join(format!("{}_regime.tsv", options.output_name)),
        runs,
    )?;
    write_data_tsv(
        &options
            .output_dir
            .join(format!("{}_data.tsv", options.output_name)),
        runs,
        &config.perf_measure,
    )?;
    if options.save_settings {
        io::save_settings(
            &options
                .output_dir
                .join(format!("{}_settings.json", options.output_name)),
            config,
        )?;
    }
    Ok(())
}
