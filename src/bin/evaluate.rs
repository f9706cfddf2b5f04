//! Batch evaluation CLI
//!
//! Walks an evaluation directory of lifelong-learning experiment logs,
//! computes metrics for every run, and writes the aggregated artifacts.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use medir::batch::{evaluate_batch, BatchOptions};
use medir::config::{
    AggregationMethod, MaintenanceMethod, MetricsConfig, NormalizationMethod, SmoothingMethod,
    SteAveragingMethod, TransferMethod, VariantMode,
};
use medir::io;

#[derive(Parser)]
#[command(name = "evaluate")]
#[command(about = "Compute lifelong-learning metrics from experiment logs", long_about = None)]
#[command(version)]
struct Cli {
    /// Evaluation directory containing logs
    #[arg(short = 'l', long, default_value = "")]
    eval_dir: PathBuf,

    /// Agent configuration directory of data; empty evaluates all
    #[arg(short = 'f', long, default_value = "")]
    agent_config_dir: String,

    /// Agent configuration directory of STE data; empty stores all
    #[arg(short = 's', long, default_value = "")]
    ste_dir: String,

    /// Mode for computing metrics with respect to task variants
    #[arg(short = 'r', long, default_value = "aware", value_parser = VariantMode::from_str)]
    variant_mode: VariantMode,

    /// Method for handling multiple STE runs
    #[arg(short = 'v', long, default_value = "metrics", value_parser = SteAveragingMethod::from_str)]
    ste_averaging_method: SteAveragingMethod,

    /// Name of column to use for metrics calculations
    #[arg(short = 'p', long, default_value = "reward")]
    perf_measure: String,

    /// Method for aggregating within-lifetime metrics
    #[arg(short = 'a', long, default_value = "mean", value_parser = AggregationMethod::from_str)]
    aggregation_method: AggregationMethod,

    /// Method for computing performance maintenance
    #[arg(short = 'm', long, default_value = "mrlep", value_parser = MaintenanceMethod::from_str)]
    maintenance_method: MaintenanceMethod,

    /// Method for computing forward and backward transfer
    #[arg(short = 't', long, default_value = "ratio", value_parser = TransferMethod::from_str)]
    transfer_method: TransferMethod,

    /// Method for normalizing data
    #[arg(short = 'n', long, default_value = "task", value_parser = NormalizationMethod::from_str)]
    normalization_method: NormalizationMethod,

    /// Method for smoothing data, window type
    #[arg(short = 'g', long, default_value = "flat", value_parser = SmoothingMethod::from_str)]
    smoothing_method: SmoothingMethod,

    /// Window length for smoothing data
    #[arg(short = 'w', long)]
    window_length: Option<usize>,

    /// Clamp outliers in data to quantiles
    #[arg(short = 'x', long)]
    clamp_outliers: bool,

    /// JSON file containing task performance ranges for normalization
    #[arg(short = 'd', long)]
    data_range_file: Option<PathBuf>,

    /// Directory for output files
    #[arg(short = 'O', long, default_value = "results")]
    output_dir: PathBuf,

    /// Output filename for results
    #[arg(short = 'o', long, default_value = "ll_metrics")]
    output: String,

    /// Store STE data found in the evaluation directory (default)
    #[arg(short = 'T', long, overrides_with = "no_store_ste")]
    do_store_ste: bool,

    /// Do not store STE data
    #[arg(long, overrides_with = "do_store_ste")]
    no_store_ste: bool,

    /// Load evaluation settings from a JSON file; flags are ignored for
    /// the options the file covers
    #[arg(short = 'c', long)]
    load_settings: Option<PathBuf>,

    /// Do not save evaluation settings next to the outputs
    #[arg(long)]
    no_save_settings: bool,
}

impl Cli {
    fn config(&self) -> Result<MetricsConfig> {
        let mut config = match &self.load_settings {
            Some(path) => io::load_settings(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => MetricsConfig {
                variant_mode: self.variant_mode,
                ste_averaging_method: self.ste_averaging_method,
                perf_measure: self.perf_measure.clone(),
                aggregation_method: self.aggregation_method,
                maintenance_method: self.maintenance_method,
                transfer_method: self.transfer_method,
                normalization_method: self.normalization_method,
                smoothing_method: self.smoothing_method,
                window_length: self.window_length,
                clamp_outliers: self.clamp_outliers,
                data_range: None,
            },
        };

        if let Some(path) = &self.data_range_file {
            let ranges = io::load_data_range(path)
                .with_context(|| format!("loading data ranges from {}", path.display()))?;
            config.data_range = Some(ranges);
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    let options = BatchOptions {
        eval_dir: cli.eval_dir.clone(),
        agent_config_dir: cli.agent_config_dir.clone(),
        ste_dir: cli.ste_dir.clone(),
        do_store_ste: cli.do_store_ste || !cli.no_store_ste,
        output_dir: cli.output_dir.clone(),
        output_name: cli.output.clone(),
        save_settings: !cli.no_save_settings,
    };

    let summary = evaluate_batch(&options, &config).context("batch evaluation failed")?;

    println!(
        "Computed {} run(s), {} failed; results written to {}",
        summary.runs.len(),
        summary.failed,
        options.output_dir.display()
    );
    Ok(())
}
