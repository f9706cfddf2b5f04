//! Integration test for the full report pipeline:
//! 1. Write run directories in the on-disk log layout
//! 2. Read and merge the TSV logs
//! 3. Compute a report per run
//! 4. Aggregate the batch and check the written artifacts

use std::path::Path;

use medir::batch::{evaluate_batch, BatchOptions};
use medir::config::{MetricsConfig, NormalizationMethod, SmoothingMethod};
use medir::io::{
    read_log_dir, DATA_LOG_FILE, LOGGER_INFO_FILE, REGIME_LOG_FILE, SCENARIO_INFO_FILE,
};
use medir::metrics::ModuleStatus;
use medir::MetricsReport;

/// One block of episodes to lay out in a synthetic run directory.
struct Block {
    task: &'static str,
    block_type: &'static str,
    phase: usize,
    values: Vec<f64>,
}

/// Write a run directory from block specs, numbering blocks and episodes.
fn write_run_dir(dir: &Path, scenario_type: &str, blocks: &[Block]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(LOGGER_INFO_FILE),
        r#"{"metrics_columns": ["reward"]}"#,
    )
    .unwrap();
    std::fs::write(
        dir.join(SCENARIO_INFO_FILE),
        format!(
            r#"{{"scenario_type": "{scenario_type}", "complexity": "medium", "difficulty": "easy"}}"#
        ),
    )
    .unwrap();

    let mut data = String::from("phase_number\tworker_id\tblock_num\ttask_name\texp_num\treward\n");
    let mut regime =
        String::from("phase_number\tworker_id\tblock_num\ttask_name\tblock_type\tblock_subtype\n");
    let mut exp_num = 0u64;
    for (block_num, block) in blocks.iter().enumerate() {
        regime.push_str(&format!(
            "{}\tworker-0\t{}\t{}\t{}\twake\n",
            block.phase, block_num, block.task, block.block_type
        ));
        for value in &block.values {
            data.push_str(&format!(
                "{}\tworker-0\t{}\t{}\t{}\t{}\n",
                block.phase, block_num, block.task, exp_num, value
            ));
            exp_num += 1;
        }
    }
    std::fs::write(dir.join(DATA_LOG_FILE), data).unwrap();
    std::fs::write(dir.join(REGIME_LOG_FILE), regime).unwrap();
}

fn ramp(to: f64, len: usize) -> Vec<f64> {
    (0..len).map(|i| to * i as f64 / (len - 1) as f64).collect()
}

fn raw_config() -> MetricsConfig {
    MetricsConfig {
        smoothing_method: SmoothingMethod::None,
        normalization_method: NormalizationMethod::None,
        ..MetricsConfig::default()
    }
}

#[test]
fn test_single_run_maintenance_scenario() {
    // Phase 1 trains task X to saturation 5.0, phase 2 evaluates it at 3.0:
    // maintenance must be exactly 2.0.
    let dir = tempfile::tempdir().unwrap();
    write_run_dir(
        dir.path(),
        "CL",
        &[
            Block {
                task: "x",
                block_type: "train",
                phase: 1,
                values: vec![5.0; 20],
            },
            Block {
                task: "x",
                block_type: "test",
                phase: 2,
                values: vec![3.0; 10],
            },
        ],
    );

    let config = raw_config();
    let (log, scenario) = read_log_dir(dir.path(), &config.perf_measure).unwrap();
    let computed = MetricsReport::new(log, scenario, config, None)
        .unwrap()
        .calculate();

    let lifetime = computed.lifetime_metrics();
    assert!((lifetime.perf_maintenance_mrlep.unwrap() - 2.0).abs() < 1e-12);
    assert_eq!(lifetime.num_lx, 20);
    assert_eq!(lifetime.num_ex, 10);

    let task = &computed.lifetime_summary().task_metrics["x"];
    assert_eq!(task.maintenance_mrlep_vals, vec![2.0]);
}

#[test]
fn test_report_coverage_accounts_for_every_module() {
    let dir = tempfile::tempdir().unwrap();
    write_run_dir(
        dir.path(),
        "CL",
        &[
            Block {
                task: "a",
                block_type: "train",
                phase: 0,
                values: ramp(10.0, 40),
            },
            Block {
                task: "b",
                block_type: "train",
                phase: 0,
                values: ramp(8.0, 40),
            },
        ],
    );

    let config = raw_config();
    let (log, scenario) = read_log_dir(dir.path(), &config.perf_measure).unwrap();
    let computed = MetricsReport::new(log, scenario, config, None)
        .unwrap()
        .calculate();

    let coverage = computed.coverage();
    assert_eq!(coverage.len(), 5);
    assert_eq!(coverage[0].module, "within_block_saturation");
    assert_eq!(coverage[0].status, ModuleStatus::Computed);
    // No retraining and no evaluation blocks: the rest runs but finds
    // nothing applicable.
    for report in &coverage[1..] {
        assert_eq!(report.status, ModuleStatus::Skipped, "{}", report.module);
    }
}

#[test]
fn test_normalization_rescales_summary_range() {
    let dir = tempfile::tempdir().unwrap();
    write_run_dir(
        dir.path(),
        "CL",
        &[Block {
            task: "x",
            block_type: "train",
            phase: 0,
            values: ramp(7.0, 50),
        }],
    );

    let config = MetricsConfig {
        smoothing_method: SmoothingMethod::None,
        normalization_method: NormalizationMethod::Task,
        ..MetricsConfig::default()
    };
    let (log, scenario) = read_log_dir(dir.path(), &config.perf_measure).unwrap();
    let computed = MetricsReport::new(log, scenario, config, None)
        .unwrap()
        .calculate();

    let lifetime = computed.lifetime_metrics();
    assert!((lifetime.min.unwrap() - 0.0).abs() < 1e-12);
    assert!((lifetime.max.unwrap() - 100.0).abs() < 1e-12);
    let ranges = computed
        .lifetime_summary()
        .normalization_data_range
        .as_ref()
        .unwrap();
    assert!((ranges["x"].max - 7.0).abs() < 1e-12);
}

#[test]
fn test_batch_aggregates_two_agent_configs() {
    let eval = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    for agent in ["agent_config_a", "agent_config_b"] {
        write_run_dir(
            &eval.path().join(agent).join("ll_logs/run-0"),
            "CL",
            &[
                Block {
                    task: "x",
                    block_type: "train",
                    phase: 0,
                    values: ramp(5.0, 30),
                },
                Block {
                    task: "x",
                    block_type: "test",
                    phase: 1,
                    values: vec![4.0; 10],
                },
            ],
        );
    }

    let options = BatchOptions {
        eval_dir: eval.path().to_path_buf(),
        output_dir: out.path().to_path_buf(),
        ..BatchOptions::default()
    };
    let summary = evaluate_batch(&options, &raw_config()).unwrap();
    assert_eq!(summary.runs.len(), 2);
    assert_eq!(summary.failed, 0);

    let tsv = std::fs::read_to_string(out.path().join("ll_metrics.tsv")).unwrap();
    let mut lines = tsv.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("sg_name\tagent_config\trun_id"));
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].contains("agent_config_a"));
    assert!(rows[1].contains("agent_config_b"));

    let json = std::fs::read_to_string(out.path().join("ll_metrics.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 2);
    assert_eq!(parsed[0]["scenario_type"], "CL");
    assert!(parsed[0]["task_metrics"]["x"].is_object());

    let regime_tsv = std::fs::read_to_string(out.path().join("ll_metrics_regime.tsv")).unwrap();
    // Two runs of two regimes each, plus the header.
    assert_eq!(regime_tsv.lines().count(), 5);
}

#[test]
fn test_ste_workflow_end_to_end() {
    // Two tasks; STE data exists for both, so ANT_A computes the full
    // module list including STE-relative performance and sample efficiency.
    let eval = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    for (i, task) in ["pong", "breakout"].into_iter().enumerate() {
        write_run_dir(
            &eval
                .path()
                .join(format!("agent_config_a/ste_logs/ste-{i}")),
            "CL",
            &[Block {
                task,
                block_type: "train",
                phase: 0,
                values: ramp(10.0, 21),
            }],
        );
    }
    write_run_dir(
        &eval.path().join("agent_config_a/ll_logs/run-0"),
        "ANT_A",
        &[
            Block {
                task: "pong",
                block_type: "train",
                phase: 0,
                values: ramp(8.0, 41),
            },
            Block {
                task: "breakout",
                block_type: "train",
                phase: 0,
                values: ramp(10.0, 21),
            },
            Block {
                task: "pong",
                block_type: "test",
                phase: 1,
                values: vec![6.0; 10],
            },
        ],
    );

    let options = BatchOptions {
        eval_dir: eval.path().to_path_buf(),
        output_dir: out.path().to_path_buf(),
        ..BatchOptions::default()
    };
    let summary = evaluate_batch(&options, &raw_config()).unwrap();
    assert_eq!(summary.runs.len(), 1);

    let report = &summary.runs[0].report;
    let lifetime = report.lifetime_metrics();
    // pong test saturation 6.0 against its expert's 10.0.
    assert!((lifetime.ste_rel_perf.unwrap() - 0.6).abs() < 1e-12);

    // pong: (8/10) * (20/40); breakout: (10/10) * (20/20); mean of both.
    let pong_se = (8.0 / 10.0) * (20.0 / 40.0);
    let expected = (pong_se + 1.0) / 2.0;
    assert!((lifetime.sample_efficiency.unwrap() - expected).abs() < 1e-12);

    // The STE store was persisted per task.
    assert!(out.path().join("taskinfo/pong.json").is_file());
    assert!(out.path().join("taskinfo/breakout.json").is_file());
}
