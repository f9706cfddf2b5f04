//! Run directory reading and settings persistence
//!
//! A run directory holds two TSV log files plus two JSON info files:
//!
//! - `data-log.tsv`: one row per episode with the application measures
//! - `regime-log.tsv`: one row per block with its type and subtype
//! - `logger_info.json`: which columns are application measures
//! - `scenario_info.json`: scenario identity (type, complexity, difficulty)
//!
//! The two TSVs are merged on `(phase, task_name, worker, block)`, sorted by
//! episode index, and regimes are numbered over the merged rows. The result
//! is a validated [`EpisodeLog`] ready for a report.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DataRange, MetricsConfig};
use crate::data::{BlockType, EpisodeLog, EpisodeRecord};
use crate::{Error, Result};

/// Per-episode log file inside a run directory.
pub const DATA_LOG_FILE: &str = "data-log.tsv";
/// Per-block log file inside a run directory.
pub const REGIME_LOG_FILE: &str = "regime-log.tsv";
/// Logger info file inside a run directory.
pub const LOGGER_INFO_FILE: &str = "logger_info.json";
/// Scenario info file inside a run directory.
pub const SCENARIO_INFO_FILE: &str = "scenario_info.json";

/// Scenario identity of one run.
///
/// `run_id` defaults to the run directory name; `sg_name` and
/// `agent_config` are filled in by the batch walker from the surrounding
/// directory structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioInfo {
    /// Run identifier
    pub run_id: String,
    /// Scenario taxonomy key (syllabus subtype)
    pub scenario_type: String,
    /// Scenario complexity tag
    pub complexity: String,
    /// Scenario difficulty tag
    pub difficulty: String,
    /// Scenario group name
    pub sg_name: String,
    /// Agent configuration the run belongs to
    pub agent_config: String,
}

/// Logger metadata of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerInfo {
    /// Names of the application measure columns in `data-log.tsv`
    pub metrics_columns: Vec<String>,
}

/// Whether a directory looks like a single-run log directory.
#[must_use]
pub fn is_run_dir(dir: &Path) -> bool {
    dir.join(LOGGER_INFO_FILE).is_file() && dir.join(SCENARIO_INFO_FILE).is_file()
}

fn tsv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(Into::into)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    Ok(serde_json::from_reader(std::fs::File::open(path)?)?)
}

/// Column indices resolved from a TSV header.
struct Columns {
    phase_number: usize,
    worker_id: usize,
    block_num: usize,
    task_name: usize,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| Error::MissingColumn(name.to_string()))
        };
        Ok(Self {
            phase_number: find("phase_number")?,
            worker_id: find("worker_id")?,
            block_num: find("block_num")?,
            task_name: find("task_name")?,
        })
    }
}

fn parse_field<T: std::str::FromStr>(record: &csv::StringRecord, idx: usize, name: &str) -> Result<T> {
    record
        .get(idx)
        .ok_or_else(|| Error::MissingColumn(name.to_string()))?
        .trim()
        .parse()
        .map_err(|_| {
            Error::InvalidLog(format!(
                "cannot parse {name} value {:?}",
                record.get(idx).unwrap_or_default()
            ))
        })
}

/// One merged-but-unnumbered episode row.
struct RawEpisode {
    phase_number: usize,
    worker_id: String,
    block_num: usize,
    task_name: String,
    exp_num: u64,
    measures: BTreeMap<String, f64>,
}

fn read_data_log(path: &Path, metrics_columns: &[String]) -> Result<Vec<RawEpisode>> {
    let mut reader = tsv_reader(path)?;
    let headers = reader.headers()?.clone();
    let columns = Columns::resolve(&headers)?;
    let exp_num_idx = headers
        .iter()
        .position(|h| h == "exp_num")
        .ok_or_else(|| Error::MissingColumn("exp_num".to_string()))?;

    let measure_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| metrics_columns.iter().any(|m| m == h))
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut episodes = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut measures = BTreeMap::new();
        for (idx, name) in &measure_columns {
            let Some(field) = record.get(*idx) else {
                continue;
            };
            if let Ok(value) = field.trim().parse::<f64>() {
                measures.insert(name.clone(), value);
            }
        }
        episodes.push(RawEpisode {
            phase_number: parse_field(&record, columns.phase_number, "phase_number")?,
            worker_id: parse_field(&record, columns.worker_id, "worker_id")?,
            block_num: parse_field(&record, columns.block_num, "block_num")?,
            task_name: parse_field(&record, columns.task_name, "task_name")?,
            exp_num: parse_field(&record, exp_num_idx, "exp_num")?,
            measures,
        });
    }
    Ok(episodes)
}

type BlockKey = (usize, String, String, usize);

fn read_regime_log(path: &Path) -> Result<FxHashMap<BlockKey, (BlockType, String)>> {
    let mut reader = tsv_reader(path)?;
    let headers = reader.headers()?.clone();
    let columns = Columns::resolve(&headers)?;
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    };
    let block_type_idx = find("block_type")?;
    let block_subtype_idx = find("block_subtype")?;

    let mut blocks = FxHashMap::default();
    for record in reader.records() {
        let record = record?;
        let key: BlockKey = (
            parse_field(&record, columns.phase_number, "phase_number")?,
            parse_field(&record, columns.task_name, "task_name")?,
            parse_field(&record, columns.worker_id, "worker_id")?,
            parse_field(&record, columns.block_num, "block_num")?,
        );
        let block_type: BlockType = record
            .get(block_type_idx)
            .ok_or_else(|| Error::MissingColumn("block_type".to_string()))?
            .trim()
            .parse()?;
        let block_subtype = record
            .get(block_subtype_idx)
            .ok_or_else(|| Error::MissingColumn("block_subtype".to_string()))?
            .trim()
            .to_string();
        blocks.insert(key, (block_type, block_subtype));
    }
    Ok(blocks)
}

/// Merge the episode rows with block metadata and number the regimes.
fn merge_logs(
    mut episodes: Vec<RawEpisode>,
    blocks: &FxHashMap<BlockKey, (BlockType, String)>,
) -> Result<Vec<EpisodeRecord>> {
    episodes.sort_by_key(|e| e.exp_num);

    let mut records = Vec::with_capacity(episodes.len());
    let mut regime_num = 0usize;
    let mut prev_key: Option<(usize, BlockType, String, usize, String)> = None;

    for episode in episodes {
        let key: BlockKey = (
            episode.phase_number,
            episode.task_name.clone(),
            episode.worker_id.clone(),
            episode.block_num,
        );
        let Some((block_type, block_subtype)) = blocks.get(&key) else {
            return Err(Error::InvalidLog(format!(
                "no block metadata for phase {} task {} worker {} block {}",
                episode.phase_number, episode.task_name, episode.worker_id, episode.block_num
            )));
        };

        let regime_key = (
            episode.block_num,
            *block_type,
            block_subtype.clone(),
            episode.phase_number,
            episode.task_name.clone(),
        );
        if let Some(prev) = &prev_key {
            if *prev != regime_key {
                regime_num += 1;
            }
        }
        prev_key = Some(regime_key);

        records.push(EpisodeRecord {
            regime_num,
            exp_num: episode.exp_num,
            worker_id: episode.worker_id,
            block_num: episode.block_num,
            block_type: *block_type,
            block_subtype: block_subtype.clone(),
            phase_number: episode.phase_number,
            task_name: episode.task_name,
            measures: episode.measures,
        });
    }
    Ok(records)
}

/// Read one run directory into a validated episode log plus its scenario
/// identity.
///
/// # Errors
///
/// - [`Error::MissingColumn`] when a required TSV column, or the configured
///   performance measure, is absent
/// - [`Error::InvalidLog`] for unparseable rows or episode rows without
///   block metadata
/// - [`Error::Io`] / [`Error::Csv`] / [`Error::Json`] from the underlying
///   readers
pub fn read_log_dir(dir: &Path, perf_measure: &str) -> Result<(EpisodeLog, ScenarioInfo)> {
    let logger_info: LoggerInfo = read_json(&dir.join(LOGGER_INFO_FILE))?;
    if !logger_info.metrics_columns.iter().any(|c| c == perf_measure) {
        return Err(Error::MissingColumn(perf_measure.to_string()));
    }

    let mut scenario: ScenarioInfo = read_json(&dir.join(SCENARIO_INFO_FILE))?;
    if scenario.run_id.is_empty() {
        scenario.run_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    let episodes = read_data_log(&dir.join(DATA_LOG_FILE), &logger_info.metrics_columns)?;
    let blocks = read_regime_log(&dir.join(REGIME_LOG_FILE))?;
    let records = merge_logs(episodes, &blocks)?;
    debug!(
        run_id = %scenario.run_id,
        records = records.len(),
        "read run directory"
    );

    Ok((EpisodeLog::new(records, perf_measure)?, scenario))
}

/// Load a data-range file for normalization, lowercasing the task keys.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn load_data_range(path: &Path) -> Result<BTreeMap<String, DataRange>> {
    let raw: BTreeMap<String, DataRange> = read_json(path)?;
    Ok(raw
        .into_iter()
        .map(|(task, range)| (task.to_lowercase(), range))
        .collect())
}

/// Evaluation settings as persisted next to the output artifacts.
#[derive(Debug, Serialize, Deserialize)]
pub struct SavedSettings {
    /// When the evaluation was computed
    pub computed_at: DateTime<Utc>,
    /// The full configuration the evaluation ran with
    #[serde(flatten)]
    pub config: MetricsConfig,
}

/// Persist the evaluation settings as JSON.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn save_settings(path: &Path, config: &MetricsConfig) -> Result<()> {
    let settings = SavedSettings {
        computed_at: Utc::now(),
        config: config.clone(),
    };
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &settings)?;
    Ok(())
}

/// Load evaluation settings saved by [`save_settings`].
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn load_settings(path: &Path) -> Result<MetricsConfig> {
    let settings: SavedSettings = read_json(path)?;
    Ok(settings.config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_run_dir(dir: &Path) {
        std::fs::write(
            dir.join(LOGGER_INFO_FILE),
            r#"{"metrics_columns": ["reward"]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join(SCENARIO_INFO_FILE),
            r#"{"scenario_type": "CL", "complexity": "medium", "difficulty": "easy"}"#,
        )
        .unwrap();

        let mut data = String::from("phase_number\tworker_id\tblock_num\ttask_name\texp_num\treward\n");
        for i in 0..10 {
            data.push_str(&format!("0\tworker-0\t0\tpong\t{i}\t{}.0\n", i));
        }
        for i in 10..15 {
            data.push_str(&format!("0\tworker-0\t1\tpong\t{i}\t9.0\n"));
        }
        std::fs::write(dir.join(DATA_LOG_FILE), data).unwrap();

        let regime = "phase_number\tworker_id\tblock_num\ttask_name\tblock_type\tblock_subtype\n\
                      0\tworker-0\t0\tpong\ttrain\twake\n\
                      0\tworker-0\t1\tpong\ttest\twake\n";
        std::fs::write(dir.join(REGIME_LOG_FILE), regime).unwrap();
    }

    #[test]
    fn test_read_log_dir_merges_and_numbers_regimes() {
        let dir = tempfile::tempdir().unwrap();
        write_run_dir(dir.path());

        let (log, scenario) = read_log_dir(dir.path(), "reward").unwrap();
        assert_eq!(log.len(), 15);
        assert_eq!(log.regime_nums(), vec![0, 1]);
        assert_eq!(log.regime_records(0).len(), 10);
        assert_eq!(log.regime_records(1)[0].block_type, BlockType::Test);
        assert_eq!(scenario.scenario_type, "CL");
        assert_eq!(
            scenario.run_id,
            dir.path().file_name().unwrap().to_string_lossy()
        );
        assert!(is_run_dir(dir.path()));
    }

    #[test]
    fn test_unknown_perf_measure_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_run_dir(dir.path());

        let err = read_log_dir(dir.path(), "score").unwrap_err();
        assert!(matches!(err, Error::MissingColumn(_)));
    }

    #[test]
    fn test_episode_without_block_metadata_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_run_dir(dir.path());
        // A data row referencing block 2, which the regime log never declares.
        let mut data = std::fs::read_to_string(dir.path().join(DATA_LOG_FILE)).unwrap();
        data.push_str("0\tworker-0\t2\tpong\t15\t1.0\n");
        std::fs::write(dir.path().join(DATA_LOG_FILE), data).unwrap();

        let err = read_log_dir(dir.path(), "reward").unwrap_err();
        assert!(matches!(err, Error::InvalidLog(_)));
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let config = MetricsConfig {
            window_length: Some(42),
            ..MetricsConfig::default()
        };
        save_settings(&path, &config).unwrap();
        let loaded = load_settings(&path).unwrap();
        assert_eq!(loaded.window_length, Some(42));
    }

    #[test]
    fn test_data_range_keys_are_lowercased() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranges.json");
        std::fs::write(&path, r#"{"Pong": {"min": 0.0, "max": 21.0}}"#).unwrap();
        let ranges = load_data_range(&path).unwrap();
        assert!((ranges["pong"].max - 21.0).abs() < 1e-12);
    }
}
