//! Single-Task-Expert baseline store
//!
//! Maps each task name to one or more independently recorded training runs
//! of that task in isolation. Metric modules that normalize against expert
//! performance (STE-relative performance, sample efficiency) read from this
//! store; it is populated once per evaluation and never mutated during a
//! report's computation.
//!
//! Persistence is one JSON file per task under a task-info directory, with
//! each file holding the list of stored runs for that task.

use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::{BlockType, EpisodeLog, EpisodeRecord};
use crate::{Error, Result};

/// On-disk payload for one task: the stored runs, train records only.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRuns {
    task_name: String,
    runs: Vec<Vec<EpisodeRecord>>,
}

/// Read-only collection of STE baselines, keyed by task name.
#[derive(Debug, Default)]
pub struct SteStore {
    runs: FxHashMap<String, Vec<EpisodeLog>>,
}

impl SteStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the store holds no baselines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Number of tasks with stored baselines.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.runs.len()
    }

    /// Whether a task has at least one stored run.
    #[must_use]
    pub fn contains(&self, task_name: &str) -> bool {
        self.runs.contains_key(task_name)
    }

    /// Stored runs for a task.
    #[must_use]
    pub fn get(&self, task_name: &str) -> Option<&[EpisodeLog]> {
        self.runs.get(task_name).map(Vec::as_slice)
    }

    /// Task names with stored baselines, sorted.
    #[must_use]
    pub fn task_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.runs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Add one STE run, keeping only its train blocks.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLog`] when the run contains more than one task, or
    ///   no train records at all
    pub fn add_run(&mut self, log: &EpisodeLog, perf_measure: &str) -> Result<()> {
        let tasks = log.task_names();
        if tasks.len() != 1 {
            return Err(Error::InvalidLog(format!(
                "STE scenario contains {} tasks, expected exactly one",
                tasks.len()
            )));
        }

        let train_records: Vec<EpisodeRecord> = log
            .records()
            .iter()
            .filter(|r| r.block_type == BlockType::Train)
            .cloned()
            .collect();
        let train_log = EpisodeLog::new(train_records, perf_measure).map_err(|_| {
            Error::InvalidLog(format!("STE run for {} has no train records", tasks[0]))
        })?;

        self.runs.entry(tasks[0].clone()).or_default().push(train_log);
        Ok(())
    }

    /// Load all stored baselines from a task-info directory.
    ///
    /// Files that are not `.json` are ignored. A missing directory yields an
    /// empty store: evaluations without STE data are legitimate, the modules
    /// needing baselines will report their own absence.
    ///
    /// # Errors
    ///
    /// Returns an error when a baseline file cannot be read or parsed, or
    /// when a stored run fails log validation.
    pub fn load_dir(dir: &Path, perf_measure: &str) -> Result<Self> {
        let mut store = Self::new();
        if !dir.exists() {
            return Ok(store);
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let payload: StoredRuns = serde_json::from_reader(std::fs::File::open(&path)?)?;
            let logs = payload
                .runs
                .into_iter()
                .map(|records| EpisodeLog::new(records, perf_measure))
                .collect::<Result<Vec<_>>>()?;
            if !logs.is_empty() {
                store.runs.insert(payload.task_name, logs);
            }
        }

        info!(tasks = store.task_count(), "loaded STE baselines");
        Ok(store)
    }

    /// Persist every task's stored runs to a task-info directory, one JSON
    /// file per task.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created or a file
    /// cannot be written.
    pub fn save_dir(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        for (task_name, logs) in &self.runs {
            let payload = StoredRuns {
                task_name: task_name.clone(),
                runs: logs.iter().map(|l| l.records().to_vec()).collect(),
            };
            let file = std::fs::File::create(dir.join(format!("{task_name}.json")))?;
            serde_json::to_writer(file, &payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::data::WAKE_SUBTYPE;

    fn ste_log(task: &str, n: usize) -> EpisodeLog {
        let records: Vec<EpisodeRecord> = (0..n)
            .map(|i| EpisodeRecord {
                regime_num: 0,
                exp_num: i as u64,
                worker_id: "worker-default".to_string(),
                block_num: 0,
                block_type: BlockType::Train,
                block_subtype: WAKE_SUBTYPE.to_string(),
                phase_number: 0,
                task_name: task.to_string(),
                measures: BTreeMap::from([("reward".to_string(), i as f64)]),
            })
            .collect();
        EpisodeLog::new(records, "reward").unwrap()
    }

    #[test]
    fn test_add_and_get_run() {
        let mut store = SteStore::new();
        store.add_run(&ste_log("pong", 10), "reward").unwrap();
        store.add_run(&ste_log("pong", 20), "reward").unwrap();

        assert!(store.contains("pong"));
        assert_eq!(store.get("pong").unwrap().len(), 2);
        assert_eq!(store.task_names(), vec!["pong"]);
    }

    #[test]
    fn test_multi_task_run_is_rejected() {
        let mut records = ste_log("a", 2).records().to_vec();
        let mut second = records[1].clone();
        second.regime_num = 1;
        second.exp_num = 10;
        second.task_name = "b".to_string();
        records.push(second);
        let log = EpisodeLog::new(records, "reward").unwrap();

        let mut store = SteStore::new();
        let err = store.add_run(&log, "reward").unwrap_err();
        assert!(matches!(err, Error::InvalidLog(_)));
    }

    #[test]
    fn test_missing_dir_loads_empty() {
        let store =
            SteStore::load_dir(Path::new("/nonexistent/taskinfo"), "reward").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SteStore::new();
        store.add_run(&ste_log("pong", 10), "reward").unwrap();
        store.add_run(&ste_log("breakout", 5), "reward").unwrap();
        store.save_dir(dir.path()).unwrap();

        let loaded = SteStore::load_dir(dir.path(), "reward").unwrap();
        assert_eq!(loaded.task_count(), 2);
        assert_eq!(loaded.get("pong").unwrap()[0].len(), 10);
    }
}
