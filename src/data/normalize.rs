//! Performance normalization
//!
//! Scales the performance measure into [0, 100] against a per-task or
//! whole-run data range, so metrics computed across tasks with different
//! reward scales stay comparable. Ranges come from a caller-supplied data
//! range file when available, otherwise from the observed data.

use std::collections::BTreeMap;

use tracing::warn;

use crate::config::{DataRange, MetricsConfig, NormalizationMethod};
use crate::{Error, Result};

use super::EpisodeLog;

/// Target span of normalized values.
const NORMALIZED_SCALE: f64 = 100.0;

/// Resolved normalization ranges for one run.
#[derive(Debug, Clone)]
pub struct Normalizer {
    ranges: BTreeMap<String, DataRange>,
}

impl Normalizer {
    /// Resolve per-task ranges from the configuration and the observed log.
    ///
    /// With the `task` method each task gets its own range (supplied range
    /// preferred, observed otherwise); with the `run` method every task
    /// shares the whole-run range. A task whose observed range is degenerate
    /// (no spread) is left unnormalized with a diagnostic.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] when a supplied range has `max <= min`
    ///   for a task present in the log, or when called with normalization
    ///   disabled
    pub fn from_config(log: &EpisodeLog, config: &MetricsConfig) -> Result<Self> {
        let measure = &config.perf_measure;
        let supplied = config.data_range.as_ref();

        let mut ranges = BTreeMap::new();
        match config.normalization_method {
            NormalizationMethod::None => {
                return Err(Error::InvalidConfig(
                    "normalizer constructed with normalization disabled".to_string(),
                ));
            }
            NormalizationMethod::Task => {
                for task in log.task_names() {
                    let range = match supplied.and_then(|m| m.get(&task)) {
                        Some(r) => {
                            if r.max <= r.min {
                                return Err(Error::InvalidConfig(format!(
                                    "degenerate data range for task {task}: [{}, {}]",
                                    r.min, r.max
                                )));
                            }
                            *r
                        }
                        None => match log.task_measure_range(&task, measure) {
                            Some(r) if r.max > r.min => r,
                            _ => {
                                warn!(task, "no usable data range, leaving task unnormalized");
                                continue;
                            }
                        },
                    };
                    ranges.insert(task, range);
                }
            }
            NormalizationMethod::Run => {
                // Envelope of supplied ranges when present, observed range
                // otherwise.
                let run_range = supplied
                    .filter(|m| !m.is_empty())
                    .map(|m| {
                        m.values().fold(
                            DataRange {
                                min: f64::INFINITY,
                                max: f64::NEG_INFINITY,
                            },
                            |acc, r| DataRange {
                                min: acc.min.min(r.min),
                                max: acc.max.max(r.max),
                            },
                        )
                    })
                    .or_else(|| log.measure_range(measure));
                match run_range {
                    Some(r) if r.max > r.min => {
                        for task in log.task_names() {
                            ranges.insert(task, r);
                        }
                    }
                    _ => warn!("no usable run-level data range, leaving log unnormalized"),
                }
            }
        }

        Ok(Self { ranges })
    }

    /// Scale the measure column of every record whose task has a range.
    pub fn apply(&self, log: &mut EpisodeLog, measure: &str) {
        for record in &mut log.records {
            let Some(range) = self.ranges.get(&record.task_name) else {
                continue;
            };
            if let Some(v) = record.measures.get_mut(measure) {
                *v = (*v - range.min) / (range.max - range.min) * NORMALIZED_SCALE;
            }
        }
    }

    /// The resolved per-task ranges, for echoing into report output.
    #[must_use]
    pub fn into_ranges(self) -> BTreeMap<String, DataRange> {
        self.ranges
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::data::{BlockType, EpisodeRecord, WAKE_SUBTYPE};

    fn log_with(values: &[(&str, f64)]) -> EpisodeLog {
        let records: Vec<EpisodeRecord> = values
            .iter()
            .enumerate()
            .map(|(i, &(task, reward))| EpisodeRecord {
                regime_num: i,
                exp_num: i as u64,
                worker_id: "worker-default".to_string(),
                block_num: i,
                block_type: BlockType::Train,
                block_subtype: WAKE_SUBTYPE.to_string(),
                phase_number: 0,
                task_name: task.to_string(),
                measures: BTreeMap::from([("reward".to_string(), reward)]),
            })
            .collect();
        EpisodeLog::new(records, "reward").unwrap()
    }

    #[test]
    fn test_task_normalization_scales_to_0_100() {
        let mut log = log_with(&[("a", 0.0), ("a", 5.0), ("a", 10.0)]);
        let config = MetricsConfig::default();
        let normalizer = Normalizer::from_config(&log, &config).unwrap();
        normalizer.apply(&mut log, "reward");
        let range = log.measure_range("reward").unwrap();
        assert!((range.min - 0.0).abs() < 1e-12);
        assert!((range.max - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_supplied_range_overrides_observed() {
        let mut log = log_with(&[("a", 0.0), ("a", 5.0)]);
        let config = MetricsConfig {
            data_range: Some(BTreeMap::from([(
                "a".to_string(),
                DataRange {
                    min: 0.0,
                    max: 10.0,
                },
            )])),
            ..MetricsConfig::default()
        };
        let normalizer = Normalizer::from_config(&log, &config).unwrap();
        normalizer.apply(&mut log, "reward");
        // 5.0 of [0, 10] lands on 50, not 100.
        assert!((log.measure_range("reward").unwrap().max - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_supplied_range_is_rejected() {
        let log = log_with(&[("a", 1.0)]);
        let config = MetricsConfig {
            data_range: Some(BTreeMap::from([(
                "a".to_string(),
                DataRange { min: 2.0, max: 2.0 },
            )])),
            ..MetricsConfig::default()
        };
        let err = Normalizer::from_config(&log, &config).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_constant_task_is_left_unnormalized() {
        let mut log = log_with(&[("a", 3.0), ("a", 3.0)]);
        let config = MetricsConfig::default();
        let normalizer = Normalizer::from_config(&log, &config).unwrap();
        normalizer.apply(&mut log, "reward");
        assert!((log.measure_range("reward").unwrap().max - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_run_normalization_shares_one_range() {
        let mut log = log_with(&[("a", 0.0), ("b", 10.0)]);
        let config = MetricsConfig {
            normalization_method: NormalizationMethod::Run,
            ..MetricsConfig::default()
        };
        let normalizer = Normalizer::from_config(&log, &config).unwrap();
        normalizer.apply(&mut log, "reward");
        let range = log.measure_range("reward").unwrap();
        assert!((range.min - 0.0).abs() < 1e-12);
        assert!((range.max - 100.0).abs() < 1e-12);
    }
}
