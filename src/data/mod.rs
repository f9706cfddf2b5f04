//! Episode log data model
//!
//! The episode log is the validated, preprocessed view of one run's raw
//! experiment records. Regimes (contiguous blocks of one task, block type,
//! and phase) are the unit every metric module operates on; the regime
//! table is the per-regime metadata derived once from the log.

pub mod normalize;

use std::collections::BTreeMap;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DataRange, MetricsConfig, NormalizationMethod, VariantMode};
use crate::{Error, Result};

pub use normalize::Normalizer;

/// Block subtype marking primary learning experience blocks.
pub const WAKE_SUBTYPE: &str = "wake";

/// Train/test designation of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    /// Learning experiences
    Train,
    /// Evaluation experiences
    Test,
}

impl FromStr for BlockType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Self::Train),
            "test" => Ok(Self::Test),
            other => Err(Error::InvalidLog(format!("unknown block type: {other}"))),
        }
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Train => "train",
            Self::Test => "test",
        })
    }
}

/// One logged episode (or timestep) of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// Identifies the contiguous block this episode belongs to
    pub regime_num: usize,
    /// Monotonically increasing episode index within the run
    pub exp_num: u64,
    /// Worker that produced the episode
    pub worker_id: String,
    /// Block counter within the run
    pub block_num: usize,
    /// Train or test
    pub block_type: BlockType,
    /// Block subtype, e.g. "wake"
    pub block_subtype: String,
    /// Phase the block belongs to
    pub phase_number: usize,
    /// Task being executed
    pub task_name: String,
    /// Application measures logged for the episode, keyed by column name
    pub measures: BTreeMap<String, f64>,
}

impl EpisodeRecord {
    /// Value of a measure column, if logged.
    #[must_use]
    pub fn measure(&self, name: &str) -> Option<f64> {
        self.measures.get(name).copied()
    }
}

/// Validated, preprocessed episode log of one run.
///
/// Construction checks the structural invariants every downstream
/// computation relies on: regimes are contiguous runs of records ordered by
/// `exp_num`, regime numbers never decrease, and the configured performance
/// measure is present on every record.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeLog {
    records: Vec<EpisodeRecord>,
    // (start, end) record-index range per regime, in appearance order
    regime_spans: Vec<(usize, usize)>,
    regime_index: FxHashMap<usize, usize>,
}

impl EpisodeLog {
    /// Build a log from raw records, validating structure.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLog`] for an empty record set, a decreasing
    ///   `regime_num`, a reused `regime_num`, or out-of-order `exp_num`
    ///   within a regime
    /// - [`Error::MissingColumn`] when `perf_measure` is absent from any
    ///   record
    pub fn new(records: Vec<EpisodeRecord>, perf_measure: &str) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::InvalidLog(
                "episode log contains no records".to_string(),
            ));
        }

        let mut regime_spans = Vec::new();
        let mut regime_index = FxHashMap::default();
        let mut span_start = 0usize;

        for (i, record) in records.iter().enumerate() {
            if record.measure(perf_measure).is_none() {
                return Err(Error::MissingColumn(perf_measure.to_string()));
            }

            if i == 0 {
                continue;
            }
            let prev = &records[i - 1];
            match record.regime_num.cmp(&prev.regime_num) {
                std::cmp::Ordering::Less => {
                    return Err(Error::InvalidLog(format!(
                        "regime_num decreased from {} to {} at exp_num {}",
                        prev.regime_num, record.regime_num, record.exp_num
                    )));
                }
                std::cmp::Ordering::Equal => {
                    if record.exp_num < prev.exp_num {
                        return Err(Error::InvalidLog(format!(
                            "exp_num decreased within regime {}: {} after {}",
                            record.regime_num, record.exp_num, prev.exp_num
                        )));
                    }
                }
                std::cmp::Ordering::Greater => {
                    if regime_index
                        .insert(prev.regime_num, regime_spans.len())
                        .is_some()
                    {
                        return Err(Error::InvalidLog(format!(
                            "regime_num {} appears in two separate spans",
                            prev.regime_num
                        )));
                    }
                    regime_spans.push((span_start, i));
                    span_start = i;
                }
            }
        }

        let last = &records[records.len() - 1];
        if regime_index
            .insert(last.regime_num, regime_spans.len())
            .is_some()
        {
            return Err(Error::InvalidLog(format!(
                "regime_num {} appears in two separate spans",
                last.regime_num
            )));
        }
        regime_spans.push((span_start, records.len()));

        Ok(Self {
            records,
            regime_spans,
            regime_index,
        })
    }

    /// All records, in log order.
    #[must_use]
    pub fn records(&self) -> &[EpisodeRecord] {
        &self.records
    }

    /// Number of records in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Regime numbers in appearance order.
    #[must_use]
    pub fn regime_nums(&self) -> Vec<usize> {
        self.regime_spans
            .iter()
            .map(|&(start, _)| self.records[start].regime_num)
            .collect()
    }

    /// Records of one regime, or an empty slice for an unknown regime.
    #[must_use]
    pub fn regime_records(&self, regime_num: usize) -> &[EpisodeRecord] {
        self.regime_index
            .get(&regime_num)
            .map_or(&[], |&i| {
                let (start, end) = self.regime_spans[i];
                &self.records[start..end]
            })
    }

    /// `(exp_num, value)` rows of one regime for a measure column.
    #[must_use]
    pub fn regime_rows(&self, regime_num: usize, measure: &str) -> Vec<(u64, f64)> {
        Self::measure_rows(self.regime_records(regime_num), measure)
    }

    /// `(exp_num, value)` rows extracted from arbitrary records.
    #[must_use]
    pub fn measure_rows(records: &[EpisodeRecord], measure: &str) -> Vec<(u64, f64)> {
        records
            .iter()
            .filter_map(|r| r.measure(measure).map(|v| (r.exp_num, v)))
            .collect()
    }

    /// Unique task names in appearance order.
    #[must_use]
    pub fn task_names(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for record in &self.records {
            if !seen.iter().any(|t| t == &record.task_name) {
                seen.push(record.task_name.clone());
            }
        }
        seen
    }

    /// Observed range of a measure column over the whole log.
    #[must_use]
    pub fn measure_range(&self, measure: &str) -> Option<DataRange> {
        let mut range: Option<DataRange> = None;
        for record in &self.records {
            if let Some(v) = record.measure(measure) {
                if v.is_nan() {
                    continue;
                }
                let r = range.get_or_insert(DataRange { min: v, max: v });
                r.min = r.min.min(v);
                r.max = r.max.max(v);
            }
        }
        range
    }

    /// Observed range of a measure restricted to one task.
    #[must_use]
    pub fn task_measure_range(&self, task_name: &str, measure: &str) -> Option<DataRange> {
        let mut range: Option<DataRange> = None;
        for record in self.records.iter().filter(|r| r.task_name == task_name) {
            if let Some(v) = record.measure(measure) {
                if v.is_nan() {
                    continue;
                }
                let r = range.get_or_insert(DataRange { min: v, max: v });
                r.min = r.min.min(v);
                r.max = r.max.max(v);
            }
        }
        range
    }

    /// Preprocess the log in place per the configuration: task-variant
    /// collapsing, outlier clamping, then normalization.
    ///
    /// Returns the per-task data ranges used for normalization, when
    /// normalization is enabled, so reports can echo them in their output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a supplied data range is
    /// degenerate (`max <= min`) for a task present in the log.
    pub fn preprocess(
        &mut self,
        config: &MetricsConfig,
    ) -> Result<Option<BTreeMap<String, DataRange>>> {
        if config.variant_mode == VariantMode::Agnostic {
            self.collapse_task_variants();
        }

        if config.clamp_outliers {
            self.clamp_outliers(&config.perf_measure);
        }

        if config.normalization_method == NormalizationMethod::None {
            return Ok(None);
        }
        let normalizer = Normalizer::from_config(self, config)?;
        normalizer.apply(self, &config.perf_measure);
        Ok(Some(normalizer.into_ranges()))
    }

    /// Collapse task variants onto the base task name (text before the
    /// first underscore).
    fn collapse_task_variants(&mut self) {
        for record in &mut self.records {
            if let Some(base) = record.task_name.split('_').next() {
                if base.len() != record.task_name.len() {
                    record.task_name = base.to_string();
                }
            }
        }
    }

    /// Clamp the performance measure to its per-task [0.1, 0.9] quantiles.
    fn clamp_outliers(&mut self, measure: &str) {
        for task in self.task_names() {
            let values: Vec<f64> = self
                .records
                .iter()
                .filter(|r| r.task_name == task)
                .filter_map(|r| r.measure(measure))
                .filter(|v| !v.is_nan())
                .collect();
            let (Some(lower), Some(upper)) = (quantile(&values, 0.1), quantile(&values, 0.9))
            else {
                continue;
            };
            debug!(task, lower, upper, "clamping outliers");
            for record in self.records.iter_mut().filter(|r| r.task_name == task) {
                if let Some(v) = record.measures.get_mut(measure) {
                    *v = v.clamp(lower, upper);
                }
            }
        }
    }
}

/// Linear-interpolation quantile of an unsorted sample.
fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

/// One row of the regime metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeRecord {
    /// Regime identifier, matching the episode log
    pub regime_num: usize,
    /// Block counter within the run
    pub block_num: usize,
    /// Train or test
    pub block_type: BlockType,
    /// Block subtype, e.g. "wake"
    pub block_subtype: String,
    /// Phase the regime belongs to
    pub phase_number: usize,
    /// Task being executed
    pub task_name: String,
    /// Number of raw episode rows in the regime
    pub episode_count: usize,
}

impl RegimeRecord {
    /// Whether this is a learning (train) regime.
    #[must_use]
    pub const fn is_train(&self) -> bool {
        matches!(self.block_type, BlockType::Train)
    }

    /// Whether this is an evaluation (test) regime.
    #[must_use]
    pub const fn is_test(&self) -> bool {
        matches!(self.block_type, BlockType::Test)
    }

    /// Whether this is a primary learning regime (train + wake).
    #[must_use]
    pub fn is_wake_train(&self) -> bool {
        self.is_train() && self.block_subtype == WAKE_SUBTYPE
    }
}

/// Per-regime metadata table, one row per regime in appearance order.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeTable {
    rows: Vec<RegimeRecord>,
    index: FxHashMap<usize, usize>,
}

impl RegimeTable {
    /// Derive the regime table from a validated episode log.
    #[must_use]
    pub fn from_log(log: &EpisodeLog) -> Self {
        let mut rows = Vec::new();
        let mut index = FxHashMap::default();
        for regime_num in log.regime_nums() {
            let records = log.regime_records(regime_num);
            let first = &records[0];
            index.insert(regime_num, rows.len());
            rows.push(RegimeRecord {
                regime_num,
                block_num: first.block_num,
                block_type: first.block_type,
                block_subtype: first.block_subtype.clone(),
                phase_number: first.phase_number,
                task_name: first.task_name.clone(),
                episode_count: records.len(),
            });
        }
        Self { rows, index }
    }

    /// All rows in appearance order.
    #[must_use]
    pub fn rows(&self) -> &[RegimeRecord] {
        &self.rows
    }

    /// Number of regimes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no regimes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for a regime number.
    #[must_use]
    pub fn get(&self, regime_num: usize) -> Option<&RegimeRecord> {
        self.index.get(&regime_num).map(|&i| &self.rows[i])
    }

    /// Appearance-order position of a regime number.
    #[must_use]
    pub fn position(&self, regime_num: usize) -> Option<usize> {
        self.index.get(&regime_num).copied()
    }

    /// Unique task names in appearance order.
    #[must_use]
    pub fn task_names(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for row in &self.rows {
            if !seen.iter().any(|t| t == &row.task_name) {
                seen.push(row.task_name.clone());
            }
        }
        seen
    }

    /// Train+wake regimes of a task, in appearance order.
    #[must_use]
    pub fn wake_train_regimes(&self, task_name: &str) -> Vec<&RegimeRecord> {
        self.rows
            .iter()
            .filter(|r| r.task_name == task_name && r.is_wake_train())
            .collect()
    }
}
