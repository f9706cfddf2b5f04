//! Forward and backward transfer between task pairs
//!
//! Transfer compares a task's evaluation performance before and after some
//! other task was trained. Forward transfer looks at a task that has not
//! been trained yet; backward transfer looks at a task that was trained
//! earlier. Both come in a ratio form (`after / before`) and a normalized
//! contrast form (`(after - before) / (after + before)`), anchored at the
//! "after" evaluation regime.

use tracing::debug;

use crate::config::TransferMethod;
use crate::Result;

use super::{
    Metric, MetricContext, RunningMetrics, TransferDirection, TransferRecord, TransferVariant,
};

/// Forward/backward transfer over every ordered task pair.
#[derive(Debug)]
pub struct Transfer {
    method: TransferMethod,
}

impl Transfer {
    /// Create the module with the configured formula policy.
    #[must_use]
    pub const fn new(method: TransferMethod) -> Self {
        Self { method }
    }

    /// Compute and record one pair's transfer from its before/after
    /// saturation values. Returns how many cells were written.
    fn record(
        &self,
        metrics: &mut RunningMetrics,
        direction: TransferDirection,
        src_task: &str,
        dst_task: &str,
        before_regime: usize,
        after_regime: usize,
    ) -> usize {
        let (Some(before), Some(after)) = (
            metrics.row(before_regime).and_then(|r| r.saturation),
            metrics.row(after_regime).and_then(|r| r.saturation),
        ) else {
            debug!(
                src_task,
                dst_task, "missing saturation cells, skipping transfer pair"
            );
            return 0;
        };

        let mut values = Vec::new();
        if self.method.wants_ratio() {
            if before == 0.0 {
                debug!(
                    src_task,
                    dst_task, "zero baseline saturation, skipping transfer ratio"
                );
            } else {
                values.push((TransferVariant::Ratio, after / before));
            }
        }
        if self.method.wants_contrast() {
            let denom = after + before;
            if denom == 0.0 {
                debug!(
                    src_task,
                    dst_task, "degenerate contrast denominator, skipping transfer contrast"
                );
            } else {
                values.push((TransferVariant::Contrast, (after - before) / denom));
            }
        }

        let mut written = 0;
        for (variant, value) in values {
            if let Some(row) = metrics.row_mut(after_regime) {
                match (direction, variant) {
                    (TransferDirection::Forward, TransferVariant::Ratio) => {
                        row.forward_transfer_ratio = Some(value);
                    }
                    (TransferDirection::Forward, TransferVariant::Contrast) => {
                        row.forward_transfer_contrast = Some(value);
                    }
                    (TransferDirection::Backward, TransferVariant::Ratio) => {
                        row.backward_transfer_ratio = Some(value);
                    }
                    (TransferDirection::Backward, TransferVariant::Contrast) => {
                        row.backward_transfer_contrast = Some(value);
                    }
                }
            }
            metrics.push_transfer(TransferRecord {
                direction,
                variant,
                src_task: src_task.to_string(),
                dst_task: dst_task.to_string(),
                regime_num: after_regime,
                value,
            });
            written += 1;
        }
        written
    }
}

impl Metric for Transfer {
    fn name(&self) -> &'static str {
        "transfer"
    }

    fn fill(&self, ctx: &MetricContext<'_>, metrics: &mut RunningMetrics) -> Result<usize> {
        let tasks = ctx.regimes.task_names();
        let first_train = |task: &str| {
            ctx.regimes
                .rows()
                .iter()
                .find(|r| r.task_name == task && r.is_train())
                .map(|r| r.regime_num)
        };

        let mut written = 0;
        for src_task in &tasks {
            let Some(train_src) = first_train(src_task) else {
                continue;
            };
            for dst_task in &tasks {
                if dst_task == src_task {
                    continue;
                }
                let dst_tests: Vec<usize> = ctx
                    .regimes
                    .rows()
                    .iter()
                    .filter(|r| r.task_name == *dst_task && r.is_test())
                    .map(|r| r.regime_num)
                    .collect();
                let train_dst = first_train(dst_task);

                // Forward: the receiver has not been trained yet on either
                // side of the source's first training.
                let before = dst_tests.iter().rev().find(|&&t| t < train_src);
                let after = dst_tests
                    .iter()
                    .find(|&&t| t > train_src && train_dst.map_or(true, |d| t < d));
                if let (Some(&b), Some(&a)) = (before, after) {
                    written +=
                        self.record(metrics, TransferDirection::Forward, src_task, dst_task, b, a);
                }

                // Backward: the receiver trained first; compare its tests
                // across the source's training.
                if let Some(train_dst) = train_dst.filter(|&d| d < train_src) {
                    let before = dst_tests
                        .iter()
                        .rev()
                        .find(|&&t| t > train_dst && t < train_src);
                    let after = dst_tests.iter().find(|&&t| t > train_src);
                    if let (Some(&b), Some(&a)) = (before, after) {
                        written += self.record(
                            metrics,
                            TransferDirection::Backward,
                            src_task,
                            dst_task,
                            b,
                            a,
                        );
                    }
                }
            }
        }

        Ok(written)
    }
}
