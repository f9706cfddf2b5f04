//! Within-block saturation and terminal performance
//!
//! The foundation module: fills saturation and terminal statistics for
//! every regime. Every other metric family reads these cells, so this
//! module always runs first.

use tracing::debug;

use crate::stats::{block_saturation, terminal_perf, DEFAULT_TERMINAL_WINDOW_RATIO};
use crate::Result;

use super::{Metric, MetricContext, RunningMetrics};

/// Per-regime saturation/terminal statistics.
#[derive(Debug, Default)]
pub struct WithinBlockSaturation;

impl Metric for WithinBlockSaturation {
    fn name(&self) -> &'static str {
        "within_block_saturation"
    }

    fn fill(&self, ctx: &MetricContext<'_>, metrics: &mut RunningMetrics) -> Result<usize> {
        let window = ctx.config.window_kind();
        let window_len = ctx.config.window_length;
        let measure = &ctx.config.perf_measure;

        let mut written = 0;
        for regime in ctx.regimes.rows() {
            let rows = ctx.log.regime_rows(regime.regime_num, measure);
            let sat = block_saturation(&rows, None, window, window_len)?;
            let term = terminal_perf(
                &rows,
                None,
                window,
                window_len,
                DEFAULT_TERMINAL_WINDOW_RATIO,
            )?;

            debug!(
                regime = regime.regime_num,
                task = %regime.task_name,
                saturation = sat.value,
                "within-block saturation"
            );

            let Some(row) = metrics.row_mut(regime.regime_num) else {
                continue;
            };
            row.saturation = Some(sat.value);
            row.eps_to_sat = Some(sat.episodes_to);
            row.term_perf = Some(term.value);
            row.eps_to_term = Some(term.episodes_to);
            written += 1;
        }

        Ok(written)
    }
}
