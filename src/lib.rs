//! # Medir: Lifelong-Learning Metrics Engine
//!
//! Medir computes continual-learning performance metrics from
//! reinforcement-learning experiment logs and aggregates them across many
//! runs. A raw per-episode performance series becomes scalar learning-curve
//! metrics: saturation, recovery time, forward/backward transfer,
//! performance maintenance, and sample efficiency against single-task
//! expert baselines.
//!
//! ## Layers
//!
//! - [`smoothing`] / [`stats`]: windowed smoothing and per-block statistics
//! - [`metrics`]: one module per metric family, run in a fixed order
//! - [`report`]: per-run orchestration and lifetime summaries
//! - [`io`] / [`batch`]: run-directory reading and multi-run aggregation
//!
//! ## Example
//!
//! ```rust,no_run
//! use medir::config::MetricsConfig;
//! use medir::report::MetricsReport;
//!
//! let config = MetricsConfig::default();
//! let (log, scenario) = medir::io::read_log_dir("logs/run-0".as_ref(), &config.perf_measure)?;
//! let computed = MetricsReport::new(log, scenario, config, None)?.calculate();
//! println!("{:?}", computed.lifetime_metrics().saturation);
//! # Ok::<(), medir::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod batch;
pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod metrics;
pub mod report;
pub mod smoothing;
pub mod stats;
pub mod ste;

pub use config::MetricsConfig;
pub use error::{Error, Result};
pub use report::{ComputedReport, MetricsReport, SyllabusSubtype};
pub use ste::SteStore;
