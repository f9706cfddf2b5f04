//! Error types for medir
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Medir error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed performance series (empty or otherwise unusable)
    #[error("Shape error: {0}")]
    Shape(String),

    /// Unknown smoothing window kind
    #[error("Invalid smoothing window: {0}\nValid windows: flat, hanning, hamming, bartlett, blackman")]
    InvalidWindow(String),

    /// No single-task-expert baseline for a required task
    #[error("Missing STE baseline: {0}")]
    MissingBaseline(String),

    /// Unrecognized scenario taxonomy key
    #[error("Unsupported scenario: {0}\nValid subtypes: CL, ANT_A, ANT_B, ANT_C")]
    UnsupportedScenario(String),

    /// Required column absent from the episode log
    #[error("Missing log column: {0}")]
    MissingColumn(String),

    /// Bad configuration option value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Structural violation in the episode log (regime ordering, contiguity)
    #[error("Invalid log data: {0}")]
    InvalidLog(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TSV read/write error
    #[error("TSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
