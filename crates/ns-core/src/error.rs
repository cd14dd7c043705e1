//! Error types for NextStat

use thiserror::Error;

/// NextStat error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or mutually inconsistent input series
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration the engine refuses to run (unknown method, unsupported policy, bad knob)
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
