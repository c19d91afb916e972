//! Error types for snapshot validation and configuration loading.

use thiserror::Error;

/// Result type alias for input validation.
pub type InputResult<T> = Result<T, InputError>;

/// Malformed collector data. Never retried: the caller must fix the input.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("invalid value for {field}: {value:?} (expected a finite, non-negative number)")]
    InvalidNumber { field: String, value: String },

    #[error("no resource demand for service: {0}")]
    MissingDemand(String),

    #[error("placed service missing from the service list: {0}")]
    UnlistedService(String),

    #[error("placement references unknown host: {0}")]
    UnknownHost(String),

    #[error("affinity metric not present in snapshot: {0}")]
    MissingMetric(String),

    #[error("snapshot parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading a placement configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
