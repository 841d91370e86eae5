//! Configuration errors.

use thiserror::Error;

/// Errors raised while loading or validating a run configuration.
///
/// These are the only errors allowed to stop dirstress, and only before the
/// first iteration starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error reading the run file
    #[error("Failed to read run file: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing YAML
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Duration string could not be parsed
    #[error("Invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Attack mode selector not recognized
    #[error("Unknown attack mode: {0}")]
    UnknownMode(String),

    /// Threshold metric not recognized
    #[error("Unknown threshold metric: {0}")]
    UnknownMetric(String),

    /// Threshold expression could not be parsed or does not apply to its metric
    #[error("Invalid threshold '{expression}' for metric '{metric}': {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    /// Stage schedule is unusable
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// Any other invalid field
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid_duration(value: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidDuration {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
