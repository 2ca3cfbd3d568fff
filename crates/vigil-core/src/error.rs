//! Error types for reporter configuration.

use thiserror::Error;

/// Errors raised while building or validating a reporter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("VigilReporter \"{0}\" option cannot be null or empty")]
    Missing(&'static str),

    #[error("VigilReporter \"interval\" option is out of range: {0}s exceeds {max}s", max = crate::config::MAX_INTERVAL_SECS)]
    IntervalOutOfRange(u64),

    #[error("invalid collector url: {0}")]
    InvalidUrl(String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
