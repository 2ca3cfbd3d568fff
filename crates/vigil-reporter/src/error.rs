//! Error type shared by the timed request path and the reporter lifecycle.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;
use vigil_core::ConfigError;

/// Result type alias for reporter operations.
pub type ReporterResult<T> = Result<T, ReporterError>;

/// Errors surfaced by the reporter.
///
/// Cloneable so that a single failure can be logged, handed to the
/// configured callback and returned to the caller.
#[derive(Debug, Clone, Error)]
pub enum ReporterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The collector answered with a non-success status.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    #[error("request aborted: timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The request could not be delivered (connection refused, reset, ...).
    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to build request: {0}")]
    Build(String),
}

impl ReporterError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Status code of the collector response, for `Http` errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
