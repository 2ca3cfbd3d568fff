//! Logger capability injected into the reporter.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::ReporterError;

/// Sink for reporter lifecycle events.
///
/// Every method has an empty default body, so an implementation may
/// override only the levels it cares about.
pub trait ReporterLogger: Send + Sync {
    fn info(&self, _event: &str) {}

    fn warn(&self, _event: &str) {}

    fn error(&self, _event: &str, _error: &ReporterError) {}
}

/// Default sink: forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl ReporterLogger for TracingLogger {
    fn info(&self, event: &str) {
        info!(target: "vigil_reporter", %event);
    }

    fn warn(&self, event: &str) {
        warn!(target: "vigil_reporter", %event);
    }

    fn error(&self, event: &str, err: &ReporterError) {
        error!(target: "vigil_reporter", %event, error = %err);
    }
}

/// Which logger the reporter should use.
#[derive(Clone, Default)]
pub enum LoggerSetting {
    /// Use [`TracingLogger`].
    #[default]
    Default,
    /// Log nothing.
    Disabled,
    Custom(Arc<dyn ReporterLogger>),
}

impl LoggerSetting {
    pub(crate) fn resolve(self) -> Option<Arc<dyn ReporterLogger>> {
        match self {
            Self::Default => Some(Arc::new(TracingLogger)),
            Self::Disabled => None,
            Self::Custom(logger) => Some(logger),
        }
    }
}

impl std::fmt::Debug for LoggerSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Disabled => f.write_str("Disabled"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct ErrorsOnly {
        errors: Mutex<Vec<String>>,
    }

    impl ReporterLogger for ErrorsOnly {
        fn error(&self, event: &str, _error: &ReporterError) {
            self.errors.lock().unwrap().push(event.to_string());
        }
    }

    #[test]
    fn partial_logger_tolerates_missing_levels() {
        let logger = ErrorsOnly::default();
        logger.info("vigil-reporter.report");
        logger.warn("vigil-reporter.restart");
        logger.error("vigil-reporter.report", &ReporterError::Request("refused".into()));
        assert_eq!(*logger.errors.lock().unwrap(), vec!["vigil-reporter.report"]);
    }

    #[test]
    fn disabled_resolves_to_none() {
        assert!(LoggerSetting::Disabled.resolve().is_none());
        assert!(LoggerSetting::Default.resolve().is_some());
        let custom: Arc<dyn ReporterLogger> = Arc::new(ErrorsOnly::default());
        assert!(LoggerSetting::Custom(custom).resolve().is_some());
    }
}
