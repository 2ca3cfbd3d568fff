//! Reporter options and the collector endpoint derived from them.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{HeaderValue, Uri};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use vigil_core::{ConfigError, ReporterConfig};

use crate::error::ReporterError;
use crate::logger::{LoggerSetting, ReporterLogger};
use crate::request::{FormatErrorFn, Transport};
use crate::workload::HostCounters;
use crate::ReportResult;

/// Request timeout used for flushes, and for reports once the interval
/// reaches 15 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Characters left unescaped in path segments, matching `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Invoked with the outcome of every timer-driven report.
pub type TickCallback = Arc<dyn Fn(ReportResult) + Send + Sync>;

/// Invoked when a report or flush fails.
pub type ErrorCallback = Arc<dyn Fn(&ReporterError) + Send + Sync>;

/// Everything needed to build a reporter.
pub struct ReporterOptions {
    pub(crate) config: ReporterConfig,
    pub(crate) logger: LoggerSetting,
    pub(crate) on_tick: Option<TickCallback>,
    pub(crate) on_report_error: Option<ErrorCallback>,
    pub(crate) on_flush_error: Option<ErrorCallback>,
    pub(crate) format_error: Option<FormatErrorFn>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) counters: Option<Box<dyn HostCounters>>,
}

impl ReporterOptions {
    pub fn new(config: ReporterConfig) -> Self {
        Self {
            config,
            logger: LoggerSetting::Default,
            on_tick: None,
            on_report_error: None,
            on_flush_error: None,
            format_error: None,
            transport: None,
            counters: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn ReporterLogger>) -> Self {
        self.logger = LoggerSetting::Custom(logger);
        self
    }

    /// Silence the logger entirely. Callbacks and return values still
    /// carry every outcome.
    pub fn without_logger(mut self) -> Self {
        self.logger = LoggerSetting::Disabled;
        self
    }

    pub fn with_logger_setting(mut self, logger: LoggerSetting) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_on_tick(mut self, callback: TickCallback) -> Self {
        self.on_tick = Some(callback);
        self
    }

    pub fn with_on_report_error(mut self, callback: ErrorCallback) -> Self {
        self.on_report_error = Some(callback);
        self
    }

    pub fn with_on_flush_error(mut self, callback: ErrorCallback) -> Self {
        self.on_flush_error = Some(callback);
        self
    }

    /// Replace the message built for non-success collector responses.
    pub fn with_format_error(mut self, format: FormatErrorFn) -> Self {
        self.format_error = Some(format);
        self
    }

    /// Replace the HTTP transport (defaults to [`crate::HyperTransport`]).
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the host counter source used by the workload sampler.
    pub fn with_counters(mut self, counters: Box<dyn HostCounters>) -> Self {
        self.counters = Some(counters);
        self
    }
}

impl From<ReporterConfig> for ReporterOptions {
    fn from(config: ReporterConfig) -> Self {
        Self::new(config)
    }
}

/// Collector addresses and credentials, derived once per reporter.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub report_uri: Uri,
    pub flush_uri: Uri,
    pub authorization: HeaderValue,
    /// Deadline applied to each report request.
    pub timeout: Duration,
}

impl Endpoint {
    /// Derive the endpoint from a validated config.
    pub fn from_config(config: &ReporterConfig) -> Result<Self, ConfigError> {
        let mut base = config.url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let report = format!(
            "{base}reporter/{}/{}/",
            encode_component(&config.probe_id),
            encode_component(&config.node_id)
        );
        let flush = format!("{report}{}/", encode_component(&config.replica_id));

        let report_uri = parse_absolute(&report)?;
        let flush_uri = parse_absolute(&flush)?;

        let credentials = STANDARD.encode(format!(":{}", config.token));
        let mut authorization = HeaderValue::from_str(&format!("Basic {credentials}"))
            .map_err(|e| ConfigError::Parse(format!("authorization header: {e}")))?;
        authorization.set_sensitive(true);

        Ok(Self {
            report_uri,
            flush_uri,
            authorization,
            timeout: report_timeout(config.interval),
        })
    }
}

/// Half the interval below 15 seconds, [`DEFAULT_TIMEOUT`] otherwise.
pub fn report_timeout(interval_secs: u64) -> Duration {
    if interval_secs < 15 {
        Duration::from_millis(interval_secs * 1000 / 2)
    } else {
        DEFAULT_TIMEOUT
    }
}

fn encode_component(segment: &str) -> String {
    utf8_percent_encode(segment, COMPONENT).to_string()
}

fn parse_absolute(url: &str) -> Result<Uri, ConfigError> {
    let uri: Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| ConfigError::InvalidUrl(format!("{url}: {e}")))?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(ConfigError::InvalidUrl(format!("{url}: not an absolute url")));
    }
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> ReporterConfig {
        ReporterConfig::new(url, "...", "api", "my-backend", "the-one")
    }

    #[test]
    fn endpoint_paths_with_and_without_trailing_slash() {
        for url in ["http://localhost:8080", "http://localhost:8080/"] {
            let endpoint = Endpoint::from_config(&config(url)).unwrap();
            assert_eq!(
                endpoint.report_uri.to_string(),
                "http://localhost:8080/reporter/api/my-backend/"
            );
            assert_eq!(
                endpoint.flush_uri.to_string(),
                "http://localhost:8080/reporter/api/my-backend/the-one/"
            );
        }
    }

    #[test]
    fn endpoint_keeps_url_prefix() {
        let endpoint = Endpoint::from_config(&config("https://status.example.com/vigil/")).unwrap();
        assert_eq!(
            endpoint.report_uri.to_string(),
            "https://status.example.com/vigil/reporter/api/my-backend/"
        );
    }

    #[test]
    fn identifiers_are_percent_encoded() {
        let mut config = config("http://localhost");
        config.node_id = "eu west/1".to_string();
        config.replica_id = "host:9000?x".to_string();
        let endpoint = Endpoint::from_config(&config).unwrap();
        assert_eq!(
            endpoint.flush_uri.to_string(),
            "http://localhost/reporter/api/eu%20west%2F1/host%3A9000%3Fx/"
        );
    }

    #[test]
    fn unreserved_marks_are_left_alone() {
        assert_eq!(encode_component("a-b_c.d!e~f*g'h(i)"), "a-b_c.d!e~f*g'h(i)");
    }

    #[test]
    fn basic_auth_uses_empty_username() {
        let endpoint = Endpoint::from_config(&config("http://localhost")).unwrap();
        // base64(":...")
        assert_eq!(endpoint.authorization.to_str().unwrap(), "Basic Oi4uLg==");
        assert!(endpoint.authorization.is_sensitive());
    }

    #[test]
    fn relative_url_is_rejected() {
        let err = Endpoint::from_config(&config("localhost")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn timeout_is_half_interval_below_fifteen_seconds() {
        assert_eq!(report_timeout(1), Duration::from_millis(500));
        assert_eq!(report_timeout(10), Duration::from_secs(5));
        assert_eq!(report_timeout(14), Duration::from_secs(7));
        assert_eq!(report_timeout(15), DEFAULT_TIMEOUT);
        assert_eq!(report_timeout(30), DEFAULT_TIMEOUT);
    }
}
