//! Reporter lifecycle.
//!
//! A [`VigilReporter`] is either stopped or running; it is running exactly
//! while a ticker is armed. Each tick refreshes the cached workload and
//! posts it to the collector, swallowing failures after they have been
//! logged and handed to the configured callbacks. Manual [`report`] and
//! [`flush`] calls share the same timed request path but propagate errors
//! to the caller unless asked not to.
//!
//! [`report`]: VigilReporter::report
//! [`flush`]: VigilReporter::flush

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{Method, Request, Uri};
use tracing::debug;
use vigil_core::{Load, ReportBody, ReporterConfig};

use crate::error::{ReporterError, ReporterResult};
use crate::logger::ReporterLogger;
use crate::options::{DEFAULT_TIMEOUT, Endpoint, ErrorCallback, ReporterOptions, TickCallback};
use crate::request::{self, FormatErrorFn, HyperTransport, Transport};
use crate::ticker::{self, TickerHandle};
use crate::workload::{HostCounters, SystemCounters, WorkloadSampler};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

const USER_AGENT_VALUE: &str = concat!("vigil-reporter/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    /// Send one report before arming the timer and fail if it is rejected.
    pub ensure: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StopOptions {
    /// Deregister the replica after stopping the timer.
    pub flush: bool,
}

/// Arguments of [`VigilReporter::end`].
#[derive(Default)]
pub struct EndOptions {
    pub flush: bool,
    /// Called once with the shutdown outcome.
    pub done: Option<Box<dyn FnOnce(Option<ReporterError>) + Send>>,
}

impl EndOptions {
    pub fn flush(mut self, flush: bool) -> Self {
        self.flush = flush;
        self
    }

    pub fn done(mut self, done: impl FnOnce(Option<ReporterError>) + Send + 'static) -> Self {
        self.done = Some(Box::new(done));
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    /// Return failures as `Err` (the default) instead of inside the result.
    pub rethrow: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self { rethrow: true }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FlushOptions {
    /// Return failures as `Err` (the default) instead of inside the result.
    pub rethrow: bool,
    /// Request deadline; 15 seconds when unset or zero.
    pub timeout: Option<Duration>,
}

impl Default for FlushOptions {
    fn default() -> Self {
        Self {
            rethrow: true,
            timeout: None,
        }
    }
}

/// Outcome of one report attempt.
#[derive(Debug, Clone)]
pub struct ReportResult {
    /// Body posted to the collector.
    pub body_sent: ReportBody,
    pub error: Option<ReporterError>,
}

/// Outcome of one flush attempt.
#[derive(Debug, Clone, Default)]
pub struct FlushResult {
    pub error: Option<ReporterError>,
}

/// Periodically reports this replica's load to a Vigil collector.
pub struct VigilReporter {
    inner: Arc<Inner>,
    /// Present while running.
    ticker: Mutex<Option<TickerHandle>>,
}

struct Inner {
    config: ReporterConfig,
    endpoint: Endpoint,
    logger: Option<Arc<dyn ReporterLogger>>,
    on_tick: Option<TickCallback>,
    on_report_error: Option<ErrorCallback>,
    on_flush_error: Option<ErrorCallback>,
    format_error: Option<FormatErrorFn>,
    transport: Arc<dyn Transport>,
    sampler: Arc<Mutex<WorkloadSampler<Box<dyn HostCounters>>>>,
    /// Load measured by the last tick, consumed by the next report.
    current_usage: Mutex<Option<Load>>,
}

impl VigilReporter {
    /// Build a reporter. Fails if a required option is empty or the
    /// collector url is not absolute.
    pub fn new(options: impl Into<ReporterOptions>) -> ReporterResult<Self> {
        let options = options.into();
        let config = options.config.normalized();
        config.validate()?;
        let endpoint = Endpoint::from_config(&config)?;

        let transport = options
            .transport
            .unwrap_or_else(|| Arc::new(HyperTransport::new()));
        let counters = options
            .counters
            .unwrap_or_else(|| Box::new(SystemCounters::new()));

        debug!(
            report_url = %endpoint.report_uri,
            interval = config.interval,
            timeout_ms = endpoint.timeout.as_millis() as u64,
            "vigil reporter configured"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                endpoint,
                logger: options.logger.resolve(),
                on_tick: options.on_tick,
                on_report_error: options.on_report_error,
                on_flush_error: options.on_flush_error,
                format_error: options.format_error,
                transport,
                sampler: Arc::new(Mutex::new(WorkloadSampler::with_counters(counters))),
                current_usage: Mutex::new(None),
            }),
            ticker: Mutex::new(None),
        })
    }

    /// Build a reporter with the default logger, transport and counters.
    pub fn from_config(config: ReporterConfig) -> ReporterResult<Self> {
        Self::new(ReporterOptions::from(config))
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.inner.config
    }

    /// Deadline applied to each report request.
    pub fn timeout(&self) -> Duration {
        self.inner.endpoint.timeout
    }

    pub fn report_url(&self) -> &Uri {
        &self.inner.endpoint.report_uri
    }

    pub fn flush_url(&self) -> &Uri {
        &self.inner.endpoint.flush_uri
    }

    pub fn is_running(&self) -> bool {
        lock(&self.ticker).is_some()
    }

    /// Start the reporting loop, restarting it if already running.
    ///
    /// With `ensure`, one report is sent first; if it fails the error is
    /// returned and the loop is not started.
    pub async fn start(&self, options: StartOptions) -> ReporterResult<()> {
        if self.is_running() {
            self.inner.log_warn("vigil-reporter.restart");
            self.stop(StopOptions::default()).await?;
        }

        self.inner.log_info("vigil-reporter.start");

        if options.ensure {
            self.inner.report(ReportOptions::default()).await?;
        }

        // Baseline for the first tick's CPU window.
        self.inner.sample().await;

        let inner = Arc::clone(&self.inner);
        let period = Duration::from_secs(self.inner.config.interval);
        let handle = ticker::arm(period, move || {
            let inner = Arc::clone(&inner);
            async move { inner.tick().await }
        });

        if let Some(previous) = lock(&self.ticker).replace(handle) {
            previous.disarm();
        }
        Ok(())
    }

    /// Stop the reporting loop. In-flight requests are not cancelled.
    ///
    /// With `flush`, the replica is deregistered and a flush failure is
    /// returned.
    pub async fn stop(&self, options: StopOptions) -> ReporterResult<()> {
        let handle = lock(&self.ticker).take();
        if let Some(handle) = handle {
            self.inner.log_info("vigil-reporter.stop");
            handle.disarm();
        }

        let result = if options.flush {
            self.inner.flush(FlushOptions::default()).await.map(|_| ())
        } else {
            Ok(())
        };

        *lock(&self.inner.current_usage) = None;
        result
    }

    /// Stop, reporting the outcome through `options.done` rather than a
    /// return value.
    pub async fn end(&self, options: EndOptions) {
        let result = self.stop(StopOptions { flush: options.flush }).await;
        if let Some(done) = options.done {
            done(result.err());
        }
    }

    /// Post the current load to the collector once.
    pub async fn report(&self, options: ReportOptions) -> ReporterResult<ReportResult> {
        self.inner.report(options).await
    }

    /// Deregister this replica from the collector.
    pub async fn flush(&self, options: FlushOptions) -> ReporterResult<FlushResult> {
        self.inner.flush(options).await
    }
}

impl Drop for VigilReporter {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.ticker).take() {
            handle.disarm();
        }
    }
}

impl Inner {
    async fn tick(&self) {
        let load = self.sample().await;
        *lock(&self.current_usage) = Some(load);

        let result = self.report(ReportOptions { rethrow: false }).await;
        match (result, &self.on_tick) {
            (Ok(result), Some(on_tick)) => on_tick(result),
            (Ok(_), None) => {}
            // Not produced while rethrow is off.
            (Err(e), _) => debug!(error = %e, "tick report failed"),
        }
    }

    async fn report(&self, options: ReportOptions) -> ReporterResult<ReportResult> {
        self.log_info("vigil-reporter.report");

        let cached = *lock(&self.current_usage);
        let load = match cached {
            Some(load) => load,
            None => self.sample().await,
        };
        let body = ReportBody {
            replica: self.config.replica_id.clone(),
            interval: self.config.interval,
            load,
        };

        let outcome = match self.build_report_request(&body) {
            Ok(req) => request::execute(
                self.transport.as_ref(),
                req,
                self.endpoint.timeout,
                self.format_error.as_ref(),
            )
            .await
            .map(|_| ()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => Ok(ReportResult {
                body_sent: body,
                error: None,
            }),
            Err(e) => {
                self.log_error("vigil-reporter.report", &e);
                if let Some(callback) = &self.on_report_error {
                    callback(&e);
                }
                if options.rethrow {
                    Err(e)
                } else {
                    Ok(ReportResult {
                        body_sent: body,
                        error: Some(e),
                    })
                }
            }
        }
    }

    async fn flush(&self, options: FlushOptions) -> ReporterResult<FlushResult> {
        self.log_info("vigil-reporter.flush");

        let timeout = options
            .timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(DEFAULT_TIMEOUT);
        let outcome = match self.build_flush_request() {
            Ok(req) => request::execute(
                self.transport.as_ref(),
                req,
                timeout,
                self.format_error.as_ref(),
            )
            .await
            .map(|_| ()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => Ok(FlushResult::default()),
            Err(e) => {
                self.log_error("vigil-reporter.flush", &e);
                if let Some(callback) = &self.on_flush_error {
                    callback(&e);
                }
                if options.rethrow {
                    Err(e)
                } else {
                    Ok(FlushResult { error: Some(e) })
                }
            }
        }
    }

    fn build_report_request(&self, body: &ReportBody) -> ReporterResult<Request<Bytes>> {
        let payload = serde_json::to_vec(body).map_err(|e| ReporterError::Build(e.to_string()))?;
        Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.report_uri.clone())
            .header(AUTHORIZATION, self.endpoint.authorization.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(Bytes::from(payload))
            .map_err(|e| ReporterError::Build(e.to_string()))
    }

    fn build_flush_request(&self) -> ReporterResult<Request<Bytes>> {
        Request::builder()
            .method(Method::DELETE)
            .uri(self.endpoint.flush_uri.clone())
            .header(AUTHORIZATION, self.endpoint.authorization.clone())
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(Bytes::new())
            .map_err(|e| ReporterError::Build(e.to_string()))
    }

    /// Read host counters on the blocking pool.
    async fn sample(&self) -> Load {
        let sampler = Arc::clone(&self.sampler);
        match tokio::task::spawn_blocking(move || lock(&sampler).sample()).await {
            Ok(load) => load,
            Err(e) => {
                debug!(error = %e, "workload sampling task failed");
                Load::default()
            }
        }
    }

    fn log_info(&self, event: &str) {
        if let Some(logger) = &self.logger {
            logger.info(event);
        }
    }

    fn log_warn(&self, event: &str) {
        if let Some(logger) = &self.logger {
            logger.warn(event);
        }
    }

    fn log_error(&self, event: &str, error: &ReporterError) {
        if let Some(logger) = &self.logger {
            logger.error(event, error);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
