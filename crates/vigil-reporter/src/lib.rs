//! vigil-reporter — in-process load reporting for Vigil.
//!
//! Embeds in a long-running service and periodically tells a Vigil
//! collector how loaded this replica is. On shutdown the replica can be
//! flushed (deregistered) from the collector.
//!
//! # Architecture
//!
//! ```text
//! VigilReporter
//!   ├── WorkloadSampler (CPU busy ratio, memory ratio)
//!   ├── ticker (one background loop while running)
//!   │   └── per tick: sample → report(rethrow = false) → on_tick
//!   └── request::execute (timeout-bounded HTTP call via Transport)
//!       ├── POST   {url}/reporter/{probe}/{node}/
//!       └── DELETE {url}/reporter/{probe}/{node}/{replica}/
//! ```
//!
//! Failures on the timer path are logged and handed to callbacks but never
//! stop the loop. There is no retry; the next tick is the retry.

pub mod error;
pub mod logger;
pub mod options;
pub mod reporter;
pub mod request;
pub mod ticker;
pub mod workload;

pub use error::{ReporterError, ReporterResult};
pub use logger::{LoggerSetting, ReporterLogger, TracingLogger};
pub use options::{Endpoint, ErrorCallback, ReporterOptions, TickCallback};
pub use reporter::{
    EndOptions, FlushOptions, FlushResult, ReportOptions, ReportResult, StartOptions, StopOptions,
    VigilReporter,
};
pub use request::{FormatErrorFn, HttpResponse, HyperTransport, Transport};
pub use workload::{HostCounters, WorkloadSampler};

pub use vigil_core::{ConfigError, Load, ReportBody, ReporterConfig};
