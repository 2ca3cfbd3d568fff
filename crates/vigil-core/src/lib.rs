pub mod config;
pub mod error;
pub mod types;

pub use config::{DEFAULT_INTERVAL_SECS, MAX_INTERVAL_SECS, ReporterConfig};
pub use error::ConfigError;
pub use types::*;
