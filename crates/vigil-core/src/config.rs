//! Reporter configuration: collector location, replica identity, interval.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Reporting interval used when none (or zero) is configured.
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

/// Longest accepted reporting interval (one year).
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// `page_url` of the Vigil collector.
    pub url: String,
    /// `reporter_token` of the Vigil collector.
    pub token: String,
    /// Probe containing the parent node of this replica.
    pub probe_id: String,
    /// Node containing this replica.
    pub node_id: String,
    pub replica_id: String,
    /// Reporting interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl ReporterConfig {
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        probe_id: impl Into<String>,
        node_id: impl Into<String>,
        replica_id: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            probe_id: probe_id.into(),
            node_id: node_id.into(),
            replica_id: replica_id.into(),
            interval: DEFAULT_INTERVAL_SECS,
        }
    }

    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply defaults for fields left unset. A zero interval counts as unset.
    pub fn normalized(mut self) -> Self {
        if self.interval == 0 {
            self.interval = DEFAULT_INTERVAL_SECS;
        }
        self
    }

    /// Check that every required field is non-empty and the interval can
    /// be scheduled.
    ///
    /// Fields are checked in declaration order and the first offender is
    /// reported. No I/O is performed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields: [(&'static str, bool); 6] = [
            ("url", self.url.is_empty()),
            ("token", self.token.is_empty()),
            ("probe_id", self.probe_id.is_empty()),
            ("node_id", self.node_id.is_empty()),
            ("replica_id", self.replica_id.is_empty()),
            ("interval", self.interval == 0),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, empty)| *empty) {
            return Err(ConfigError::Missing(*name));
        }
        if self.interval > MAX_INTERVAL_SECS {
            return Err(ConfigError::IntervalOutOfRange(self.interval));
        }
        Ok(())
    }
}

impl fmt::Debug for ReporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("probe_id", &self.probe_id)
            .field("node_id", &self.node_id)
            .field("replica_id", &self.replica_id)
            .field("interval", &self.interval)
            .finish()
    }
}
