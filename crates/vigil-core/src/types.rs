//! Wire types exchanged with the Vigil collector.

use serde::{Deserialize, Serialize};

/// Normalized host load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Load {
    /// CPU busy ratio (may slightly exceed 1.0 due to counter timing).
    pub cpu: f64,
    /// Memory pressure ratio.
    pub ram: f64,
}

/// Body of a `POST /reporter/{probe_id}/{node_id}/` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportBody {
    pub replica: String,
    /// Reporting interval in seconds.
    pub interval: u64,
    pub load: Load,
}
