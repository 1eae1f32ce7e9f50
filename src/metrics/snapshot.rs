use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Live view of a run, published while workers are busy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    pub target: u64,
    pub completed: u64,
    pub success: u64,
    pub failure: u64,
    pub active_workers: u64,
    /// Fraction of completed items that succeeded, `0.0` before any complete.
    pub success_rate: f64,
    pub requests_per_second: f64,
    pub elapsed_seconds: f64,
}

/// Final report of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub started_at: String,
    pub target: u64,
    pub completed: u64,
    pub success: u64,
    pub failure: u64,
    pub elapsed_seconds: f64,
    pub success_rate: f64,
    pub throughput: f64,
    pub avg_latency_ms: u64,
}

/// A successful item and how long it took, as used for ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub seq: u64,
    pub endpoint: String,
    pub latency_ms: f64,
    #[serde(skip)]
    pub latency: Duration,
}

impl RankedEntry {
    pub fn new(seq: u64, endpoint: impl Into<String>, latency: Duration) -> Self {
        Self {
            seq,
            endpoint: endpoint.into(),
            latency_ms: latency.as_micros() as f64 / 1000.0,
            latency,
        }
    }
}
