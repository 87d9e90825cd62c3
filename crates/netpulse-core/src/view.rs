//! Host-wide throughput and the view exposed to consumers.

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionRecord;

/// Aggregate statistics for the whole host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Total upload rate in bytes/sec.
    pub upload_rate: f64,
    /// Total download rate in bytes/sec.
    pub download_rate: f64,
    /// Number of connections in the current view.
    pub active_connections: usize,
    /// Bytes sent since this process started sampling.
    pub total_bytes_sent: u64,
    /// Bytes received since this process started sampling.
    pub total_bytes_received: u64,
    /// Seconds since the sampler started.
    pub uptime_secs: f64,
}

/// One point of the aggregate rate history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    /// Sample timestamp (Unix milliseconds).
    pub timestamp_ms: i64,
    /// Upload rate in bytes/sec.
    pub upload_rate: f64,
    /// Download rate in bytes/sec.
    pub download_rate: f64,
}

impl HistorySample {
    pub fn new(timestamp_ms: i64, upload_rate: f64, download_rate: f64) -> Self {
        Self {
            timestamp_ms,
            upload_rate,
            download_rate,
        }
    }
}

/// The complete state exposed externally, replaced wholesale each tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkView {
    /// Timestamp of the tick that produced this view (Unix milliseconds).
    pub timestamp_ms: i64,
    /// Sequence number of the producing tick (0 = nothing sampled yet).
    pub tick: u64,
    /// Active connections, ordered by identity.
    pub connections: Vec<ConnectionRecord>,
    pub stats: AggregateStats,
}

impl NetworkView {
    /// Whether any tick has been committed.
    pub fn is_empty(&self) -> bool {
        self.tick == 0
    }
}
