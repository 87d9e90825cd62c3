//! Dashboard API types.
//!
//! These types are used for JSON serialization in the REST API. The
//! WebSocket messages live in `netpulse_core::message`.

use netpulse_core::{ConnectionRecord, HistorySample};
use serde::{Deserialize, Serialize};

/// `GET /` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub status: String,
}

/// `GET /health` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Registered viewer sessions.
    pub active_viewers: usize,
    /// Seconds since the dashboard started.
    pub uptime_secs: f64,
    /// Tick of the current view, 0 before the first sample.
    pub tick: u64,
}

/// `GET /api/connections` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionsResponse {
    pub connections: Vec<ConnectionRecord>,
    pub count: usize,
}

/// `GET /api/bandwidth-history` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<HistorySample>,
    pub count: usize,
}

/// Query string of `GET /api/bandwidth-history`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    /// Trailing window; the full history when absent.
    pub window_seconds: Option<u64>,
}
