//! Core domain types for the netpulse network monitor.
//!
//! This crate provides the types shared by the sampler, the dashboard and
//! the viewer client:
//! - `ConnectionKey`, `ConnectionRecord`: per-socket identity and state
//! - `AggregateStats`, `HistorySample`, `NetworkView`: host-wide throughput
//! - `ServerMessage`, `ClientMessage`: the viewer wire protocol

pub mod connection;
pub mod error;
pub mod message;
pub mod view;

pub use connection::{ConnectionKey, ConnectionRecord, ConnectionState, Protocol};
pub use error::{CoreError, Result};
pub use message::{ClientMessage, InitialData, ServerMessage, UpdateData};
pub use view::{AggregateStats, HistorySample, NetworkView};

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
