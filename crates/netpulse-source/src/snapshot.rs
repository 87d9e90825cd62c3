//! Raw snapshot types and the source trait.

use netpulse_core::{ConnectionKey, ConnectionState};

use crate::error::SourceResult;

/// One connection as reported by a source, before any delta work.
#[derive(Debug, Clone, PartialEq)]
pub struct RawConnection {
    pub key: ConnectionKey,
    pub state: ConnectionState,
    pub pid: Option<u32>,
    pub process_name: Option<String>,
    /// Per-connection cumulative bytes sent, if the source can attribute them.
    pub bytes_sent: Option<u64>,
    /// Per-connection cumulative bytes received, if the source can attribute them.
    pub bytes_received: Option<u64>,
}

impl RawConnection {
    /// A connection without process or byte attribution.
    pub fn new(key: ConnectionKey, state: ConnectionState) -> Self {
        Self {
            key,
            state,
            pid: None,
            process_name: None,
            bytes_sent: None,
            bytes_received: None,
        }
    }

    pub fn with_process(mut self, pid: u32, name: impl Into<String>) -> Self {
        self.pid = Some(pid);
        self.process_name = Some(name.into());
        self
    }

    pub fn with_bytes(mut self, sent: u64, received: u64) -> Self {
        self.bytes_sent = Some(sent);
        self.bytes_received = Some(received);
        self
    }
}

/// Result of one `poll_snapshot` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSnapshot {
    /// Unordered connection list.
    pub connections: Vec<RawConnection>,
    /// Host-wide cumulative bytes sent.
    pub bytes_sent: u64,
    /// Host-wide cumulative bytes received.
    pub bytes_received: u64,
}

/// Provider of raw connection snapshots.
///
/// Calls may block on file system or OS queries; the sampler runs them on
/// the blocking thread pool.
pub trait SnapshotSource: Send + Sync + 'static {
    /// Read the current connection table and host byte counters.
    fn poll_snapshot(&self) -> SourceResult<RawSnapshot>;

    /// Short name for logging.
    fn name(&self) -> &'static str;
}
