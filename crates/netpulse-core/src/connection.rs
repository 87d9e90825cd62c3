//! Connection identity and per-connection state.
//!
//! A connection is identified by `(protocol, local, remote)`. The identity
//! must survive between samples so that first-observed time and byte totals
//! carry over.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::CoreError;

/// Transport protocol of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Lowercase short name, used in connection ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(CoreError::UnknownProtocol(s.to_string())),
        }
    }
}

/// Socket state as reported by the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Established,
    Listen,
    TimeWait,
    CloseWait,
    SynSent,
    SynRecv,
    Closing,
    FinWait1,
    FinWait2,
    LastAck,
    Closed,
    #[default]
    Unknown,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Established => "ESTABLISHED",
            ConnectionState::Listen => "LISTEN",
            ConnectionState::TimeWait => "TIME_WAIT",
            ConnectionState::CloseWait => "CLOSE_WAIT",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::SynRecv => "SYN_RECV",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::FinWait1 => "FIN_WAIT1",
            ConnectionState::FinWait2 => "FIN_WAIT2",
            ConnectionState::LastAck => "LAST_ACK",
            ConnectionState::Closed => "CLOSED",
            ConnectionState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a connection across samples.
///
/// Ordering is by protocol, then local, then remote address, which gives
/// views a stable row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub protocol: Protocol,
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

impl ConnectionKey {
    pub fn new(protocol: Protocol, local: SocketAddr, remote: SocketAddr) -> Self {
        Self {
            protocol,
            local,
            remote,
        }
    }

    /// True when the socket has no remote peer (listening TCP, unconnected UDP).
    pub fn is_unconnected(&self) -> bool {
        self.remote.ip().is_unspecified() && self.remote.port() == 0
    }

    /// Stable identifier exposed to consumers.
    ///
    /// Format: `{protocol}_{local}_{remote}_{first_seen_ms}`. Including the
    /// first-observed time distinguishes a reused 4-tuple from its
    /// predecessor.
    pub fn id_at(&self, first_seen_ms: i64) -> String {
        format!(
            "{}_{}_{}_{}",
            self.protocol, self.local, self.remote, first_seen_ms
        )
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.protocol, self.local, self.remote)
    }
}

/// One connection as exposed in a `NetworkView`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Stable identifier (see [`ConnectionKey::id_at`]).
    pub id: String,
    pub protocol: Protocol,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    pub state: ConnectionState,
    /// Owning process name, "Unknown" when unresolvable.
    pub process_name: String,
    /// Owning process id, absent when unresolvable.
    pub pid: Option<u32>,
    /// First time this identity was observed (Unix milliseconds).
    pub first_seen_ms: i64,
    /// Seconds since first observation.
    pub duration_secs: f64,
    /// Cumulative bytes sent, 0 when the source cannot attribute bytes.
    pub bytes_sent: u64,
    /// Cumulative bytes received, 0 when the source cannot attribute bytes.
    pub bytes_received: u64,
    /// Upload rate in bytes/sec.
    pub upload_rate: f64,
    /// Download rate in bytes/sec.
    pub download_rate: f64,
}

impl ConnectionRecord {
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.protocol, self.local_addr, self.remote_addr)
    }
}
