//! Viewer error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Gave up after {0} reconnection attempts")]
    MaxReconnectAttempts(u32),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Message error: {0}")]
    Message(#[from] netpulse_core::CoreError),
}

pub type ViewerResult<T> = Result<T, ViewerError>;
