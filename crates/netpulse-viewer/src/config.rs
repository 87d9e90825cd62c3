//! Viewer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection and retry settings for [`crate::ViewerClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// WebSocket URL of the `/ws` endpoint.
    #[serde(default = "default_url")]
    pub url: String,
    /// Reconnections allowed after a drop (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Idle time before a ping is sent.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// A pong must arrive within this.
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,
}

fn default_url() -> String {
    "ws://127.0.0.1:5000/ws".to_string()
}

fn default_reconnect_base_delay_ms() -> u64 {
    500
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_ping_interval_ms() -> u64 {
    15_000
}

fn default_pong_timeout_ms() -> u64 {
    5_000
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
        }
    }
}

impl ViewerConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}
