//! Viewer wire protocol.
//!
//! Server messages are adjacently tagged: `{"type": "...", "data": {...}}`.
//! Client messages carry only a `type` tag.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::view::{HistorySample, NetworkView};

/// Payload of the first message a session receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialData {
    pub view: NetworkView,
    /// Full history window, oldest first.
    pub history: Vec<HistorySample>,
}

/// Payload of the per-tick update message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateData {
    pub view: NetworkView,
    /// The history sample appended by this tick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<HistorySample>,
}

/// Messages sent from the server to a viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full state (sent once when a session becomes active).
    Initial(InitialData),
    /// State after one tick.
    Update(UpdateData),
    /// Keepalive response.
    Pong,
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Messages sent from a viewer to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keepalive request.
    Ping,
    /// Explicit close of the session.
    Unsubscribe,
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
