//! netpulse-viewer - reconnecting client for the `/ws` endpoint.
//!
//! Status machine:
//!
//! ```text
//! Connecting ──initial──► Active ──disconnect──► Closed
//!     ▲                                            │
//!     └──────── backoff ◄── Reconnecting ◄─────────┘
//!                               │
//!                               └── attempts exhausted ──► GaveUp
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod heartbeat;

pub use client::{backoff_delay, ViewerClient, ViewerEvent, ViewerStatus};
pub use config::ViewerConfig;
pub use error::{ViewerError, ViewerResult};
pub use heartbeat::Heartbeat;
