//! netpulse - live network connection monitor.
//!
//! Wires the components together:
//! - procfs snapshot source
//! - sampling pipeline (delta engine, history, state store, broadcaster)
//! - HTTP/WebSocket dashboard
//! - reconnecting terminal viewer (`netpulse watch`)

pub mod app;
pub mod config;
pub mod error;

pub use app::{watch, Application};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
