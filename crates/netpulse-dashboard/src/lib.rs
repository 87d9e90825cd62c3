//! netpulse-dashboard - HTTP and WebSocket surface for the sampler.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  axum HTTP server (default 127.0.0.1:5000)               │
//! │  GET /                        → service info             │
//! │  GET /health                  → liveness + viewer count  │
//! │  GET /api/snapshot            → current NetworkView      │
//! │  GET /api/connections         → connection list          │
//! │  GET /api/stats               → aggregate stats          │
//! │  GET /api/bandwidth-history   → rate history             │
//! │  GET /metrics                 → Prometheus text          │
//! │  GET /ws                      → viewer session           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every handler reads from the pipeline's `StateStore`; none of them can
//! stall the tick task.

mod config;
mod error;
mod server;
mod session;
mod state;
mod types;

pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::{create_router, run_server, serve_on, AppState};
pub use session::SessionState;
pub use state::DashboardState;
pub use types::{ConnectionsResponse, HealthResponse, HistoryQuery, HistoryResponse, ServiceInfo};
