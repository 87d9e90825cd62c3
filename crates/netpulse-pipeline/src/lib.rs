//! netpulse-pipeline - sampling, delta computation and fan-out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Sampler (one tokio task, fixed interval)                    │
//! │     │ spawn_blocking                                         │
//! │     ▼                                                        │
//! │  SnapshotSource::poll_snapshot()                             │
//! │     │                                                        │
//! │     ▼                                                        │
//! │  DeltaEngine ──► HistoryRing.append()                        │
//! │     │                                                        │
//! │     ▼                                                        │
//! │  Broadcaster::commit()                                       │
//! │     ├── StateStore.replace()   (atomic swap)                 │
//! │     └── try_send(update) ──► session 1 (capacity 1)          │
//! │                         ──► session 2                        │
//! │                         ──► ... full / closed => dropped     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tick task is the only writer. Readers load immutable frames from the
//! `StateStore` and never block it.

pub mod broadcast;
pub mod config;
pub mod delta;
pub mod error;
pub mod history;
pub mod sampler;
pub mod store;

pub use broadcast::{Broadcaster, CloseReason, FanoutReport, SessionId, Subscription};
pub use config::{SamplerConfig, MAX_HISTORY_SAMPLES};
pub use delta::{rate_per_sec, DeltaEngine, DeltaOutput};
pub use error::{PipelineError, PipelineResult};
pub use history::HistoryRing;
pub use sampler::{Sampler, TickOutcome};
pub use store::{StateStore, StoreFrame};
