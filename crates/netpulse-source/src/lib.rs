//! Snapshot sources for the netpulse sampler.
//!
//! A [`SnapshotSource`] returns the host's current connection table and
//! cumulative byte counters. Each call is independent: sources keep no
//! memory of previous calls, all delta work happens in the pipeline.
//!
//! - [`ProcNetSource`]: Linux `/proc` reader
//! - [`ScriptedSource`]: replays queued results (demos and tests)

pub mod error;
pub mod procfs;
pub mod scripted;
pub mod snapshot;

pub use error::{SourceError, SourceResult};
pub use procfs::ProcNetSource;
pub use scripted::ScriptedSource;
pub use snapshot::{RawConnection, RawSnapshot, SnapshotSource};
