//! Scripted snapshot source.
//!
//! Replays a queue of prepared results in order. Once the queue is drained
//! the last successful snapshot is repeated, so a demo pipeline keeps
//! ticking with a stable view.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::{SourceError, SourceResult};
use crate::snapshot::{RawSnapshot, SnapshotSource};

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<SourceResult<RawSnapshot>>,
    last: Option<RawSnapshot>,
    polls: usize,
}

/// Source that returns queued results.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: Mutex<Script>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful snapshot.
    pub fn push(&self, snapshot: RawSnapshot) {
        self.script.lock().queue.push_back(Ok(snapshot));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: SourceError) {
        self.script.lock().queue.push_back(Err(error));
    }

    /// Number of `poll_snapshot` calls so far.
    pub fn poll_count(&self) -> usize {
        self.script.lock().polls
    }

    /// Number of queued results not yet consumed.
    pub fn pending(&self) -> usize {
        self.script.lock().queue.len()
    }
}

impl SnapshotSource for ScriptedSource {
    fn poll_snapshot(&self) -> SourceResult<RawSnapshot> {
        let mut script = self.script.lock();
        script.polls += 1;
        match script.queue.pop_front() {
            Some(Ok(snapshot)) => {
                script.last = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(e)) => Err(e),
            None => script
                .last
                .clone()
                .ok_or_else(|| SourceError::Unavailable("script exhausted".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
