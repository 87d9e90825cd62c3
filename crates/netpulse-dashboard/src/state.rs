//! Read side of the pipeline as seen by HTTP handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use netpulse_core::{HistorySample, NetworkView};
use netpulse_pipeline::{Broadcaster, PipelineResult, Subscription};

use crate::types::HealthResponse;

/// Handle shared by every handler.
///
/// Cloning is cheap; all clones point at the same broadcaster and store.
#[derive(Debug, Clone)]
pub struct DashboardState {
    broadcaster: Arc<Broadcaster>,
    started_at: Instant,
}

impl DashboardState {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            broadcaster,
            started_at: Instant::now(),
        }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Latest committed view.
    pub fn current_view(&self) -> Arc<NetworkView> {
        self.broadcaster.store().current_view()
    }

    /// History samples, restricted to a trailing window when given.
    pub fn history(&self, window: Option<Duration>) -> Vec<HistorySample> {
        let store = self.broadcaster.store();
        match window {
            Some(window) => store.history_window(window),
            None => store.history().to_vec(),
        }
    }

    pub fn active_viewers(&self) -> usize {
        self.broadcaster.session_count()
    }

    pub fn subscribe(&self) -> PipelineResult<Subscription> {
        self.broadcaster.subscribe()
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".to_string(),
            active_viewers: self.active_viewers(),
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            tick: self.current_view().tick,
        }
    }
}
