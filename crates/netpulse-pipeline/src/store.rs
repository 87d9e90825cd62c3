//! Single-writer, many-reader state store.
//!
//! The current view and history are published together as one immutable
//! [`StoreFrame`] behind an `ArcSwap`. Replacing is a pointer swap; readers
//! get an `Arc` to a frame that never changes underneath them.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use netpulse_core::{HistorySample, NetworkView};

/// One published state: the view and the history as of the same tick.
#[derive(Debug, Clone)]
pub struct StoreFrame {
    pub view: Arc<NetworkView>,
    /// History window, oldest first.
    pub history: Arc<[HistorySample]>,
}

impl Default for StoreFrame {
    fn default() -> Self {
        Self {
            view: Arc::new(NetworkView::default()),
            history: Arc::from(Vec::new()),
        }
    }
}

impl StoreFrame {
    /// History samples newer than `window` before the newest sample.
    pub fn history_window(&self, window: Duration) -> Vec<HistorySample> {
        let Some(newest) = self.history.last() else {
            return Vec::new();
        };
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let cutoff = newest.timestamp_ms.saturating_sub(window_ms);
        let start = self.history.partition_point(|s| s.timestamp_ms <= cutoff);
        self.history[start..].to_vec()
    }
}

/// Holder of the current [`StoreFrame`].
#[derive(Debug)]
pub struct StateStore {
    frame: ArcSwap<StoreFrame>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create a store holding an empty view.
    pub fn new() -> Self {
        Self {
            frame: ArcSwap::from_pointee(StoreFrame::default()),
        }
    }

    /// Publish a new view and history atomically.
    pub fn replace(&self, view: Arc<NetworkView>, history: Vec<HistorySample>) {
        self.frame.store(Arc::new(StoreFrame {
            view,
            history: history.into(),
        }));
    }

    /// The current frame.
    pub fn frame(&self) -> Arc<StoreFrame> {
        self.frame.load_full()
    }

    /// The current view.
    pub fn current_view(&self) -> Arc<NetworkView> {
        Arc::clone(&self.frame.load().view)
    }

    /// The full history window, oldest first.
    pub fn history(&self) -> Arc<[HistorySample]> {
        Arc::clone(&self.frame.load().history)
    }

    /// History limited to the last `window`.
    pub fn history_window(&self, window: Duration) -> Vec<HistorySample> {
        self.frame.load().history_window(window)
    }
}
