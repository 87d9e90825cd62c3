//! Fan-out of committed ticks to viewer sessions.
//!
//! Each session owns a bounded channel of capacity 1. A tick is serialized
//! once and offered to every session with `try_send`; a session whose
//! channel is still full from the previous tick, or whose receiver is gone,
//! is removed on the spot. Nothing the sessions do can make the commit wait.
//!
//! The registry lock also covers the store swap, so a new subscriber's
//! initial message and its first update never overlap or leave a gap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use netpulse_core::{HistorySample, InitialData, NetworkView, ServerMessage, UpdateData};
use netpulse_telemetry::Metrics;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::store::StateStore;

/// Identifier of one session instance.
pub type SessionId = Uuid;

/// Why a session left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Outbound channel still full when the next tick arrived.
    Lagged,
    /// Viewer disconnected or unsubscribed.
    ClientClosed,
    /// Write failure, write timeout or malformed inbound message.
    TransportError,
    /// Pipeline shutting down.
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Lagged => "lagged",
            CloseReason::ClientClosed => "client_closed",
            CloseReason::TransportError => "transport_error",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// Outcome of one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Sessions that accepted the update.
    pub delivered: usize,
    /// Sessions removed during this commit.
    pub dropped: usize,
}

/// Registry of live sessions and owner of the commit path.
#[derive(Debug)]
pub struct Broadcaster {
    store: Arc<StateStore>,
    sessions: Mutex<HashMap<SessionId, mpsc::Sender<Arc<str>>>>,
    max_sessions: usize,
    closed: AtomicBool,
}

impl Broadcaster {
    pub fn new(store: Arc<StateStore>, max_sessions: usize) -> Self {
        Self {
            store,
            sessions: Mutex::new(HashMap::new()),
            max_sessions,
            closed: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Publish a tick: swap the store, then offer the update to every session.
    pub fn commit(
        &self,
        view: NetworkView,
        sample: Option<HistorySample>,
        history: Vec<HistorySample>,
    ) -> FanoutReport {
        let update = ServerMessage::Update(UpdateData {
            view: view.clone(),
            sample,
        });
        let encoded: Option<Arc<str>> = match update.to_json() {
            Ok(json) => Some(json.into()),
            Err(e) => {
                error!(error = %e, "Failed to serialize update");
                None
            }
        };
        let tick = view.tick;

        let mut report = FanoutReport::default();
        let mut dropped: Vec<(SessionId, CloseReason)> = Vec::new();
        {
            let mut sessions = self.sessions.lock();
            self.store.replace(Arc::new(view), history);

            if let Some(msg) = &encoded {
                for (id, tx) in sessions.iter() {
                    match tx.try_send(Arc::clone(msg)) {
                        Ok(()) => report.delivered += 1,
                        Err(TrySendError::Full(_)) => dropped.push((*id, CloseReason::Lagged)),
                        Err(TrySendError::Closed(_)) => {
                            dropped.push((*id, CloseReason::ClientClosed))
                        }
                    }
                }
                for (id, _) in &dropped {
                    sessions.remove(id);
                }
            }
        }

        report.dropped = dropped.len();
        for (id, reason) in dropped {
            Metrics::session_closed(reason.as_str());
            match reason {
                CloseReason::Lagged => {
                    warn!(session = %id, tick, "Session did not drain previous update, dropping")
                }
                _ => debug!(session = %id, reason = reason.as_str(), "Session removed"),
            }
        }
        report
    }

    /// Register a new session.
    ///
    /// The returned subscription carries the fully built initial message;
    /// every update it receives afterwards belongs to a later tick.
    pub fn subscribe(self: &Arc<Self>) -> PipelineResult<Subscription> {
        if self.is_closed() {
            return Err(PipelineError::Shutdown);
        }

        let (id, initial, rx) = {
            let mut sessions = self.sessions.lock();
            if sessions.len() >= self.max_sessions {
                return Err(PipelineError::SessionLimit {
                    max: self.max_sessions,
                });
            }

            let frame = self.store.frame();
            let initial = ServerMessage::Initial(InitialData {
                view: (*frame.view).clone(),
                history: frame.history.to_vec(),
            })
            .to_json()?;

            let (tx, rx) = mpsc::channel(1);
            let id = Uuid::new_v4();
            sessions.insert(id, tx);
            (id, Arc::<str>::from(initial), rx)
        };

        Metrics::session_opened();
        debug!(session = %id, "Session registered");

        Ok(Subscription {
            id,
            initial,
            rx,
            broadcaster: Arc::clone(self),
            close_reason: CloseReason::ClientClosed,
        })
    }

    fn unregister(&self, id: SessionId, reason: CloseReason) {
        let removed = self.sessions.lock().remove(&id).is_some();
        if removed {
            Metrics::session_closed(reason.as_str());
            debug!(session = %id, reason = reason.as_str(), "Session unregistered");
        }
    }

    /// Refuse new sessions and drop every registered one.
    ///
    /// Subscribers drain what is already buffered, then see end of stream.
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<SessionId> = self.sessions.lock().drain().map(|(id, _)| id).collect();
        for _ in &drained {
            Metrics::session_closed(CloseReason::Shutdown.as_str());
        }
        info!(sessions = drained.len(), "Closed all sessions");
    }
}

/// A registered session's receiving end.
///
/// Dropping it unregisters the session.
#[derive(Debug)]
pub struct Subscription {
    id: SessionId,
    initial: Arc<str>,
    rx: mpsc::Receiver<Arc<str>>,
    broadcaster: Arc<Broadcaster>,
    close_reason: CloseReason,
}

impl Subscription {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The serialized initial message.
    pub fn initial(&self) -> &Arc<str> {
        &self.initial
    }

    /// Next serialized update, `None` once the broadcaster dropped us.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    /// Whether the broadcaster has shut down.
    pub fn is_shutdown(&self) -> bool {
        self.broadcaster.is_closed()
    }

    /// Reason recorded when this subscription is dropped.
    pub fn set_close_reason(&mut self, reason: CloseReason) {
        self.close_reason = reason;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unregister(self.id, self.close_reason);
    }
}
