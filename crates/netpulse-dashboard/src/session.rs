//! One viewer session over a WebSocket.
//!
//! The session is registered with the broadcaster before the upgrade
//! completes (Connecting), becomes Active once the initial message is
//! written, and ends in Closed. A single task selects over the outbound
//! channel and the inbound frames.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use netpulse_core::{ClientMessage, ServerMessage};
use netpulse_pipeline::{CloseReason, Subscription};
use tracing::{debug, info, trace, warn};

/// Lifecycle of a viewer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, initial message not yet written.
    Connecting,
    /// Receiving updates.
    Active,
    /// Terminal.
    Closed,
}

type WsSink = SplitSink<WebSocket, Message>;

/// What to do after an inbound frame.
enum Inbound {
    Continue,
    Close(CloseReason),
}

struct ViewerSession {
    subscription: Subscription,
    sink: WsSink,
    write_timeout: Duration,
    state: SessionState,
}

impl ViewerSession {
    fn transition(&mut self, next: SessionState) {
        trace!(session = %self.subscription.id(), from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }

    async fn write(&mut self, text: &str) -> Result<(), CloseReason> {
        let frame = Message::Text(text.to_string().into());
        match tokio::time::timeout(self.write_timeout, self.sink.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                debug!(session = %self.subscription.id(), error = %e, "WebSocket write failed");
                Err(CloseReason::TransportError)
            }
            Err(_) => {
                warn!(
                    session = %self.subscription.id(),
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "WebSocket write timed out"
                );
                Err(CloseReason::TransportError)
            }
        }
    }

    async fn handle_inbound(&mut self, frame: Option<Result<Message, axum::Error>>) -> Inbound {
        let id = self.subscription.id();
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            // Control frames are answered by the transport
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => return Inbound::Continue,
            Some(Ok(Message::Binary(_))) => {
                debug!(session = %id, "Binary frame from viewer, closing");
                return Inbound::Close(CloseReason::TransportError);
            }
            Some(Ok(Message::Close(_))) | None => return Inbound::Close(CloseReason::ClientClosed),
            Some(Err(e)) => {
                debug!(session = %id, error = %e, "WebSocket receive error");
                return Inbound::Close(CloseReason::TransportError);
            }
        };

        match ClientMessage::from_json(text.as_str()) {
            Ok(ClientMessage::Ping) => {
                let pong = match ServerMessage::Pong.to_json() {
                    Ok(json) => json,
                    Err(_) => return Inbound::Close(CloseReason::TransportError),
                };
                match self.write(&pong).await {
                    Ok(()) => Inbound::Continue,
                    Err(reason) => Inbound::Close(reason),
                }
            }
            Ok(ClientMessage::Unsubscribe) => Inbound::Close(CloseReason::ClientClosed),
            Err(e) => {
                debug!(session = %id, error = %e, "Malformed viewer message, closing");
                Inbound::Close(CloseReason::TransportError)
            }
        }
    }
}

/// Drive a session until the viewer leaves, the transport fails or the
/// broadcaster drops it.
pub(crate) async fn run_session(
    socket: WebSocket,
    subscription: Subscription,
    write_timeout: Duration,
) {
    let (sink, mut stream) = socket.split();
    let mut session = ViewerSession {
        subscription,
        sink,
        write_timeout,
        state: SessionState::Connecting,
    };
    let id = session.subscription.id();

    let initial = session.subscription.initial().clone();
    let reason = match session.write(&initial).await {
        Err(reason) => reason,
        Ok(()) => {
            session.transition(SessionState::Active);
            info!(session = %id, "Viewer session active");

            loop {
                tokio::select! {
                    update = session.subscription.recv() => {
                        match update {
                            Some(text) => {
                                if let Err(reason) = session.write(&text).await {
                                    break reason;
                                }
                            }
                            // Dropped by the broadcaster (lagged or shutdown)
                            None => {
                                break if session.subscription.is_shutdown() {
                                    CloseReason::Shutdown
                                } else {
                                    CloseReason::Lagged
                                };
                            }
                        }
                    }
                    frame = stream.next() => {
                        if let Inbound::Close(reason) = session.handle_inbound(frame).await {
                            break reason;
                        }
                    }
                }
            }
        }
    };

    let _ = tokio::time::timeout(
        session.write_timeout,
        session.sink.send(Message::Close(None)),
    )
    .await;
    session.transition(SessionState::Closed);
    session.subscription.set_close_reason(reason);
    info!(session = %id, reason = reason.as_str(), "Viewer session closed");
}
