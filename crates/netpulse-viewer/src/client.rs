//! Reconnecting viewer connection.
//!
//! Handles connection lifecycle, keepalive and automatic reconnection with
//! capped exponential backoff. Every reconnection opens a new server-side
//! session and starts over with an `initial` message.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use netpulse_core::{ClientMessage, InitialData, ServerMessage, UpdateData};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ViewerConfig;
use crate::error::{ViewerError, ViewerResult};
use crate::heartbeat::Heartbeat;

/// Connection status as seen by the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerStatus {
    Connecting,
    /// Initial message received; updates flowing.
    Active,
    Closed,
    /// Waiting out the backoff before the next attempt.
    Reconnecting { attempt: u32 },
    /// Terminal: reconnection attempts exhausted.
    GaveUp,
}

/// Everything the client reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Status(ViewerStatus),
    Initial(InitialData),
    Update(UpdateData),
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped at `max`.
///
/// attempt=1 -> base, attempt=2 -> 2*base, attempt=3 -> 4*base.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let delay = base_ms.saturating_mul(1u64 << exponent);
    Duration::from_millis(delay.min(max_ms))
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// How one connection ended.
enum Disconnect {
    Shutdown,
    Dropped { was_active: bool },
}

/// WebSocket viewer with automatic reconnection.
pub struct ViewerClient {
    config: ViewerConfig,
    events: mpsc::Sender<ViewerEvent>,
    status: Arc<RwLock<ViewerStatus>>,
    shutdown_token: CancellationToken,
}

impl ViewerClient {
    pub fn new(config: ViewerConfig, events: mpsc::Sender<ViewerEvent>) -> Self {
        Self {
            config,
            events,
            status: Arc::new(RwLock::new(ViewerStatus::Closed)),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn status(&self) -> ViewerStatus {
        *self.status.read()
    }

    /// Token that stops [`ViewerClient::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn shutdown(&self) {
        info!("Viewer shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    async fn set_status(&self, next: ViewerStatus) {
        {
            let mut status = self.status.write();
            if *status == next {
                return;
            }
            *status = next;
        }
        self.emit(ViewerEvent::Status(next)).await;
    }

    async fn emit(&self, event: ViewerEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Viewer event receiver dropped, shutting down");
            self.shutdown_token.cancel();
        }
    }

    /// Connect and keep reconnecting until shutdown or until attempts run out.
    pub async fn run(&self) -> ViewerResult<()> {
        let mut attempt = 0u32;
        let mut heartbeat = Heartbeat::new(self.config.ping_interval(), self.config.pong_timeout());

        loop {
            if self.is_shutdown() {
                self.set_status(ViewerStatus::Closed).await;
                return Ok(());
            }

            self.set_status(ViewerStatus::Connecting).await;

            match self.try_connect(&mut heartbeat).await {
                Ok(Disconnect::Shutdown) => {
                    self.set_status(ViewerStatus::Closed).await;
                    return Ok(());
                }
                Ok(Disconnect::Dropped { was_active }) => {
                    if was_active {
                        attempt = 0;
                    }
                    info!("Viewer connection closed");
                }
                Err((e, was_active)) => {
                    if was_active {
                        attempt = 0;
                    }
                    warn!(error = %e, "Viewer connection error");
                }
            }
            self.set_status(ViewerStatus::Closed).await;

            if self.is_shutdown() {
                return Ok(());
            }

            attempt += 1;
            if self.config.max_reconnect_attempts > 0 && attempt > self.config.max_reconnect_attempts
            {
                error!(
                    attempts = self.config.max_reconnect_attempts,
                    "Max reconnection attempts reached"
                );
                self.set_status(ViewerStatus::GaveUp).await;
                return Err(ViewerError::MaxReconnectAttempts(
                    self.config.max_reconnect_attempts,
                ));
            }

            self.set_status(ViewerStatus::Reconnecting { attempt }).await;
            let delay = backoff_delay(
                attempt,
                self.config.reconnect_base_delay_ms,
                self.config.reconnect_max_delay_ms,
            );
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff");
                    self.set_status(ViewerStatus::Closed).await;
                    return Ok(());
                }
            }
        }
    }

    /// One connection. The error side carries whether Active was reached.
    async fn try_connect(
        &self,
        heartbeat: &mut Heartbeat,
    ) -> Result<Disconnect, (ViewerError, bool)> {
        info!(url = %self.config.url, "Connecting to viewer endpoint");

        let (ws_stream, _response) = tokio::select! {
            result = connect_async(self.config.url.as_str()) => {
                result.map_err(|e| (ViewerError::from(e), false))?
            }
            () = self.shutdown_token.cancelled() => return Ok(Disconnect::Shutdown),
        };
        let (mut write, mut read) = ws_stream.split();

        heartbeat.reset();
        let mut active = false;
        self.message_loop(&mut write, &mut read, heartbeat, &mut active)
            .await
            .map_err(|e| (e, active))
    }

    async fn message_loop(
        &self,
        write: &mut WsSink,
        read: &mut WsSource,
        heartbeat: &mut Heartbeat,
        active: &mut bool,
    ) -> ViewerResult<Disconnect> {
        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    if let Ok(text) = ClientMessage::Unsubscribe.to_json() {
                        let _ = write.send(Message::Text(text)).await;
                    }
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(Disconnect::Shutdown);
                }

                frame = read.next() => {
                    heartbeat.record_message();
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match ServerMessage::from_json(&text)? {
                                ServerMessage::Initial(data) => {
                                    if !*active {
                                        *active = true;
                                        self.set_status(ViewerStatus::Active).await;
                                    }
                                    self.emit(ViewerEvent::Initial(data)).await;
                                }
                                ServerMessage::Update(data) => {
                                    if !*active {
                                        return Err(ViewerError::Protocol(
                                            "update before initial".to_string(),
                                        ));
                                    }
                                    self.emit(ViewerEvent::Update(data)).await;
                                }
                                ServerMessage::Pong => heartbeat.record_pong(),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason): (u16, String) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            debug!(code, %reason, "Viewer connection closed by server");
                            return Ok(Disconnect::Dropped { was_active: *active });
                        }
                        Some(Ok(Message::Binary(_))) => {
                            return Err(ViewerError::Protocol("unexpected binary frame".to_string()));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            return Err(ViewerError::ConnectionClosed {
                                code: 1006,
                                reason: "stream ended".to_string(),
                            });
                        }
                    }
                }

                () = tokio::time::sleep_until(heartbeat.next_deadline()) => {
                    if heartbeat.is_timed_out() {
                        return Err(ViewerError::HeartbeatTimeout);
                    }
                    if heartbeat.should_ping() {
                        write.send(Message::Text(ClientMessage::Ping.to_json()?)).await?;
                        heartbeat.record_ping();
                        debug!("Sent viewer ping");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let delays: Vec<u64> = (1..=6)
            .map(|attempt| backoff_delay(attempt, 500, 5_000).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![500, 1_000, 2_000, 4_000, 5_000, 5_000]);
    }

    #[test]
    fn test_backoff_large_attempt_saturates() {
        assert_eq!(backoff_delay(u32::MAX, 1_000, 60_000), Duration::from_secs(60));
        assert_eq!(backoff_delay(0, 1_000, 60_000), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        // Reserve a port, then free it so connections are refused
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ViewerConfig {
            url: format!("ws://{addr}/ws"),
            max_reconnect_attempts: 2,
            reconnect_base_delay_ms: 10,
            reconnect_max_delay_ms: 20,
            ..ViewerConfig::default()
        };
        let (tx, mut rx) = mpsc::channel(64);
        let client = ViewerClient::new(config, tx);

        let result = client.run().await;
        assert!(matches!(result, Err(ViewerError::MaxReconnectAttempts(2))));
        assert_eq!(client.status(), ViewerStatus::GaveUp);

        let mut statuses = Vec::new();
        while let Ok(ViewerEvent::Status(status)) = rx.try_recv() {
            statuses.push(status);
        }
        assert_eq!(
            statuses,
            vec![
                ViewerStatus::Connecting,
                ViewerStatus::Closed,
                ViewerStatus::Reconnecting { attempt: 1 },
                ViewerStatus::Connecting,
                ViewerStatus::Closed,
                ViewerStatus::Reconnecting { attempt: 2 },
                ViewerStatus::Connecting,
                ViewerStatus::Closed,
                ViewerStatus::GaveUp,
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_before_run_returns_immediately() {
        let (tx, _rx) = mpsc::channel(8);
        let client = ViewerClient::new(ViewerConfig::default(), tx);
        client.shutdown();
        assert!(client.run().await.is_ok());
        assert_eq!(client.status(), ViewerStatus::Closed);
    }
}
