//! Application-level keepalive for a viewer connection.
//!
//! A ping is sent after `interval` without traffic from the server; once
//! sent, a pong must arrive within `timeout`.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Ping/pong bookkeeping for one connection.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    last_activity: Instant,
    ping_sent_at: Option<Instant>,
}

impl Heartbeat {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            last_activity: Instant::now(),
            ping_sent_at: None,
        }
    }

    /// Reset on a fresh connection.
    pub fn reset(&mut self) {
        self.last_activity = Instant::now();
        self.ping_sent_at = None;
    }

    /// Any frame from the server counts as activity.
    pub fn record_message(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn record_ping(&mut self) {
        self.ping_sent_at = Some(Instant::now());
    }

    pub fn record_pong(&mut self) {
        let now = Instant::now();
        if let Some(sent) = self.ping_sent_at.take() {
            debug!(rtt_ms = now.duration_since(sent).as_millis() as u64, "Received pong");
        }
        self.last_activity = now;
    }

    pub fn waiting_for_pong(&self) -> bool {
        self.ping_sent_at.is_some()
    }

    /// When the connection loop must next wake up.
    pub fn next_deadline(&self) -> Instant {
        match self.ping_sent_at {
            Some(sent) => sent + self.timeout,
            None => self.last_activity + self.interval,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        self.ping_sent_at
            .is_some_and(|sent| sent.elapsed() >= self.timeout)
    }

    /// A ping is due and none is outstanding.
    pub fn should_ping(&self) -> bool {
        self.ping_sent_at.is_none() && self.last_activity.elapsed() >= self.interval
    }
}
