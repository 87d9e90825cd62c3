//! Delta engine.
//!
//! Compares each snapshot with the previous one by connection identity and
//! derives rates, durations and totals. Rates are never negative: a counter
//! that went backwards (reset, wrap, process restart) reads as 0 for that
//! tick.

use std::collections::HashMap;

use netpulse_core::{
    AggregateStats, ConnectionKey, ConnectionRecord, HistorySample, NetworkView,
};
use netpulse_source::RawSnapshot;
use tracing::trace;

/// Bytes/sec between two cumulative readings taken `elapsed_ms` apart.
///
/// Returns 0 when the counter decreased or no time elapsed.
pub fn rate_per_sec(previous: u64, current: u64, elapsed_ms: i64) -> f64 {
    if elapsed_ms <= 0 || current < previous {
        return 0.0;
    }
    (current - previous) as f64 * 1000.0 / elapsed_ms as f64
}

/// Rate for optional per-connection counters; unknown on either side is 0.
fn optional_rate(previous: Option<u64>, current: Option<u64>, elapsed_ms: i64) -> f64 {
    match (previous, current) {
        (Some(p), Some(c)) => rate_per_sec(p, c, elapsed_ms),
        _ => 0.0,
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    first_seen_ms: i64,
    bytes_sent: Option<u64>,
    bytes_received: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct PreviousTick {
    timestamp_ms: i64,
    bytes_sent: u64,
    bytes_received: u64,
}

/// Result of applying one snapshot.
#[derive(Debug, Clone)]
pub struct DeltaOutput {
    pub view: NetworkView,
    pub sample: HistorySample,
    /// Identities seen for the first time this tick.
    pub opened: Vec<ConnectionKey>,
    /// Identities present last tick and absent now.
    pub closed: Vec<ConnectionKey>,
}

/// Stateful delta computation across consecutive snapshots.
#[derive(Debug)]
pub struct DeltaEngine {
    started_at_ms: i64,
    include_unconnected: bool,
    previous: Option<PreviousTick>,
    tracked: HashMap<ConnectionKey, Tracked>,
    total_sent: u64,
    total_received: u64,
    tick: u64,
}

impl DeltaEngine {
    /// Create an engine. `started_at_ms` anchors uptime.
    pub fn new(started_at_ms: i64, include_unconnected: bool) -> Self {
        Self {
            started_at_ms,
            include_unconnected,
            previous: None,
            tracked: HashMap::new(),
            total_sent: 0,
            total_received: 0,
            tick: 0,
        }
    }

    /// Number of snapshots applied so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Number of connections carried into the next tick.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Apply a snapshot taken at `timestamp_ms`.
    pub fn apply(&mut self, snapshot: RawSnapshot, timestamp_ms: i64) -> DeltaOutput {
        let elapsed_ms = self.previous.map(|p| timestamp_ms - p.timestamp_ms);

        let (upload_rate, download_rate) = match self.previous {
            Some(prev) => {
                let elapsed = timestamp_ms - prev.timestamp_ms;
                self.total_sent = self
                    .total_sent
                    .saturating_add(snapshot.bytes_sent.saturating_sub(prev.bytes_sent));
                self.total_received = self
                    .total_received
                    .saturating_add(snapshot.bytes_received.saturating_sub(prev.bytes_received));
                (
                    rate_per_sec(prev.bytes_sent, snapshot.bytes_sent, elapsed),
                    rate_per_sec(prev.bytes_received, snapshot.bytes_received, elapsed),
                )
            }
            None => (0.0, 0.0),
        };

        let mut tracked = HashMap::with_capacity(snapshot.connections.len());
        let mut records = Vec::with_capacity(snapshot.connections.len());
        let mut opened = Vec::new();

        for conn in snapshot.connections {
            if !self.include_unconnected && conn.key.is_unconnected() {
                continue;
            }
            if tracked.contains_key(&conn.key) {
                trace!(key = %conn.key, "Duplicate connection in snapshot, keeping first");
                continue;
            }

            let previous = self.tracked.get(&conn.key);
            let first_seen_ms = previous.map_or(timestamp_ms, |p| p.first_seen_ms);
            if previous.is_none() {
                opened.push(conn.key);
            }

            let (up, down) = match (previous, elapsed_ms) {
                (Some(p), Some(elapsed)) => (
                    optional_rate(p.bytes_sent, conn.bytes_sent, elapsed),
                    optional_rate(p.bytes_received, conn.bytes_received, elapsed),
                ),
                _ => (0.0, 0.0),
            };

            records.push(ConnectionRecord {
                id: conn.key.id_at(first_seen_ms),
                protocol: conn.key.protocol,
                local_addr: conn.key.local,
                remote_addr: conn.key.remote,
                state: conn.state,
                process_name: conn
                    .process_name
                    .unwrap_or_else(|| "Unknown".to_string()),
                pid: conn.pid,
                first_seen_ms,
                duration_secs: (timestamp_ms - first_seen_ms).max(0) as f64 / 1000.0,
                bytes_sent: conn.bytes_sent.unwrap_or(0),
                bytes_received: conn.bytes_received.unwrap_or(0),
                upload_rate: up,
                download_rate: down,
            });

            tracked.insert(
                conn.key,
                Tracked {
                    first_seen_ms,
                    bytes_sent: conn.bytes_sent,
                    bytes_received: conn.bytes_received,
                },
            );
        }

        let mut closed: Vec<ConnectionKey> = self
            .tracked
            .keys()
            .filter(|key| !tracked.contains_key(*key))
            .copied()
            .collect();
        closed.sort();
        records.sort_by_key(|r| r.key());

        self.tracked = tracked;
        self.previous = Some(PreviousTick {
            timestamp_ms,
            bytes_sent: snapshot.bytes_sent,
            bytes_received: snapshot.bytes_received,
        });
        self.tick += 1;

        let stats = AggregateStats {
            upload_rate,
            download_rate,
            active_connections: records.len(),
            total_bytes_sent: self.total_sent,
            total_bytes_received: self.total_received,
            uptime_secs: (timestamp_ms - self.started_at_ms).max(0) as f64 / 1000.0,
        };

        DeltaOutput {
            view: NetworkView {
                timestamp_ms,
                tick: self.tick,
                connections: records,
                stats,
            },
            sample: HistorySample::new(timestamp_ms, upload_rate, download_rate),
            opened,
            closed,
        }
    }
}
