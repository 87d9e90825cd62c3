//! The tick loop: poll, compute deltas, commit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use netpulse_core::now_ms;
use netpulse_source::{SnapshotSource, SourceError, SourceResult, RawSnapshot};
use netpulse_telemetry::Metrics;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::broadcast::{Broadcaster, FanoutReport};
use crate::config::SamplerConfig;
use crate::delta::DeltaEngine;
use crate::error::PipelineResult;
use crate::history::HistoryRing;

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A new view was committed and fanned out.
    Published { tick: u64, report: FanoutReport },
    /// The source failed; the committed state is unchanged.
    SourceFailed { kind: &'static str },
}

/// Single writer of the pipeline state.
pub struct Sampler {
    source: Arc<dyn SnapshotSource>,
    engine: DeltaEngine,
    ring: HistoryRing,
    broadcaster: Arc<Broadcaster>,
    interval: Duration,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("source", &self.source.name())
            .field("engine", &self.engine)
            .field("ring", &self.ring)
            .field("interval", &self.interval)
            .finish()
    }
}

impl Sampler {
    pub fn new(
        config: &SamplerConfig,
        source: Arc<dyn SnapshotSource>,
        broadcaster: Arc<Broadcaster>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            source,
            engine: DeltaEngine::new(now_ms(), config.include_listening),
            ring: HistoryRing::for_config(config)?,
            broadcaster,
            interval: config.interval(),
        })
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Run one tick stamped with the wall clock after the poll returns.
    pub async fn tick(&mut self) -> TickOutcome {
        let started = Instant::now();
        let polled = self.poll().await;
        self.finish(polled, now_ms(), started)
    }

    /// Run one tick with an explicit timestamp.
    pub async fn tick_at(&mut self, timestamp_ms: i64) -> TickOutcome {
        let started = Instant::now();
        let polled = self.poll().await;
        self.finish(polled, timestamp_ms, started)
    }

    async fn poll(&self) -> SourceResult<RawSnapshot> {
        let source = Arc::clone(&self.source);
        match tokio::task::spawn_blocking(move || source.poll_snapshot()).await {
            Ok(result) => result,
            Err(e) => Err(SourceError::Unavailable(format!("poll task failed: {e}"))),
        }
    }

    fn finish(
        &mut self,
        polled: SourceResult<RawSnapshot>,
        timestamp_ms: i64,
        started: Instant,
    ) -> TickOutcome {
        let snapshot = match polled {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let kind = e.kind();
                Metrics::tick_source_error(kind, elapsed_ms(started));
                warn!(source = self.source.name(), error = %e, kind, "Snapshot failed, keeping previous view");
                return TickOutcome::SourceFailed { kind };
            }
        };

        let output = self.engine.apply(snapshot, timestamp_ms);
        let sample = if self.ring.append(output.sample) {
            Some(output.sample)
        } else {
            debug!(timestamp_ms, "Non-increasing sample timestamp, history unchanged");
            None
        };

        for key in &output.opened {
            trace!(%key, "Connection opened");
        }
        for key in &output.closed {
            trace!(%key, "Connection closed");
        }

        let tick = output.view.tick;
        let stats = output.view.stats.clone();
        let report = self
            .broadcaster
            .commit(output.view, sample, self.ring.snapshot());

        Metrics::tick_published(
            elapsed_ms(started),
            stats.upload_rate,
            stats.download_rate,
            stats.active_connections,
        );
        trace!(
            tick,
            connections = stats.active_connections,
            tracked = self.engine.tracked_count(),
            delivered = report.delivered,
            dropped = report.dropped,
            "Tick committed"
        );

        TickOutcome::Published { tick, report }
    }

    /// Tick at the configured interval until `shutdown` fires.
    ///
    /// A tick already in flight completes; then every session is closed.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            source = self.source.name(),
            interval_ms = self.interval.as_millis() as u64,
            history_capacity = self.ring.capacity(),
            "Sampler started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    break;
                }

                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        self.broadcaster.close_all();
        info!(ticks = self.engine.tick(), "Sampler stopped");
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mockall::mock;
    use netpulse_core::{ConnectionKey, ConnectionState, Protocol, ServerMessage};
    use netpulse_source::{RawConnection, ScriptedSource};

    use crate::error::PipelineError;
    use crate::store::StateStore;

    mock! {
        pub Source {}

        impl SnapshotSource for Source {
            fn poll_snapshot(&self) -> SourceResult<RawSnapshot>;
            fn name(&self) -> &'static str;
        }
    }

    fn config() -> SamplerConfig {
        SamplerConfig {
            interval_ms: 1000,
            window_seconds: 60,
            ..SamplerConfig::default()
        }
    }

    fn snapshot(n: u64) -> RawSnapshot {
        let local: SocketAddr = "10.0.0.2:50000".parse().unwrap();
        let remote: SocketAddr = "93.184.216.34:443".parse().unwrap();
        RawSnapshot {
            connections: vec![RawConnection::new(
                ConnectionKey::new(Protocol::Tcp, local, remote),
                ConnectionState::Established,
            )
            .with_process(4242, "curl")],
            bytes_sent: n * 1000,
            bytes_received: n * 2000,
        }
    }

    fn sampler_with(source: Arc<dyn SnapshotSource>) -> Sampler {
        let broadcaster = Arc::new(Broadcaster::new(Arc::new(StateStore::new()), 8));
        Sampler::new(&config(), source, broadcaster).unwrap()
    }

    #[test]
    fn test_oversized_window_is_config_error() {
        let broadcaster = Arc::new(Broadcaster::new(Arc::new(StateStore::new()), 8));
        let oversized = SamplerConfig {
            interval_ms: 1,
            window_seconds: u64::MAX / 1000,
            ..SamplerConfig::default()
        };
        let result = Sampler::new(&oversized, Arc::new(ScriptedSource::new()), broadcaster);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_first_tick_publishes_zero_rates() {
        let source = Arc::new(ScriptedSource::new());
        source.push(snapshot(5));
        let mut sampler = sampler_with(source);

        let outcome = sampler.tick_at(1_000).await;
        assert!(matches!(outcome, TickOutcome::Published { tick: 1, .. }));

        let view = sampler.broadcaster().store().current_view();
        assert_eq!(view.tick, 1);
        assert_eq!(view.stats.upload_rate, 0.0);
        assert_eq!(view.stats.download_rate, 0.0);
        assert_eq!(view.connections.len(), 1);
    }

    #[tokio::test]
    async fn test_rates_from_consecutive_ticks() {
        let source = Arc::new(ScriptedSource::new());
        source.push(snapshot(1));
        source.push(snapshot(2));
        let mut sampler = sampler_with(source);

        sampler.tick_at(1_000).await;
        sampler.tick_at(2_000).await;

        let store = sampler.broadcaster().store();
        let view = store.current_view();
        assert_eq!(view.stats.upload_rate, 1000.0);
        assert_eq!(view.stats.download_rate, 2000.0);
        assert_eq!(store.history().len(), 2);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_history_then_next_tick() {
        let source = Arc::new(ScriptedSource::new());
        for n in 1..=6 {
            source.push(snapshot(n));
        }
        let mut sampler = sampler_with(source);
        for n in 1..=5 {
            sampler.tick_at(n * 1000).await;
        }

        let mut sub = sampler.broadcaster().subscribe().unwrap();
        match ServerMessage::from_json(sub.initial()).unwrap() {
            ServerMessage::Initial(data) => {
                assert_eq!(data.view.tick, 5);
                assert!(!data.history.is_empty());
                assert!(data.history.len() <= 5);
            }
            other => panic!("unexpected {other:?}"),
        }

        sampler.tick_at(6000).await;
        match ServerMessage::from_json(&sub.recv().await.unwrap()).unwrap() {
            ServerMessage::Update(data) => assert_eq!(data.view.tick, 6),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_source_failure_keeps_previous_view() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut source = MockSource::new();
        source.expect_name().return_const("mock");
        source.expect_poll_snapshot().returning(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            if n == 3 {
                Err(SourceError::PermissionDenied(PathBuf::from("/proc/net/tcp")))
            } else {
                Ok(snapshot(n))
            }
        });

        let mut sampler = sampler_with(Arc::new(source));
        let mut sub = sampler.broadcaster().subscribe().unwrap();

        sampler.tick_at(1000).await;
        sampler.tick_at(2000).await;
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_some());
        let before = sampler.broadcaster().store().current_view();

        let outcome = sampler.tick_at(3000).await;
        assert_eq!(outcome, TickOutcome::SourceFailed { kind: "permission_denied" });
        let after = sampler.broadcaster().store().current_view();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(sampler.broadcaster().store().history().len(), 2);

        let outcome = sampler.tick_at(4000).await;
        assert!(matches!(outcome, TickOutcome::Published { tick: 3, .. }));
        match ServerMessage::from_json(&sub.recv().await.unwrap()).unwrap() {
            ServerMessage::Update(data) => {
                assert_eq!(data.view.tick, 3);
                // Two seconds since the last good poll, 2000 bytes sent
                assert_eq!(data.view.stats.upload_rate, 1000.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_increasing_timestamp_skips_history() {
        let source = Arc::new(ScriptedSource::new());
        source.push(snapshot(1));
        source.push(snapshot(2));
        let mut sampler = sampler_with(source);
        let mut sub = sampler.broadcaster().subscribe().unwrap();

        sampler.tick_at(5000).await;
        sampler.tick_at(5000).await;

        assert_eq!(sampler.broadcaster().store().history().len(), 1);
        let _ = sub.recv().await;
        match ServerMessage::from_json(&sub.recv().await.unwrap()).unwrap() {
            ServerMessage::Update(data) => {
                assert_eq!(data.view.tick, 2);
                assert!(data.sample.is_none());
                assert_eq!(data.view.stats.upload_rate, 0.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_current_view_is_stable_between_ticks() {
        let source = Arc::new(ScriptedSource::new());
        source.push(snapshot(1));
        let mut sampler = sampler_with(source);
        sampler.tick_at(1000).await;

        let store = sampler.broadcaster().store();
        assert_eq!(store.current_view(), store.current_view());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_and_closes_sessions() {
        let source = Arc::new(ScriptedSource::new());
        source.push(snapshot(1));
        let sampler = sampler_with(source.clone());
        let broadcaster = Arc::clone(sampler.broadcaster());
        let mut sub = broadcaster.subscribe().unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sampler.run(shutdown.clone()));

        assert!(sub.recv().await.is_some());
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(broadcaster.session_count(), 0);
        assert!(source.poll_count() >= 1);
        assert!(matches!(
            broadcaster.subscribe(),
            Err(crate::error::PipelineError::Shutdown)
        ));
    }
}
