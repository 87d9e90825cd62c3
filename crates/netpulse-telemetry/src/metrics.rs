//! Prometheus metrics for netpulse.
//!
//! Covers the sampling pipeline (ticks, source failures, tick latency,
//! aggregate rates) and viewer sessions (active, opened, closed by reason).
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error caught on first use.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram,
    register_int_gauge, Counter, CounterVec, Encoder, Gauge, Histogram, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Sampler ticks by outcome (published / source_error).
pub static TICKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "netpulse_ticks_total",
        "Total sampler ticks by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Snapshot source failures by kind.
pub static SOURCE_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "netpulse_source_errors_total",
        "Total snapshot source failures",
        &["kind"]
    )
    .unwrap()
});

/// Wall time of one tick, source call included.
pub static TICK_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "netpulse_tick_duration_ms",
        "Duration of one sampler tick in milliseconds",
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 250.0, 500.0, 1000.0]
    )
    .unwrap()
});

/// Current host upload rate.
pub static UPLOAD_RATE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "netpulse_upload_bytes_per_second",
        "Host upload rate in bytes per second"
    )
    .unwrap()
});

/// Current host download rate.
pub static DOWNLOAD_RATE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "netpulse_download_bytes_per_second",
        "Host download rate in bytes per second"
    )
    .unwrap()
});

/// Connections in the current view.
pub static TRACKED_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "netpulse_tracked_connections",
        "Connections in the current view"
    )
    .unwrap()
});

/// Registered viewer sessions.
pub static SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("netpulse_sessions_active", "Registered viewer sessions").unwrap()
});

/// Viewer sessions opened.
pub static SESSIONS_OPENED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("netpulse_sessions_opened_total", "Total viewer sessions opened").unwrap()
});

/// Viewer sessions closed by reason.
pub static SESSIONS_CLOSED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "netpulse_sessions_closed_total",
        "Total viewer sessions closed",
        &["reason"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a tick that committed a new view.
    pub fn tick_published(duration_ms: f64, upload_rate: f64, download_rate: f64, conns: usize) {
        TICKS_TOTAL.with_label_values(&["published"]).inc();
        TICK_DURATION_MS.observe(duration_ms);
        UPLOAD_RATE.set(upload_rate);
        DOWNLOAD_RATE.set(download_rate);
        TRACKED_CONNECTIONS.set(conns as i64);
    }

    /// Record a tick skipped because the source failed.
    pub fn tick_source_error(kind: &str, duration_ms: f64) {
        TICKS_TOTAL.with_label_values(&["source_error"]).inc();
        SOURCE_ERRORS_TOTAL.with_label_values(&[kind]).inc();
        TICK_DURATION_MS.observe(duration_ms);
    }

    /// Record a session registration.
    pub fn session_opened() {
        SESSIONS_OPENED_TOTAL.inc();
        SESSIONS_ACTIVE.inc();
    }

    /// Record a session leaving the registry.
    pub fn session_closed(reason: &str) {
        SESSIONS_CLOSED_TOTAL.with_label_values(&[reason]).inc();
        SESSIONS_ACTIVE.dec();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_metrics_are_exported() {
        Metrics::tick_published(1.5, 1000.0, 2000.0, 3);
        Metrics::tick_source_error("permission_denied", 0.2);

        let text = Metrics::gather_text().unwrap();
        assert!(text.contains("netpulse_ticks_total"));
        assert!(text.contains("netpulse_source_errors_total{kind=\"permission_denied\"}"));
        assert!(text.contains("netpulse_tracked_connections 3"));
    }

    #[test]
    fn test_session_gauge_balances() {
        let before = SESSIONS_ACTIVE.get();
        Metrics::session_opened();
        Metrics::session_opened();
        Metrics::session_closed("client_closed");
        Metrics::session_closed("lagged");
        assert_eq!(SESSIONS_ACTIVE.get(), before);
    }
}
