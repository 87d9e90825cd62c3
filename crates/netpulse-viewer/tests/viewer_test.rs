//! Viewer client against a live dashboard and a silent mock endpoint.

mod common;

use std::sync::Arc;
use std::time::Duration;

use netpulse_core::{HistorySample, NetworkView};
use netpulse_dashboard::{serve_on, DashboardConfig, DashboardState};
use netpulse_pipeline::{Broadcaster, StateStore};
use netpulse_viewer::{ViewerClient, ViewerConfig, ViewerEvent, ViewerStatus};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::SilentServer;

async fn next_event(rx: &mut mpsc::Receiver<ViewerEvent>) -> ViewerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for viewer event")
        .expect("viewer event channel closed")
}

async fn start_dashboard() -> (String, Arc<Broadcaster>, CancellationToken) {
    let broadcaster = Arc::new(Broadcaster::new(Arc::new(StateStore::new()), 4));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();

    let state = DashboardState::new(Arc::clone(&broadcaster));
    let token = shutdown.clone();
    tokio::spawn(async move {
        serve_on(listener, state, DashboardConfig::default(), token)
            .await
            .unwrap();
    });

    (format!("ws://{addr}/ws"), broadcaster, shutdown)
}

#[tokio::test]
async fn test_viewer_receives_initial_and_updates() {
    let (url, broadcaster, server_shutdown) = start_dashboard().await;

    let config = ViewerConfig {
        ping_interval_ms: 50,
        pong_timeout_ms: 2_000,
        ..ViewerConfig::with_url(url)
    };
    let (tx, mut rx) = mpsc::channel(64);
    let client = Arc::new(ViewerClient::new(config, tx));
    let runner = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run().await })
    };

    assert_eq!(
        next_event(&mut rx).await,
        ViewerEvent::Status(ViewerStatus::Connecting)
    );
    assert_eq!(
        next_event(&mut rx).await,
        ViewerEvent::Status(ViewerStatus::Active)
    );
    match next_event(&mut rx).await {
        ViewerEvent::Initial(data) => assert_eq!(data.view.tick, 0),
        other => panic!("expected initial, got {other:?}"),
    }

    let sample = HistorySample::new(1_000, 64.0, 128.0);
    let view = NetworkView {
        timestamp_ms: 1_000,
        tick: 1,
        ..NetworkView::default()
    };
    broadcaster.commit(view, Some(sample), vec![sample]);

    match next_event(&mut rx).await {
        ViewerEvent::Update(data) => {
            assert_eq!(data.view.tick, 1);
            assert_eq!(data.sample, Some(sample));
        }
        other => panic!("expected update, got {other:?}"),
    }

    // Several pings go by and are answered
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.status(), ViewerStatus::Active);

    client.shutdown();
    runner.await.unwrap().unwrap();
    assert_eq!(client.status(), ViewerStatus::Closed);

    broadcaster.close_all();
    server_shutdown.cancel();
}

#[tokio::test]
async fn test_missing_pong_triggers_reconnect() {
    let server = SilentServer::start().await;

    let config = ViewerConfig {
        ping_interval_ms: 50,
        pong_timeout_ms: 100,
        reconnect_base_delay_ms: 10,
        reconnect_max_delay_ms: 50,
        ..ViewerConfig::with_url(server.url())
    };
    let (tx, mut rx) = mpsc::channel(64);
    let client = Arc::new(ViewerClient::new(config, tx));
    let runner = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run().await })
    };

    let mut statuses = Vec::new();
    while statuses
        .iter()
        .filter(|s| **s == ViewerStatus::Active)
        .count()
        < 2
    {
        if let ViewerEvent::Status(status) = next_event(&mut rx).await {
            statuses.push(status);
        }
    }

    assert_eq!(
        statuses,
        vec![
            ViewerStatus::Connecting,
            ViewerStatus::Active,
            ViewerStatus::Closed,
            ViewerStatus::Reconnecting { attempt: 1 },
            ViewerStatus::Connecting,
            ViewerStatus::Active,
        ]
    );
    assert!(server.connection_count() >= 2);

    client.shutdown();
    runner.await.unwrap().unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_server_shutdown_moves_viewer_to_reconnecting() {
    let (url, broadcaster, server_shutdown) = start_dashboard().await;

    let config = ViewerConfig {
        reconnect_base_delay_ms: 50,
        reconnect_max_delay_ms: 100,
        ..ViewerConfig::with_url(url)
    };
    let (tx, mut rx) = mpsc::channel(64);
    let client = Arc::new(ViewerClient::new(config, tx));
    let runner = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run().await })
    };

    loop {
        if let ViewerEvent::Initial(_) = next_event(&mut rx).await {
            break;
        }
    }

    broadcaster.close_all();
    assert_eq!(
        next_event(&mut rx).await,
        ViewerEvent::Status(ViewerStatus::Closed)
    );
    assert_eq!(
        next_event(&mut rx).await,
        ViewerEvent::Status(ViewerStatus::Reconnecting { attempt: 1 })
    );

    client.shutdown();
    runner.await.unwrap().unwrap();
    server_shutdown.cancel();
}
