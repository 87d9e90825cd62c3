//! Application wiring and lifecycle.

use std::sync::Arc;

use netpulse_dashboard::{serve_on, DashboardState};
use netpulse_pipeline::{Broadcaster, Sampler, StateStore};
use netpulse_source::{ProcNetSource, SnapshotSource};
use netpulse_viewer::{ViewerClient, ViewerConfig, ViewerEvent, ViewerStatus};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// The `serve` command: sampler plus dashboard.
pub struct Application {
    config: AppConfig,
    source: Arc<dyn SnapshotSource>,
}

impl Application {
    /// Create the application with the procfs source.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let source = ProcNetSource::new_with_custom_procfs(config.sampler.procfs_root.clone());
        debug!(procfs_root = %source.root().display(), "Using procfs source");
        Self::with_source(config, Arc::new(source))
    }

    /// Create the application with any snapshot source.
    pub fn with_source(config: AppConfig, source: Arc<dyn SnapshotSource>) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config, source })
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
            signal.cancel();
        });

        let addr = self.config.dashboard.socket_addr()?;
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            AppError::Dashboard(netpulse_dashboard::DashboardError::Bind {
                addr: addr.to_string(),
                source,
            })
        })?;
        info!(%addr, "Dashboard listening");
        self.run_on(listener, shutdown).await
    }

    /// Run on a bound listener until `shutdown` fires.
    ///
    /// On shutdown the sampler finishes its in-flight tick and closes every
    /// session, then the HTTP server drains.
    pub async fn run_on(self, listener: TcpListener, shutdown: CancellationToken) -> AppResult<()> {
        info!(
            source = self.source.name(),
            interval_ms = self.config.sampler.interval_ms,
            window_seconds = self.config.sampler.window_seconds,
            "Starting netpulse"
        );

        let store = Arc::new(StateStore::new());
        let broadcaster = Arc::new(Broadcaster::new(
            store,
            self.config.dashboard.max_sessions,
        ));
        let sampler = Sampler::new(
            &self.config.sampler,
            Arc::clone(&self.source),
            Arc::clone(&broadcaster),
        )?;

        let sampler_token = shutdown.child_token();
        let sampler_task = tokio::spawn(sampler.run(sampler_token.clone()));

        let server_token = CancellationToken::new();
        let server = serve_on(
            listener,
            DashboardState::new(Arc::clone(&broadcaster)),
            self.config.dashboard.clone(),
            server_token.clone(),
        );
        tokio::pin!(server);

        let server_result = tokio::select! {
            result = &mut server => {
                error!("Dashboard server exited unexpectedly");
                Some(result)
            }
            () = shutdown.cancelled() => None,
        };

        sampler_token.cancel();
        if let Err(e) = sampler_task.await {
            warn!(error = %e, "Sampler task failed");
            broadcaster.close_all();
        }

        let result = match server_result {
            Some(result) => result,
            None => {
                server_token.cancel();
                server.await
            }
        };
        info!("netpulse stopped");
        result.map_err(AppError::from)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// The `watch` command: log what a viewer sees until Ctrl-C.
pub async fn watch(config: ViewerConfig) -> AppResult<()> {
    let (tx, mut rx) = mpsc::channel(64);
    let client = ViewerClient::new(config, tx);
    let token = client.shutdown_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        token.cancel();
    });

    // The client owns the only sender; the event loop ends when it returns
    let runner = tokio::spawn(async move { client.run().await });

    while let Some(event) = rx.recv().await {
        match event {
            ViewerEvent::Status(status) => match status {
                ViewerStatus::Reconnecting { attempt } => warn!(attempt, "Viewer reconnecting"),
                ViewerStatus::GaveUp => error!("Viewer gave up reconnecting"),
                other => info!(status = ?other, "Viewer status"),
            },
            ViewerEvent::Initial(data) => info!(
                tick = data.view.tick,
                connections = data.view.connections.len(),
                history = data.history.len(),
                "Initial view"
            ),
            ViewerEvent::Update(data) => info!(
                tick = data.view.tick,
                connections = data.view.stats.active_connections,
                upload_bps = data.view.stats.upload_rate,
                download_bps = data.view.stats.download_rate,
                "Update"
            ),
        }
    }

    match runner.await {
        Ok(result) => result.map_err(AppError::from),
        Err(e) => Err(AppError::Task(e.to_string())),
    }
}
