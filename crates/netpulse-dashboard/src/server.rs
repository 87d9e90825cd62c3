//! HTTP server implementation using axum.

use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use netpulse_core::{AggregateStats, NetworkView};
use netpulse_pipeline::PipelineError;
use netpulse_telemetry::Metrics;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::session::run_session;
use crate::state::DashboardState;
use crate::types::{ConnectionsResponse, HistoryQuery, HistoryResponse, ServiceInfo};

/// Shared application state for axum handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    dashboard: DashboardState,
    config: DashboardConfig,
}

impl AppState {
    pub fn new(dashboard: DashboardState, config: DashboardConfig) -> Self {
        Self { dashboard, config }
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/connections", get(get_connections))
        .route("/api/stats", get(get_stats))
        .route("/api/bandwidth-history", get(get_bandwidth_history))
        .route("/metrics", get(get_metrics))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "netpulse".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
    })
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.health())
}

/// Current view as JSON.
async fn get_snapshot(State(state): State<AppState>) -> Json<NetworkView> {
    Json((*state.dashboard.current_view()).clone())
}

async fn get_connections(State(state): State<AppState>) -> Json<ConnectionsResponse> {
    let view = state.dashboard.current_view();
    Json(ConnectionsResponse {
        connections: view.connections.clone(),
        count: view.connections.len(),
    })
}

async fn get_stats(State(state): State<AppState>) -> Json<AggregateStats> {
    Json(state.dashboard.current_view().stats.clone())
}

async fn get_bandwidth_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let history = state
        .dashboard
        .history(query.window_seconds.map(Duration::from_secs));
    Json(HistoryResponse {
        count: history.len(),
        history,
    })
}

async fn get_metrics() -> Response {
    match Metrics::gather_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// WebSocket upgrade handler.
///
/// The session is registered before the upgrade so that a full registry
/// is reported as a plain HTTP 503.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let subscription = match state.dashboard.subscribe() {
        Ok(subscription) => subscription,
        Err(PipelineError::SessionLimit { max }) => {
            warn!(
                current = state.dashboard.active_viewers(),
                max, "Viewer session limit reached"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many sessions").into_response();
        }
        Err(PipelineError::Shutdown) => {
            return (StatusCode::SERVICE_UNAVAILABLE, "Shutting down").into_response();
        }
        Err(e) => {
            error!(error = %e, "Failed to register viewer session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    info!(
        session = %subscription.id(),
        viewers = state.dashboard.active_viewers(),
        "New viewer connection"
    );

    let write_timeout = state.config.write_timeout();
    ws.on_upgrade(move |socket| run_session(socket, subscription, write_timeout))
}

/// Serve on an already bound listener until `shutdown` fires.
pub async fn serve_on(
    listener: TcpListener,
    dashboard: DashboardState,
    config: DashboardConfig,
    shutdown: CancellationToken,
) -> DashboardResult<()> {
    let app = create_router(AppState::new(dashboard, config));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Bind the configured address and serve until `shutdown` fires.
pub async fn run_server(
    dashboard: DashboardState,
    config: DashboardConfig,
    shutdown: CancellationToken,
) -> DashboardResult<()> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| DashboardError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!(%addr, "Starting dashboard server");

    serve_on(listener, dashboard, config, shutdown).await?;
    info!("Dashboard server stopped");
    Ok(())
}
