//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] netpulse_pipeline::PipelineError),

    #[error("Dashboard error: {0}")]
    Dashboard(#[from] netpulse_dashboard::DashboardError),

    #[error("Viewer error: {0}")]
    Viewer(#[from] netpulse_viewer::ViewerError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] netpulse_telemetry::TelemetryError),

    #[error("Task failed: {0}")]
    Task(String),
}

pub type AppResult<T> = Result<T, AppError>;
