//! Application configuration.

use netpulse_dashboard::DashboardConfig;
use netpulse_pipeline::SamplerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply `NETPULSE_HOST` / `NETPULSE_PORT`.
    pub fn apply_env_overrides(&mut self) -> AppResult<()> {
        self.apply_overrides(
            std::env::var("NETPULSE_HOST").ok(),
            std::env::var("NETPULSE_PORT").ok(),
        )
    }

    pub fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) -> AppResult<()> {
        if let Some(host) = host {
            self.dashboard.host = host;
        }
        if let Some(port) = port {
            self.dashboard.port = port
                .parse()
                .map_err(|_| AppError::Config(format!("Invalid port: {port}")))?;
        }
        Ok(())
    }

    /// Reject settings the service cannot start with.
    pub fn validate(&self) -> AppResult<()> {
        self.sampler
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        if self.dashboard.port == 0 {
            return Err(AppError::Config("dashboard.port must be non-zero".to_string()));
        }
        if self.dashboard.max_sessions == 0 {
            return Err(AppError::Config(
                "dashboard.max_sessions must be at least 1".to_string(),
            ));
        }
        if self.dashboard.write_timeout_ms == 0 {
            return Err(AppError::Config(
                "dashboard.write_timeout_ms must be non-zero".to_string(),
            ));
        }
        self.dashboard
            .socket_addr()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(())
    }
}
