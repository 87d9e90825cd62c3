//! Sampler configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Upper bound on retained history samples (one day at 1 s).
pub const MAX_HISTORY_SAMPLES: usize = 86_400;

/// Sampling pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Sampling period in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Length of the retained rate history in seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Keep sockets without a remote peer (listening TCP, unconnected UDP).
    #[serde(default)]
    pub include_listening: bool,
    /// procfs mount point read by the Linux source.
    #[serde(default = "default_procfs_root")]
    pub procfs_root: PathBuf,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_window_seconds() -> u64 {
    60
}

fn default_procfs_root() -> PathBuf {
    PathBuf::from("/proc")
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            window_seconds: default_window_seconds(),
            include_listening: false,
            procfs_root: default_procfs_root(),
        }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Number of samples retained: `window / interval`.
    pub fn history_capacity(&self) -> usize {
        if self.interval_ms == 0 {
            return 0;
        }
        let samples = self.window_seconds.saturating_mul(1000) / self.interval_ms;
        usize::try_from(samples).unwrap_or(usize::MAX)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.interval_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.history_capacity() == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "window_seconds ({}) must cover at least one interval ({} ms)",
                self.window_seconds, self.interval_ms
            )));
        }
        if self.history_capacity() > MAX_HISTORY_SAMPLES {
            return Err(PipelineError::InvalidConfig(format!(
                "window_seconds ({}) at interval_ms ({}) exceeds {} history samples",
                self.window_seconds, self.interval_ms, MAX_HISTORY_SAMPLES
            )));
        }
        Ok(())
    }
}
