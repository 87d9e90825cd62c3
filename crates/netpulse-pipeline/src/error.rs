//! Pipeline error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid sampler configuration: {0}")]
    InvalidConfig(String),

    #[error("Session limit reached ({max})")]
    SessionLimit { max: usize },

    #[error("Broadcaster is shut down")]
    Shutdown,

    #[error("Message encode error: {0}")]
    Encode(#[from] netpulse_core::CoreError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
