//! Snapshot source error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading a snapshot.
///
/// Every variant is recoverable from the pipeline's point of view: the
/// sampler logs it and retries on the next tick.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Permission denied reading {0:?}")]
    PermissionDenied(PathBuf),

    #[error("{0:?}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Unexpected line in {path:?}: {line}")]
    UnexpectedLine { path: PathBuf, line: String },

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Map an I/O failure on `path`, keeping permission errors distinct.
    pub fn from_io(path: PathBuf, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            SourceError::PermissionDenied(path)
        } else {
            SourceError::Io(path, err)
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::PermissionDenied(_) => "permission_denied",
            SourceError::Io(..) => "io",
            SourceError::UnexpectedLine { .. } => "parse",
            SourceError::Unavailable(_) => "unavailable",
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;
