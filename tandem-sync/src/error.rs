//! Error types for tandem-sync.

use std::path::PathBuf;

use thiserror::Error;

use tandem_core::ContextError;

/// All errors that can arise from auto-save operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The interactive context went away mid-operation.
    #[error("interactive context error: {0}")]
    Context(#[from] ContextError),

    /// A blocking disk task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
