use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the tooling daemon link, protocol and host runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("tooling daemon is not running (socket: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    #[error("not connected to the build service")]
    NotConnected,

    #[error("interactive context error: {0}")]
    Context(#[from] tandem_core::ContextError),

    #[error("auto-save error: {0}")]
    Sync(#[from] tandem_sync::SyncError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
