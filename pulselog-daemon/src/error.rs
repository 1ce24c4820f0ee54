use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, ticker, control interface and protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] pulselog_core::PulseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

impl DaemonError {
    /// True when the request itself was rejected before touching any state.
    pub fn is_validation(&self) -> bool {
        matches!(self, DaemonError::Core(err) if err.is_validation())
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn join_err(task: &str, err: tokio::task::JoinError) -> DaemonError {
    DaemonError::Protocol(format!("{task} join error: {err}"))
}
