//! Error types for the remote shell and the scan pipeline.
//!
//! Store, config and CLI code use `anyhow`; the scan path keeps typed
//! errors so callers can tell a dead connection from a busy store.

use std::time::Duration;
use thiserror::Error;

/// Failures talking to the remote host.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("Authentication rejected for user {0}")]
    AuthRejected(String),

    #[error("SSH channel error: {0}")]
    Channel(String),

    #[error("Remote command exited with status {status}")]
    CommandFailed { status: u32, output: String },

    #[error("Remote command killed by signal {signal}")]
    Killed { signal: String, output: String },

    #[error("Remote operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote session already closed")]
    Closed,
}

impl From<russh::Error> for RemoteError {
    fn from(err: russh::Error) -> Self {
        RemoteError::Channel(err.to_string())
    }
}

/// Failures that end a scan early.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Remote connection failed: {0}")]
    Connection(#[source] RemoteError),

    #[error("Remote file listing failed: {0}")]
    Listing(#[source] RemoteError),

    #[error("Artifact store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("A scan is already running against this store")]
    AlreadyRunning,

    #[error("Scan task aborted: {0}")]
    Aborted(String),
}
