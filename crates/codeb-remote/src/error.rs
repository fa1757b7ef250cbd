//! Remote execution error types

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote command is empty")]
    EmptyCommand,

    #[error("Transport error ({target}): {stderr}")]
    Transport { target: String, stderr: String },

    #[error("Remote command timed out after {}s ({target})", .after.as_secs())]
    Timeout { target: String, after: Duration },

    #[error("Remote command failed (exit code {}): {stderr}", exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()))]
    CommandFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Payload too large for an inline remote write: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Invalid remote path: {0}")]
    InvalidPath(String),
}

impl RemoteError {
    /// True for failures of the channel itself rather than of the remote command
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RemoteError::Transport { .. } | RemoteError::Timeout { .. } | RemoteError::Spawn { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
