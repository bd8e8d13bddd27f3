//! Error taxonomy for bridge operations.
//!
//! Every façade call resolves to either success or a [`BridgeError`] whose
//! `Display` output is short enough to show to a user. Diagnostic context
//! (such as the backend's stderr tail) travels alongside in events, not in
//! the error string.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while driving a media backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// No backend binary exists at any searched location.
    BackendNotFound {
        /// Backend name that was looked for (e.g. "mpv").
        backend: String,
        /// Every path that was probed, in search order.
        searched: Vec<PathBuf>,
    },
    /// A command was issued while no backend connection exists.
    NotConnected,
    /// A playback call was made before any backend handle exists.
    NotReady,
    /// The backend did not reply within the per-request timeout.
    Timeout {
        /// Command name that timed out.
        command: String,
        /// Timeout that elapsed.
        after: Duration,
    },
    /// The backend was torn down while the request was pending.
    BackendStopped,
    /// A malformed reply, line, or argument.
    Protocol(String),
    /// The backend replied with an error for this command.
    CommandFailed(String),
    /// Every fallback candidate was rejected.
    LoadFailed {
        /// URL the caller asked for.
        url: String,
        /// Error text reported for the primary candidate.
        message: String,
    },
    /// The backend process could not be spawned.
    Spawn(String),
    /// An OS-level I/O failure on a pipe or socket.
    Io(String),
}

impl BridgeError {
    /// Returns `true` if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::BackendStopped)
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BackendNotFound { backend, searched } => {
                write!(f, "{backend} not found (searched {} locations)", searched.len())
            }
            Self::NotConnected => write!(f, "Backend not connected"),
            Self::NotReady => write!(f, "Playback not ready"),
            Self::Timeout { command, after } => {
                write!(f, "Backend did not answer '{command}' within {}ms", after.as_millis())
            }
            Self::BackendStopped => write!(f, "Backend stopped"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            Self::CommandFailed(msg) => write!(f, "{msg}"),
            Self::LoadFailed { message, .. } => write!(f, "Failed to load stream: {message}"),
            Self::Spawn(msg) => write!(f, "Failed to start backend: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
