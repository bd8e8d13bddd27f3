//! Events produced by background tasks for the session owner.
//!
//! Reader tasks, the exit watcher, and the frame server never touch
//! playback state directly. They push [`BridgeEvent`]s into one unbounded
//! channel that the session drains on its own task.
//!
//! ```text
//! channel reader ──┐
//! exit watcher ────┼──> UnboundedSender<BridgeEvent> ──> Session::dispatch_next()
//! frame server ────┘
//! ```

use tokio::sync::mpsc;

use crate::codec::StatusDelta;

/// Sender half handed to every background task.
pub type EventSender = mpsc::UnboundedSender<BridgeEvent>;

/// Receiver half owned by the session.
pub type EventReceiver = mpsc::UnboundedReceiver<BridgeEvent>;

/// An event tagged with the generation of the backend that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeEvent {
    /// Generation id of the producing backend handle.
    pub backend_id: u64,
    /// What happened.
    pub kind: BackendEvent,
}

impl BridgeEvent {
    /// Tag an event with its backend generation.
    pub fn new(backend_id: u64, kind: BackendEvent) -> Self {
        Self { backend_id, kind }
    }
}

/// Kinds of asynchronous backend events.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Backend finished initialising and accepts commands.
    Ready,
    /// Partial playback state update.
    Status(StatusDelta),
    /// Backend reported an error outside any request.
    Error(String),
    /// Backend reported a non-fatal condition.
    Warning(String),
    /// Backend diagnostic line.
    Debug(String),
    /// Media reached its end.
    EndOfStream,
    /// A frame is waiting in the slot.
    FrameReady,
    /// The frame producer connected or disconnected.
    FrameSource {
        /// `true` on connect.
        connected: bool,
    },
    /// The backend process exited without being asked to.
    Exited(ExitReport),
}

/// Details of an unexpected backend exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
    /// Last lines the backend wrote to stderr, oldest first.
    pub stderr_tail: Vec<String>,
}

impl ExitReport {
    /// One-line summary, e.g. `exited with code 1` or `killed by signal 11`.
    pub fn summary(&self) -> String {
        match (self.exit_code, self.signal) {
            (_, Some(signal)) => format!("killed by signal {signal}"),
            (Some(code), None) => format!("exited with code {code}"),
            (None, None) => "exited".to_string(),
        }
    }
}
