//! Wire codecs for the backend protocols.
//!
//! Pure parsing and formatting, no I/O:
//!
//! - [`frame`] - fixed 40-byte binary header of the video frame stream
//! - [`text`] - newline-delimited ASCII protocol spoken by the helper
//! - [`json`] - newline-delimited JSON protocol spoken by the player
//!
//! Both command protocols encode the same protocol-neutral [`Command`] and
//! both status sources decode into the same [`StatusDelta`].

pub mod frame;
pub mod json;
pub mod text;

/// A backend command, independent of which protocol carries it.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Native window handle the backend should embed into.
    Window(u64),
    /// Video surface placement in device pixels.
    Rect {
        /// Left edge.
        x: i32,
        /// Top edge.
        y: i32,
        /// Width.
        width: i32,
        /// Height.
        height: i32,
    },
    /// Replace the current media with `url` and start playing.
    Load(String),
    /// Resume playback.
    Play,
    /// Pause playback.
    Pause,
    /// Flip between play and pause.
    TogglePause,
    /// Stop playback and release the stream.
    Stop,
    /// Seek to `seconds` (absolute) or by `seconds` (relative).
    Seek {
        /// Target or offset in seconds.
        seconds: f64,
        /// Whether `seconds` is an absolute position.
        absolute: bool,
    },
    /// Volume in percent (100 = unity gain).
    Volume(u16),
    /// Set mute state.
    Mute(bool),
    /// Flip mute state.
    ToggleMute,
    /// Ask for an immediate status report.
    Status,
    /// Ask the backend to exit.
    Quit,
    /// Subscribe to change events for a property.
    Observe {
        /// Observer id echoed in property-change events.
        id: u32,
        /// Property name.
        property: String,
    },
    /// Read a property value.
    GetProperty(String),
}

impl Command {
    /// Short name used in logs and timeout errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Window(_) => "window",
            Self::Rect { .. } => "rect",
            Self::Load(_) => "load",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::TogglePause => "toggle",
            Self::Stop => "stop",
            Self::Seek { .. } => "seek",
            Self::Volume(_) => "volume",
            Self::Mute(_) => "mute",
            Self::ToggleMute => "toggle-mute",
            Self::Status => "status",
            Self::Quit => "quit",
            Self::Observe { .. } => "observe",
            Self::GetProperty(_) => "get-property",
        }
    }
}

/// A partial playback-state update decoded from a backend.
///
/// `None` fields were absent (or unparseable) in the source message and
/// must leave the merged state unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusDelta {
    /// Backend is actively playing.
    pub playing: Option<bool>,
    /// Volume in percent.
    pub volume: Option<i64>,
    /// Audio muted.
    pub muted: Option<bool>,
    /// Current position in seconds.
    pub position: Option<f64>,
    /// Media duration in seconds.
    pub duration: Option<f64>,
    /// Backend is waiting on its network buffer.
    pub buffering: Option<bool>,
}

impl StatusDelta {
    /// Whether the delta carries no fields at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
