//! Session playback phase.

/// Where the session is in its playback lifecycle.
///
/// ```text
/// Idle ──load──> Loading ──ack──> Playing <──> Paused
///                   │                │            │
///                   └─fail─> (prev)  └──Buffering─┘
///                                    │
///                           end of stream ──> Stopped
/// any ──stop()/backend death──> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    /// No media loaded.
    #[default]
    Idle,
    /// Waiting for the backend to accept a URL.
    Loading,
    /// Media is playing.
    Playing,
    /// Media is paused by the user.
    Paused,
    /// Held while the backend refills its buffer.
    Buffering {
        /// Resume when buffering ends.
        resume: bool,
    },
    /// Media reached its end.
    Stopped,
}

impl PlaybackPhase {
    /// Whether media is loaded (playing, paused, or buffering).
    pub fn has_media(self) -> bool {
        matches!(self, Self::Playing | Self::Paused | Self::Buffering { .. })
    }
}

impl std::fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
            Self::Buffering { .. } => write!(f, "buffering"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
