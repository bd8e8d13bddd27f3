//! Playback state merging and buffering intent.
//!
//! Every status source (helper status lines, player property changes)
//! produces [`StatusDelta`]s. The [`StatusFeed`] folds them into one
//! [`PlaybackState`] and tracks the buffering flag separately, together
//! with the user's last explicit play/pause intent.
//!
//! Rust guideline compliant 2026-02

pub mod throttle;

use crate::codec::StatusDelta;

pub use throttle::StatusThrottle;

/// Snapshot of playback state as shown to the UI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    /// Backend is actively playing.
    pub playing: bool,
    /// Volume in percent, 0..=100.
    pub volume: u8,
    /// Audio muted.
    pub muted: bool,
    /// Position in seconds.
    pub position: f64,
    /// Duration in seconds; 0 until known.
    pub duration: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            playing: false,
            volume: 100,
            muted: false,
            position: 0.0,
            duration: 0.0,
        }
    }
}

/// What the user last asked for, independent of buffering holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Intent {
    /// User wants playback to run.
    Play,
    /// User paused, or nothing has been started.
    #[default]
    Pause,
}

/// Change of the buffering flag produced by a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferingTransition {
    /// Backend started waiting on its network buffer.
    Entered,
    /// Buffer refilled.
    Exited,
}

/// Result of merging one delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Any [`PlaybackState`] field changed.
    pub changed: bool,
    /// The buffering flag flipped.
    pub buffering: Option<BufferingTransition>,
}

/// Accumulated playback state for one session.
#[derive(Debug, Clone, Default)]
pub struct StatusFeed {
    state: PlaybackState,
    buffering: bool,
    intent: Intent,
}

impl StatusFeed {
    /// Fresh state with a paused intent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a delta field by field; absent fields are left alone.
    ///
    /// Volume is clamped to 0..=100. Negative or non-finite times are
    /// ignored.
    pub fn merge(&mut self, delta: &StatusDelta) -> MergeOutcome {
        let before = self.state;

        if let Some(playing) = delta.playing {
            self.state.playing = playing;
        }
        if let Some(volume) = delta.volume {
            self.state.volume = volume.clamp(0, 100) as u8;
        }
        if let Some(muted) = delta.muted {
            self.state.muted = muted;
        }
        if let Some(position) = delta.position.filter(|p| valid_time(*p)) {
            self.state.position = position;
        }
        if let Some(duration) = delta.duration.filter(|d| valid_time(*d)) {
            self.state.duration = duration;
        }

        let buffering = match delta.buffering {
            Some(true) if !self.buffering => Some(BufferingTransition::Entered),
            Some(false) if self.buffering => Some(BufferingTransition::Exited),
            _ => None,
        };
        if let Some(flag) = delta.buffering {
            self.buffering = flag;
        }

        MergeOutcome {
            changed: self.state != before,
            buffering,
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> PlaybackState {
        self.state
    }

    /// Whether the backend is waiting on its buffer.
    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    /// The user's last explicit play/pause choice.
    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// Record an explicit play/pause choice.
    pub fn set_intent(&mut self, intent: Intent) {
        self.intent = intent;
    }

    /// Clear position and duration for a newly loaded item.
    pub fn reset_media(&mut self) {
        self.state.position = 0.0;
        self.state.duration = 0.0;
        self.buffering = false;
    }

    /// Back to defaults with a paused intent (new backend handle).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn valid_time(seconds: f64) -> bool {
    seconds.is_finite() && seconds >= 0.0
}
