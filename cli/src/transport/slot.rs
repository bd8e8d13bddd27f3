//! Single-slot, latest-wins frame holder between the socket reader and the
//! render path.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::codec::frame::{FramePacket, VideoInfo};

use super::decoder::DecodedFrame;

#[derive(Debug, Default)]
struct SlotInner {
    frame: Option<FramePacket>,
    pending_info: Option<VideoInfo>,
    delivered: u64,
    dropped: u64,
}

/// Shared latest-frame slot. Clones refer to the same slot.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<SlotInner>>,
}

impl FrameSlot {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a frame, replacing any unconsumed one.
    ///
    /// Returns `true` if the slot was empty (the consumer needs a wake-up).
    pub fn put(&self, frame: DecodedFrame) -> bool {
        let mut inner = self.lock();
        if let Some(info) = frame.info_changed {
            inner.pending_info = Some(info);
        }
        let was_empty = inner.frame.replace(frame.packet).is_none();
        if !was_empty {
            inner.dropped += 1;
        }
        was_empty
    }

    /// Take the newest frame together with any geometry change that must be
    /// applied before it is drawn.
    pub fn take_latest(&self) -> Option<(Option<VideoInfo>, FramePacket)> {
        let mut inner = self.lock();
        let frame = inner.frame.take()?;
        inner.delivered += 1;
        Some((inner.pending_info.take(), frame))
    }

    /// Whether a frame is waiting.
    pub fn has_frame(&self) -> bool {
        self.lock().frame.is_some()
    }

    /// Frames replaced before anyone consumed them.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Frames handed to the consumer.
    pub fn delivered(&self) -> u64 {
        self.lock().delivered
    }

    /// Discard any waiting frame (backend stopped).
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.frame = None;
        inner.pending_info = None;
    }
}
