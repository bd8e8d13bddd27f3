//! Typed listener lists for session events.

use crate::codec::frame::{FramePacket, VideoInfo};
use crate::status::PlaybackState;

/// A failure worth showing to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFault {
    /// Short human-readable message.
    pub message: String,
    /// Last stderr lines of a crashed backend; empty otherwise.
    pub stderr_tail: Vec<String>,
    /// Whether loading again (which restarts the backend) may help.
    pub recoverable: bool,
}

type Callback<T> = Box<dyn FnMut(&T) + Send>;

/// Ordered list of callbacks for one event kind.
pub struct Listeners<T> {
    callbacks: Vec<Callback<T>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }
}

impl<T> std::fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.callbacks.len())
            .finish()
    }
}

impl<T> Listeners<T> {
    /// Register a callback; callbacks run in registration order.
    pub fn add(&mut self, callback: impl FnMut(&T) + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Remove every callback.
    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub(crate) fn emit(&mut self, value: &T) {
        for callback in &mut self.callbacks {
            callback(value);
        }
    }
}

/// One listener list per session event kind.
#[derive(Debug, Default)]
pub struct SessionListeners {
    /// Backend accepted its first commands.
    pub ready: Listeners<()>,
    /// Throttled playback state.
    pub status: Listeners<PlaybackState>,
    /// Backend errors and crashes.
    pub error: Listeners<BackendFault>,
    /// Non-fatal backend conditions, including end of stream.
    pub warning: Listeners<String>,
    /// Backend diagnostic lines; only produced when the backend runs with
    /// debug output enabled.
    pub diagnostic: Listeners<String>,
    /// Newest decoded frame.
    pub frame: Listeners<FramePacket>,
    /// Frame geometry changed; always precedes the first frame with it.
    pub video_info: Listeners<VideoInfo>,
}

impl SessionListeners {
    /// Remove every callback of every kind.
    pub fn clear_all(&mut self) {
        self.ready.clear();
        self.status.clear();
        self.error.clear();
        self.warning.clear();
        self.diagnostic.clear();
        self.frame.clear();
        self.video_info.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_add_emit_clear() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners: Listeners<String> = Listeners::default();

        let sink = Arc::clone(&seen);
        listeners.add(move |msg: &String| sink.lock().unwrap().push(format!("a:{msg}")));
        let sink = Arc::clone(&seen);
        listeners.add(move |msg: &String| sink.lock().unwrap().push(format!("b:{msg}")));

        listeners.emit(&"x".to_string());
        assert_eq!(*seen.lock().unwrap(), vec!["a:x", "b:x"]);

        listeners.clear();
        assert!(listeners.is_empty());
        listeners.emit(&"y".to_string());
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_clear_all() {
        let mut all = SessionListeners::default();
        all.ready.add(|_| {});
        all.warning.add(|_| {});
        all.diagnostic.add(|_| {});
        all.frame.add(|_| {});
        assert_eq!(all.ready.len() + all.warning.len() + all.diagnostic.len() + all.frame.len(), 4);
        all.clear_all();
        assert!(all.ready.is_empty() && all.warning.is_empty() && all.frame.is_empty());
        assert!(all.diagnostic.is_empty());
    }
}
