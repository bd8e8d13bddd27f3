//! Rate limiter for status pushes to the UI.
//!
//! Coalescing, not queuing: the throttle only tracks *whether* the merged
//! state has changed since the last push. A change inside the window arms a
//! trailing deadline so the final update of a burst is always delivered.

use std::time::Duration;

use tokio::time::Instant;

/// Leading-edge throttle with a trailing push.
#[derive(Debug, Clone)]
pub struct StatusThrottle {
    interval: Duration,
    last_push: Option<Instant>,
    dirty: bool,
}

impl StatusThrottle {
    /// Throttle allowing one push per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_push: None,
            dirty: false,
        }
    }

    /// Record a state change at `now`.
    ///
    /// Returns `true` if the caller should push immediately. Otherwise the
    /// change is remembered and [`StatusThrottle::deadline`] says when to
    /// come back.
    pub fn offer(&mut self, now: Instant) -> bool {
        self.dirty = true;
        self.poll(now)
    }

    /// Returns `true` (and records the push) if a pending change is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.dirty {
            return false;
        }
        let due = self
            .last_push
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last_push = Some(now);
            self.dirty = false;
        }
        due
    }

    /// When the trailing push is due, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        if !self.dirty {
            return None;
        }
        Some(self.last_push.map_or_else(Instant::now, |last| last + self.interval))
    }

    /// Forget pending changes and push history (new backend handle).
    pub fn reset(&mut self) {
        self.last_push = None;
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    #[test]
    fn test_first_change_pushes_immediately() {
        let mut throttle = StatusThrottle::new(WINDOW);
        assert!(throttle.offer(Instant::now()));
        assert!(throttle.deadline().is_none());
    }

    #[test]
    fn test_burst_coalesces_into_one_trailing_push() {
        let mut throttle = StatusThrottle::new(WINDOW);
        let t0 = Instant::now();
        assert!(throttle.offer(t0));

        for ms in [10, 20, 30, 90] {
            assert!(!throttle.offer(t0 + Duration::from_millis(ms)));
        }
        assert_eq!(throttle.deadline(), Some(t0 + WINDOW));

        assert!(!throttle.poll(t0 + Duration::from_millis(99)));
        assert!(throttle.poll(t0 + WINDOW));
        assert!(!throttle.poll(t0 + Duration::from_millis(150)));
        assert!(throttle.deadline().is_none());
    }

    #[test]
    fn test_at_most_one_push_per_window() {
        let mut throttle = StatusThrottle::new(WINDOW);
        let t0 = Instant::now();
        let mut pushes = 0;
        for ms in (0..1000).step_by(5) {
            if throttle.offer(t0 + Duration::from_millis(ms)) {
                pushes += 1;
            }
        }
        assert_eq!(pushes, 10);
    }
}
