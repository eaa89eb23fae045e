//! One-shot timer seam and the per-channel inactivity timer

use std::time::Duration;

/// Identifies one arming of one channel's inactivity timer.
///
/// The epoch changes on every restart, so an expiry that raced with a
/// restart or stop can be recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub slot: usize,
    pub epoch: u64,
}

/// One-shot scheduling service.
///
/// After `start`, the owner of the service must eventually report the key
/// back to the TCP handler unless `stop` was called for it first.
pub trait TimerService: Send + Sync {
    fn start(&self, key: TimerKey, timeout: Duration);
    fn stop(&self, key: TimerKey);
}

#[derive(Debug)]
pub(crate) struct InactivityTimer {
    slot: usize,
    epoch: u64,
    armed: Option<TimerKey>,
}

impl InactivityTimer {
    pub(crate) fn new(slot: usize) -> Self {
        Self {
            slot,
            epoch: 0,
            armed: None,
        }
    }

    /// (Re)start; a running timer is stopped first
    pub(crate) fn start(&mut self, timers: &dyn TimerService, timeout: Duration) {
        self.stop(timers);
        self.epoch = self.epoch.wrapping_add(1);
        let key = TimerKey {
            slot: self.slot,
            epoch: self.epoch,
        };
        timers.start(key, timeout);
        self.armed = Some(key);
    }

    pub(crate) fn stop(&mut self, timers: &dyn TimerService) {
        if let Some(key) = self.armed.take() {
            timers.stop(key);
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.armed.is_some()
    }

    /// Consume an expiry; false if `key` is not the current arming
    pub(crate) fn expire(&mut self, key: TimerKey) -> bool {
        if self.armed == Some(key) {
            self.armed = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualTimers;

    #[test]
    fn test_restart_invalidates_previous_key() {
        let timers = ManualTimers::new();
        let mut timer = InactivityTimer::new(3);

        timer.start(&timers, Duration::from_millis(2000));
        let first = timers.active()[0].0;
        timer.start(&timers, Duration::from_millis(5000));
        let second = timers.active()[0].0;

        assert_ne!(first, second);
        assert_eq!(timers.active().len(), 1);
        assert!(!timer.expire(first));
        assert!(timer.expire(second));
        assert!(!timer.is_running());
    }

    #[test]
    fn test_stop_cancels() {
        let timers = ManualTimers::new();
        let mut timer = InactivityTimer::new(0);
        timer.start(&timers, Duration::from_millis(10));
        let key = timers.active()[0].0;
        timer.stop(&timers);
        assert!(timers.active().is_empty());
        assert!(!timer.expire(key));
    }
}
