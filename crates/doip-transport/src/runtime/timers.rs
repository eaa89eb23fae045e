use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::Event;
use crate::channel::timer::{TimerKey, TimerService};

/// One sleeping task per armed timer; expiry is posted to the dispatcher
pub(crate) struct TokioTimers {
    events: mpsc::UnboundedSender<Event>,
    armed: Mutex<HashMap<TimerKey, AbortHandle>>,
}

impl TokioTimers {
    pub(crate) fn new(events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            events,
            armed: Mutex::new(HashMap::new()),
        }
    }

    /// Drop bookkeeping of an expired timer
    pub(crate) fn forget(&self, key: TimerKey) {
        self.armed.lock().remove(&key);
    }

    pub(crate) fn cancel_all(&self) {
        for (_, handle) in self.armed.lock().drain() {
            handle.abort();
        }
    }
}

impl TimerService for TokioTimers {
    fn start(&self, key: TimerKey, timeout: Duration) {
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(Event::TimerExpired(key));
        });
        if let Some(previous) = self.armed.lock().insert(key, task.abort_handle()) {
            previous.abort();
        }
    }

    fn stop(&self, key: TimerKey) {
        if let Some(handle) = self.armed.lock().remove(&key) {
            handle.abort();
        }
    }
}
