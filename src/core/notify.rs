//! Status fan-out to observers.
//!
//! Observers are called on the owner thread, in subscription order, with a
//! snapshot of the subscriber list taken when the update is published. They
//! must not block; anything that wants to act on an update enqueues a request
//! through a [`crate::core::Handle`].

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::constants;
use crate::error::Error;
use crate::state::{ConnectionStatus, KillSwitchState, StatusUpdate};

/// Receives connection transitions and subprocess log lines.
pub trait Observer: Send + Sync {
    /// Called exactly once per status transition.
    fn on_status_changed(&self, update: &StatusUpdate);

    /// The kill switch changed without a status transition, e.g. the user
    /// lifted a block while the connection stays failed.
    fn on_killswitch_changed(&self, _state: KillSwitchState) {}

    /// A raw line of VPN output, including lines from superseded attempts.
    fn on_log_line(&self, _line: &str) {}

    /// A queued request was refused on the owner thread.
    fn on_rejected(&self, _error: &Error) {}
}

/// Subscriber registry.
#[derive(Default)]
pub struct Notifier {
    observers: Mutex<Vec<Arc<dyn Observer>>>,
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer`. Subscribing the same `Arc` twice is a no-op.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        if !observers.iter().any(|o| same(o, &observer)) {
            observers.push(observer);
        }
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn Observer>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|o| !same(o, observer));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn publish(&self, update: &StatusUpdate) {
        for observer in self.snapshot() {
            observer.on_status_changed(update);
        }
    }

    pub fn killswitch(&self, state: KillSwitchState) {
        for observer in self.snapshot() {
            observer.on_killswitch_changed(state);
        }
    }

    pub fn log_line(&self, line: &str) {
        for observer in self.snapshot() {
            observer.on_log_line(line);
        }
    }

    pub fn reject(&self, error: &Error) {
        for observer in self.snapshot() {
            observer.on_rejected(error);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn Observer>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn same(a: &Arc<dyn Observer>, b: &Arc<dyn Observer>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Records every published status in order.
#[derive(Default)]
pub struct StatusHistory {
    statuses: Mutex<Vec<ConnectionStatus>>,
    changed: Condvar,
}

impl StatusHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Block until at least `len` statuses were recorded or `timeout` elapses.
    /// Returns the statuses seen so far.
    pub fn wait_for(&self, len: usize, timeout: Duration) -> Vec<ConnectionStatus> {
        let deadline = Instant::now() + timeout;
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        while statuses.len() < len {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            statuses = self
                .changed
                .wait_timeout(statuses, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        statuses.clone()
    }
}

impl Observer for StatusHistory {
    fn on_status_changed(&self, update: &StatusUpdate) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update.status);
        self.changed.notify_all();
    }
}

/// Keeps the most recent VPN log lines.
pub struct LogBuffer {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(constants::MAX_LOG_LINES)
    }
}

impl LogBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Oldest first.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl Observer for LogBuffer {
    fn on_status_changed(&self, _update: &StatusUpdate) {}

    fn on_log_line(&self, line: &str) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AttemptId;

    fn update(status: ConnectionStatus) -> StatusUpdate {
        StatusUpdate {
            status,
            attempt: AttemptId(1),
            endpoint: None,
            retrying: false,
            killswitch: KillSwitchState::Disabled,
        }
    }

    /// Appends its tag to a shared journal so ordering across observers is visible.
    struct Tagged {
        tag: &'static str,
        journal: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Observer for Tagged {
        fn on_status_changed(&self, _update: &StatusUpdate) {
            self.journal.lock().unwrap().push(self.tag);
        }
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let notifier = Notifier::new();
        for tag in ["a", "b", "c"] {
            notifier.subscribe(Arc::new(Tagged {
                tag,
                journal: journal.clone(),
            }));
        }
        notifier.publish(&update(ConnectionStatus::Connecting));
        assert_eq!(*journal.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_subscribe_is_noop() {
        let notifier = Notifier::new();
        let history = Arc::new(StatusHistory::new());
        let observer: Arc<dyn Observer> = history.clone();
        notifier.subscribe(observer.clone());
        notifier.subscribe(observer.clone());
        assert_eq!(notifier.len(), 1);

        notifier.publish(&update(ConnectionStatus::Idle));
        assert_eq!(history.statuses(), vec![ConnectionStatus::Idle]);

        notifier.unsubscribe(&observer);
        assert!(notifier.is_empty());
        notifier.publish(&update(ConnectionStatus::Connecting));
        assert_eq!(history.statuses().len(), 1);
    }

    /// Subscribes another observer while being notified.
    struct Recruiter {
        notifier: Arc<Notifier>,
        recruit: Arc<StatusHistory>,
    }

    impl Observer for Recruiter {
        fn on_status_changed(&self, _update: &StatusUpdate) {
            self.notifier.subscribe(self.recruit.clone());
        }
    }

    #[test]
    fn test_subscribe_during_publish_applies_to_next_update() {
        let notifier = Arc::new(Notifier::new());
        let recruit = Arc::new(StatusHistory::new());
        notifier.subscribe(Arc::new(Recruiter {
            notifier: notifier.clone(),
            recruit: recruit.clone(),
        }));

        notifier.publish(&update(ConnectionStatus::Connecting));
        assert!(recruit.statuses().is_empty());

        notifier.publish(&update(ConnectionStatus::Connected));
        assert_eq!(recruit.statuses(), vec![ConnectionStatus::Connected]);
    }

    /// Counts kill-switch notifications separately from status updates.
    #[derive(Default)]
    struct Switchboard {
        states: Mutex<Vec<KillSwitchState>>,
        updates: Mutex<usize>,
    }

    impl Observer for Switchboard {
        fn on_status_changed(&self, _update: &StatusUpdate) {
            *self.updates.lock().unwrap() += 1;
        }

        fn on_killswitch_changed(&self, state: KillSwitchState) {
            self.states.lock().unwrap().push(state);
        }
    }

    #[test]
    fn test_killswitch_change_is_not_a_status_update() {
        let notifier = Notifier::new();
        let board = Arc::new(Switchboard::default());
        let history = Arc::new(StatusHistory::new());
        notifier.subscribe(board.clone());
        notifier.subscribe(history.clone());

        notifier.killswitch(KillSwitchState::Armed);
        assert_eq!(*board.states.lock().unwrap(), vec![KillSwitchState::Armed]);
        assert_eq!(*board.updates.lock().unwrap(), 0);
        assert!(history.statuses().is_empty());
    }

    #[test]
    fn test_log_buffer_keeps_latest_lines() {
        let notifier = Notifier::new();
        let buffer = Arc::new(LogBuffer::with_capacity(2));
        notifier.subscribe(buffer.clone());
        for line in ["one", "two", "three"] {
            notifier.log_line(line);
        }
        assert_eq!(buffer.lines(), vec!["two", "three"]);
    }

    #[test]
    fn test_wait_for_times_out_with_partial_history() {
        let history = StatusHistory::new();
        history.on_status_changed(&update(ConnectionStatus::Connecting));
        let seen = history.wait_for(2, Duration::from_millis(50));
        assert_eq!(seen, vec![ConnectionStatus::Connecting]);
    }
}
