//! Tracking of the focused session.

use tokio::sync::broadcast;

use crate::id::SessionId;

/// Channel capacity for focus notifications.
const FOCUS_CHANNEL_CAPACITY: usize = 64;

/// A change of the focused session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusChange {
    /// Session that lost focus, if any.
    pub previous: Option<SessionId>,
    /// Session that gained focus. `None` once the last session is gone.
    pub current: Option<SessionId>,
}

/// Holds the one session id that has input focus.
///
/// Every change is broadcast as a [`FocusChange`] so tab strips and similar
/// observers can follow along. Consumers must re-read [`get`](Self::get)
/// instead of caching activeness.
pub struct ActiveSessionTracker {
    active: Option<SessionId>,
    changes: broadcast::Sender<FocusChange>,
}

impl ActiveSessionTracker {
    /// Creates a tracker with no active session.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(FOCUS_CHANNEL_CAPACITY);
        Self {
            active: None,
            changes,
        }
    }

    /// Returns the active session id, or `None` before the first session.
    pub fn get(&self) -> Option<&SessionId> {
        self.active.as_ref()
    }

    /// Returns true if `id` is the active session.
    pub fn is_active(&self, id: &SessionId) -> bool {
        self.active.as_ref() == Some(id)
    }

    /// Overwrites the active session and notifies subscribers.
    ///
    /// Returns the previously active id.
    pub fn set(&mut self, id: SessionId) -> Option<SessionId> {
        let previous = self.active.replace(id.clone());
        self.notify(previous.clone(), Some(id));
        previous
    }

    /// Resets to "no active session" and notifies subscribers.
    pub fn clear(&mut self) -> Option<SessionId> {
        let previous = self.active.take();
        if previous.is_some() {
            self.notify(previous.clone(), None);
        }
        previous
    }

    /// Subscribes to focus changes.
    pub fn subscribe(&self) -> broadcast::Receiver<FocusChange> {
        self.changes.subscribe()
    }

    /// Returns a sender that can mint further subscriptions.
    pub fn notifier(&self) -> broadcast::Sender<FocusChange> {
        self.changes.clone()
    }

    fn notify(&self, previous: Option<SessionId>, current: Option<SessionId>) {
        if self.changes.send(FocusChange { previous, current }).is_err() {
            tracing::trace!("No subscribers for focus change");
        }
    }
}

impl Default for ActiveSessionTracker {
    fn default() -> Self {
        Self::new()
    }
}
