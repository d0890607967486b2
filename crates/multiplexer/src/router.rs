//! Session router: the façade between the UI, the registry and the backend.
//!
//! Per-session lifecycle:
//!
//! ```text
//! Creating ──spawn ok──► Running ──close / terminate──► Destroying
//!    │                      │                               │
//!    └─spawn failed─┐       └────────Destroyed event────────┤
//!                   ▼                                       ▼
//!              rolled back                                Gone
//! ```
//!
//! A session only becomes `Gone` when the backend reports `Destroyed`, so
//! teardown follows the same path whether the user closed the tab or the
//! shell exited by itself.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};

use crate::backend::{BackendEvent, SessionBackend};
use crate::error::{RouterError, RouterResult};
use crate::id::SessionId;
use crate::registry::{SessionRegistry, SessionState};
use crate::tracker::{ActiveSessionTracker, FocusChange};
use crate::view::{Dimensions, LocalInput, SessionContext, SessionView, ViewFactory};

/// Input written to a shell to ask it to exit.
pub const DEFAULT_CLOSE_SEQUENCE: &[u8] = b"exit\n";

/// Router settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Maximum number of live sessions. `None` means unlimited.
    pub max_sessions: Option<usize>,
    /// Bytes written to a session's shell on close.
    pub close_sequence: Vec<u8>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_sessions: None,
            close_sequence: DEFAULT_CLOSE_SEQUENCE.to_vec(),
        }
    }
}

/// Snapshot of one live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub order: u64,
    pub state: SessionState,
    pub size: Option<Dimensions>,
    pub active: bool,
}

/// Owns the live sessions and routes input, output and focus between the UI
/// and the backend.
///
/// The router is single-owner: every method takes `&self` or `&mut self` and
/// none of them lock. Wrap it in a [`RouterService`](crate::RouterService)
/// when calls come from more than one task.
pub struct SessionRouter<B: SessionBackend, F: ViewFactory> {
    backend: B,
    views: F,
    registry: SessionRegistry<F::View>,
    tracker: ActiveSessionTracker,
    input_tx: mpsc::UnboundedSender<LocalInput>,
    config: RouterConfig,
}

impl<B: SessionBackend, F: ViewFactory> SessionRouter<B, F> {
    /// Creates a router with no sessions.
    ///
    /// Returns the router and the receiving end of the local-input channel
    /// that every view's [`SessionContext`] writes to. Feed what arrives
    /// there back into [`handle_input`](Self::handle_input).
    pub fn new(
        backend: B,
        views: F,
        config: RouterConfig,
    ) -> (Self, mpsc::UnboundedReceiver<LocalInput>) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let router = Self {
            backend,
            views,
            registry: SessionRegistry::new(),
            tracker: ActiveSessionTracker::new(),
            input_tx,
            config,
        };

        (router, input_rx)
    }

    /// Creates a session, spawns its process and gives it focus.
    ///
    /// If the backend fails to spawn, the tentative entry is removed again and
    /// its view disposed; no half-registered session survives.
    pub async fn create_session(&mut self) -> RouterResult<SessionId> {
        self.heal_active();

        if let Some(max) = self.config.max_sessions {
            if self.registry.len() >= max {
                warn!(max_sessions = max, "Refusing to create session: limit reached");
                return Err(RouterError::SessionLimit(max));
            }
        }

        let id = SessionId::new();
        let mut view = self.views.create_view(&id);
        view.attach(SessionContext::new(id.clone(), self.input_tx.clone()));

        if let Err(e) = self.registry.insert(id.clone(), view) {
            error!(session_id = %id, error = %e, "Minted a session id that is already live");
            return Err(e);
        }

        if let Err(e) = self.backend.spawn(&id).await {
            error!(session_id = %id, error = %e, "Backend failed to spawn session, rolling back");
            self.registry.remove(&id);
            return Err(RouterError::BackendSpawnFailed(e));
        }

        if let Some(session) = self.registry.get_mut(&id) {
            session.set_state(SessionState::Running);
        }

        info!(
            session_id = %id,
            sessions = self.registry.len(),
            "Created session"
        );

        self.activate(&id);
        Ok(id)
    }

    /// Moves focus to `id`.
    ///
    /// A no-op if `id` is already active. Fails with `NotFound` for ids that
    /// are not live, which means the caller's session list is stale.
    pub fn switch_to(&mut self, id: &SessionId) -> RouterResult<()> {
        self.heal_active();

        if self.tracker.is_active(id) {
            return Ok(());
        }

        if !self.registry.contains(id) {
            debug!(session_id = %id, "Switch to unknown session");
            return Err(RouterError::NotFound(id.clone()));
        }

        debug!(session_id = %id, "Switching session");
        self.activate(id);
        Ok(())
    }

    /// Asks the session's shell to exit by writing the close sequence.
    ///
    /// The session stays registered until the backend reports `Destroyed`.
    pub fn close_session(&mut self, id: &SessionId) {
        let Some(session) = self.registry.get_mut(id) else {
            debug!(session_id = %id, "Close requested for unknown session");
            return;
        };
        session.set_state(SessionState::Destroying);

        info!(session_id = %id, "Requesting session close");
        if let Err(e) = self.backend.write(id, &self.config.close_sequence) {
            warn!(session_id = %id, error = %e, "Failed to send close sequence");
        }
    }

    /// Kills the session's process without asking the shell.
    ///
    /// Teardown still waits for the backend's `Destroyed` event.
    pub fn terminate(&mut self, id: &SessionId) {
        let Some(session) = self.registry.get_mut(id) else {
            debug!(session_id = %id, "Terminate requested for unknown session");
            return;
        };
        session.set_state(SessionState::Destroying);

        info!(session_id = %id, "Terminating session");
        if let Err(e) = self.backend.terminate(id) {
            warn!(session_id = %id, error = %e, "Failed to terminate session");
        }
    }

    /// Forwards input verbatim to the session's process.
    ///
    /// Writes to unknown ids are dropped; a keystroke racing a teardown is
    /// expected and not an error.
    pub fn write(&self, id: &SessionId, data: &[u8]) {
        if !self.registry.contains(id) {
            debug!(session_id = %id, bytes = data.len(), "Dropping write for unknown session");
            return;
        }

        if let Err(e) = self.backend.write(id, data) {
            warn!(session_id = %id, error = %e, "Write to session failed");
        }
    }

    /// Resizes the session's terminal.
    pub fn resize(&mut self, id: &SessionId, size: Dimensions) {
        let Some(session) = self.registry.get_mut(id) else {
            debug!(session_id = %id, "Resize for unknown session");
            return;
        };

        match self.backend.resize(id, size) {
            Ok(()) => session.set_size(size),
            Err(e) => warn!(session_id = %id, error = %e, "Resize of session failed"),
        }
    }

    /// Returns the focused session, or `None` when no session exists.
    pub fn active_id(&self) -> Option<SessionId> {
        self.tracker
            .get()
            .filter(|id| self.registry.contains(id))
            .cloned()
    }

    /// Returns all live ids in creation order.
    pub fn all_ids(&self) -> Vec<SessionId> {
        self.registry.ordered_ids().cloned().collect()
    }

    /// Returns a snapshot of all live sessions in creation order.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.registry
            .iter()
            .map(|session| SessionInfo {
                id: session.id().clone(),
                order: session.order(),
                state: session.state(),
                size: session.size(),
                active: self.tracker.is_active(session.id()),
            })
            .collect()
    }

    /// Applies one event from the backend's stream.
    pub fn handle_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Output { id, data } => self.deliver_output(&id, &data),
            BackendEvent::Destroyed { id, exit_code } => self.on_backend_destroyed(&id, exit_code),
        }
    }

    /// Forwards input typed into a view to the backend.
    pub fn handle_input(&self, input: LocalInput) {
        self.write(&input.id, &input.data);
    }

    /// Subscribes to focus changes.
    pub fn subscribe_focus(&self) -> broadcast::Receiver<FocusChange> {
        self.tracker.subscribe()
    }

    pub(crate) fn focus_notifier(&self) -> broadcast::Sender<FocusChange> {
        self.tracker.notifier()
    }

    /// Returns the session registry.
    pub fn registry(&self) -> &SessionRegistry<F::View> {
        &self.registry
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Kills every live session and releases all views.
    pub fn shutdown(&mut self) {
        for id in self.registry.ordered_ids() {
            if let Err(e) = self.backend.terminate(id) {
                debug!(session_id = %id, error = %e, "Failed to terminate session on shutdown");
            }
        }

        let released = self.registry.drain().len();
        self.tracker.clear();
        info!(sessions = released, "Session router shut down");
    }

    fn deliver_output(&mut self, id: &SessionId, data: &[u8]) {
        if data.is_empty() {
            return;
        }

        match self.registry.get_mut(id) {
            Some(session) => session.view_mut().render(data),
            None => trace!(session_id = %id, bytes = data.len(), "Dropping output for gone session"),
        }
    }

    fn on_backend_destroyed(&mut self, id: &SessionId, exit_code: Option<u32>) {
        let Some(session) = self.registry.get_mut(id) else {
            debug!(session_id = %id, "Destroy event for unknown session");
            return;
        };
        session.set_state(SessionState::Destroying);

        // The successor is computed on the intact ring, before removal.
        let successor = self.registry.successor_of(id);
        let was_active = self.tracker.is_active(id);

        drop(self.registry.remove(id));

        info!(
            session_id = %id,
            exit_code = ?exit_code,
            remaining = self.registry.len(),
            "Session destroyed"
        );

        if !was_active {
            return;
        }

        match successor.or_else(|| self.registry.first_id().cloned()) {
            Some(next) => self.activate(&next),
            None => {
                self.tracker.clear();
                debug!("Last session destroyed, no active session");
            }
        }
    }

    /// Blurs the current session, records `id` as active, reconciles its
    /// size and focuses it.
    fn activate(&mut self, id: &SessionId) {
        if let Some(current) = self.tracker.get().filter(|current| *current != id) {
            if let Some(session) = self.registry.get_mut(current) {
                session.view_mut().blur();
            }
        }

        self.tracker.set(id.clone());
        self.reconcile_size(id);

        if let Some(session) = self.registry.get_mut(id) {
            session.view_mut().focus();
        }
    }

    /// Pushes the view's proposed size to the backend if it changed.
    ///
    /// A backgrounded session receives no resizes, so its PTY may be stale by
    /// the time it regains focus.
    fn reconcile_size(&mut self, id: &SessionId) {
        let Some(session) = self.registry.get_mut(id) else {
            return;
        };
        let Some(proposed) = session.view().propose_dimensions() else {
            return;
        };
        if session.size() == Some(proposed) {
            return;
        }

        match self.backend.resize(id, proposed) {
            Ok(()) => {
                session.set_size(proposed);
                debug!(
                    session_id = %id,
                    rows = proposed.rows,
                    cols = proposed.cols,
                    "Reconciled session size"
                );
            }
            Err(e) => warn!(session_id = %id, error = %e, "Resize reconciliation failed"),
        }
    }

    /// Reassigns focus if the tracker points at a session that is gone.
    fn heal_active(&mut self) {
        let Some(active) = self.tracker.get().cloned() else {
            return;
        };
        if self.registry.contains(&active) {
            return;
        }

        warn!(session_id = %active, "Active session missing from registry, reassigning focus");
        match self.registry.first_id().cloned() {
            Some(first) => self.activate(&first),
            None => {
                self.tracker.clear();
            }
        }
    }
}
