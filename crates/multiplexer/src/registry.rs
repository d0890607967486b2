//! The registry of live sessions.
//!
//! [`SessionRegistry`] is the single source of truth for which sessions exist.
//! Entries are kept in creation order; removing one never reorders the rest.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{RouterError, RouterResult};
use crate::id::SessionId;
use crate::neighbor::circular_successor;
use crate::view::{Dimensions, SessionView};

/// Lifecycle state of a registered session.
///
/// A session that is gone is simply absent from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered, waiting for the backend to spawn the process.
    Creating,
    /// Process running.
    Running,
    /// Close requested; waiting for the backend to report the exit.
    Destroying,
}

/// A live session and the presentation handle it owns.
///
/// Dropping a session disposes its view, so the view is released exactly once
/// on every path that removes the session.
pub struct Session<V: SessionView> {
    id: SessionId,
    order: u64,
    state: SessionState,
    size: Option<Dimensions>,
    view: V,
}

impl<V: SessionView> Session<V> {
    /// Returns the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the creation sequence number.
    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Returns the last size pushed to the backend, if any.
    pub fn size(&self) -> Option<Dimensions> {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: Dimensions) {
        self.size = Some(size);
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }
}

impl<V: SessionView> Drop for Session<V> {
    fn drop(&mut self) {
        self.view.dispose();
    }
}

impl<V: SessionView> std::fmt::Debug for Session<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("order", &self.order)
            .field("state", &self.state)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered map of live sessions.
pub struct SessionRegistry<V: SessionView> {
    sessions: IndexMap<SessionId, Session<V>>,
    next_order: u64,
}

impl<V: SessionView> SessionRegistry<V> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: IndexMap::new(),
            next_order: 0,
        }
    }

    /// Registers a new session in the `Creating` state.
    ///
    /// Fails with `DuplicateId` if `id` is already present; the rejected view
    /// is disposed and the existing entry is left untouched.
    pub fn insert(&mut self, id: SessionId, view: V) -> RouterResult<()> {
        let session = Session {
            id: id.clone(),
            order: self.next_order,
            state: SessionState::Creating,
            size: None,
            view,
        };

        if self.sessions.contains_key(&id) {
            return Err(RouterError::DuplicateId(id));
        }

        self.next_order += 1;
        self.sessions.insert(id, session);
        Ok(())
    }

    /// Removes and returns a session, preserving the order of the rest.
    pub fn remove(&mut self, id: &SessionId) -> Option<Session<V>> {
        self.sessions.shift_remove(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session<V>> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session<V>> {
        self.sessions.get_mut(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Iterates over live ids in creation order.
    ///
    /// The iterator borrows the registry, so it always reflects current state;
    /// call again to restart.
    pub fn ordered_ids(&self) -> impl Iterator<Item = &SessionId> + '_ {
        self.sessions.keys()
    }

    /// Iterates over live sessions in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Session<V>> + '_ {
        self.sessions.values()
    }

    /// Returns the id of the session that should take focus after `id` is
    /// removed: its right neighbor in creation order, wrapping to the first.
    ///
    /// Must be called while `id` is still registered. Returns `None` if `id`
    /// is unknown or is the only session.
    pub fn successor_of(&self, id: &SessionId) -> Option<SessionId> {
        let target = self.sessions.get(id)?.order;
        let orders: Vec<u64> = self.sessions.values().map(|s| s.order).collect();
        let next = *circular_successor(&orders, &target)?;
        let idx = orders.binary_search(&next).ok()?;
        self.sessions.get_index(idx).map(|(id, _)| id.clone())
    }

    /// Returns the first live id in creation order.
    pub fn first_id(&self) -> Option<&SessionId> {
        self.sessions.first().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes every session, returning them in creation order.
    pub fn drain(&mut self) -> Vec<Session<V>> {
        self.sessions.drain(..).map(|(_, session)| session).collect()
    }
}

impl<V: SessionView> Default for SessionRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::SessionContext;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingView {
        disposed: Arc<AtomicUsize>,
    }

    impl SessionView for CountingView {
        fn attach(&mut self, _context: SessionContext) {}
        fn render(&mut self, _data: &[u8]) {}
        fn focus(&mut self) {}
        fn blur(&mut self) {}
        fn dispose(&mut self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn view(counter: &Arc<AtomicUsize>) -> CountingView {
        CountingView {
            disposed: Arc::clone(counter),
        }
    }

    fn registry_with(n: usize) -> (SessionRegistry<CountingView>, Vec<SessionId>, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = SessionRegistry::new();
        let ids: Vec<SessionId> = (0..n).map(|_| SessionId::new()).collect();
        for id in &ids {
            registry.insert(id.clone(), view(&counter)).unwrap();
        }
        (registry, ids, counter)
    }

    #[test]
    fn test_insert_and_get() {
        let (registry, ids, _) = registry_with(2);
        assert_eq!(registry.len(), 2);
        let session = registry.get(&ids[1]).unwrap();
        assert_eq!(session.id(), &ids[1]);
        assert_eq!(session.order(), 1);
        assert_eq!(session.state(), SessionState::Creating);
        assert!(session.size().is_none());
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let (mut registry, ids, counter) = registry_with(1);

        let result = registry.insert(ids[0].clone(), view(&counter));
        assert!(matches!(result, Err(RouterError::DuplicateId(id)) if id == ids[0]));

        // The rejected view is released, the original entry is not.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&ids[0]).unwrap().order(), 0);
    }

    #[test]
    fn test_remove_disposes_once() {
        let (mut registry, ids, counter) = registry_with(2);

        let removed = registry.remove(&ids[0]);
        assert!(removed.is_some());
        drop(removed);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert!(registry.remove(&ids[0]).is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ordered_ids_follow_creation_after_removal() {
        let (mut registry, ids, _) = registry_with(4);
        registry.remove(&ids[1]);

        let ordered: Vec<SessionId> = registry.ordered_ids().cloned().collect();
        assert_eq!(ordered, vec![ids[0].clone(), ids[2].clone(), ids[3].clone()]);

        // Restartable and live.
        registry.remove(&ids[0]);
        assert_eq!(registry.ordered_ids().count(), 2);
    }

    #[test]
    fn test_successor_of_middle_and_last() {
        let (mut registry, ids, _) = registry_with(4);
        assert_eq!(registry.successor_of(&ids[2]), Some(ids[3].clone()));

        registry.remove(&ids[2]);
        assert_eq!(registry.successor_of(&ids[3]), Some(ids[0].clone()));
    }

    #[test]
    fn test_successor_of_single_or_unknown() {
        let (registry, ids, _) = registry_with(1);
        assert_eq!(registry.successor_of(&ids[0]), None);
        assert_eq!(registry.successor_of(&SessionId::new()), None);
    }

    #[test]
    fn test_drain_disposes_all() {
        let (mut registry, _, counter) = registry_with(3);
        let drained = registry.drain();
        assert_eq!(drained.len(), 3);
        drop(drained);
        assert!(registry.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_orders_never_reused() {
        let (mut registry, ids, counter) = registry_with(2);
        registry.remove(&ids[1]);
        let id = SessionId::new();
        registry.insert(id.clone(), view(&counter)).unwrap();
        assert_eq!(registry.get(&id).unwrap().order(), 2);
    }
}
