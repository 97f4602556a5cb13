use std::collections::HashMap;
use std::sync::Arc;

use wren_core::AccountId;
use wren_engine::Engine;

/// One live automation session. A handle can exist without being ready
/// (mid-handshake); readiness is flipped by engine lifecycle events.
pub struct Session {
    pub engine: Arc<dyn Engine>,
    pub ready: bool,
}

/// Single source of truth for which accounts hold a live engine handle,
/// which of those are ready, and which account is currently selected.
///
/// Pure in-memory bookkeeping: no I/O happens here. The worker guards it
/// behind one lock and never holds that lock across engine calls.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<AccountId, Session>,
    current: Option<AccountId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, account_id: &AccountId) -> Option<&Session> {
        self.sessions.get(account_id)
    }

    pub fn engine(&self, account_id: &AccountId) -> Option<Arc<dyn Engine>> {
        self.sessions.get(account_id).map(|s| s.engine.clone())
    }

    /// Registers a handle, replacing any previous one for the account.
    /// New handles always start un-ready.
    pub fn insert(&mut self, account_id: AccountId, engine: Arc<dyn Engine>) {
        self.sessions.insert(
            account_id,
            Session {
                engine,
                ready: false,
            },
        );
    }

    pub fn mark_ready(&mut self, account_id: &AccountId, ready: bool) -> bool {
        let Some(session) = self.sessions.get_mut(account_id) else {
            return false;
        };
        session.ready = ready;
        true
    }

    pub fn is_ready(&self, account_id: &AccountId) -> bool {
        self.sessions.get(account_id).is_some_and(|s| s.ready)
    }

    pub fn remove(&mut self, account_id: &AccountId) -> Option<Session> {
        self.sessions.remove(account_id)
    }

    /// Removes every session except `keep`, returning them for teardown.
    /// This is how the one-live-browser constraint is enforced.
    pub fn drain_except(&mut self, keep: &AccountId) -> Vec<(AccountId, Session)> {
        let others: Vec<AccountId> = self
            .sessions
            .keys()
            .filter(|id| *id != keep)
            .cloned()
            .collect();
        others
            .into_iter()
            .filter_map(|id| self.sessions.remove(&id).map(|s| (id, s)))
            .collect()
    }

    pub fn drain_all(&mut self) -> Vec<(AccountId, Session)> {
        self.sessions.drain().collect()
    }

    pub fn current(&self) -> Option<&AccountId> {
        self.current.as_ref()
    }

    pub fn set_current(&mut self, account_id: Option<AccountId>) {
        self.current = account_id;
    }

    pub fn ready_accounts(&self) -> Vec<AccountId> {
        self.sessions
            .iter()
            .filter(|(_, s)| s.ready)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::ScriptedEngine;

    use super::*;

    fn engine() -> Arc<dyn Engine> {
        ScriptedEngine::new(Vec::new())
    }

    #[test]
    fn one_handle_per_account() {
        let mut registry = SessionRegistry::new();
        let id = AccountId::from("acc1");
        registry.insert(id.clone(), engine());
        registry.mark_ready(&id, true);

        // Re-inserting replaces the handle and drops readiness.
        registry.insert(id.clone(), engine());
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_ready(&id));
    }

    #[test]
    fn readiness_is_independent_of_existence() {
        let mut registry = SessionRegistry::new();
        let id = AccountId::from("acc1");
        assert!(!registry.mark_ready(&id, true), "no handle yet");

        registry.insert(id.clone(), engine());
        assert!(!registry.is_ready(&id), "handles start un-ready");
        assert!(registry.mark_ready(&id, true));
        assert!(registry.is_ready(&id));
    }

    #[test]
    fn drain_except_keeps_only_the_selected_account() {
        let mut registry = SessionRegistry::new();
        let keep = AccountId::from("keep");
        registry.insert(keep.clone(), engine());
        registry.insert(AccountId::from("a"), engine());
        registry.insert(AccountId::from("b"), engine());

        let drained = registry.drain_except(&keep);
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&keep).is_some());
    }

    #[test]
    fn current_pointer_moves_only_on_explicit_switch() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.current(), None);

        let id = AccountId::from("acc1");
        registry.insert(id.clone(), engine());
        assert_eq!(registry.current(), None, "insert does not select");

        registry.set_current(Some(id.clone()));
        assert_eq!(registry.current(), Some(&id));

        registry.remove(&id);
        // Removal of the handle does not clear the selection; the worker
        // decides what the pointer means next.
        assert_eq!(registry.current(), Some(&id));
    }
}
