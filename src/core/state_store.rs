//! State store: the single register holding the current SystemState
//!
//! Every mutation goes through `set`, which is a no-op when the value does
//! not change and otherwise notifies subscribers in registration order.

use tracing::debug;

use crate::types::SystemState;

type Observer = Box<dyn Fn(SystemState, SystemState) + Send + Sync>;

/// Handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Finite-state register with change notification
pub struct StateStore {
    current: SystemState,
    observers: Vec<(SubscriptionId, Observer)>,
    next_id: u64,
    transitions: u64,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("current", &self.current)
            .field("observers", &self.observers.len())
            .field("transitions", &self.transitions)
            .finish()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create store in `idle`
    pub fn new() -> Self {
        Self {
            current: SystemState::Idle,
            observers: Vec::new(),
            next_id: 0,
            transitions: 0,
        }
    }

    pub fn get(&self) -> SystemState {
        self.current
    }

    pub fn is(&self, state: SystemState) -> bool {
        self.current == state
    }

    /// Set the state; returns false (and notifies nobody) if unchanged
    pub fn set(&mut self, next: SystemState) -> bool {
        if self.current == next {
            return false;
        }
        let prev = self.current;
        self.current = next;
        self.transitions += 1;
        debug!(from = %prev, to = %next, "system state changed");
        for (_, observer) in &self.observers {
            observer(prev, next);
        }
        true
    }

    /// Register a change observer called with `(previous, next)`
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: Fn(SystemState, SystemState) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer; returns whether it was registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(i, _)| *i != id);
        self.observers.len() != before
    }

    /// Number of effective changes so far
    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_initial_state_is_idle() {
        assert_eq!(StateStore::new().get(), SystemState::Idle);
    }

    #[test]
    fn test_set_notifies_in_order() {
        let mut store = StateStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |from, to| sink.lock().unwrap().push((from, to)));

        assert!(store.set(SystemState::Listening));
        assert!(store.set(SystemState::Recording));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (SystemState::Idle, SystemState::Listening),
                (SystemState::Listening, SystemState::Recording),
            ]
        );
    }

    #[test]
    fn test_same_value_is_noop() {
        let mut store = StateStore::new();
        let calls = Arc::new(Mutex::new(0));
        let sink = calls.clone();
        store.subscribe(move |_, _| *sink.lock().unwrap() += 1);

        store.set(SystemState::Listening);
        assert!(!store.set(SystemState::Listening));
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(store.transitions(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let mut store = StateStore::new();
        let calls = Arc::new(Mutex::new(0));
        let sink = calls.clone();
        let id = store.subscribe(move |_, _| *sink.lock().unwrap() += 1);
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.set(SystemState::Speaking);
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
