// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Change notifications for state replicas.
//!
//! Purely observational: a listener that misses a notification still sees
//! the correct state on the next snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::rig::caps::Capabilities;
use crate::rig::diff::StateField;
use crate::rig::state::State;

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Receives replica events. All methods default to no-ops.
pub trait StateListener: Send + Sync {
    /// A field differs between two consecutive snapshots.
    fn on_field_change(&self, _field: StateField, _old: &State, _new: &State) {}

    /// First snapshot after start-up or after the radio disappeared.
    fn on_initial_state(&self, _state: &State) {}

    /// Capabilities of the radio arrived.
    fn on_capabilities(&self, _caps: &Capabilities) {}

    /// The server withdrew its snapshot (tombstone).
    fn on_radio_gone(&self) {}

    /// The server's liveness flag changed.
    fn on_online_change(&self, _online: bool) {}
}

/// Manages registered listeners and dispatches events.
pub struct StateEventEmitter {
    listeners: Vec<(ListenerId, Arc<dyn StateListener>)>,
}

impl Default for StateEventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl StateEventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Register a listener to receive events.
    /// Returns an ID that can be used to unregister the listener.
    pub fn register(&mut self, listener: Arc<dyn StateListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.push((id, listener));
        id
    }

    pub fn unregister(&mut self, id: ListenerId) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn notify_field_change(&self, field: StateField, old: &State, new: &State) {
        for (_, listener) in &self.listeners {
            listener.on_field_change(field, old, new);
        }
    }

    pub fn notify_initial_state(&self, state: &State) {
        for (_, listener) in &self.listeners {
            listener.on_initial_state(state);
        }
    }

    pub fn notify_capabilities(&self, caps: &Capabilities) {
        for (_, listener) in &self.listeners {
            listener.on_capabilities(caps);
        }
    }

    pub fn notify_radio_gone(&self) {
        for (_, listener) in &self.listeners {
            listener.on_radio_gone();
        }
    }

    pub fn notify_online_change(&self, online: bool) {
        for (_, listener) in &self.listeners {
            listener.on_online_change(online);
        }
    }
}
