// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-object signal state (satisfied/satisfiable) with synchronous observers
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: SignalState, StateTracker, StateObserver, ObserverAction, ObserverId
//! DEPENDS_ON: nexus-abi::Signals
//! INVARIANTS: satisfied ⊆ satisfiable after every update; the tracker holds no lock and is
//!             only mutated under the owning object's lock; observers run inside that lock;
//!             unregistered observers are parked until the owner takes them after unlocking

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::{fmt, mem};

use nexus_abi::Signals;

/// Snapshot of a tracker's two masks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignalState {
    /// Signals that are currently asserted.
    pub satisfied: Signals,
    /// Signals that may still become asserted.
    pub satisfiable: Signals,
}

impl SignalState {
    /// Returns `true` when any of `watched` is asserted.
    pub fn any_satisfied(&self, watched: Signals) -> bool {
        self.satisfied.intersects(watched)
    }

    /// Returns `true` when none of `watched` can ever be asserted again.
    pub fn never_satisfiable(&self, watched: Signals) -> bool {
        !self.satisfiable.intersects(watched)
    }
}

/// Whether an observer stays registered after a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserverAction {
    /// Keep receiving notifications.
    Keep,
    /// Unregister now.
    Remove,
}

/// Registration token returned by [`StateTracker::add_observer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Callback invoked on every state transition.
///
/// Runs with the owning object's lock held: implementations must not block and must not call
/// back into the object that notified them. An observer is never dropped under that lock, so it
/// may own references to kernel objects, including the one it watches.
pub trait StateObserver: Send + Sync {
    /// Handles a transition to `state`.
    fn on_state_change(&self, state: SignalState) -> ObserverAction;
}

/// Satisfied/satisfiable signal pair embedded by value in a kernel object.
pub struct StateTracker {
    satisfied: Signals,
    satisfiable: Signals,
    observers: Vec<(ObserverId, Arc<dyn StateObserver>)>,
    retired: Vec<Arc<dyn StateObserver>>,
    next_observer: u64,
}

impl StateTracker {
    /// Creates a tracker; `satisfied` must be a subset of `satisfiable`.
    pub fn new(satisfied: Signals, satisfiable: Signals) -> Self {
        assert!(satisfiable.contains(satisfied), "satisfied signals outside satisfiable set");
        Self {
            satisfied,
            satisfiable,
            observers: Vec::new(),
            retired: Vec::new(),
            next_observer: 1,
        }
    }

    /// Current masks.
    pub fn state(&self) -> SignalState {
        SignalState { satisfied: self.satisfied, satisfiable: self.satisfiable }
    }

    /// Currently asserted signals.
    pub fn satisfied(&self) -> Signals {
        self.satisfied
    }

    /// Signals that may still be asserted.
    pub fn satisfiable(&self) -> Signals {
        self.satisfiable
    }

    /// Applies a transition and notifies observers when either mask changed.
    ///
    /// Clears are applied before sets on each mask. Returns `true` when the state changed.
    ///
    /// # Panics
    /// If the resulting satisfied mask is not contained in the satisfiable mask.
    pub fn update_state(
        &mut self,
        satisfied_clear: Signals,
        satisfied_set: Signals,
        satisfiable_clear: Signals,
        satisfiable_set: Signals,
    ) -> bool {
        let satisfied = self.satisfied.difference(satisfied_clear).union(satisfied_set);
        let satisfiable = self.satisfiable.difference(satisfiable_clear).union(satisfiable_set);
        assert!(
            satisfiable.contains(satisfied),
            "signal invariant broken: satisfied={:#x} satisfiable={:#x}",
            satisfied.bits(),
            satisfiable.bits()
        );
        if satisfied == self.satisfied && satisfiable == self.satisfiable {
            return false;
        }
        self.satisfied = satisfied;
        self.satisfiable = satisfiable;
        let state = self.state();
        let (keep, done): (Vec<_>, Vec<_>) = mem::take(&mut self.observers)
            .into_iter()
            .partition(|(_, observer)| observer.on_state_change(state) == ObserverAction::Keep);
        self.observers = keep;
        self.retired.extend(done.into_iter().map(|(_, observer)| observer));
        true
    }

    /// Registers `observer` after evaluating it against the current state.
    ///
    /// Returns `None` when the observer completed immediately and was not stored.
    pub fn add_observer(&mut self, observer: Arc<dyn StateObserver>) -> Option<ObserverId> {
        if observer.on_state_change(self.state()) == ObserverAction::Remove {
            self.retired.push(observer);
            return None;
        }
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, observer));
        Some(id)
    }

    /// Unregisters `id`; returns `false` if it had already completed.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let Some(index) = self.observers.iter().position(|(registered, _)| *registered == id) else {
            return false;
        };
        let (_, observer) = self.observers.remove(index);
        self.retired.push(observer);
        true
    }

    /// Takes the observers unregistered since the last call.
    ///
    /// The owner drops them after releasing its lock; the last reference to an observer may be
    /// the last reference to another kernel object.
    pub fn take_retired(&mut self) -> Vec<Arc<dyn StateObserver>> {
        mem::take(&mut self.retired)
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl fmt::Debug for StateTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTracker")
            .field("satisfied", &self.satisfied.bits())
            .field("satisfiable", &self.satisfiable.bits())
            .field("observers", &self.observers.len())
            .field("retired", &self.retired.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<SignalState>>,
        stop_on: Signals,
    }

    impl StateObserver for Recorder {
        fn on_state_change(&self, state: SignalState) -> ObserverAction {
            self.seen.lock().unwrap().push(state);
            if state.any_satisfied(self.stop_on) {
                ObserverAction::Remove
            } else {
                ObserverAction::Keep
            }
        }
    }

    fn recorder(stop_on: Signals) -> Arc<Recorder> {
        Arc::new(Recorder { seen: Mutex::new(Vec::new()), stop_on })
    }

    #[test]
    fn clear_then_set() {
        let mut tracker = StateTracker::new(Signals::WRITABLE, Signals::CHANNEL_ALL);
        assert!(tracker.update_state(
            Signals::WRITABLE,
            Signals::READABLE | Signals::WRITABLE,
            Signals::empty(),
            Signals::empty()
        ));
        assert_eq!(tracker.satisfied(), Signals::READABLE | Signals::WRITABLE);
    }

    #[test]
    fn unchanged_state_does_not_notify() {
        let mut tracker = StateTracker::new(Signals::WRITABLE, Signals::CHANNEL_ALL);
        let observer = recorder(Signals::PEER_CLOSED);
        tracker.add_observer(observer.clone()).unwrap();
        assert!(!tracker.update_state(
            Signals::empty(),
            Signals::WRITABLE,
            Signals::empty(),
            Signals::empty()
        ));
        assert_eq!(observer.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn observer_removed_when_done() {
        let mut tracker = StateTracker::new(Signals::WRITABLE, Signals::CHANNEL_ALL);
        let observer = recorder(Signals::READABLE);
        let id = tracker.add_observer(observer.clone()).unwrap();
        tracker.update_state(
            Signals::empty(),
            Signals::READABLE,
            Signals::empty(),
            Signals::empty(),
        );
        assert_eq!(tracker.observer_count(), 0);
        assert!(!tracker.remove_observer(id));
        assert_eq!(observer.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn finished_observers_are_parked_until_taken() {
        let mut tracker = StateTracker::new(Signals::WRITABLE, Signals::CHANNEL_ALL);
        let done = recorder(Signals::READABLE);
        let kept = recorder(Signals::PEER_CLOSED);
        tracker.add_observer(done.clone()).unwrap();
        let kept_id = tracker.add_observer(kept.clone()).unwrap();
        tracker.update_state(
            Signals::empty(),
            Signals::READABLE,
            Signals::empty(),
            Signals::empty(),
        );
        assert_eq!(Arc::strong_count(&done), 2);

        let retired = tracker.take_retired();
        assert_eq!(retired.len(), 1);
        drop(retired);
        assert_eq!(Arc::strong_count(&done), 1);

        assert!(tracker.remove_observer(kept_id));
        assert_eq!(Arc::strong_count(&kept), 2);
        assert_eq!(tracker.take_retired().len(), 1);
        assert!(tracker.take_retired().is_empty());
    }

    #[test]
    fn already_satisfied_observer_is_not_stored() {
        let mut tracker = StateTracker::new(Signals::WRITABLE, Signals::CHANNEL_ALL);
        assert!(tracker.add_observer(recorder(Signals::WRITABLE)).is_none());
        assert_eq!(tracker.observer_count(), 0);
    }

    #[test]
    fn satisfiable_can_be_restored() {
        let mut tracker = StateTracker::new(Signals::empty(), Signals::CHANNEL_ALL);
        tracker.update_state(
            Signals::empty(),
            Signals::empty(),
            Signals::READABLE,
            Signals::empty(),
        );
        assert!(tracker.state().never_satisfiable(Signals::READABLE));
        tracker.update_state(
            Signals::empty(),
            Signals::READABLE,
            Signals::empty(),
            Signals::READABLE,
        );
        assert!(tracker.state().any_satisfied(Signals::READABLE));
    }

    #[test]
    #[should_panic(expected = "signal invariant broken")]
    fn satisfied_outside_satisfiable_panics() {
        let mut tracker = StateTracker::new(Signals::WRITABLE, Signals::CHANNEL_ALL);
        tracker.update_state(
            Signals::empty(),
            Signals::empty(),
            Signals::WRITABLE,
            Signals::empty(),
        );
    }
}
