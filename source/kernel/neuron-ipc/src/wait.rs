// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Blocking waits on object signals
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: Waitable, Waiter, wait_one
//! DEPENDS_ON: state::{StateObserver, SignalState}, parking_lot
//! INVARIANTS: A waiter completes once: on the first watched signal asserted or when every
//!             watched signal became unsatisfiable; its observer is unregistered on timeout

use std::sync::Arc;
use std::time::Instant;

use log::trace;
use nexus_abi::{Signals, Status};
use parking_lot::{Condvar, Mutex};

use crate::state::{ObserverAction, ObserverId, SignalState, StateObserver};

/// Object whose signal state can be observed.
pub trait Waitable {
    /// Registers `observer` under the object's lock.
    ///
    /// Returns `None` if the observer completed against the current state and was not stored.
    fn add_observer(&self, observer: Arc<dyn StateObserver>) -> Option<ObserverId>;

    /// Unregisters a previously stored observer.
    fn remove_observer(&self, id: ObserverId);

    /// Current signal masks.
    fn signal_state(&self) -> SignalState;
}

/// Condvar-backed observer that parks one thread until a watched condition holds.
pub struct Waiter {
    watched: Signals,
    result: Mutex<Option<SignalState>>,
    cond: Condvar,
}

impl Waiter {
    /// Creates a waiter for any of `watched`.
    pub fn new(watched: Signals) -> Arc<Self> {
        Arc::new(Self { watched, result: Mutex::new(None), cond: Condvar::new() })
    }

    fn done(&self, state: &SignalState) -> bool {
        state.any_satisfied(self.watched) || state.never_satisfiable(self.watched)
    }

    /// Blocks until completion or `deadline`; returns the completing state if any.
    pub fn wait(&self, deadline: Option<Instant>) -> Option<SignalState> {
        let mut result = self.result.lock();
        while result.is_none() {
            match deadline {
                None => self.cond.wait(&mut result),
                Some(deadline) => {
                    if self.cond.wait_until(&mut result, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        *result
    }

    /// Completing state, if the waiter already fired.
    pub fn result(&self) -> Option<SignalState> {
        *self.result.lock()
    }
}

impl StateObserver for Waiter {
    fn on_state_change(&self, state: SignalState) -> ObserverAction {
        if !self.done(&state) {
            return ObserverAction::Keep;
        }
        *self.result.lock() = Some(state);
        self.cond.notify_all();
        ObserverAction::Remove
    }
}

fn outcome(watched: Signals, state: SignalState) -> Result<Signals, Status> {
    if state.any_satisfied(watched) {
        Ok(state.satisfied)
    } else {
        Err(Status::BadState)
    }
}

/// Waits until any of `signals` is asserted on `object`.
///
/// Returns the satisfied mask at completion. Fails with [`Status::BadState`] when every watched
/// signal became unsatisfiable, and with [`Status::TimedOut`] when `deadline` passes first.
pub fn wait_one(
    object: &dyn Waitable,
    signals: Signals,
    deadline: Option<Instant>,
) -> Result<Signals, Status> {
    if signals.is_empty() {
        return Err(Status::InvalidArgs);
    }
    let waiter = Waiter::new(signals);
    let observer: Arc<dyn StateObserver> = waiter.clone();
    let Some(id) = object.add_observer(observer) else {
        let state = waiter.result().unwrap_or_else(|| object.signal_state());
        return outcome(signals, state);
    };
    match waiter.wait(deadline) {
        Some(state) => outcome(signals, state),
        None => {
            object.remove_observer(id);
            // The observer may have fired between the timeout and its removal.
            match waiter.result() {
                Some(state) => outcome(signals, state),
                None => {
                    trace!("wait: timed out watching {:#x}", signals.bits());
                    Err(Status::TimedOut)
                }
            }
        }
    }
}
