// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Event object (signal-only kernel object)
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: EventDispatcher
//! DEPENDS_ON: state::StateTracker, wait::Waitable
//! INVARIANTS: Only SIGNALED and user signals may be asserted; the tracker is guarded by the
//!             event's own lock

use core::any::Any;
use std::sync::Arc;
use std::time::Instant;

use log::trace;
use nexus_abi::{ObjectType, Signals, Status};
use parking_lot::Mutex;

use crate::object::{alloc_koid, KernelObject, Koid};
use crate::state::{ObserverId, SignalState, StateObserver, StateTracker};
use crate::wait::{self, Waitable};

/// Signals a user may toggle on an event.
const EVENT_SIGNALS: Signals = Signals::SIGNALED.union(Signals::USER_ALL);

/// Kernel event: a StateTracker with nothing but user-controlled bits.
pub struct EventDispatcher {
    koid: Koid,
    state: Mutex<StateTracker>,
}

impl EventDispatcher {
    /// Creates an unsignalled event.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            koid: alloc_koid(),
            state: Mutex::new(StateTracker::new(Signals::empty(), EVENT_SIGNALS)),
        })
    }

    /// Clears then sets signal bits.
    pub fn signal(&self, clear: Signals, set: Signals) -> Result<(), Status> {
        if !EVENT_SIGNALS.contains(clear | set) {
            return Err(Status::InvalidArgs);
        }
        let (changed, retired) = {
            let mut state = self.state.lock();
            let changed = state.update_state(clear, set, Signals::empty(), Signals::empty());
            (changed, state.take_retired())
        };
        drop(retired);
        if changed {
            trace!("event {}: clear={:#x} set={:#x}", self.koid, clear.bits(), set.bits());
        }
        Ok(())
    }

    /// Currently asserted signals.
    pub fn signals(&self) -> Signals {
        self.state.lock().satisfied()
    }

    /// Blocks until any of `signals` is asserted.
    pub fn wait_one(&self, signals: Signals, deadline: Option<Instant>) -> Result<Signals, Status> {
        wait::wait_one(self, signals, deadline)
    }

    /// Number of pending waiters.
    pub fn observer_count(&self) -> usize {
        self.state.lock().observer_count()
    }
}

impl Waitable for EventDispatcher {
    fn add_observer(&self, observer: Arc<dyn StateObserver>) -> Option<ObserverId> {
        let (id, retired) = {
            let mut state = self.state.lock();
            let id = state.add_observer(observer);
            (id, state.take_retired())
        };
        drop(retired);
        id
    }

    fn remove_observer(&self, id: ObserverId) {
        let retired = {
            let mut state = self.state.lock();
            state.remove_observer(id);
            state.take_retired()
        };
        drop(retired);
    }

    fn signal_state(&self) -> SignalState {
        self.state.lock().state()
    }
}

impl KernelObject for EventDispatcher {
    fn koid(&self) -> Koid {
        self.koid
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::Event
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn as_waitable(&self) -> Option<&dyn Waitable> {
        Some(self)
    }
}
