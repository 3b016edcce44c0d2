// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Completion ports and the notifier contract used by channels
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: PortNotifier, PortDispatcher, PortClient
//! DEPENDS_ON: nexus-abi::{PortPacket, Signals}, parking_lot
//! INVARIANTS: Port queues are bounded; a notifier never blocks and never re-enters the object
//!             that invoked it; packets from one binding are queued in notification order
//!
//! A channel calls [`PortNotifier::signal`] while holding its own lock so that packets stay
//! ordered with the enqueues that caused them. The port lock is therefore always acquired
//! after a channel lock and never the other way round.

use core::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use log::{trace, warn};
use nexus_abi::{ObjectType, PortPacket, Signals, Status, DEFAULT_PORT_CAPACITY};
use parking_lot::{Condvar, Mutex};

use crate::object::{alloc_koid, KernelObject, Koid};

/// Asynchronous notification target registered on one channel side.
///
/// `signal` is invoked with the channel lock held: it must not block and must not call back
/// into the channel.
pub trait PortNotifier: Send {
    /// Delivers a transition of `signals`; `count` is the message size for readable
    /// notifications and 0 otherwise. Returns `false` if the notification was dropped.
    fn signal(&mut self, signals: Signals, count: usize) -> bool;

    /// Signals this notifier wants to hear about.
    fn trigger_signals(&self) -> Signals;
}

struct PortQueue {
    packets: VecDeque<PortPacket>,
    capacity: usize,
}

/// Bounded queue of [`PortPacket`]s with a blocking dequeue.
pub struct PortDispatcher {
    koid: Koid,
    inner: Mutex<PortQueue>,
    cond: Condvar,
}

impl PortDispatcher {
    /// Creates a port holding at most [`DEFAULT_PORT_CAPACITY`] packets.
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_PORT_CAPACITY)
    }

    /// Creates a port holding at most `capacity` packets.
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            koid: alloc_koid(),
            inner: Mutex::new(PortQueue { packets: VecDeque::new(), capacity }),
            cond: Condvar::new(),
        })
    }

    /// Appends `packet`; fails with [`Status::ShouldWait`] when the port is full.
    pub fn queue(&self, packet: PortPacket) -> Result<(), Status> {
        let mut inner = self.inner.lock();
        if inner.packets.len() >= inner.capacity {
            return Err(Status::ShouldWait);
        }
        inner.packets.push_back(packet);
        drop(inner);
        self.cond.notify_one();
        Ok(())
    }

    /// Queues a user packet carrying `user`.
    pub fn queue_user(&self, key: u64, user: u64) -> Result<(), Status> {
        self.queue(PortPacket::user(key, user))
    }

    /// Dequeues the oldest packet, blocking until one arrives or `deadline` passes.
    pub fn wait(&self, deadline: Option<Instant>) -> Result<PortPacket, Status> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(packet) = inner.packets.pop_front() {
                return Ok(packet);
            }
            match deadline {
                None => self.cond.wait(&mut inner),
                Some(deadline) => {
                    if self.cond.wait_until(&mut inner, deadline).timed_out()
                        && inner.packets.is_empty()
                    {
                        return Err(Status::TimedOut);
                    }
                }
            }
        }
    }

    /// Number of queued packets.
    pub fn pending(&self) -> usize {
        self.inner.lock().packets.len()
    }
}

impl KernelObject for PortDispatcher {
    fn koid(&self) -> Koid {
        self.koid
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::Port
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Binding of one object to a port under a caller-chosen key.
pub struct PortClient {
    port: Arc<PortDispatcher>,
    key: u64,
    trigger: Signals,
}

impl PortClient {
    /// Binds `port` with `key`, forwarding only `trigger` signals.
    pub fn new(port: Arc<PortDispatcher>, key: u64, trigger: Signals) -> Self {
        Self { port, key, trigger }
    }

    /// Key stamped on every packet.
    pub fn key(&self) -> u64 {
        self.key
    }
}

impl PortNotifier for PortClient {
    fn signal(&mut self, signals: Signals, count: usize) -> bool {
        let hit = signals & self.trigger;
        if hit.is_empty() {
            return true;
        }
        let packet = PortPacket::signal(self.key, hit, count as u64);
        match self.port.queue(packet) {
            Ok(()) => {
                trace!(
                    "port {}: key={} signals={:#x} count={}",
                    self.port.koid,
                    self.key,
                    hit.bits(),
                    count
                );
                true
            }
            Err(status) => {
                warn!("port {}: dropped packet for key {} ({})", self.port.koid, self.key, status);
                false
            }
        }
    }

    fn trigger_signals(&self) -> Signals {
        self.trigger
    }
}
