// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Two-sided message channel shared by a pair of dispatchers
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: Channel, Side, WriteError, ReadError
//! DEPENDS_ON: ipc::Message, state::StateTracker, port::PortNotifier, parking_lot
//! INVARIANTS:
//!   - One lock guards both queues, both trackers, both notifiers and both liveness flags
//!   - A side's liveness goes true -> false exactly once
//!   - Empty queue with a dead peer implies READABLE cleared and unsatisfiable on that side
//!   - Messages and notifiers are dropped only after the lock is released
//!   - Both sides are dead and both queues empty when the channel itself drops

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

use log::{debug, trace};
use nexus_abi::{Signals, Status};
use parking_lot::Mutex;

use super::Message;
use crate::port::PortNotifier;
use crate::state::{ObserverId, SignalState, StateObserver, StateTracker};

/// One of the two endpoints of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// First endpoint.
    Zero,
    /// Second endpoint.
    One,
}

impl Side {
    /// Array index of this side.
    pub const fn index(self) -> usize {
        match self {
            Side::Zero => 0,
            Side::One => 1,
        }
    }

    /// The peer side.
    pub const fn other(self) -> Side {
        match self {
            Side::Zero => Side::One,
            Side::One => Side::Zero,
        }
    }
}

/// Failed write; the message (and every handle attached to it) goes back to the caller.
#[derive(Debug, thiserror::Error)]
#[error("channel write failed: {status}")]
pub struct WriteError {
    /// Reason for the failure.
    pub status: Status,
    /// The rejected message, untouched.
    pub message: Message,
}

impl WriteError {
    /// Pairs `status` with the message being handed back.
    pub fn new(status: Status, message: Message) -> Self {
        Self { status, message }
    }

    /// Recovers the rejected message.
    pub fn into_message(self) -> Message {
        self.message
    }
}

/// Failed read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// Queue empty while the peer is alive.
    #[error("no message pending")]
    ShouldWait,
    /// Queue empty and the peer is gone for good.
    #[error("peer closed")]
    PeerClosed,
    /// Front message exceeds the caller's limits.
    #[error("message needs {bytes} bytes and {handles} handles")]
    BufferTooSmall {
        /// Size of the front message.
        bytes: usize,
        /// Handle count of the front message.
        handles: usize,
        /// Whether the message was popped and dropped.
        discarded: bool,
    },
    /// Front message fits the caller's buffers but not the caller's free handle slots.
    #[error("message carries {handles} handles, not enough free slots")]
    NoMemory {
        /// Handle count of the front message.
        handles: usize,
    },
}

impl ReadError {
    /// Status code reported to userspace.
    pub fn status(&self) -> Status {
        match self {
            ReadError::ShouldWait => Status::ShouldWait,
            ReadError::PeerClosed => Status::PeerClosed,
            ReadError::BufferTooSmall { .. } => Status::BufferTooSmall,
            ReadError::NoMemory { .. } => Status::NoMemory,
        }
    }
}

impl From<ReadError> for Status {
    fn from(err: ReadError) -> Self {
        err.status()
    }
}

/// Per-side state: messages addressed to this side plus its signals.
struct Endpoint {
    messages: VecDeque<Message>,
    alive: bool,
    state: StateTracker,
    port: Option<Box<dyn PortNotifier>>,
}

impl Endpoint {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            alive: true,
            state: StateTracker::new(Signals::WRITABLE, Signals::CHANNEL_ALL),
            port: None,
        }
    }

    fn notify(&mut self, signals: Signals, count: usize) {
        if let Some(port) = self.port.as_mut() {
            if !port.signal(signals, count) {
                trace!("channel: notifier dropped {:#x}", signals.bits());
            }
        }
    }
}

/// Observers unregistered on either side; dropped by the caller once unlocked.
fn take_retired(ends: &mut [Endpoint; 2]) -> Vec<Arc<dyn StateObserver>> {
    let [zero, one] = ends;
    let mut retired = zero.state.take_retired();
    retired.append(&mut one.state.take_retired());
    retired
}

/// Splits the endpoint pair into (`side`, peer).
fn pair(ends: &mut [Endpoint; 2], side: Side) -> (&mut Endpoint, &mut Endpoint) {
    let [zero, one] = ends;
    match side {
        Side::Zero => (zero, one),
        Side::One => (one, zero),
    }
}

/// Caller-side limits of one read.
#[derive(Clone, Copy)]
struct ReadLimits {
    bytes: usize,
    handles: usize,
    slots: usize,
}

/// Bidirectional message transport. Messages are queued on the side that will read them.
pub struct Channel {
    inner: Mutex<[Endpoint; 2]>,
}

impl Channel {
    /// Creates a channel with both sides alive and writable.
    pub fn new() -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new([Endpoint::new(), Endpoint::new()]) })
    }

    /// Queues `message` for the peer of `side`.
    ///
    /// Fails with [`Status::PeerClosed`] if the peer is gone, returning the message intact.
    /// A registered peer notifier is signalled before the lock is released, so packets are
    /// ordered with the enqueues that produced them.
    ///
    /// # Panics
    /// If `side` itself has already been destroyed.
    pub fn write(&self, side: Side, message: Message) -> Result<(), WriteError> {
        let mut ends = self.inner.lock();
        let (me, peer) = pair(&mut ends, side);
        assert!(me.alive, "channel write on destroyed side {:?}", side);
        if !peer.alive {
            drop(ends);
            return Err(WriteError::new(Status::PeerClosed, message));
        }
        let size = message.data_size();
        trace!(
            "channel: {:?} -> {:?} bytes={} handles={}",
            side,
            side.other(),
            size,
            message.handle_count()
        );
        peer.messages.push_back(message);
        peer.state.update_state(
            Signals::empty(),
            Signals::READABLE,
            Signals::empty(),
            Signals::empty(),
        );
        peer.notify(Signals::READABLE, size);
        let retired = peer.state.take_retired();
        drop(ends);
        drop(retired);
        Ok(())
    }

    /// Dequeues the oldest message addressed to `side`.
    ///
    /// A message larger than `max_bytes` or carrying more than `max_handles` handles is left
    /// in place unless `may_discard` is set, in which case it is dropped and the error reports
    /// `discarded: true`.
    ///
    /// # Panics
    /// If `side` itself has already been destroyed.
    pub fn read(
        &self,
        side: Side,
        max_bytes: usize,
        max_handles: usize,
        may_discard: bool,
    ) -> Result<Message, ReadError> {
        self.read_bounded(side, max_bytes, max_handles, usize::MAX, may_discard)
    }

    /// [`Channel::read`] for a reader that can accept at most `free_slots` handles.
    ///
    /// A front message that fits the buffers but carries more than `free_slots` handles stays
    /// queued and the read fails with [`ReadError::NoMemory`], whatever `may_discard` says.
    pub fn read_bounded(
        &self,
        side: Side,
        max_bytes: usize,
        max_handles: usize,
        free_slots: usize,
        may_discard: bool,
    ) -> Result<Message, ReadError> {
        let limits = ReadLimits { bytes: max_bytes, handles: max_handles, slots: free_slots };
        let (result, discarded, retired) = {
            let mut ends = self.inner.lock();
            let (result, discarded) = Self::read_locked(&mut ends, side, limits, may_discard);
            (result, discarded, take_retired(&mut ends))
        };
        // Dropping handles can reach other objects, including this channel.
        drop(discarded);
        drop(retired);
        result
    }

    fn read_locked(
        ends: &mut [Endpoint; 2],
        side: Side,
        limits: ReadLimits,
        may_discard: bool,
    ) -> (Result<Message, ReadError>, Option<Message>) {
        let (me, peer) = pair(ends, side);
        assert!(me.alive, "channel read on destroyed side {:?}", side);
        let Some(message) = me.messages.pop_front() else {
            let err = if peer.alive { ReadError::ShouldWait } else { ReadError::PeerClosed };
            return (Err(err), None);
        };
        let bytes = message.data_size();
        let handles = message.handle_count();
        let fits = bytes <= limits.bytes && handles <= limits.handles;
        if fits && handles > limits.slots {
            me.messages.push_front(message);
            return (Err(ReadError::NoMemory { handles }), None);
        }
        if !fits && !may_discard {
            me.messages.push_front(message);
            return (Err(ReadError::BufferTooSmall { bytes, handles, discarded: false }), None);
        }
        if me.messages.is_empty() {
            let unsatisfiable = if peer.alive { Signals::empty() } else { Signals::READABLE };
            me.state.update_state(
                Signals::READABLE,
                Signals::empty(),
                unsatisfiable,
                Signals::empty(),
            );
        }
        if fits {
            (Ok(message), None)
        } else {
            trace!("channel: {:?} discarded bytes={} handles={}", side, bytes, handles);
            (Err(ReadError::BufferTooSmall { bytes, handles, discarded: true }), Some(message))
        }
    }

    /// Tears down `side` after its owning dispatcher went away.
    ///
    /// Pending messages for `side` are drained and dropped after the lock is released. A live
    /// peer loses WRITABLE, gains PEER_CLOSED and, if nothing is left for it to read, loses
    /// READABLE for good.
    ///
    /// # Panics
    /// If called twice for the same side.
    pub fn on_dispatcher_destruction(&self, side: Side) {
        let (drained, port, retired) = {
            let mut ends = self.inner.lock();
            let (me, peer) = pair(&mut ends, side);
            assert!(me.alive, "channel side {:?} destroyed twice", side);
            me.alive = false;
            let drained = mem::take(&mut me.messages);
            let port = me.port.take();
            if peer.alive {
                let mut clear = Signals::WRITABLE;
                if peer.messages.is_empty() {
                    clear |= Signals::READABLE;
                }
                peer.state.update_state(clear, Signals::PEER_CLOSED, clear, Signals::empty());
                peer.notify(Signals::PEER_CLOSED, 0);
            }
            (drained, port, take_retired(&mut ends))
        };
        debug!("channel: side {:?} closed, dropping {} pending", side, drained.len());
        drop(drained);
        drop(port);
        drop(retired);
    }

    /// Registers the asynchronous notifier for `side`.
    ///
    /// Trigger bits other than READABLE and PEER_CLOSED fail with [`Status::InvalidArgs`]; a
    /// second registration fails with [`Status::AlreadyBound`]. On success every queued
    /// message is replayed as a READABLE notification, followed by PEER_CLOSED when the peer
    /// is already gone.
    pub fn set_port_notifier(
        &self,
        side: Side,
        mut client: Box<dyn PortNotifier>,
    ) -> Result<(), Status> {
        if !Signals::CHANNEL_TRIGGERS.contains(client.trigger_signals()) {
            return Err(Status::InvalidArgs);
        }
        let mut ends = self.inner.lock();
        let (me, peer) = pair(&mut ends, side);
        assert!(me.alive, "port bind on destroyed side {:?}", side);
        if me.port.is_some() {
            drop(ends);
            drop(client);
            return Err(Status::AlreadyBound);
        }
        for message in &me.messages {
            client.signal(Signals::READABLE, message.data_size());
        }
        if !peer.alive {
            client.signal(Signals::PEER_CLOSED, 0);
        }
        me.port = Some(client);
        Ok(())
    }

    /// Signal masks of `side`.
    pub fn signal_state(&self, side: Side) -> SignalState {
        self.inner.lock()[side.index()].state.state()
    }

    /// Registers a state observer on `side`.
    pub fn add_observer(
        &self,
        side: Side,
        observer: Arc<dyn StateObserver>,
    ) -> Option<ObserverId> {
        let (id, retired) = {
            let mut ends = self.inner.lock();
            let state = &mut ends[side.index()].state;
            (state.add_observer(observer), state.take_retired())
        };
        drop(retired);
        id
    }

    /// Unregisters an observer from `side`.
    pub fn remove_observer(&self, side: Side, id: ObserverId) {
        let retired = {
            let mut ends = self.inner.lock();
            let state = &mut ends[side.index()].state;
            state.remove_observer(id);
            state.take_retired()
        };
        drop(retired);
    }

    /// Number of messages waiting to be read by `side`.
    pub fn pending(&self, side: Side) -> usize {
        self.inner.lock()[side.index()].messages.len()
    }

    /// Whether `side`'s dispatcher still exists.
    pub fn is_alive(&self, side: Side) -> bool {
        self.inner.lock()[side.index()].alive
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        for end in self.inner.get_mut().iter() {
            debug_assert!(!end.alive, "channel dropped with a live side");
            debug_assert!(end.messages.is_empty(), "channel dropped with queued messages");
        }
    }
}
