// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Handle-facing owner of one channel side
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: ChannelDispatcher::{create, write, read, read_bounded, bind_port, wait_one}
//! DEPENDS_ON: ipc::Channel, port::PortClient, wait::wait_one
//! INVARIANTS: Exactly one dispatcher per side; its drop calls on_dispatcher_destruction once;
//!             messages are validated before they reach the channel

use core::any::Any;
use std::sync::Arc;
use std::time::Instant;

use log::debug;
use nexus_abi::{ObjectType, Rights, Signals, Status, MAX_MSG_BYTES, MAX_MSG_HANDLES};

use super::channel::{Channel, ReadError, Side, WriteError};
use super::Message;
use crate::object::{alloc_koid, KernelObject, Koid};
use crate::port::{PortClient, PortDispatcher};
use crate::state::{ObserverId, SignalState, StateObserver};
use crate::wait::{self, Waitable};

#[cfg(feature = "ipc_trace_ring")]
use super::trace::{self, TraceKind};

/// One endpoint of a channel as seen through a handle.
pub struct ChannelDispatcher {
    koid: Koid,
    peer_koid: Koid,
    side: Side,
    channel: Arc<Channel>,
}

impl ChannelDispatcher {
    /// Creates a new channel and returns its two endpoints.
    pub fn create() -> (Arc<Self>, Arc<Self>) {
        let channel = Channel::new();
        let koid0 = alloc_koid();
        let koid1 = alloc_koid();
        let zero =
            Self { koid: koid0, peer_koid: koid1, side: Side::Zero, channel: channel.clone() };
        let one = Self { koid: koid1, peer_koid: koid0, side: Side::One, channel };
        debug!("channel: created {} <-> {}", koid0, koid1);
        #[cfg(feature = "ipc_trace_ring")]
        trace::record(TraceKind::Create, Ok(()), koid0, 0, 0);
        (Arc::new(zero), Arc::new(one))
    }

    /// Koid of the peer endpoint.
    pub fn peer_koid(&self) -> Koid {
        self.peer_koid
    }

    /// Side of the channel this endpoint owns.
    pub fn side(&self) -> Side {
        self.side
    }

    fn check(&self, message: &Message) -> Result<(), Status> {
        if message.data_size() > MAX_MSG_BYTES || message.handle_count() > MAX_MSG_HANDLES {
            return Err(Status::OutOfRange);
        }
        for handle in message.handles() {
            // An endpoint queued inside its own channel can keep the channel alive forever.
            if handle.koid() == self.koid || handle.koid() == self.peer_koid {
                return Err(Status::NotSupported);
            }
            handle.require(Rights::TRANSFER)?;
        }
        Ok(())
    }

    /// Validates and queues `message` for the peer.
    ///
    /// Errors: `OutOfRange` past the size or handle limits, `NotSupported` when the message
    /// carries a handle to either endpoint of this channel, `AccessDenied` when a handle lacks
    /// TRANSFER and `PeerClosed` once the peer is gone. The message is handed back on every
    /// error.
    pub fn write(&self, message: Message) -> Result<(), WriteError> {
        #[cfg(feature = "ipc_trace_ring")]
        let (bytes, handles) = (message.data_size(), message.handle_count());
        let result = match self.check(&message) {
            Ok(()) => self.channel.write(self.side, message),
            Err(status) => Err(WriteError::new(status, message)),
        };
        #[cfg(feature = "ipc_trace_ring")]
        trace::record(
            TraceKind::Write,
            result.as_ref().map(|_| ()).map_err(|err| err.status),
            self.koid,
            bytes,
            handles,
        );
        result
    }

    /// Reads the oldest pending message; see [`Channel::read`].
    pub fn read(
        &self,
        max_bytes: usize,
        max_handles: usize,
        may_discard: bool,
    ) -> Result<Message, ReadError> {
        self.read_bounded(max_bytes, max_handles, usize::MAX, may_discard)
    }

    /// Reads for a caller with `free_slots` free handle slots; see [`Channel::read_bounded`].
    pub fn read_bounded(
        &self,
        max_bytes: usize,
        max_handles: usize,
        free_slots: usize,
        may_discard: bool,
    ) -> Result<Message, ReadError> {
        let result =
            self.channel.read_bounded(self.side, max_bytes, max_handles, free_slots, may_discard);
        #[cfg(feature = "ipc_trace_ring")]
        {
            let (bytes, handles) = match &result {
                Ok(message) => (message.data_size(), message.handle_count()),
                Err(ReadError::BufferTooSmall { bytes, handles, .. }) => (*bytes, *handles),
                Err(_) => (0, 0),
            };
            let status = result.as_ref().map(|_| ()).map_err(ReadError::status);
            trace::record(TraceKind::Read, status, self.koid, bytes, handles);
        }
        result
    }

    /// Currently asserted signals.
    pub fn signals(&self) -> Signals {
        self.channel.signal_state(self.side).satisfied
    }

    /// Number of messages waiting to be read from this endpoint.
    pub fn pending(&self) -> usize {
        self.channel.pending(self.side)
    }

    /// Routes READABLE / PEER_CLOSED transitions to `port` under `key`.
    pub fn bind_port(
        &self,
        port: &Arc<PortDispatcher>,
        key: u64,
        trigger: Signals,
    ) -> Result<(), Status> {
        let client = PortClient::new(Arc::clone(port), key, trigger);
        let result = self.channel.set_port_notifier(self.side, Box::new(client));
        #[cfg(feature = "ipc_trace_ring")]
        trace::record(TraceKind::PortBind, result, self.koid, 0, 0);
        result
    }

    /// Blocks until any of `signals` is asserted on this endpoint.
    pub fn wait_one(&self, signals: Signals, deadline: Option<Instant>) -> Result<Signals, Status> {
        wait::wait_one(self, signals, deadline)
    }
}

impl Waitable for ChannelDispatcher {
    fn add_observer(&self, observer: Arc<dyn StateObserver>) -> Option<ObserverId> {
        self.channel.add_observer(self.side, observer)
    }

    fn remove_observer(&self, id: ObserverId) {
        self.channel.remove_observer(self.side, id);
    }

    fn signal_state(&self) -> SignalState {
        self.channel.signal_state(self.side)
    }
}

impl KernelObject for ChannelDispatcher {
    fn koid(&self) -> Koid {
        self.koid
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::Channel
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

impl Drop for ChannelDispatcher {
    fn drop(&mut self) {
        debug!("channel: endpoint {} closed", self.koid);
        self.channel.on_dispatcher_destruction(self.side);
        #[cfg(feature = "ipc_trace_ring")]
        trace::record(TraceKind::Close, Ok(()), self.koid, 0, 0);
    }
}
