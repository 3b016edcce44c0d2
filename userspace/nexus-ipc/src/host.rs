// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-process IPC backend driving kernel channel objects directly
//!
//! OWNERS: @runtime
//!
//! PUBLIC API:
//!   - loopback_channel(): Create client/server pair over one channel
//!   - struct Endpoint: blocking send/recv over one channel side
//!   - struct LoopbackClient / LoopbackServer: Client and Server implementations
//!
//! ERROR CONDITIONS:
//!   - IpcError::Disconnected: Peer endpoint destroyed and nothing left to read
//!   - IpcError::WouldBlock: Nothing pending in non-blocking mode (or zero timeout)
//!   - IpcError::Timeout: Deadline passed while waiting for READABLE
//!
//! The kernel read never blocks. `recv` retries it: on ShouldWait it waits for READABLE or
//! PEER_CLOSED, on BufferTooSmall it grows its buffer hint and reads again.
//!
//! ADR: docs/adr/0003-ipc-runtime-architecture.md

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{trace, warn};
use nexus_abi::{Signals, Status, MAX_MSG_HANDLES};
use neuron_ipc::ipc::{ChannelDispatcher, Message, ReadError, WriteError};

use crate::{Client, IpcError, Result, Server, Wait};

const INITIAL_BUFFER: usize = 256;

/// Creates a client/server pair connected by a fresh channel.
pub fn loopback_channel() -> (LoopbackClient, LoopbackServer) {
    let (client, server) = ChannelDispatcher::create();
    (LoopbackClient(Endpoint::new(client)), LoopbackServer(Endpoint::new(server)))
}

/// Blocking runtime over one channel endpoint.
pub struct Endpoint {
    channel: Arc<ChannelDispatcher>,
    buffer: AtomicUsize,
}

impl Endpoint {
    /// Wraps an endpoint.
    pub fn new(channel: Arc<ChannelDispatcher>) -> Self {
        Self { channel, buffer: AtomicUsize::new(INITIAL_BUFFER) }
    }

    /// Underlying kernel endpoint.
    pub fn channel(&self) -> &Arc<ChannelDispatcher> {
        &self.channel
    }

    /// Sends a byte frame. Writes never block, so `wait` is not consulted.
    pub fn send(&self, frame: &[u8], _wait: Wait) -> Result<()> {
        self.send_message(Message::new(frame.to_vec(), Vec::new()))
            .map_err(|err| err.status.into())
    }

    /// Sends a full message; on failure the message comes back inside the error.
    pub fn send_message(&self, message: Message) -> core::result::Result<(), WriteError> {
        self.channel.write(message)
    }

    /// Receives the next message, retrying according to `wait`.
    pub fn recv_message(&self, wait: Wait) -> Result<Message> {
        let deadline = wait.timeout().map(|timeout| Instant::now() + timeout);
        loop {
            let capacity = self.buffer.load(Ordering::Relaxed);
            match self.channel.read(capacity, MAX_MSG_HANDLES, false) {
                Ok(message) => return Ok(message),
                Err(ReadError::BufferTooSmall { bytes, .. }) => {
                    trace!("ipc: growing receive buffer {} -> {}", capacity, bytes);
                    self.buffer.fetch_max(bytes, Ordering::Relaxed);
                }
                Err(ReadError::PeerClosed) => return Err(IpcError::Disconnected),
                Err(err @ ReadError::NoMemory { .. }) => return Err(IpcError::Kernel(err.status())),
                Err(ReadError::ShouldWait) => {
                    if wait.is_non_blocking() {
                        return Err(IpcError::WouldBlock);
                    }
                    let watched = Signals::READABLE | Signals::PEER_CLOSED;
                    match self.channel.wait_one(watched, deadline) {
                        Ok(_) => {}
                        Err(Status::TimedOut) => return Err(IpcError::Timeout),
                        Err(status) => return Err(IpcError::Kernel(status)),
                    }
                }
            }
        }
    }

    /// Receives the next frame; handles attached by a raw sender are closed.
    pub fn recv(&self, wait: Wait) -> Result<Vec<u8>> {
        let (data, handles) = self.recv_message(wait)?.into_parts();
        if !handles.is_empty() {
            warn!("ipc: closing {} unexpected handles on frame receive", handles.len());
        }
        Ok(data)
    }
}

/// Client implementation over a kernel channel.
pub struct LoopbackClient(Endpoint);

impl LoopbackClient {
    /// Endpoint backing this client.
    pub fn endpoint(&self) -> &Endpoint {
        &self.0
    }
}

impl Client for LoopbackClient {
    fn send(&self, frame: &[u8], wait: Wait) -> Result<()> {
        self.0.send(frame, wait)
    }

    fn recv(&self, wait: Wait) -> Result<Vec<u8>> {
        self.0.recv(wait)
    }
}

/// Server implementation over a kernel channel.
pub struct LoopbackServer(Endpoint);

impl LoopbackServer {
    /// Endpoint backing this server.
    pub fn endpoint(&self) -> &Endpoint {
        &self.0
    }
}

impl Server for LoopbackServer {
    fn recv(&self, wait: Wait) -> Result<Vec<u8>> {
        self.0.recv(wait)
    }

    fn send(&self, frame: &[u8], wait: Wait) -> Result<()> {
        self.0.send(frame, wait)
    }
}
