// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: IPC runtime abstractions over kernel channels
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 6 unit tests, 3 integration tests
//!
//! PUBLIC API:
//!   - Client trait: Client-side IPC interface
//!   - Server trait: Server-side IPC interface
//!   - Wait enum: Wait behavior for operations
//!   - IpcError: IPC error types
//!   - Endpoint, loopback_channel(): blocking runtime over a neuron-ipc channel
//!
//! DEPENDENCIES:
//!   - neuron-ipc: channel objects (read returns ShouldWait; blocking lives here)
//!   - nexus-abi: Status and Signals
//!
//! ADR: docs/adr/0003-ipc-runtime-architecture.md

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

use core::time::Duration;

use nexus_abi::Status;

/// Result type returned by IPC operations.
pub type Result<T> = core::result::Result<T, IpcError>;

/// Behaviour of a blocking call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Block until the operation completes.
    Blocking,
    /// Return immediately if no progress can be made.
    NonBlocking,
    /// Block until either the operation completes or the timeout expires.
    Timeout(Duration),
}

impl Wait {
    /// Returns `true` when the caller asked not to block, including a zero timeout.
    pub const fn is_non_blocking(self) -> bool {
        match self {
            Self::NonBlocking => true,
            Self::Timeout(duration) => duration.is_zero(),
            Self::Blocking => false,
        }
    }

    /// Converts a [`Wait::Timeout`] variant into its [`Duration`].
    pub const fn timeout(self) -> Option<Duration> {
        match self {
            Self::Timeout(duration) => Some(duration),
            Self::Blocking | Self::NonBlocking => None,
        }
    }
}

/// Errors produced by the IPC runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IpcError {
    /// Operation could not progress without blocking.
    #[error("operation would block")]
    WouldBlock,
    /// The caller exceeded the requested timeout.
    #[error("operation timed out")]
    Timeout,
    /// The opposite endpoint disconnected.
    #[error("peer disconnected")]
    Disconnected,
    /// Kernel returned a failure the runtime does not translate.
    #[error("kernel rejected ipc request: {0}")]
    Kernel(Status),
}

impl From<Status> for IpcError {
    fn from(status: Status) -> Self {
        match status {
            Status::ShouldWait => Self::WouldBlock,
            Status::TimedOut => Self::Timeout,
            Status::PeerClosed => Self::Disconnected,
            other => Self::Kernel(other),
        }
    }
}

/// Client side of an IPC channel sending requests and receiving replies.
pub trait Client {
    /// Sends a request frame to the server.
    fn send(&self, frame: &[u8], wait: Wait) -> Result<()>;

    /// Receives a response frame from the server.
    fn recv(&self, wait: Wait) -> Result<Vec<u8>>;
}

/// Server side of an IPC channel receiving requests and delivering replies.
pub trait Server {
    /// Receives the next request frame.
    fn recv(&self, wait: Wait) -> Result<Vec<u8>>;

    /// Sends a response frame back to the caller.
    fn send(&self, frame: &[u8], wait: Wait) -> Result<()>;
}

#[cfg(feature = "std")]
mod host;
#[cfg(feature = "std")]
pub use host::{loopback_channel, Endpoint, LoopbackClient, LoopbackServer};
