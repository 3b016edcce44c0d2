// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! CONTEXT: Shared ABI definitions for kernel objects exposed to userland crates
//! OWNERS: @runtime
//! PUBLIC API: Status, Signals, Rights, ObjectType, PortPacket, PacketKind, limits
//! DEPENDS_ON: no_std, bitflags, thiserror, static_assertions
//! INVARIANTS: Status raw values are stable and negative; PortPacket is 32 bytes LE
//! ADR: docs/adr/0016-kernel-libs-architecture.md

mod packet;
mod signals;
mod status;

pub use packet::{PacketKind, PortPacket};
pub use signals::{Rights, Signals};
pub use status::{ok, Status, OK};

/// Result type returned by kernel object operations.
pub type Result<T> = core::result::Result<T, Status>;

/// Upper bound on the payload carried by one channel message.
pub const MAX_MSG_BYTES: usize = 65_536;

/// Upper bound on the handles carried by one channel message.
pub const MAX_MSG_HANDLES: usize = 64;

/// Default number of packets a completion port can hold before dropping.
pub const DEFAULT_PORT_CAPACITY: usize = 256;

/// Default number of slots in a per-process handle table.
///
/// Kept bounded so untrusted callers cannot force unbounded growth.
pub const DEFAULT_HANDLE_TABLE_SLOTS: usize = 64;

/// Kind of kernel object referenced by a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ObjectType {
    /// One endpoint of a two-sided message channel.
    Channel = 4,
    /// Standalone signalable event.
    Event = 5,
    /// Completion port receiving asynchronous packets.
    Port = 6,
}

impl ObjectType {
    /// Returns the stable raw identifier for this object type.
    pub const fn into_raw(self) -> u32 {
        self as u32
    }
}
