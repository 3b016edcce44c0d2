// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel object layer for message channels, events and completion ports
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//!
//! PUBLIC API:
//!   - ipc::Channel: two-sided message transport (one lock, two queues, two trackers)
//!   - ipc::ChannelDispatcher: per-side owner; destruction propagates PEER_CLOSED
//!   - state::StateTracker: satisfied/satisfiable signal pair with observers
//!   - port::{PortDispatcher, PortClient, PortNotifier}: asynchronous notification
//!   - event::EventDispatcher, object::Handle, cap::HandleTable, syscall::*
//!
//! DEPENDS_ON: nexus-abi (Status, Signals, Rights, PortPacket), parking_lot, log, thiserror
//! INVARIANTS: Object state changes only under the owning object's lock; handle teardown
//!             never runs while a channel lock is held
//! ADR: docs/adr/0001-runtime-roles-and-boundaries.md

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod cap;
pub mod event;
pub mod ipc;
pub mod object;
pub mod port;
pub mod state;
pub mod syscall;
pub mod wait;

pub use nexus_abi::{ObjectType, PortPacket, Rights, Signals, Status};
