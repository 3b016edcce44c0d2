// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Kernel side channel primitives.
//!
//! A [`Channel`] is shared by exactly two [`ChannelDispatcher`]s, one per [`Side`]. All state
//! lives behind the channel's single lock; dispatchers only validate and forward.

mod channel;
mod dispatcher;
mod message;

#[cfg(feature = "ipc_trace_ring")]
pub mod trace;

pub use channel::{Channel, ReadError, Side, WriteError};
pub use dispatcher::ChannelDispatcher;
pub use message::Message;

#[cfg(test)]
mod tests_prop;
