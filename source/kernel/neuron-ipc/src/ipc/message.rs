// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Channel message: an immutable byte payload plus owned handles.

extern crate alloc;

use alloc::vec::Vec;
use core::fmt;

use crate::object::Handle;

/// Unit of transfer through a channel.
///
/// Fields are private so a message cannot be edited once it has been queued; it can only be
/// inspected or taken apart with [`Message::into_parts`].
pub struct Message {
    data: Vec<u8>,
    handles: Vec<Handle>,
}

impl Message {
    /// Builds a message that takes ownership of `handles`.
    pub fn new(data: Vec<u8>, handles: Vec<Handle>) -> Self {
        Self { data, handles }
    }

    /// Payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes.
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Attached handles, in the order they were written.
    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    /// Number of attached handles.
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Splits the message, transferring handle ownership to the caller.
    pub fn into_parts(self) -> (Vec<u8>, Vec<Handle>) {
        (self.data, self.handles)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("bytes", &self.data.len())
            .field("handles", &self.handles)
            .finish()
    }
}
