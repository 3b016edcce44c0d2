// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Handle-table facing syscall layer and error handling
//! OWNERS: @kernel-team
//! PUBLIC API: api::*, Context, Error, SysResult
//! DEPENDS_ON: cap::HandleTable, ipc, port, event, wait
//! INVARIANTS: Decode/check before touching the handle table; a failed call leaves the table
//!             as it found it
//! ADR: docs/adr/0001-runtime-roles-and-boundaries.md

pub mod api;

use nexus_abi::Status;

use crate::cap::{CapError, HandleTable};
use crate::ipc::ReadError;

/// Result type used by syscall handlers.
pub type SysResult<T> = Result<T, Error>;

/// Per-call view of the calling process.
pub struct Context<'a> {
    /// Handle table of the caller.
    pub handles: &'a mut HandleTable,
}

impl<'a> Context<'a> {
    /// Wraps the caller's handle table.
    pub fn new(handles: &'a mut HandleTable) -> Self {
        Self { handles }
    }
}

/// Error returned by the handler stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Handle table lookup or insertion failed.
    #[error("capability error: {0}")]
    Capability(#[from] CapError),
    /// Object operation failed.
    #[error("{0}")]
    Object(#[from] Status),
    /// Caller buffers cannot hold the pending message; sizes are the message's.
    #[error("buffer too small: message has {bytes} bytes and {handles} handles")]
    BufferTooSmall {
        /// Bytes in the pending message.
        bytes: usize,
        /// Handles in the pending message.
        handles: usize,
    },
}

impl Error {
    /// Status code reported to userspace.
    pub fn status(&self) -> Status {
        match self {
            Error::Capability(err) => Status::from(*err),
            Error::Object(status) => *status,
            Error::BufferTooSmall { .. } => Status::BufferTooSmall,
        }
    }
}

impl From<ReadError> for Error {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::BufferTooSmall { bytes, handles, .. } => {
                Error::BufferTooSmall { bytes, handles }
            }
            other => Error::Object(other.status()),
        }
    }
}

/// Raw return value: the status code on failure, otherwise [`nexus_abi::OK`].
pub fn into_raw<T>(result: &SysResult<T>) -> i32 {
    match result {
        Ok(_) => nexus_abi::OK,
        Err(err) => err.status().into_raw(),
    }
}
