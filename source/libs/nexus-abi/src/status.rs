// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Status codes returned by kernel object operations.

/// Raw value reported for a successful call.
pub const OK: i32 = 0;

/// Errors surfaced by kernel object syscalls.
///
/// Raw values are negative and stable across releases; see [`Status::into_raw`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[repr(i32)]
pub enum Status {
    /// Unexpected kernel condition.
    #[error("internal error")]
    Internal = -1,
    /// Operation is not supported on this object.
    #[error("operation not supported")]
    NotSupported = -2,
    /// Kernel could not allocate the resources needed for the call.
    #[error("out of memory")]
    NoMemory = -4,
    /// An argument was malformed.
    #[error("invalid arguments")]
    InvalidArgs = -10,
    /// Handle value does not refer to a live handle.
    #[error("bad handle")]
    BadHandle = -11,
    /// Handle refers to an object of the wrong type.
    #[error("wrong object type")]
    WrongType = -12,
    /// A size or count exceeded its limit.
    #[error("argument out of range")]
    OutOfRange = -14,
    /// The caller's buffer cannot hold the pending message.
    #[error("buffer too small")]
    BufferTooSmall = -15,
    /// The object is not in a state that permits the operation.
    #[error("bad state")]
    BadState = -20,
    /// Deadline expired before the operation could complete.
    #[error("timed out")]
    TimedOut = -21,
    /// Operation cannot make progress now; wait and retry.
    #[error("should wait")]
    ShouldWait = -22,
    /// Operation was cancelled.
    #[error("canceled")]
    Canceled = -23,
    /// The other endpoint of a peered object is gone.
    #[error("peer closed")]
    PeerClosed = -24,
    /// A notification target is already registered.
    #[error("already bound")]
    AlreadyBound = -27,
    /// Handle lacks the rights required for the operation.
    #[error("access denied")]
    AccessDenied = -30,
}

impl Status {
    /// Returns the stable raw code for this status.
    pub const fn into_raw(self) -> i32 {
        self as i32
    }

    /// Decodes a raw code; `OK` and unknown codes yield `None`.
    pub const fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            -1 => Self::Internal,
            -2 => Self::NotSupported,
            -4 => Self::NoMemory,
            -10 => Self::InvalidArgs,
            -11 => Self::BadHandle,
            -12 => Self::WrongType,
            -14 => Self::OutOfRange,
            -15 => Self::BufferTooSmall,
            -20 => Self::BadState,
            -21 => Self::TimedOut,
            -22 => Self::ShouldWait,
            -23 => Self::Canceled,
            -24 => Self::PeerClosed,
            -27 => Self::AlreadyBound,
            -30 => Self::AccessDenied,
            _ => return None,
        })
    }

    /// Returns `true` for statuses a caller may retry after waiting.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::ShouldWait | Self::TimedOut)
    }
}

/// Converts a raw syscall return value into a `Result`.
///
/// Unknown negative codes collapse to [`Status::Internal`].
pub fn ok(raw: i32) -> Result<(), Status> {
    if raw == OK {
        Ok(())
    } else {
        Err(Status::from_raw(raw).unwrap_or(Status::Internal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_are_stable() {
        assert_eq!(Status::ShouldWait.into_raw(), -22);
        assert_eq!(Status::PeerClosed.into_raw(), -24);
        assert_eq!(Status::BufferTooSmall.into_raw(), -15);
        assert_eq!(Status::from_raw(-27), Some(Status::AlreadyBound));
        assert_eq!(Status::from_raw(OK), None);
    }

    #[test]
    fn ok_maps_unknown_codes_to_internal() {
        assert_eq!(ok(OK), Ok(()));
        assert_eq!(ok(-24), Err(Status::PeerClosed));
        assert_eq!(ok(-999), Err(Status::Internal));
    }

    #[test]
    fn only_wait_like_statuses_are_transient() {
        assert!(Status::ShouldWait.is_transient());
        assert!(Status::TimedOut.is_transient());
        assert!(!Status::PeerClosed.is_transient());
        assert!(!Status::BufferTooSmall.is_transient());
    }
}
