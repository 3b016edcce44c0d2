// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Low-noise, bounded IPC trace ring for triage
//! OWNERS: @kernel-ipc-team
//! STATUS: Experimental (debug feature only)
//! API_STABILITY: Unstable
//!
//! Records the most recent channel events in memory. Nothing is logged unless a caller takes
//! a snapshot and prints it.

use std::collections::VecDeque;

use nexus_abi::Status;
use parking_lot::Mutex;

use crate::object::Koid;

/// Kind of recorded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceKind {
    /// Channel pair created (koid of side zero).
    Create,
    /// Write attempt.
    Write,
    /// Read attempt.
    Read,
    /// Endpoint destroyed.
    Close,
    /// Port notifier registration.
    PortBind,
}

/// One recorded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceEvent {
    /// Monotonic sequence number.
    pub seq: u64,
    /// Event kind.
    pub kind: TraceKind,
    /// Raw status (0 on success).
    pub status: i32,
    /// Endpoint involved.
    pub koid: Koid,
    /// Payload bytes, saturated.
    pub bytes: u32,
    /// Handle count, saturated.
    pub handles: u16,
}

// Large enough to span a failing exchange, small enough to dump in one go.
const RING_SIZE: usize = 8192;

struct Ring {
    next_seq: u64,
    events: VecDeque<TraceEvent>,
}

static RING: Mutex<Ring> =
    parking_lot::const_mutex(Ring { next_seq: 0, events: VecDeque::new() });

/// Appends an event, evicting the oldest once the ring is full.
pub fn record(
    kind: TraceKind,
    status: Result<(), Status>,
    koid: Koid,
    bytes: usize,
    handles: usize,
) {
    let status = match status {
        Ok(()) => nexus_abi::OK,
        Err(status) => status.into_raw(),
    };
    let mut ring = RING.lock();
    let seq = ring.next_seq;
    ring.next_seq = seq.wrapping_add(1);
    if ring.events.len() == RING_SIZE {
        ring.events.pop_front();
    }
    ring.events.push_back(TraceEvent {
        seq,
        kind,
        status,
        koid,
        bytes: u32::try_from(bytes).unwrap_or(u32::MAX),
        handles: u16::try_from(handles).unwrap_or(u16::MAX),
    });
}

/// Copies the ring, oldest first.
pub fn snapshot() -> Vec<TraceEvent> {
    RING.lock().events.iter().copied().collect()
}

/// Empties the ring.
pub fn clear() {
    RING.lock().events.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{ChannelDispatcher, Message};

    // The ring is global and tests run in parallel, so filter by koid.
    fn events_for(koid: Koid) -> Vec<TraceEvent> {
        snapshot().into_iter().filter(|ev| ev.koid == koid).collect()
    }

    #[test]
    fn records_write_read_and_close() {
        use crate::object::KernelObject;

        let (a, b) = ChannelDispatcher::create();
        let (a_koid, b_koid) = (a.koid(), b.koid());
        a.write(Message::new(b"ping".to_vec(), Vec::new())).unwrap();
        b.read(2, 0, false).unwrap_err();
        drop(a);

        let a_events = events_for(a_koid);
        let kinds: Vec<_> = a_events.iter().map(|ev| ev.kind).collect();
        assert!(kinds.ends_with(&[TraceKind::Write, TraceKind::Close]));
        let write = a_events.iter().find(|ev| ev.kind == TraceKind::Write);
        assert_eq!(write.map(|ev| ev.bytes), Some(4));

        let b_read = events_for(b_koid).into_iter().find(|ev| ev.kind == TraceKind::Read).unwrap();
        assert_eq!(b_read.status, Status::BufferTooSmall.into_raw());
        assert_eq!(b_read.bytes, 4);
    }

    #[test]
    fn sequence_numbers_increase() {
        let (a, _b) = ChannelDispatcher::create();
        a.write(Message::new(Vec::new(), Vec::new())).unwrap();
        a.write(Message::new(Vec::new(), Vec::new())).unwrap();
        let seqs: Vec<_> = snapshot().iter().map(|ev| ev.seq).collect();
        assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
