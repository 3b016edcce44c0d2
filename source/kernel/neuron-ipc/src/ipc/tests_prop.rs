// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for channel queueing
//! OWNERS: @kernel-ipc-team
//! NOTE: Tests only; no kernel logic.
//!
//! TEST_SCOPE:
//!   - FIFO delivery per direction
//!   - Too-small reads without discard leave the queue untouched
//!   - Too-small reads with discard drop exactly the front message
//!   - READABLE tracks queue emptiness
//!
//! TEST_SCENARIOS:
//!   - fifo_per_direction(): interleaved writes from both sides arrive in order on each side
//!   - small_buffer_keeps_message(): retry with a large buffer returns the same payload
//!   - discard_skips_to_next(): the read after a discard returns the next payload
//!   - readable_matches_queue(): READABLE set iff the side has pending messages

use super::{Channel, Message, ReadError, Side};
use nexus_abi::Signals;
use proptest::prelude::*;

fn arb_payloads() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..48), 1..24)
}

fn arb_ops() -> impl Strategy<Value = Vec<(bool, Vec<u8>)>> {
    prop::collection::vec((any::<bool>(), prop::collection::vec(any::<u8>(), 0..16)), 1..64)
}

fn close(channel: &Channel) {
    channel.on_dispatcher_destruction(Side::Zero);
    channel.on_dispatcher_destruction(Side::One);
}

proptest! {
    #[test]
    fn fifo_per_direction(ops in arb_ops()) {
        let channel = Channel::new();
        let mut expected: [Vec<Vec<u8>>; 2] = [Vec::new(), Vec::new()];
        for (from_zero, data) in &ops {
            let writer = if *from_zero { Side::Zero } else { Side::One };
            channel.write(writer, Message::new(data.clone(), Vec::new())).unwrap();
            expected[writer.other().index()].push(data.clone());
        }
        for side in [Side::Zero, Side::One] {
            for data in &expected[side.index()] {
                let message = channel.read(side, usize::MAX, 0, false).unwrap();
                prop_assert_eq!(message.data(), data.as_slice());
            }
            let err = channel.read(side, usize::MAX, 0, false).unwrap_err();
            prop_assert_eq!(err, ReadError::ShouldWait);
        }
        close(&channel);
    }

    #[test]
    fn small_buffer_keeps_message(payloads in arb_payloads(), shortfall in 1usize..8) {
        let channel = Channel::new();
        for data in &payloads {
            channel.write(Side::Zero, Message::new(data.clone(), Vec::new())).unwrap();
        }
        for (consumed, data) in payloads.iter().enumerate() {
            if data.len() >= shortfall {
                let err = channel.read(Side::One, data.len() - shortfall, 0, false).unwrap_err();
                let expected =
                    ReadError::BufferTooSmall { bytes: data.len(), handles: 0, discarded: false };
                prop_assert_eq!(err, expected);
                prop_assert_eq!(channel.pending(Side::One), payloads.len() - consumed);
            }
            let message = channel.read(Side::One, data.len(), 0, false).unwrap();
            prop_assert_eq!(message.data(), data.as_slice());
        }
        close(&channel);
    }

    #[test]
    fn discard_skips_to_next(payloads in arb_payloads(), drop_at in any::<prop::sample::Index>()) {
        prop_assume!(payloads.len() >= 2);
        let channel = Channel::new();
        for data in &payloads {
            channel.write(Side::One, Message::new(data.clone(), Vec::new())).unwrap();
        }
        let victim = drop_at.index(payloads.len() - 1);
        for _ in 0..victim {
            channel.read(Side::Zero, usize::MAX, 0, false).unwrap();
        }
        let before = channel.pending(Side::Zero);
        let limit = payloads[victim].len();
        // A zero-handle limit with one too few bytes only fails for non-empty payloads.
        if limit > 0 {
            let err = channel.read(Side::Zero, limit - 1, 0, true).unwrap_err();
            let expected = ReadError::BufferTooSmall { bytes: limit, handles: 0, discarded: true };
            prop_assert_eq!(err, expected);
            prop_assert_eq!(channel.pending(Side::Zero), before - 1);
            let next = channel.read(Side::Zero, usize::MAX, 0, false).unwrap();
            prop_assert_eq!(next.data(), payloads[victim + 1].as_slice());
        }
        close(&channel);
    }

    #[test]
    fn readable_matches_queue(ops in prop::collection::vec(any::<bool>(), 1..64)) {
        let channel = Channel::new();
        for write in ops {
            if write {
                channel.write(Side::Zero, Message::new(vec![1], Vec::new())).unwrap();
            } else {
                let _ = channel.read(Side::One, 8, 0, false);
            }
            let readable = channel.signal_state(Side::One).satisfied.contains(Signals::READABLE);
            prop_assert_eq!(readable, channel.pending(Side::One) > 0);
        }
        close(&channel);
    }
}
