// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for the handle table
//! OWNERS: @kernel-cap-team
//! NOTE: Tests only; no kernel logic. Ensures rights narrowing and slot ops are sound.
//!
//! TEST_SCOPE:
//!   - Slot install/take roundtrip behavior
//!   - Duplication: subset-only (no escalation)
//!   - Allocation fills the lowest free slot and stops at capacity
//!
//! TEST_SCENARIOS:
//!   - install_and_take_roundtrip(): take returns the handle installed in the same slot
//!   - duplicate_narrows_rights(): duplicate keeps the object and applies the requested subset
//!   - duplicate_rejects_superset(): requesting rights outside the parent is AccessDenied
//!   - allocate_until_full(): capacity allocations succeed, the next one reports NoSpace

use super::{CapError, HandleTable};
use crate::event::EventDispatcher;
use crate::object::Handle;
use nexus_abi::{Rights, Status};
use proptest::prelude::*;

fn arb_rights() -> impl Strategy<Value = Rights> {
    (0u32..64).prop_map(Rights::from_bits_truncate)
}

fn event_handle(rights: Rights) -> Handle {
    Handle::new(EventDispatcher::new(), rights)
}

proptest! {
    #[test]
    fn install_and_take_roundtrip(slot in 0u32..64, rights in arb_rights()) {
        let mut table = HandleTable::new();
        let handle = event_handle(rights);
        let koid = handle.koid();
        table.install(slot, handle).unwrap();
        prop_assert_eq!(
            table.install(slot, event_handle(rights)).unwrap_err(),
            CapError::SlotOccupied
        );
        let taken = table.take(slot).unwrap();
        prop_assert_eq!(taken.koid(), koid);
        prop_assert_eq!(taken.rights(), rights);
        prop_assert_eq!(table.get(slot).unwrap_err(), CapError::InvalidSlot);
    }

    #[test]
    fn duplicate_narrows_rights(base in arb_rights(), mask in arb_rights()) {
        let mut table = HandleTable::new();
        let base = base | Rights::DUPLICATE;
        let original = table.allocate(event_handle(base)).unwrap();
        let requested = base & mask;
        let copy = table.duplicate(original, requested).unwrap();
        prop_assert_ne!(copy, original);
        prop_assert_eq!(table.get(copy).unwrap().koid(), table.get(original).unwrap().koid());
        prop_assert_eq!(table.get(copy).unwrap().rights(), requested);
    }

    #[test]
    fn duplicate_rejects_superset(base in arb_rights(), extra in 1u32..64) {
        let mut table = HandleTable::new();
        let base = base | Rights::DUPLICATE;
        let extra = Rights::from_bits_truncate(extra);
        prop_assume!(!base.contains(extra));
        let original = table.allocate(event_handle(base)).unwrap();
        prop_assert_eq!(table.duplicate(original, base | extra), Err(Status::AccessDenied));
        prop_assert_eq!(table.free_slots(), 63);
    }

    #[test]
    fn allocate_until_full(capacity in 1usize..32) {
        let mut table = HandleTable::with_capacity(capacity);
        for expected in 0..capacity {
            prop_assert_eq!(table.allocate(event_handle(Rights::WAIT)).unwrap() as usize, expected);
        }
        prop_assert_eq!(table.allocate(event_handle(Rights::WAIT)).unwrap_err(), CapError::NoSpace);
        table.close(0).unwrap();
        prop_assert_eq!(table.allocate(event_handle(Rights::WAIT)).unwrap(), 0);
    }
}
