// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-process handle table
//! OWNERS: @kernel-cap-team
//! PUBLIC API: HandleTable, HandleValue, CapError
//! DEPENDS_ON: object::Handle
//! INVARIANTS: Bounded slot count; slot values stable while occupied; rights only narrow on
//!             duplication
//! ADR: docs/adr/0001-runtime-roles-and-boundaries.md

extern crate alloc;

use alloc::vec::Vec;

use nexus_abi::{Rights, Status, DEFAULT_HANDLE_TABLE_SLOTS};

use crate::object::Handle;

/// Userspace name of a handle: its slot index.
pub type HandleValue = u32;

/// Errors produced when manipulating the handle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CapError {
    /// Slot is out of range or empty.
    #[error("invalid handle slot")]
    InvalidSlot,
    /// No free slots remain.
    #[error("handle table full")]
    NoSpace,
    /// Slot already holds a handle.
    #[error("handle slot occupied")]
    SlotOccupied,
}

impl From<CapError> for Status {
    fn from(err: CapError) -> Self {
        match err {
            CapError::InvalidSlot => Status::BadHandle,
            CapError::NoSpace => Status::NoMemory,
            CapError::SlotOccupied => Status::AlreadyBound,
        }
    }
}

/// Per-process handle table.
#[derive(Debug)]
pub struct HandleTable {
    slots: Vec<Option<Handle>>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    /// Creates an empty table with `slots` entries.
    pub fn with_capacity(slots: usize) -> Self {
        let mut table = Vec::with_capacity(slots);
        table.resize_with(slots, || None);
        Self { slots: table }
    }

    /// Creates a table with the default slot count.
    pub fn new() -> Self {
        // Bounded so untrusted callers cannot force unbounded growth.
        Self::with_capacity(DEFAULT_HANDLE_TABLE_SLOTS)
    }

    fn slot(value: HandleValue) -> usize {
        value as usize
    }

    /// Stores `handle` in the first free slot.
    pub fn allocate(&mut self, handle: Handle) -> Result<HandleValue, CapError> {
        let index = self.slots.iter().position(Option::is_none).ok_or(CapError::NoSpace)?;
        let value = HandleValue::try_from(index).map_err(|_| CapError::NoSpace)?;
        self.slots[index] = Some(handle);
        Ok(value)
    }

    /// Stores `handle` in a specific empty slot.
    pub fn install(&mut self, value: HandleValue, handle: Handle) -> Result<(), CapError> {
        let entry = self.slots.get_mut(Self::slot(value)).ok_or(CapError::InvalidSlot)?;
        if entry.is_some() {
            return Err(CapError::SlotOccupied);
        }
        *entry = Some(handle);
        Ok(())
    }

    /// Borrows the handle in `value`.
    pub fn get(&self, value: HandleValue) -> Result<&Handle, CapError> {
        self.slots.get(Self::slot(value)).and_then(Option::as_ref).ok_or(CapError::InvalidSlot)
    }

    /// Removes and returns the handle in `value`.
    pub fn take(&mut self, value: HandleValue) -> Result<Handle, CapError> {
        let entry = self.slots.get_mut(Self::slot(value)).ok_or(CapError::InvalidSlot)?;
        entry.take().ok_or(CapError::InvalidSlot)
    }

    /// Drops the handle in `value`.
    pub fn close(&mut self, value: HandleValue) -> Result<(), CapError> {
        self.take(value).map(drop)
    }

    /// Duplicates `value` with narrowed `rights` into a fresh slot.
    pub fn duplicate(&mut self, value: HandleValue, rights: Rights) -> Result<HandleValue, Status> {
        let copy = self.get(value)?.duplicate(rights)?;
        Ok(self.allocate(copy)?)
    }

    /// Number of empty slots.
    pub fn free_slots(&self) -> usize {
        self.slots.iter().filter(|entry| entry.is_none()).count()
    }
}

#[cfg(test)]
mod tests_prop;
