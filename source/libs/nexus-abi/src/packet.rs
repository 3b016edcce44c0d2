// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Completion-port packet layout.

use static_assertions::const_assert_eq;

use crate::Signals;

/// Origin of a port packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketKind {
    /// Queued explicitly by a user through the port.
    User = 0,
    /// Produced by a signal transition on a bound object.
    Signal = 1,
}

/// Packet delivered through a completion port.
///
/// The packet is exactly 32 bytes so a port queue entry stays cache-line friendly.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortPacket {
    /// Caller-chosen key identifying the binding.
    pub key: u64,
    /// Packet origin.
    pub kind: PacketKind,
    /// Raw signal bits that triggered the packet (0 for user packets).
    pub signals: u32,
    /// Byte size of the message that triggered a readable packet, otherwise 0.
    pub count: u64,
    /// Opaque user payload (0 for signal packets).
    pub user: u64,
}

const_assert_eq!(core::mem::size_of::<PortPacket>(), 32);

impl PortPacket {
    /// Builds a signal packet for `key`.
    pub const fn signal(key: u64, signals: Signals, count: u64) -> Self {
        Self { key, kind: PacketKind::Signal, signals: signals.bits(), count, user: 0 }
    }

    /// Builds a user packet for `key`.
    pub const fn user(key: u64, user: u64) -> Self {
        Self { key, kind: PacketKind::User, signals: 0, count: 0, user }
    }

    /// Returns the signal bits carried by the packet.
    pub const fn signals(&self) -> Signals {
        Signals::from_bits_retain(self.signals)
    }

    /// Serialises the packet to little-endian bytes.
    pub fn to_le_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes[0..8].copy_from_slice(&self.key.to_le_bytes());
        bytes[8..12].copy_from_slice(&(self.kind as u32).to_le_bytes());
        bytes[12..16].copy_from_slice(&self.signals.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.count.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.user.to_le_bytes());
        bytes
    }

    /// Deserialises little-endian bytes; unknown packet kinds yield `None`.
    pub fn from_le_bytes(bytes: [u8; 32]) -> Option<Self> {
        let word = |range: core::ops::Range<usize>| -> u64 {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[range]);
            u64::from_le_bytes(raw)
        };
        let half = |start: usize| -> Option<u32> {
            bytes[start..start + 4].try_into().ok().map(u32::from_le_bytes)
        };
        let kind = match half(8)? {
            0 => PacketKind::User,
            1 => PacketKind::Signal,
            _ => return None,
        };
        Some(Self {
            key: word(0..8),
            kind,
            signals: half(12)?,
            count: word(16..24),
            user: word(24..32),
        })
    }
}
