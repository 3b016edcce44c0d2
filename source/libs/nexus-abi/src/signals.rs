// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Signal and rights masks shared by every kernel object.

use bitflags::bitflags;

bitflags! {
    /// Observable state bits of a kernel object.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Signals: u32 {
        /// A message (or packet) is pending.
        const READABLE = 1 << 0;
        /// The object accepts writes.
        const WRITABLE = 1 << 1;
        /// The peer endpoint has been destroyed.
        const PEER_CLOSED = 1 << 2;
        /// Event object asserted.
        const SIGNALED = 1 << 3;

        /// User signal 0.
        const USER_0 = 1 << 24;
        /// User signal 1.
        const USER_1 = 1 << 25;
        /// User signal 2.
        const USER_2 = 1 << 26;
        /// User signal 3.
        const USER_3 = 1 << 27;
        /// User signal 4.
        const USER_4 = 1 << 28;
        /// User signal 5.
        const USER_5 = 1 << 29;
        /// User signal 6.
        const USER_6 = 1 << 30;
        /// User signal 7.
        const USER_7 = 1 << 31;

        /// All user signals.
        const USER_ALL = 0xff00_0000;
    }
}

impl Signals {
    /// Signals a channel side can report.
    pub const CHANNEL_ALL: Self =
        Self::READABLE.union(Self::WRITABLE).union(Self::PEER_CLOSED);

    /// Signals a port notifier on a channel may be triggered by.
    pub const CHANNEL_TRIGGERS: Self = Self::READABLE.union(Self::PEER_CLOSED);
}

bitflags! {
    /// Rights carried by a handle.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Rights: u32 {
        /// Holder may duplicate the handle.
        const DUPLICATE = 1 << 0;
        /// Holder may move the handle through a channel.
        const TRANSFER = 1 << 1;
        /// Holder may read messages or packets.
        const READ = 1 << 2;
        /// Holder may write messages or bind notifiers.
        const WRITE = 1 << 3;
        /// Holder may assert user signals.
        const SIGNAL = 1 << 4;
        /// Holder may wait on signals.
        const WAIT = 1 << 5;
    }
}

impl Rights {
    /// Rights granted to freshly created channel endpoints.
    pub const CHANNEL_DEFAULT: Self = Self::TRANSFER
        .union(Self::DUPLICATE)
        .union(Self::READ)
        .union(Self::WRITE)
        .union(Self::SIGNAL)
        .union(Self::WAIT);

    /// Rights granted to freshly created events.
    pub const EVENT_DEFAULT: Self =
        Self::TRANSFER.union(Self::DUPLICATE).union(Self::SIGNAL).union(Self::WAIT);

    /// Rights granted to freshly created ports.
    pub const PORT_DEFAULT: Self =
        Self::TRANSFER.union(Self::DUPLICATE).union(Self::READ).union(Self::WRITE);
}
