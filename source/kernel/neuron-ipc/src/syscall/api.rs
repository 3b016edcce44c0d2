// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Syscall handlers for channels, events and ports
//! OWNERS: @kernel-team
//! PUBLIC API: channel_*, event_create, object_*, port_*, handle_*
//! DEPENDS_ON: syscall::{Context, Error}, cap::HandleTable, ipc::ChannelDispatcher
//! INVARIANTS: Decode→Check→Execute; handles moved into a message are re-installed in their
//!             original slots when the write fails; blocking calls never hold a table borrow

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;
use std::time::Instant;

use log::{error, trace};
use nexus_abi::{PortPacket, Rights, Signals, Status, MAX_MSG_BYTES, MAX_MSG_HANDLES};

use super::{Context, SysResult};
use crate::cap::{HandleTable, HandleValue};
use crate::event::EventDispatcher;
use crate::ipc::{ChannelDispatcher, Message};
use crate::object::{Handle, KernelObject};
use crate::port::PortDispatcher;
use crate::wait;

/// Arguments of [`channel_write`].
#[derive(Copy, Clone, Debug)]
pub struct ChannelWriteArgs<'a> {
    /// Channel endpoint to write through.
    pub channel: HandleValue,
    /// Payload.
    pub data: &'a [u8],
    /// Handles to move into the message.
    pub handles: &'a [HandleValue],
}

impl ChannelWriteArgs<'_> {
    #[inline]
    fn check(&self) -> SysResult<()> {
        if self.data.len() > MAX_MSG_BYTES || self.handles.len() > MAX_MSG_HANDLES {
            return Err(Status::OutOfRange.into());
        }
        Ok(())
    }
}

/// Arguments of [`channel_read`].
#[derive(Debug)]
pub struct ChannelReadArgs<'a> {
    /// Channel endpoint to read from.
    pub channel: HandleValue,
    /// Destination for the payload.
    pub data: &'a mut [u8],
    /// Destination for received handle values.
    pub handles: &'a mut [HandleValue],
    /// Drop a message that does not fit instead of leaving it queued.
    pub may_discard: bool,
}

/// Sizes of a successfully read message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Bytes written to the data buffer.
    pub bytes: usize,
    /// Handle values written to the handle buffer.
    pub handles: usize,
}

/// Looks up `value`, checks `rights` and returns the concrete object.
fn lookup<T: KernelObject>(
    table: &HandleTable,
    value: HandleValue,
    rights: Rights,
) -> SysResult<Arc<T>> {
    let handle = table.get(value)?;
    let object = handle.downcast_arc::<T>().ok_or(Status::WrongType)?;
    handle.require(rights)?;
    Ok(object)
}

/// Puts handles back where they were taken from.
fn restore(table: &mut HandleTable, values: &[HandleValue], handles: Vec<Handle>) {
    for (value, handle) in values.iter().zip(handles) {
        if let Err(err) = table.install(*value, handle) {
            error!("syscall: lost handle {} while restoring ({})", value, err);
        }
    }
}

/// Creates a channel and installs both endpoints.
pub fn channel_create(ctx: &mut Context<'_>) -> SysResult<(HandleValue, HandleValue)> {
    if ctx.handles.free_slots() < 2 {
        return Err(Status::NoMemory.into());
    }
    let (zero, one) = ChannelDispatcher::create();
    let first = ctx.handles.allocate(Handle::new(zero, Rights::CHANNEL_DEFAULT))?;
    let second = ctx.handles.allocate(Handle::new(one, Rights::CHANNEL_DEFAULT))?;
    Ok((first, second))
}

/// Moves `args.handles` out of the caller's table and writes them with `args.data`.
///
/// On any failure the handles are back in their original slots.
pub fn channel_write(ctx: &mut Context<'_>, args: ChannelWriteArgs<'_>) -> SysResult<()> {
    args.check()?;
    let channel = lookup::<ChannelDispatcher>(ctx.handles, args.channel, Rights::WRITE)?;

    let mut moved = Vec::with_capacity(args.handles.len());
    for (index, value) in args.handles.iter().enumerate() {
        match ctx.handles.take(*value) {
            Ok(handle) => moved.push(handle),
            Err(err) => {
                restore(ctx.handles, &args.handles[..index], moved);
                return Err(err.into());
            }
        }
    }

    match channel.write(Message::new(args.data.to_vec(), moved)) {
        Ok(()) => Ok(()),
        Err(err) => {
            let status = err.status;
            let (_, handles) = err.into_message().into_parts();
            restore(ctx.handles, args.handles, handles);
            trace!("syscall: channel_write on {} failed ({})", args.channel, status);
            Err(status.into())
        }
    }
}

/// Reads one message into the caller's buffers.
///
/// Received handles are installed in the caller's table. A message that fits the buffers but
/// not the table's free slots stays queued and the call fails with `NoMemory`, so installation
/// cannot fail halfway.
pub fn channel_read(ctx: &mut Context<'_>, args: ChannelReadArgs<'_>) -> SysResult<ReadOutcome> {
    let channel = lookup::<ChannelDispatcher>(ctx.handles, args.channel, Rights::READ)?;
    let free_slots = ctx.handles.free_slots();
    let message =
        channel.read_bounded(args.data.len(), args.handles.len(), free_slots, args.may_discard)?;
    let (data, handles) = message.into_parts();
    args.data[..data.len()].copy_from_slice(&data);
    let count = handles.len();
    for (slot, handle) in args.handles.iter_mut().zip(handles) {
        *slot = ctx.handles.allocate(handle)?;
    }
    Ok(ReadOutcome { bytes: data.len(), handles: count })
}

/// Blocks until any of `signals` is asserted on the object behind `value`.
pub fn object_wait_one(
    ctx: &mut Context<'_>,
    value: HandleValue,
    signals: Signals,
    deadline: Option<Instant>,
) -> SysResult<Signals> {
    let handle = ctx.handles.get(value)?;
    handle.require(Rights::WAIT)?;
    // Keep the object alive without borrowing the table across the wait.
    let object = Arc::clone(handle.object());
    let waitable = object.as_waitable().ok_or(Status::NotSupported)?;
    Ok(wait::wait_one(waitable, signals, deadline)?)
}

/// Creates an event.
pub fn event_create(ctx: &mut Context<'_>) -> SysResult<HandleValue> {
    Ok(ctx.handles.allocate(Handle::new(EventDispatcher::new(), Rights::EVENT_DEFAULT))?)
}

/// Clears then sets user signals on an event.
pub fn object_signal(
    ctx: &mut Context<'_>,
    value: HandleValue,
    clear: Signals,
    set: Signals,
) -> SysResult<()> {
    let event = lookup::<EventDispatcher>(ctx.handles, value, Rights::SIGNAL)?;
    Ok(event.signal(clear, set)?)
}

/// Creates a port with the default capacity.
pub fn port_create(ctx: &mut Context<'_>) -> SysResult<HandleValue> {
    Ok(ctx.handles.allocate(Handle::new(PortDispatcher::new(), Rights::PORT_DEFAULT))?)
}

/// Queues a user packet on a port.
pub fn port_queue(ctx: &mut Context<'_>, value: HandleValue, key: u64, user: u64) -> SysResult<()> {
    let port = lookup::<PortDispatcher>(ctx.handles, value, Rights::WRITE)?;
    Ok(port.queue_user(key, user)?)
}

/// Dequeues one packet from a port, blocking until `deadline`.
pub fn port_wait(
    ctx: &mut Context<'_>,
    value: HandleValue,
    deadline: Option<Instant>,
) -> SysResult<PortPacket> {
    let port = lookup::<PortDispatcher>(ctx.handles, value, Rights::READ)?;
    Ok(port.wait(deadline)?)
}

/// Registers `port` as the notifier of a channel endpoint.
pub fn channel_bind_port(
    ctx: &mut Context<'_>,
    channel: HandleValue,
    port: HandleValue,
    key: u64,
    trigger: Signals,
) -> SysResult<()> {
    let channel = lookup::<ChannelDispatcher>(ctx.handles, channel, Rights::WAIT)?;
    let port = lookup::<PortDispatcher>(ctx.handles, port, Rights::WRITE)?;
    Ok(channel.bind_port(&port, key, trigger)?)
}

/// Closes a handle.
pub fn handle_close(ctx: &mut Context<'_>, value: HandleValue) -> SysResult<()> {
    // The object may be destroyed here; no lock is held.
    Ok(ctx.handles.close(value)?)
}

/// Duplicates a handle with a subset of its rights.
pub fn handle_duplicate(
    ctx: &mut Context<'_>,
    value: HandleValue,
    rights: Rights,
) -> SysResult<HandleValue> {
    Ok(ctx.handles.duplicate(value, rights)?)
}
