// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Channel behaviour under concurrent use
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! TEST_COVERAGE: 7 integration tests
//!
//! TEST_SCOPE:
//!   - Per-writer ordering with several writer threads
//!   - Waiters woken by writes and by peer destruction
//!   - Message disposal outside the channel lock
//!   - Writes racing the reader's destruction
//!   - Observer disposal outside the channel lock
//!
//! TEST_SCENARIOS:
//!   - writers_keep_their_order(): each writer's sequence arrives in order, nothing is lost
//!   - waiter_wakes_on_write(): a thread blocked on READABLE wakes when a message lands
//!   - waiter_wakes_on_peer_close(): closing the writer wakes a blocked reader
//!   - discarded_message_may_touch_channel(): dropping a discarded handle can re-lock the channel
//!   - drained_message_may_touch_channel(): drain on close runs handle teardown unlocked
//!   - writes_racing_reader_close(): every write is either returned whole or drained, once
//!   - finished_observer_may_own_last_endpoint(): a retired observer can destroy the peer

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use neuron_ipc::ipc::{ChannelDispatcher, Message, ReadError};
use neuron_ipc::object::{alloc_koid, Handle, KernelObject, Koid};
use neuron_ipc::state::{ObserverAction, SignalState, StateObserver};
use neuron_ipc::wait::Waitable;
use neuron_ipc::{ObjectType, Rights, Signals, Status};

const WRITERS: usize = 4;
const PER_WRITER: u32 = 200;

#[test]
fn writers_keep_their_order() {
    let (tx, rx) = ChannelDispatcher::create();
    let start = Arc::new(Barrier::new(WRITERS));
    let workers: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let tx = tx.clone();
            let start = start.clone();
            thread::spawn(move || {
                start.wait();
                for seq in 0..PER_WRITER {
                    let mut data = vec![writer as u8];
                    data.extend_from_slice(&seq.to_le_bytes());
                    tx.write(Message::new(data, Vec::new())).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut next = [0u32; WRITERS];
    loop {
        match rx.read(16, 0, false) {
            Ok(message) => {
                let data = message.data();
                let writer = data[0] as usize;
                let seq = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
                assert_eq!(seq, next[writer], "writer {writer} out of order");
                next[writer] += 1;
            }
            Err(ReadError::ShouldWait) => break,
            Err(other) => panic!("unexpected read error: {other}"),
        }
    }
    assert!(next.iter().all(|count| *count == PER_WRITER));
}

#[test]
fn waiter_wakes_on_write() {
    let (tx, rx) = ChannelDispatcher::create();
    let reader = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        let seen = rx.wait_one(Signals::READABLE, Some(deadline)).unwrap();
        assert!(seen.contains(Signals::READABLE));
        rx.read(64, 0, false).unwrap().data().to_vec()
    });
    thread::sleep(Duration::from_millis(10));
    tx.write(Message::new(b"wake".to_vec(), Vec::new())).unwrap();
    assert_eq!(reader.join().unwrap(), b"wake");
}

#[test]
fn waiter_wakes_on_peer_close() {
    let (tx, rx) = ChannelDispatcher::create();
    let reader = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        let watched = Signals::READABLE | Signals::PEER_CLOSED;
        let seen = rx.wait_one(watched, Some(deadline)).unwrap();
        (seen, rx.read(64, 0, false).unwrap_err())
    });
    thread::sleep(Duration::from_millis(10));
    drop(tx);
    let (seen, err) = reader.join().unwrap();
    assert!(seen.contains(Signals::PEER_CLOSED));
    assert_eq!(err, ReadError::PeerClosed);
}

/// Object whose teardown reads the state of a channel endpoint.
struct Tripwire {
    koid: Koid,
    endpoint: Arc<ChannelDispatcher>,
    drops: Arc<AtomicUsize>,
}

impl KernelObject for Tripwire {
    fn koid(&self) -> Koid {
        self.koid
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::Event
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Drop for Tripwire {
    fn drop(&mut self) {
        // Takes the channel lock; would deadlock if run under it.
        let _ = self.endpoint.signals();
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn tripwire(endpoint: &Arc<ChannelDispatcher>, drops: &Arc<AtomicUsize>) -> Handle {
    let object = Tripwire { koid: alloc_koid(), endpoint: endpoint.clone(), drops: drops.clone() };
    Handle::new(Arc::new(object), Rights::TRANSFER)
}

#[test]
fn discarded_message_may_touch_channel() {
    let (tx, rx) = ChannelDispatcher::create();
    let drops = Arc::new(AtomicUsize::new(0));
    tx.write(Message::new(vec![0; 16], vec![tripwire(&tx, &drops)])).unwrap();
    let err = rx.read(1, 0, true).unwrap_err();
    assert!(matches!(err, ReadError::BufferTooSmall { discarded: true, .. }));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn drained_message_may_touch_channel() {
    let (tx, rx) = ChannelDispatcher::create();
    let drops = Arc::new(AtomicUsize::new(0));
    tx.write(Message::new(Vec::new(), vec![tripwire(&tx, &drops)])).unwrap();
    drop(rx);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(tx.signals().contains(Signals::PEER_CLOSED));
}

#[test]
fn writes_racing_reader_close() {
    let (tx, rx) = ChannelDispatcher::create();
    let drops = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(WRITERS + 1));
    let (done_tx, done_rx) = mpsc::channel();

    for _ in 0..WRITERS {
        let tx = tx.clone();
        let drops = drops.clone();
        let start = start.clone();
        let done_tx = done_tx.clone();
        thread::spawn(move || {
            start.wait();
            let (mut queued, mut returned) = (0u32, 0u32);
            for _ in 0..PER_WRITER {
                let handle = tripwire(&tx, &drops);
                let koid = handle.koid();
                match tx.write(Message::new(b"race".to_vec(), vec![handle])) {
                    Ok(()) => queued += 1,
                    Err(err) => {
                        assert_eq!(err.status, Status::PeerClosed);
                        let (data, handles) = err.into_message().into_parts();
                        assert_eq!(data, b"race");
                        assert_eq!(handles.len(), 1);
                        assert_eq!(handles[0].koid(), koid);
                        assert_eq!(handles[0].rights(), Rights::TRANSFER);
                        returned += 1;
                    }
                }
            }
            done_tx.send((queued, returned)).unwrap();
        });
    }
    drop(done_tx);

    start.wait();
    thread::yield_now();
    drop(rx);

    let (mut queued, mut returned) = (0, 0);
    for _ in 0..WRITERS {
        let (q, r) = done_rx.recv_timeout(Duration::from_secs(10)).expect("writer stuck");
        queued += q;
        returned += r;
    }
    assert_eq!(queued + returned, WRITERS as u32 * PER_WRITER);
    assert_eq!(drops.load(Ordering::SeqCst), (WRITERS as u32 * PER_WRITER) as usize);
    assert!(tx.signals().contains(Signals::PEER_CLOSED));
    let late = tx.write(Message::new(Vec::new(), Vec::new())).unwrap_err();
    assert_eq!(late.status, Status::PeerClosed);
}

/// Observer that owns a channel endpoint until READABLE clears on the watched side.
struct Holder {
    _endpoint: Arc<ChannelDispatcher>,
}

impl StateObserver for Holder {
    fn on_state_change(&self, state: SignalState) -> ObserverAction {
        if state.any_satisfied(Signals::READABLE) {
            ObserverAction::Keep
        } else {
            ObserverAction::Remove
        }
    }
}

#[test]
fn finished_observer_may_own_last_endpoint() {
    let (tx, rx) = ChannelDispatcher::create();
    tx.write(Message::new(b"x".to_vec(), Vec::new())).unwrap();
    // The observer now holds the only reference to `tx`.
    assert!(rx.add_observer(Arc::new(Holder { _endpoint: tx })).is_some());

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let message = rx.read(64, 0, false).unwrap();
        done_tx.send((message.data().to_vec(), rx.signals())).unwrap();
    });
    let (data, signals) = done_rx.recv_timeout(Duration::from_secs(5)).expect("read stuck");
    assert_eq!(data, b"x");
    assert_eq!(signals, Signals::PEER_CLOSED);
}
