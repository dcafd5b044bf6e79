// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timed-event executor (§4.1): a fibonacci-heap-ordered priority queue
//! of scheduled callbacks, a FIFO of non-timed events, and a bounded
//! retransmit queue with destination-set merging.
//!
//! Callbacks are `FnMut(&TimedEventExecutor)` closures rather than a
//! C-style `(fn, *mut arg)` pair stored inline: a callback that needs
//! to reschedule itself simply calls back into the executor it was
//! handed, which is the idiomatic Rust shape for the same capability.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use crate::core::guid::Guid;
use crate::core::rt::fibheap::{FibHeap, NodeId};

/// Sentinel meaning "never scheduled".
pub const NEVER: i64 = i64::MAX;
/// Sentinel an async delete moves an event to, so it becomes the next
/// heap minimum regardless of anything else queued.
pub const TSCHED_DELETE: i64 = i64::MIN;

/// Opaque handle to a scheduled timed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

type Callback = Box<dyn FnMut(&TimedEventExecutor) + Send>;

struct TimedEvent {
    id: EventId,
    cb: Option<Callback>,
    sync_on_delete: bool,
}

enum NonTimedItem {
    Message(Vec<u8>),
    Callback(Box<dyn FnMut() + Send>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetransmitKey {
    pub writer: Guid,
    pub sequence: u64,
    pub fragment: Option<u32>,
}

#[derive(Clone)]
pub struct RetransmitMessage {
    pub key: RetransmitKey,
    pub destinations: Vec<Guid>,
    pub bytes: usize,
    pub mergeable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetransmitOutcome {
    Dropped,
    Merged,
    Queued,
}

#[derive(Debug, Clone, Copy)]
pub struct RetransmitLimits {
    pub max_bytes: usize,
    pub max_messages: usize,
}

impl Default for RetransmitLimits {
    fn default() -> Self {
        Self {
            max_bytes: 1 << 20,
            max_messages: 1024,
        }
    }
}

#[derive(Default)]
struct RetransmitQueue {
    entries: Vec<RetransmitMessage>,
    index: HashMap<RetransmitKey, usize>,
    bytes: usize,
}

impl RetransmitQueue {
    fn enqueue(
        &mut self,
        msg: RetransmitMessage,
        force: bool,
        limits: &RetransmitLimits,
    ) -> RetransmitOutcome {
        if msg.mergeable {
            if let Some(&idx) = self.index.get(&msg.key) {
                let existing = &mut self.entries[idx];
                for dst in msg.destinations {
                    if !existing.destinations.contains(&dst) {
                        existing.destinations.push(dst);
                    }
                }
                return RetransmitOutcome::Merged;
            }
        }
        let over_limit = self.bytes + msg.bytes > limits.max_bytes
            || self.entries.len() + 1 > limits.max_messages;
        if over_limit && !force {
            return RetransmitOutcome::Dropped;
        }
        self.bytes += msg.bytes;
        if msg.mergeable {
            self.index.insert(msg.key, self.entries.len());
        }
        self.entries.push(msg);
        RetransmitOutcome::Queued
    }

    fn dequeue(&mut self) -> Option<RetransmitMessage> {
        if self.entries.is_empty() {
            return None;
        }
        let msg = self.entries.remove(0);
        self.bytes -= msg.bytes;
        self.index.clear();
        for (i, e) in self.entries.iter().enumerate() {
            if e.mergeable {
                self.index.insert(e.key, i);
            }
        }
        Some(msg)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct Inner {
    heap: FibHeap<i64, TimedEvent>,
    handles: HashMap<EventId, NodeId>,
    nontimed: VecDeque<NonTimedItem>,
    retransmit: RetransmitQueue,
    executing: HashSet<EventId>,
}

/// Owns one fibonacci-heap-ordered timed-event queue plus the
/// non-timed FIFO and retransmit queue that share its thread.
pub struct TimedEventExecutor {
    inner: Mutex<Inner>,
    cv: Condvar,
    next_id: AtomicU64,
    retransmit_limits: RetransmitLimits,
}

impl Default for TimedEventExecutor {
    fn default() -> Self {
        Self::new(RetransmitLimits::default())
    }
}

impl TimedEventExecutor {
    #[must_use]
    pub fn new(retransmit_limits: RetransmitLimits) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: FibHeap::new(),
                handles: HashMap::new(),
                nontimed: VecDeque::new(),
                retransmit: RetransmitQueue::default(),
                executing: HashSet::new(),
            }),
            cv: Condvar::new(),
            next_id: AtomicU64::new(1),
            retransmit_limits,
        }
    }

    fn alloc_id(&self) -> EventId {
        EventId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert a timed event. Returns a handle for `reschedule_earlier`
    /// and `delete`.
    pub fn schedule_callback(
        &self,
        tsched: i64,
        cb: impl FnMut(&TimedEventExecutor) + Send + 'static,
        sync_on_delete: bool,
    ) -> EventId {
        let id = self.alloc_id();
        let mut inner = self.inner.lock().unwrap();
        let node = inner.heap.insert(
            tsched,
            TimedEvent {
                id,
                cb: Some(Box::new(cb)),
                sync_on_delete,
            },
        );
        inner.handles.insert(id, node);
        drop(inner);
        self.cv.notify_all();
        id
    }

    /// Decrease `id`'s scheduled time. No-op (returns `false`) if
    /// `tsched` is not earlier than the event's current key, or if the
    /// event is no longer scheduled.
    pub fn reschedule_earlier(&self, id: EventId, tsched: i64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(&node) = inner.handles.get(&id) else {
            return false;
        };
        if tsched >= inner.heap.key(node) {
            return false;
        }
        inner.heap.decrease_key(node, tsched);
        let became_min = inner.heap.peek_min() == Some(&tsched);
        drop(inner);
        if became_min {
            self.cv.notify_all();
        }
        true
    }

    /// Delete a scheduled event. Async by default: the event is pulled
    /// to the front of the heap and freed on the next executor pass
    /// without invoking its callback. An event scheduled with
    /// `sync_on_delete = true` instead blocks here until it is neither
    /// scheduled nor executing, required whenever the callback
    /// dereferences caller-owned state that is about to be freed.
    pub fn delete(&self, id: EventId) {
        let sync_required = {
            let inner = self.inner.lock().unwrap();
            inner
                .handles
                .get(&id)
                .map(|&node| inner.heap.value(node).sync_on_delete)
                .unwrap_or(false)
        };
        if sync_required {
            self.delete_sync(id);
        } else {
            self.delete_async(id);
        }
    }

    fn delete_async(&self, id: EventId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&node) = inner.handles.get(&id) {
            if inner.heap.key(node) > TSCHED_DELETE {
                inner.heap.decrease_key(node, TSCHED_DELETE);
            }
        }
        drop(inner);
        self.cv.notify_all();
    }

    fn delete_sync(&self, id: EventId) {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if !inner.handles.contains_key(&id) {
                return;
            }
            if inner.executing.contains(&id) {
                inner = self.cv.wait(inner).unwrap();
                continue;
            }
            if let Some(node) = inner.handles.remove(&id) {
                inner.heap.delete(node, TSCHED_DELETE);
            }
            return;
        }
    }

    pub fn enqueue_message(&self, msg: Vec<u8>) {
        self.inner
            .lock()
            .unwrap()
            .nontimed
            .push_back(NonTimedItem::Message(msg));
        self.cv.notify_all();
    }

    pub fn enqueue_nontimed_callback(&self, cb: impl FnMut() + Send + 'static) {
        self.inner
            .lock()
            .unwrap()
            .nontimed
            .push_back(NonTimedItem::Callback(Box::new(cb)));
        self.cv.notify_all();
    }

    pub fn enqueue_retransmit(&self, msg: RetransmitMessage, force: bool) -> RetransmitOutcome {
        let mut inner = self.inner.lock().unwrap();
        inner.retransmit.enqueue(msg, force, &self.retransmit_limits)
    }

    #[must_use]
    pub fn retransmit_queue_len(&self) -> usize {
        self.inner.lock().unwrap().retransmit.len()
    }

    pub fn dequeue_retransmit(&self) -> Option<RetransmitMessage> {
        self.inner.lock().unwrap().retransmit.dequeue()
    }

    /// Drain all timed events due at or before `now`, then run at most
    /// one non-timed item. Returns how many timed events fired
    /// (pending-delete markers count as fired but invoke no callback).
    pub fn run_once(&self, now: i64) -> usize {
        let mut fired = 0;
        loop {
            let due = {
                let mut inner = self.inner.lock().unwrap();
                match inner.heap.peek_min() {
                    Some(&k) if k <= now => {
                        let (_, event) = inner.heap.extract_min().expect("peeked min present");
                        inner.handles.remove(&event.id);
                        if event.cb.is_some() {
                            inner.executing.insert(event.id);
                        }
                        Some(event)
                    }
                    _ => None,
                }
            };
            let Some(event) = due else { break };
            match event.cb {
                Some(mut cb) => {
                    cb(self);
                    fired += 1;
                    let mut inner = self.inner.lock().unwrap();
                    inner.executing.remove(&event.id);
                    drop(inner);
                    self.cv.notify_all();
                }
                None => fired += 1,
            }
        }

        let item = self.inner.lock().unwrap().nontimed.pop_front();
        if let Some(NonTimedItem::Callback(mut cb)) = item {
            cb();
        }
        fired
    }

    /// Earliest scheduled time still on the heap, if any.
    #[must_use]
    pub fn next_wakeup(&self) -> Option<i64> {
        self.inner.lock().unwrap().heap.peek_min().copied()
    }
}
