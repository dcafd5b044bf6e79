// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-history-cache lifespan admin (§4.8): an auxiliary fibonacci
//! heap ordered by monotonic sample expiry, feeding a timed-event
//! callback that expires zero or more samples per firing.

use parking_lot::Mutex;

use crate::core::rt::executor::{EventId, TimedEventExecutor};
use crate::core::rt::fibheap::{FibHeap, NodeId};

/// Meaning "this sample never expires" - never inserted into the heap.
pub const NEVER: i64 = i64::MAX;

const KEY_MIN: i64 = i64::MIN;

/// One history cache's expiry schedule over its resident samples.
pub struct LifespanHeap<T> {
    heap: Mutex<FibHeap<i64, T>>,
}

impl<T> Default for LifespanHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LifespanHeap<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(FibHeap::new()),
        }
    }

    /// Insert `sample` iff `expiry != NEVER`, then reschedule `event`
    /// on `executor` to the heap's new minimum so the cache's
    /// sample-expired callback fires no later than necessary. Returns
    /// the handle used to pop this sample directly (e.g. when the
    /// cache drops it for an unrelated reason before it would have
    /// expired on its own).
    pub fn register_sample(&self, expiry: i64, sample: T, executor: &TimedEventExecutor, event: EventId) -> Option<NodeId> {
        if expiry >= NEVER {
            return None;
        }
        let mut heap = self.heap.lock();
        let node = heap.insert(expiry, sample);
        let new_min = *heap.peek_min().expect("just inserted");
        drop(heap);
        executor.reschedule_earlier(event, new_min);
        Some(node)
    }

    /// Remove a specific sample directly ("pop by address"), without
    /// waiting for it to become the heap minimum.
    pub fn pop(&self, node: NodeId) -> Option<T> {
        self.heap.lock().delete(node, KEY_MIN)
    }

    /// The minimum expiry still scheduled, whether or not it is due.
    #[must_use]
    pub fn peek(&self) -> Option<i64> {
        self.heap.lock().peek_min().copied()
    }

    /// Pop every sample whose expiry is at or before `now`. Called
    /// from the cache's sample-expired executor callback; may return
    /// an empty `Vec` if nothing is due yet (the callback having fired
    /// slightly early or been coalesced with another reschedule).
    pub fn expire_due(&self, now: i64) -> Vec<T> {
        let mut heap = self.heap.lock();
        let mut expired = Vec::new();
        while matches!(heap.peek_min(), Some(&k) if k <= now) {
            if let Some((_, value)) = heap.extract_min() {
                expired.push(value);
            }
        }
        expired
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_expiring_sample_is_not_inserted() {
        let heap = LifespanHeap::new();
        let exec = TimedEventExecutor::default();
        let event = exec.schedule_callback(1_000_000, |_| {}, false);
        assert!(heap.register_sample(NEVER, "forever", &exec, event).is_none());
        assert!(heap.is_empty());
    }

    #[test]
    fn register_reschedules_the_executor_event_to_the_new_minimum() {
        let heap: LifespanHeap<&str> = LifespanHeap::new();
        let exec = TimedEventExecutor::default();
        let event = exec.schedule_callback(1_000, |_| {}, false);

        heap.register_sample(500, "a", &exec, event);
        assert_eq!(exec.next_wakeup(), Some(500));

        heap.register_sample(100, "b", &exec, event);
        assert_eq!(exec.next_wakeup(), Some(100));
    }

    #[test]
    fn expire_due_pops_only_what_is_due() {
        let heap: LifespanHeap<&str> = LifespanHeap::new();
        let exec = TimedEventExecutor::default();
        let event = exec.schedule_callback(1_000, |_| {}, false);

        heap.register_sample(100, "early", &exec, event);
        heap.register_sample(300, "late", &exec, event);

        let due = heap.expire_due(150);
        assert_eq!(due, vec!["early"]);
        assert_eq!(heap.peek(), Some(300));

        let due = heap.expire_due(300);
        assert_eq!(due, vec!["late"]);
        assert!(heap.is_empty());
    }

    #[test]
    fn pop_removes_a_specific_sample_before_it_expires() {
        let heap = LifespanHeap::new();
        let exec = TimedEventExecutor::default();
        let event = exec.schedule_callback(1_000, |_| {}, false);

        let node = heap.register_sample(200, "dropped-early", &exec, event).unwrap();
        assert_eq!(heap.pop(node), Some("dropped-early"));
        assert!(heap.is_empty());
        assert_eq!(heap.expire_due(i64::MAX).len(), 0);
    }
}
