// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lease heap (§4.2): a single process-wide fibonacci heap ordered by
//! scheduled expiry, protected by a mutex, plus the CAS-based renewal
//! rule that keeps `renew` lock-free on the hot path.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::guid::Guid;
use crate::core::rt::fibheap::{FibHeap, NodeId};

/// Meaning "this lease never expires".
pub const NEVER: i64 = i64::MAX;

const TSCHED_NOT_ON_HEAP: i64 = i64::MIN;

/// A liveliness lease on one entity. `tend` is the wall-clock instant
/// (monotonic nanoseconds) at which the lease is considered expired
/// absent a renewal; `tdur` is how far `renew` pushes it forward each
/// time.
pub struct Lease {
    tend: AtomicI64,
    tdur: i64,
    guid: Guid,
    node: Mutex<Option<NodeId>>,
}

impl Lease {
    /// Allocate a lease, not yet registered on any heap.
    #[must_use]
    pub fn new(texpire: i64, tdur: i64, guid: Guid) -> Arc<Lease> {
        Arc::new(Lease {
            tend: AtomicI64::new(texpire),
            tdur,
            guid,
            node: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn tend(&self) -> i64 {
        self.tend.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    #[must_use]
    pub fn is_on_heap(&self) -> bool {
        self.node.lock().unwrap().is_some()
    }

    /// Attempt to advance `tend` to `now + tdur`. Never moves `tend`
    /// backward and never extends an already-expired lease: a renew
    /// after expiry observes `now >= tend` and is a no-op, so an
    /// observed expiration always wins the race against a concurrent
    /// renewal. Lock-free; does not touch any [`LeaseHeap`].
    pub fn renew(&self, now: i64) {
        let tend_new = now.saturating_add(self.tdur);
        loop {
            let tend = self.tend.load(Ordering::Acquire);
            if tend_new <= tend || now >= tend {
                return;
            }
            if self
                .tend
                .compare_exchange(tend, tend_new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }
}

/// The process-wide lease heap. Garbage-collector threads repeatedly
/// call `check_and_handle_expiration` to peek the minimum and fire
/// handlers for leases whose `tend <= now`.
pub struct LeaseHeap {
    inner: Mutex<FibHeap<i64, Arc<Lease>>>,
}

impl Default for LeaseHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaseHeap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FibHeap::new()),
        }
    }

    /// Insert `l` if it has a finite expiry. Idempotent no-op for a
    /// lease that never expires.
    pub fn register(&self, l: &Arc<Lease>) {
        let tend = l.tend();
        if tend >= NEVER {
            return;
        }
        let mut node_guard = l.node.lock().unwrap();
        debug_assert!(node_guard.is_none(), "lease already registered");
        let node = self.inner.lock().unwrap().insert(tend, l.clone());
        *node_guard = Some(node);
    }

    /// Remove `l` from the heap if it is currently on it.
    pub fn unregister(&self, l: &Arc<Lease>) {
        let mut node_guard = l.node.lock().unwrap();
        if let Some(node) = node_guard.take() {
            self.inner.lock().unwrap().delete(node, TSCHED_NOT_ON_HEAP);
        }
    }

    /// Overwrite `l.tend` unconditionally, the only operation in this
    /// heap that is not subject to the monotonic-renewal rule. Moves
    /// the heap position (or inserts/removes) to match.
    pub fn set_expiry(&self, l: &Arc<Lease>, when: i64) {
        l.tend.store(when, Ordering::Release);
        let mut node_guard = l.node.lock().unwrap();
        let mut heap = self.inner.lock().unwrap();
        match *node_guard {
            Some(node) => {
                if when < heap.key(node) {
                    heap.decrease_key(node, when);
                }
            }
            None => {
                if when < NEVER {
                    let node = heap.insert(when, l.clone());
                    *node_guard = Some(node);
                }
            }
        }
    }

    /// Pop every lease whose scheduled time is due at or before `now`.
    /// For a lease that was renewed since it was scheduled, silently
    /// reinserts it at its new `tend` instead of calling `on_expire`.
    /// `on_expire` may return a deferral instant (the 200 ms
    /// "secondary proxy participant" grace period of §4.2) to reinsert
    /// the lease rather than leave it expired and off the heap.
    pub fn check_and_handle_expiration(&self, now: i64, mut on_expire: impl FnMut(&Arc<Lease>) -> Option<i64>) {
        loop {
            let due = {
                let mut heap = self.inner.lock().unwrap();
                match heap.peek_min() {
                    Some(&k) if k <= now => Some(heap.extract_min().expect("peeked min present").1),
                    _ => None,
                }
            };
            let Some(lease) = due else { break };
            *lease.node.lock().unwrap() = None;

            let tend = lease.tend();
            if now < tend {
                if tend < NEVER {
                    self.reinsert(&lease, tend);
                }
                continue;
            }

            if let Some(defer_until) = on_expire(&lease) {
                lease.tend.store(defer_until, Ordering::Release);
                self.reinsert(&lease, defer_until);
            }
        }
    }

    fn reinsert(&self, lease: &Arc<Lease>, at: i64) {
        let node = self.inner.lock().unwrap().insert(at, lease.clone());
        *lease.node.lock().unwrap() = Some(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn guid(n: u8) -> Guid {
        Guid::new([n; 12], [0, 0, 0, 1])
    }

    #[test]
    fn register_then_expiration_fires_handler() {
        let heap = LeaseHeap::new();
        let lease = Lease::new(100, 1_000, guid(1));
        heap.register(&lease);
        assert!(lease.is_on_heap());

        let mut fired = Vec::new();
        heap.check_and_handle_expiration(50, |_| None);
        assert!(fired.is_empty());

        heap.check_and_handle_expiration(200, |l| {
            fired.push(l.guid());
            None
        });
        assert_eq!(fired, vec![guid(1)]);
        assert!(!lease.is_on_heap());
    }

    #[test]
    fn expiration_deferral_reinserts_the_lease() {
        let heap = LeaseHeap::new();
        let lease = Lease::new(100, 1_000, guid(2));
        heap.register(&lease);

        heap.check_and_handle_expiration(100, |_| Some(300));
        assert!(lease.is_on_heap());
        assert_eq!(lease.tend(), 300);

        let mut fired = false;
        heap.check_and_handle_expiration(300, |_| {
            fired = true;
            None
        });
        assert!(fired);
    }

    #[test]
    fn renew_is_monotone_and_never_extends_an_expired_lease() {
        let lease = Lease::new(500, 1_000, guid(3));

        let l1 = lease.clone();
        let l2 = lease.clone();
        let h1 = thread::spawn(move || l1.renew(100));
        let h2 = thread::spawn(move || l2.renew(200));
        h1.join().unwrap();
        h2.join().unwrap();
        assert_eq!(lease.tend(), 1_200);

        // Already expired: a renew attempt after tend must not move it.
        let expired = Lease::new(50, 1_000, guid(4));
        expired.renew(60);
        assert_eq!(expired.tend(), 50);
    }

    #[test]
    fn set_expiry_overrides_a_pending_renew_unconditionally() {
        let lease = Lease::new(500, 1_000, guid(5));
        let heap = LeaseHeap::new();
        heap.register(&lease);

        lease.renew(100);
        lease.renew(200);
        assert_eq!(lease.tend(), 1_200);

        heap.set_expiry(&lease, 50);
        assert_eq!(lease.tend(), 50);
    }
}
