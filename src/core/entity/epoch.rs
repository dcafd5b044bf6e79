// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Awake/asleep epoch mechanism (§4.3, §5): traversals over the entity
//! index mark their thread "awake" before dereferencing entities the
//! GC may otherwise reclaim, and the GC's thread-progress barrier only
//! proceeds once every registered thread has left its current awake
//! period at least once.
//!
//! This is a quiescent-state-based scheme, not full RCU: a thread's
//! epoch counter is even while asleep and odd while awake, and
//! incremented on every transition. A barrier snapshotting an odd
//! (awake) epoch waits for that counter to change - either the thread
//! went back to sleep, or it cycled into a new awake period - either
//! way the traversal that was in flight at snapshot time is done.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use dashmap::DashMap;

/// Registry of per-thread epoch counters, one per domain (mirroring
/// the "one entity index per domain" contract of §4.3).
#[derive(Default)]
pub struct EpochRegistry {
    threads: DashMap<ThreadId, Arc<AtomicU64>>,
}

impl EpochRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn epoch_for_current_thread(&self) -> Arc<AtomicU64> {
        self.threads
            .entry(std::thread::current().id())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    /// Mark the calling thread awake for the duration of the returned
    /// guard. Traversals over the entity index must hold one of these
    /// for as long as they dereference entities obtained from it.
    pub fn enter(&self) -> AwakeGuard<'_> {
        let epoch = self.epoch_for_current_thread();
        epoch.fetch_add(1, Ordering::AcqRel);
        AwakeGuard {
            registry: self,
            epoch,
        }
    }

    /// Block until every thread that was awake at the time of this
    /// call has made progress (gone back to sleep, or cycled to a new
    /// awake period). Entities physically freed after this call
    /// returns cannot have been mid-dereference by any thread that was
    /// awake when the barrier started.
    pub fn barrier(&self) {
        let snapshot: Vec<(u64, Arc<AtomicU64>)> = self
            .threads
            .iter()
            .map(|entry| (entry.value().load(Ordering::Acquire), entry.value().clone()))
            .collect();
        for (observed, epoch) in snapshot {
            if observed % 2 == 1 {
                while epoch.load(Ordering::Acquire) == observed {
                    std::thread::yield_now();
                }
            }
        }
    }
}

/// RAII awake-period marker; dropping it marks the thread asleep
/// again.
pub struct AwakeGuard<'a> {
    registry: &'a EpochRegistry,
    epoch: Arc<AtomicU64>,
}

impl Drop for AwakeGuard<'_> {
    fn drop(&mut self) {
        let _ = &self.registry;
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn barrier_waits_for_an_in_flight_awake_thread() {
        let registry = Arc::new(EpochRegistry::new());
        let observed_before_sleep = Arc::new(AtomicBool::new(false));

        let r = registry.clone();
        let flag = observed_before_sleep.clone();
        let worker = thread::spawn(move || {
            let _guard = r.enter();
            thread::sleep(Duration::from_millis(30));
            flag.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(5));
        registry.barrier();
        assert!(observed_before_sleep.load(Ordering::SeqCst));
        worker.join().unwrap();
    }

    #[test]
    fn barrier_returns_immediately_when_nobody_is_awake() {
        let registry = EpochRegistry::new();
        {
            let _guard = registry.enter();
        }
        registry.barrier();
    }
}
