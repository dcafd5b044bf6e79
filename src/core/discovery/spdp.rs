// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SPDP (Simple Participant Discovery Protocol) scheduling: the
//! periodic live-publish round, the live/aging locator reference
//! tables that decide which addresses still ride along in that
//! announcement, and `force_republish` (§4.6).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config;
use crate::core::discovery::proxy::Locator;
use crate::core::rt::executor::{EventId, TimedEventExecutor};

/// Monotonic clock used for scheduling, injected so callers can
/// replace it with a deterministic source in tests.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

struct AgingEntry {
    rounds_left: u32,
    coalesce_until: i64,
}

/// Reference-counted live locators plus the decaying set of locators
/// that dropped to zero refs and are still advertised for a bounded
/// number of rounds so in-flight remote state has time to catch up
/// (§4.6 "aging locator").
#[derive(Default)]
pub struct SpdpLocatorTable {
    live: Mutex<HashMap<Locator, u32>>,
    aging: Mutex<HashMap<Locator, AgingEntry>>,
}

impl SpdpLocatorTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference to `locator`. Cancels any in-progress aging for
    /// the same locator: a resurrected address goes straight back to
    /// live.
    pub fn ref_locator(&self, locator: Locator) {
        self.aging.lock().remove(&locator);
        *self.live.lock().entry(locator).or_insert(0) += 1;
    }

    /// Drop a reference. Once the refcount reaches zero the locator
    /// moves into the aging table with `initial_aging_count(base_interval)`
    /// rounds to live. A repeated unref of the same already-aging
    /// locator within [`config::AGING_COALESCE_WINDOW`] only extends
    /// the coalescing deadline rather than restarting the countdown,
    /// so a burst of churn on one address does not reset its clock
    /// every round.
    pub fn unref_locator(&self, locator: &Locator, now: i64, base_interval: Duration) {
        let became_zero = {
            let mut live = self.live.lock();
            match live.get_mut(locator) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    live.remove(locator);
                    true
                }
                None => false,
            }
        };
        if !became_zero {
            return;
        }
        let mut aging = self.aging.lock();
        let coalesce_until = now + config::AGING_COALESCE_WINDOW.as_nanos() as i64;
        aging
            .entry(locator.clone())
            .and_modify(|e| e.coalesce_until = coalesce_until)
            .or_insert_with(|| AgingEntry {
                rounds_left: config::initial_aging_count(base_interval),
                coalesce_until,
            });
    }

    /// Advance every aging locator by one round. A locator whose
    /// coalescing deadline has not yet passed is left untouched this
    /// round (its last unref was too recent to count as a fresh
    /// probe); otherwise its round counter is decremented, and a
    /// locator reaching zero is forgotten and returned.
    pub fn aging_tick(&self, now: i64) -> Vec<Locator> {
        let mut aging = self.aging.lock();
        let mut expired = Vec::new();
        aging.retain(|locator, entry| {
            if now < entry.coalesce_until {
                return true;
            }
            entry.rounds_left = entry.rounds_left.saturating_sub(1);
            if entry.rounds_left == 0 {
                expired.push(locator.clone());
                return false;
            }
            true
        });
        expired
    }

    #[must_use]
    pub fn is_live(&self, locator: &Locator) -> bool {
        self.live.lock().contains_key(locator)
    }

    #[must_use]
    pub fn is_aging(&self, locator: &Locator) -> bool {
        self.aging.lock().contains_key(locator)
    }

    /// Snapshot of every locator currently advertised: live ones plus
    /// whatever is still aging.
    #[must_use]
    pub fn advertised(&self) -> Vec<Locator> {
        let mut out: Vec<Locator> = self.live.lock().keys().cloned().collect();
        out.extend(self.aging.lock().keys().cloned());
        out
    }
}

/// Reschedule the running live-publish event to fire immediately,
/// e.g. after an address set changes and remote peers should not wait
/// out the full publish interval (§4.6).
pub fn force_republish(executor: &TimedEventExecutor, event: EventId, now: i64) -> bool {
    executor.reschedule_earlier(event, now)
}

/// Schedule the recurring SPDP live-publish round. Each firing invokes
/// `publish`, then re-derives the interval from `lease_duration` (so a
/// QoS change observed between rounds takes effect on the next one)
/// and reschedules itself via its own `executor` handle rather than
/// recursing through the callback's own stack frame.
pub fn schedule_live_publish(
    executor: &Arc<TimedEventExecutor>,
    clock: Clock,
    lease_duration: Option<Duration>,
    publish: Arc<dyn Fn() + Send + Sync>,
) -> EventId {
    let interval_nanos = config::spdp_publish_interval(lease_duration).as_nanos() as i64;
    let first = clock() + interval_nanos;
    schedule_round(executor.clone(), clock, lease_duration, publish, first)
}

fn schedule_round(
    executor: Arc<TimedEventExecutor>,
    clock: Clock,
    lease_duration: Option<Duration>,
    publish: Arc<dyn Fn() + Send + Sync>,
    tsched: i64,
) -> EventId {
    let next_executor = executor.clone();
    executor.schedule_callback(
        tsched,
        move |_| {
            publish();
            let interval_nanos = config::spdp_publish_interval(lease_duration).as_nanos() as i64;
            let next = clock() + interval_nanos;
            schedule_round(next_executor.clone(), clock.clone(), lease_duration, publish.clone(), next);
        },
        false,
    )
}
