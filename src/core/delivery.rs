// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local delivery engine (§4.7): converts one incoming wire sample
//! into per-sertype cached samples and fans them out to matched
//! readers' history caches, with the fast and slow delivery paths and
//! the shared resource-limit retry loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DELIVERY_RETRY_BACKOFF;
use crate::core::entity::EntityIndex;
use crate::core::guid::Guid;

/// Opaque identity of a sample's serialized type, used only to group
/// consecutive matched readers sharing one deserialization.
pub type SerType = u32;

/// A type-pinned, cache-ready view of one wire sample.
#[derive(Clone)]
pub struct CachedSample {
    pub sertype: SerType,
    pub payload: Arc<[u8]>,
}

/// Converts the incoming wire representation into a per-sertype cached
/// sample. A no-op wrapper today (the wire and in-memory
/// representations coincide here), kept as its own function so the
/// "compute once per run of identical sertype" rule has one place to
/// grow real per-sertype deserialization.
#[must_use]
pub fn makesample(sertype: SerType, raw: &Arc<[u8]>) -> CachedSample {
    CachedSample {
        sertype,
        payload: raw.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// Resource-limit rejection: retryable once the cache has room.
    RejectedResourceLimit,
    /// Permanent rejection (e.g. instance-level QoS violation): abort
    /// this sample for this reader, do not retry.
    RejectedPermanently,
}

/// A matched reader's history cache, as seen by the delivery engine.
pub trait HistoryCacheStore: Send + Sync {
    fn store(&self, sample: &CachedSample) -> StoreOutcome;
}

#[derive(Clone)]
pub struct MatchedReader {
    pub guid: Guid,
    pub sertype: SerType,
    pub store: Arc<dyn HistoryCacheStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Dropped,
}

/// The shared retry loop (§4.7 "Retry"): a resource-limit rejection is
/// retried with a [`DELIVERY_RETRY_BACKOFF`] pause between attempts,
/// aborting as soon as either the reader or the source entity is no
/// longer present in `index` - both are read through the index rather
/// than cached, since a concurrent delete can remove either mid-retry.
pub fn deliver_with_retry(
    index: &EntityIndex,
    reader_guid: Guid,
    source_guid: Guid,
    store: &dyn HistoryCacheStore,
    sample: &CachedSample,
    mut sleep: impl FnMut(Duration),
) -> DeliveryOutcome {
    loop {
        match store.store(sample) {
            StoreOutcome::Stored => return DeliveryOutcome::Delivered,
            StoreOutcome::RejectedPermanently => return DeliveryOutcome::Dropped,
            StoreOutcome::RejectedResourceLimit => {
                if index.lookup_by_guid(&reader_guid).is_none() || index.lookup_by_guid(&source_guid).is_none() {
                    return DeliveryOutcome::Dropped;
                }
                sleep(DELIVERY_RETRY_BACKOFF);
            }
        }
    }
}

/// Slow path: used while the source entity is mid-delete. Walks
/// `reader_guids` by index lookup (rather than trusting a cached
/// reader array) so a reader removed concurrently is simply skipped,
/// and shares one [`CachedSample`] per sertype across the whole walk.
pub fn deliver_slowpath(
    index: &EntityIndex,
    source_guid: Guid,
    reader_guids: &[Guid],
    sertype_of: impl Fn(Guid) -> SerType,
    store_of: impl Fn(Guid) -> Option<Arc<dyn HistoryCacheStore>>,
    raw: &Arc<[u8]>,
    mut sleep: impl FnMut(Duration),
) -> usize {
    let mut cache: HashMap<SerType, CachedSample> = HashMap::new();
    let mut delivered = 0;
    for &reader_guid in reader_guids {
        if index.lookup_by_guid(&reader_guid).is_none() {
            continue;
        }
        let Some(store) = store_of(reader_guid) else {
            continue;
        };
        let sertype = sertype_of(reader_guid);
        let sample = cache
            .entry(sertype)
            .or_insert_with(|| makesample(sertype, raw))
            .clone();
        if deliver_with_retry(index, reader_guid, source_guid, store.as_ref(), &sample, &mut sleep)
            == DeliveryOutcome::Delivered
        {
            delivered += 1;
        }
    }
    delivered
}

/// Fast path: `readers` is already a contiguous run grouped by
/// sertype, as produced by the reader-array in `fastpath_ok` state.
/// Each run's sample is computed once and shared across that run's
/// readers; a resource-limit rejection invokes `on_failure_fastpath`
/// (expected to make progress by sleeping or yielding) and retries in
/// place, aborting only when the reader or source has left `index`.
pub fn deliver_fastpath(
    readers: &[MatchedReader],
    raw: &Arc<[u8]>,
    index: &EntityIndex,
    source_guid: Guid,
    mut on_failure_fastpath: impl FnMut(),
) -> usize {
    let mut delivered = 0;
    let mut i = 0;
    while i < readers.len() {
        let sertype = readers[i].sertype;
        let mut j = i + 1;
        while j < readers.len() && readers[j].sertype == sertype {
            j += 1;
        }
        let sample = makesample(sertype, raw);
        for reader in &readers[i..j] {
            loop {
                match reader.store.store(&sample) {
                    StoreOutcome::Stored => {
                        delivered += 1;
                        break;
                    }
                    StoreOutcome::RejectedPermanently => break,
                    StoreOutcome::RejectedResourceLimit => {
                        if index.lookup_by_guid(&reader.guid).is_none()
                            || index.lookup_by_guid(&source_guid).is_none()
                        {
                            break;
                        }
                        on_failure_fastpath();
                    }
                }
            }
        }
        i = j;
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{Entity, EntityKind};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration as StdDuration;

    struct ScriptedStore {
        outcomes: Mutex<VecDeque<StoreOutcome>>,
        calls: Mutex<u32>,
    }

    impl ScriptedStore {
        fn new(outcomes: Vec<StoreOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            *self.calls.lock()
        }
    }

    impl HistoryCacheStore for ScriptedStore {
        fn store(&self, _sample: &CachedSample) -> StoreOutcome {
            *self.calls.lock() += 1;
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or(StoreOutcome::Stored)
        }
    }

    fn entity(n: u8) -> Arc<Entity> {
        Arc::new(Entity::new(
            Guid::new([n; 12], [0, 0, 0, n]),
            EntityKind::Reader,
            None,
            "chatter",
            false,
            StdDuration::from_secs(0),
        ))
    }

    #[test]
    fn fastpath_delivers_and_reuses_sample_within_a_run() {
        let index = EntityIndex::new();
        let source = entity(1);
        let r1 = entity(2);
        let r2 = entity(3);
        index.insert(source.clone()).unwrap();
        index.insert(r1.clone()).unwrap();
        index.insert(r2.clone()).unwrap();

        let s1 = ScriptedStore::new(vec![StoreOutcome::Stored]);
        let s2 = ScriptedStore::new(vec![StoreOutcome::Stored]);
        let readers = vec![
            MatchedReader { guid: r1.guid, sertype: 7, store: s1.clone() },
            MatchedReader { guid: r2.guid, sertype: 7, store: s2.clone() },
        ];
        let raw: Arc<[u8]> = Arc::from(vec![1, 2, 3]);
        let mut hooks = 0;
        let delivered = deliver_fastpath(&readers, &raw, &index, source.guid, || hooks += 1);
        assert_eq!(delivered, 2);
        assert_eq!(hooks, 0);
        assert_eq!(s1.call_count(), 1);
        assert_eq!(s2.call_count(), 1);
    }

    #[test]
    fn fastpath_retries_resource_limit_then_succeeds() {
        let index = EntityIndex::new();
        let source = entity(1);
        let reader = entity(2);
        index.insert(source.clone()).unwrap();
        index.insert(reader.clone()).unwrap();

        let store = ScriptedStore::new(vec![
            StoreOutcome::RejectedResourceLimit,
            StoreOutcome::RejectedResourceLimit,
            StoreOutcome::Stored,
        ]);
        let readers = vec![MatchedReader {
            guid: reader.guid,
            sertype: 1,
            store: store.clone(),
        }];
        let raw: Arc<[u8]> = Arc::from(vec![9]);
        let mut hooks = 0;
        let delivered = deliver_fastpath(&readers, &raw, &index, source.guid, || hooks += 1);
        assert_eq!(delivered, 1);
        assert_eq!(hooks, 2);
    }

    #[test]
    fn fastpath_aborts_when_reader_leaves_index() {
        let index = EntityIndex::new();
        let source = entity(1);
        let reader = entity(2);
        index.insert(source.clone()).unwrap();
        index.insert(reader.clone()).unwrap();
        index.remove(&reader.guid);

        let store = ScriptedStore::new(vec![StoreOutcome::RejectedResourceLimit]);
        let readers = vec![MatchedReader {
            guid: reader.guid,
            sertype: 1,
            store: store.clone(),
        }];
        let raw: Arc<[u8]> = Arc::from(vec![9]);
        let delivered = deliver_fastpath(&readers, &raw, &index, source.guid, || {});
        assert_eq!(delivered, 0);
        assert_eq!(store.call_count(), 1);
    }

    #[test]
    fn slowpath_skips_readers_no_longer_in_index() {
        let index = EntityIndex::new();
        let source = entity(1);
        let reader = entity(2);
        index.insert(source.clone()).unwrap();
        // Reader GUID named but never inserted (already removed by a
        // concurrent delete).
        let store = ScriptedStore::new(vec![]);
        let raw: Arc<[u8]> = Arc::from(vec![5]);
        let delivered = deliver_slowpath(
            &index,
            source.guid,
            &[reader.guid],
            |_| 1,
            move |_| Some(store.clone() as Arc<dyn HistoryCacheStore>),
            &raw,
            |_| {},
        );
        assert_eq!(delivered, 0);
    }

    #[test]
    fn retry_drops_when_source_leaves_index_mid_retry() {
        let index = EntityIndex::new();
        let source = entity(1);
        let reader = entity(2);
        index.insert(source.clone()).unwrap();
        index.insert(reader.clone()).unwrap();
        index.remove(&source.guid);

        let store = ScriptedStore::new(vec![StoreOutcome::RejectedResourceLimit]);
        let sample = makesample(1, &Arc::from(vec![1]));
        let outcome = deliver_with_retry(&index, reader.guid, source.guid, store.as_ref(), &sample, |_| {});
        assert_eq!(outcome, DeliveryOutcome::Dropped);
    }
}
