// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DataReader: the read side of one topic. Owns the bounded sample
//! cache [`HistoryCacheStore`] delivery writes into, the per-sample
//! lifespan schedule (§4.8), and the listener-exclusive notification
//! path (§5 point 4).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::core::delivery::{CachedSample, HistoryCacheStore, SerType, StoreOutcome};
use crate::core::entity::{delete_entity_async, Entity, EntityKind, LifecycleState};
use crate::core::guid::Guid;
use crate::core::lifespan::{self, LifespanHeap};
use crate::core::qos::{History, Qos};
use crate::core::rt::executor::{EventId, TimedEventExecutor};
use crate::core::rt::ListenerGate;
use crate::dds::condition::{StatusMask, StatusTracker};
use crate::dds::domain::{kind_tag, now_nanos};
use crate::dds::matching::{match_new_reader, sertype_of};
use crate::dds::subscriber::Subscriber;
use crate::dds::topic::Topic;
use crate::error::Result;

type Listener = Arc<dyn Fn() + Send + Sync>;

pub struct DataReader {
    pub entity: Arc<Entity>,
    pub type_name: Box<str>,
    pub(crate) sertype: SerType,
    pub subscriber: Arc<Subscriber>,
    pub topic: Arc<Topic>,
    cache: Mutex<VecDeque<Arc<[u8]>>>,
    data_available: AtomicBool,
    listener: Mutex<Option<Listener>>,
    gate: ListenerGate,
    matched_writers: Mutex<Vec<Guid>>,
    /// Remote writers matched via SEDP (§4.5), kept separate from
    /// `matched_writers` above: a proxy has no local `HistoryCacheStore`
    /// to deliver into, so it never becomes a fastpath delivery target.
    matched_proxy_writers: Mutex<Vec<Guid>>,
    status: StatusTracker,
    lifespan_heap: LifespanHeap<Arc<[u8]>>,
    lifespan_event: Mutex<Option<EventId>>,
}

impl DataReader {
    pub(crate) fn new(subscriber: Arc<Subscriber>, topic: Arc<Topic>, qos: Qos) -> Result<Arc<Self>> {
        let participant = subscriber.participant.clone();
        let domain = participant.domain();
        let entity_id = participant.alloc_entity_id(kind_tag::READER);
        let guid = Guid::new(participant.guid().prefix, entity_id);
        let entity = Arc::new(Entity::new(
            guid,
            EntityKind::Reader,
            Some(participant.guid()),
            topic.name(),
            false,
            created_at(),
        ));
        entity.set_qos(qos.clone());
        domain.index.insert(entity.clone())?;
        participant.entity.pin();
        participant.entity.add_child(guid);
        entity.set_lifecycle_state(LifecycleState::Complete);

        let reader = Arc::new(Self {
            entity,
            sertype: sertype_of(&topic.type_name),
            type_name: topic.type_name.clone(),
            subscriber,
            topic,
            cache: Mutex::new(VecDeque::new()),
            data_available: AtomicBool::new(false),
            listener: Mutex::new(None),
            gate: ListenerGate::new(),
            matched_writers: Mutex::new(Vec::new()),
            matched_proxy_writers: Mutex::new(Vec::new()),
            status: StatusTracker::new(),
            lifespan_heap: LifespanHeap::new(),
            lifespan_event: Mutex::new(None),
        });

        let initial = schedule_lifespan_round(domain.executor.clone(), Arc::downgrade(&reader), lifespan::NEVER);
        *reader.lifespan_event.lock() = Some(initial);

        domain.readers.insert(guid, reader.clone());
        match_new_reader(&domain, &reader);

        crate::debug!("reader {guid} created on topic '{}'", reader.topic.name());
        Ok(reader)
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.entity.guid
    }

    #[must_use]
    pub fn qos(&self) -> Qos {
        self.entity.qos()
    }

    #[must_use]
    pub fn data_available(&self) -> bool {
        self.data_available.load(Ordering::Acquire)
    }

    /// Install a listener, invoked exclusively (never concurrently with
    /// another invocation of the same listener) on every sample stored.
    pub fn set_listener(&self, cb: impl Fn() + Send + Sync + 'static) {
        *self.listener.lock() = Some(Arc::new(cb));
    }

    /// Take every currently resident sample, clearing `data_available`.
    pub fn take(&self) -> Vec<Arc<[u8]>> {
        let mut cache = self.cache.lock();
        self.data_available.store(false, Ordering::Release);
        cache.drain(..).collect()
    }

    /// Read every currently resident sample without removing them.
    #[must_use]
    pub fn read(&self) -> Vec<Arc<[u8]>> {
        self.cache.lock().iter().cloned().collect()
    }

    pub(crate) fn add_matched_writer(&self, guid: Guid) {
        self.matched_writers.lock().push(guid);
    }

    #[must_use]
    pub fn matched_writer_count(&self) -> usize {
        self.matched_writers.lock().len()
    }

    pub(crate) fn add_matched_proxy_writer(&self, guid: Guid) {
        self.matched_proxy_writers.lock().push(guid);
    }

    #[must_use]
    pub(crate) fn matched_proxy_writers(&self) -> Vec<Guid> {
        self.matched_proxy_writers.lock().clone()
    }

    #[must_use]
    pub fn matched_proxy_writer_count(&self) -> usize {
        self.matched_proxy_writers.lock().len()
    }

    pub(crate) fn raise_status(&self, status: StatusMask) {
        self.status.raise(status);
    }

    /// Read and clear this reader's accumulated status events (§5 point 4).
    pub fn status_changes(&self) -> StatusMask {
        self.status.take()
    }

    fn notify(&self) {
        let listener = self.listener.lock().clone();
        match listener {
            Some(cb) => self.gate.invoke_exclusive(|| cb()),
            None => self.subscriber.notify_data_on_readers(),
        }
    }

    fn expire_due_samples(&self, now: i64) {
        let expired = self.lifespan_heap.expire_due(now);
        if expired.is_empty() {
            return;
        }
        self.cache
            .lock()
            .retain(|sample| !expired.iter().any(|e| Arc::ptr_eq(sample, e)));
    }

    pub fn delete(self: Arc<Self>) -> Result<()> {
        let domain = self.subscriber.participant.domain();
        domain.readers.remove(&self.guid());
        if let Some(event) = *self.lifespan_event.lock() {
            domain.executor.delete(event);
        }
        delete_entity_async(
            &domain.index,
            &domain.gc,
            &self.entity,
            Some(&self.subscriber.participant.entity),
            |_| {},
            |_| {},
            |_| {},
        )?;
        crate::debug!("reader {} deleted", self.guid());
        Ok(())
    }
}

impl HistoryCacheStore for DataReader {
    fn store(&self, sample: &CachedSample) -> StoreOutcome {
        let qos = self.qos();
        {
            let mut cache = self.cache.lock();
            match qos.history {
                History::KeepLast(depth) => {
                    while cache.len() as u32 >= depth.max(1) {
                        cache.pop_front();
                    }
                }
                History::KeepAll => {
                    if let Some(max) = qos.resource_limits_max_samples {
                        if cache.len() as u32 >= max {
                            return StoreOutcome::RejectedResourceLimit;
                        }
                    }
                }
            }
            cache.push_back(sample.payload.clone());
        }

        if let Some(duration) = qos.lifespan {
            let expiry = now_nanos() + duration.as_nanos() as i64;
            let executor = self.subscriber.participant.domain().executor.clone();
            if let Some(event) = *self.lifespan_event.lock() {
                self.lifespan_heap
                    .register_sample(expiry, sample.payload.clone(), &executor, event);
            }
        }

        self.data_available.store(true, Ordering::Release);
        self.notify();
        StoreOutcome::Stored
    }
}

/// Self-rearming lifespan-expiry round, in the idiom of
/// [`crate::core::discovery::spdp::schedule_live_publish`]: each firing
/// expires whatever is due, then reschedules itself to the cache's new
/// minimum (or [`lifespan::NEVER`] if nothing else is pending).
fn schedule_lifespan_round(executor: Arc<TimedEventExecutor>, reader: Weak<DataReader>, tsched: i64) -> EventId {
    let next_executor = executor.clone();
    executor.schedule_callback(
        tsched,
        move |_| {
            let Some(reader) = reader.upgrade() else { return };
            reader.expire_due_samples(now_nanos());
            let next = reader.lifespan_heap.peek().unwrap_or(lifespan::NEVER);
            let id = schedule_lifespan_round(next_executor.clone(), Arc::downgrade(&reader), next);
            *reader.lifespan_event.lock() = Some(id);
        },
        false,
    )
}

fn created_at() -> std::time::Duration {
    std::time::Duration::from_nanos(now_nanos().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dds::domain::Domain;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn keep_last_evicts_the_oldest_sample() {
        let domain = Domain::new(0);
        let participant = domain.create_participant(None).unwrap();
        let subscriber = participant.create_subscriber(Qos::default());
        let topic = participant.create_topic("chatter", "t", Qos::default()).unwrap();

        let mut qos = Qos::default();
        qos.history = History::KeepLast(1);
        let reader = subscriber.create_reader(&topic, qos).unwrap();

        reader.store(&CachedSample { sertype: 0, payload: Arc::from(*b"a") });
        reader.store(&CachedSample { sertype: 0, payload: Arc::from(*b"b") });

        let samples = reader.take();
        assert_eq!(samples.len(), 1);
        assert_eq!(&*samples[0], b"b");

        subscriber.delete_reader(&reader).unwrap();
        topic.delete().unwrap();
        participant.delete().unwrap();
    }

    #[test]
    fn no_listener_falls_back_to_subscriber_data_on_readers() {
        let domain = Domain::new(0);
        let participant = domain.create_participant(None).unwrap();
        let subscriber = participant.create_subscriber(Qos::default());
        let topic = participant.create_topic("chatter", "t", Qos::default()).unwrap();
        let reader = subscriber.create_reader(&topic, Qos::default()).unwrap();

        reader.store(&CachedSample { sertype: 0, payload: Arc::from(*b"x") });
        assert!(subscriber.data_on_readers_condition().read());

        subscriber.delete_reader(&reader).unwrap();
        topic.delete().unwrap();
        participant.delete().unwrap();
    }

    #[test]
    fn listener_runs_instead_of_the_subscriber_fallback() {
        let domain = Domain::new(0);
        let participant = domain.create_participant(None).unwrap();
        let subscriber = participant.create_subscriber(Qos::default());
        let topic = participant.create_topic("chatter", "t", Qos::default()).unwrap();
        let reader = subscriber.create_reader(&topic, Qos::default()).unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let calls_cb = calls.clone();
        reader.set_listener(move || {
            calls_cb.fetch_add(1, Ordering::Relaxed);
        });

        reader.store(&CachedSample { sertype: 0, payload: Arc::from(*b"x") });
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(!subscriber.data_on_readers_condition().read());

        subscriber.delete_reader(&reader).unwrap();
        topic.delete().unwrap();
        participant.delete().unwrap();
    }

    #[test]
    fn lifespan_expiry_removes_the_sample_from_the_cache() {
        let domain = Domain::new(0);
        let participant = domain.create_participant(None).unwrap();
        let subscriber = participant.create_subscriber(Qos::default());
        let topic = participant.create_topic("chatter", "t", Qos::default()).unwrap();

        let mut qos = Qos::default();
        qos.lifespan = Some(std::time::Duration::from_nanos(1));
        let reader = subscriber.create_reader(&topic, qos).unwrap();

        reader.store(&CachedSample { sertype: 0, payload: Arc::from(*b"x") });
        assert_eq!(reader.read().len(), 1);

        domain.run_once(now_nanos() + 1_000_000_000);
        assert_eq!(reader.read().len(), 0);

        subscriber.delete_reader(&reader).unwrap();
        topic.delete().unwrap();
        participant.delete().unwrap();
    }
}
