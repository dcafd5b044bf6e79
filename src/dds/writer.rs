// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DataWriter: the write side of one topic, holding the set of matched
//! readers' history caches (§4.5, §4.7) and the liveliness lease for
//! `ManualByTopic`/`ManualByParticipant` writers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::delivery::{deliver_fastpath, MatchedReader, SerType};
use crate::core::entity::{delete_entity_async, Entity, EntityKind, LifecycleState};
use crate::core::guid::Guid;
use crate::core::qos::{LivelinessKind, Qos};
use crate::core::rt::lease::{self, Lease};
use crate::dds::condition::{StatusMask, StatusTracker};
use crate::dds::domain::{kind_tag, now_nanos};
use crate::dds::matching::{match_new_writer, sertype_of};
use crate::dds::publisher::Publisher;
use crate::dds::topic::Topic;
use crate::error::Result;

pub struct DataWriter {
    pub entity: Arc<Entity>,
    pub type_name: Box<str>,
    pub(crate) sertype: SerType,
    pub publisher: Arc<Publisher>,
    pub topic: Arc<Topic>,
    lease: Option<Arc<Lease>>,
    matched: Mutex<Vec<MatchedReader>>,
    /// Remote readers matched via SEDP (§4.5) - separate from `matched`
    /// above, which is the local fastpath delivery target list.
    matched_proxy_readers: Mutex<Vec<Guid>>,
    status: StatusTracker,
}

impl DataWriter {
    pub(crate) fn new(publisher: Arc<Publisher>, topic: Arc<Topic>, qos: Qos) -> Result<Arc<Self>> {
        let participant = publisher.participant.clone();
        let domain = participant.domain();
        let entity_id = participant.alloc_entity_id(kind_tag::WRITER);
        let guid = Guid::new(participant.guid().prefix, entity_id);
        let entity = Arc::new(Entity::new(
            guid,
            EntityKind::Writer,
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

        let lease = if qos.liveliness_kind != LivelinessKind::Automatic {
            let tdur = qos.liveliness_lease_duration.map_or(lease::NEVER, |d| d.as_nanos() as i64);
            let l = Lease::new(now_nanos() + tdur, tdur, guid);
            domain.leases.register(&l);
            Some(l)
        } else {
            None
        };

        let writer = Arc::new(Self {
            entity,
            sertype: sertype_of(&topic.type_name),
            type_name: topic.type_name.clone(),
            publisher,
            topic,
            lease,
            matched: Mutex::new(Vec::new()),
            matched_proxy_readers: Mutex::new(Vec::new()),
            status: StatusTracker::new(),
        });

        domain.writers.insert(guid, writer.clone());
        match_new_writer(&domain, &writer);

        crate::debug!("writer {guid} created on topic '{}'", writer.topic.name());
        Ok(writer)
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.entity.guid
    }

    #[must_use]
    pub fn qos(&self) -> Qos {
        self.entity.qos()
    }

    pub(crate) fn add_matched(&self, reader: MatchedReader) {
        self.matched.lock().push(reader);
    }

    #[must_use]
    pub fn matched_reader_count(&self) -> usize {
        self.matched.lock().len()
    }

    pub(crate) fn add_matched_proxy_reader(&self, guid: Guid) {
        self.matched_proxy_readers.lock().push(guid);
    }

    #[must_use]
    pub(crate) fn matched_proxy_readers(&self) -> Vec<Guid> {
        self.matched_proxy_readers.lock().clone()
    }

    #[must_use]
    pub fn matched_proxy_reader_count(&self) -> usize {
        self.matched_proxy_readers.lock().len()
    }

    pub(crate) fn raise_status(&self, status: StatusMask) {
        self.status.raise(status);
    }

    /// Read and clear this writer's accumulated status events (§5 point 4).
    pub fn status_changes(&self) -> StatusMask {
        self.status.take()
    }

    /// Manual liveliness assertion for a writer whose QoS requires it
    /// rather than relying on automatic participant-level traffic.
    pub fn assert_liveliness(&self) {
        if let Some(lease) = &self.lease {
            lease.renew(now_nanos());
        }
    }

    /// Deliver one sample to every currently matched reader via the
    /// fast path (§4.7). Returns the number of readers the sample was
    /// actually stored in.
    pub fn write(&self, payload: impl Into<Arc<[u8]>>) -> usize {
        let domain = self.publisher.participant.domain();
        let raw = payload.into();
        let readers = self.matched.lock().clone();
        deliver_fastpath(&readers, &raw, &domain.index, self.guid(), || {
            std::thread::yield_now();
        })
    }

    pub fn delete(self: Arc<Self>) -> Result<()> {
        let domain = self.publisher.participant.domain();
        domain.writers.remove(&self.guid());
        if let Some(lease) = &self.lease {
            domain.leases.unregister(lease);
        }
        delete_entity_async(
            &domain.index,
            &domain.gc,
            &self.entity,
            Some(&self.publisher.participant.entity),
            |_| {},
            |_| {},
            |_| {},
        )?;
        crate::debug!("writer {} deleted", self.guid());
        Ok(())
    }
}

fn created_at() -> std::time::Duration {
    std::time::Duration::from_nanos(now_nanos().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dds::domain::Domain;

    #[test]
    fn matches_an_already_registered_compatible_reader() {
        let domain = Domain::new(0);
        let participant = domain.create_participant(None).unwrap();
        let publisher = participant.create_publisher(Qos::default());
        let subscriber = participant.create_subscriber(Qos::default());
        let topic = participant.create_topic("chatter", "std_msgs::String", Qos::default()).unwrap();

        let reader = subscriber.create_reader(&topic, Qos::default()).unwrap();
        let writer = publisher.create_writer(&topic, Qos::default()).unwrap();

        assert_eq!(writer.matched_reader_count(), 1);
        assert_eq!(reader.matched_writer_count(), 1);

        let delivered = writer.write(Arc::from(b"hello".to_vec()));
        assert_eq!(delivered, 1);
        assert_eq!(reader.take().len(), 1);

        publisher.delete_writer(&writer).unwrap();
        subscriber.delete_reader(&reader).unwrap();
        topic.delete().unwrap();
        participant.delete().unwrap();
    }

    #[test]
    fn incompatible_qos_never_matches() {
        let domain = Domain::new(0);
        let participant = domain.create_participant(None).unwrap();
        let publisher = participant.create_publisher(Qos::default());
        let subscriber = participant.create_subscriber(Qos::default());
        let topic = participant.create_topic("chatter", "std_msgs::String", Qos::default()).unwrap();

        let mut reliable_reader_qos = Qos::default();
        reliable_reader_qos.reliability = crate::core::qos::ReliabilityKind::Reliable;
        let reader = subscriber.create_reader(&topic, reliable_reader_qos).unwrap();
        let writer = publisher.create_writer(&topic, Qos::default()).unwrap(); // BestEffort

        assert_eq!(writer.matched_reader_count(), 0);
        assert_eq!(reader.matched_writer_count(), 0);

        publisher.delete_writer(&writer).unwrap();
        subscriber.delete_reader(&reader).unwrap();
        topic.delete().unwrap();
        participant.delete().unwrap();
    }
}
