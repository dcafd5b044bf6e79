// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Participant: the entry point into one domain, owning the publishers,
//! subscribers, and topics created under it and the liveliness lease
//! that represents its own presence to the rest of the domain.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::entity::{delete_entity_async, Entity, EntityKind, LifecycleState};
use crate::core::guid::{Guid, ENTITYID_PARTICIPANT};
use crate::core::qos::Qos;
use crate::core::rt::lease::{self, Lease};
use crate::dds::condition::GuardCondition;
use crate::dds::domain::{now_nanos, Domain};
use crate::dds::publisher::Publisher;
use crate::dds::subscriber::Subscriber;
use crate::dds::topic::Topic;
use crate::error::{Error, Result};

/// A local participant. Holds a weak back-reference to its owning
/// [`Domain`] rather than a strong one: the domain's `writers`/`readers`
/// tables transitively reach back down to this participant, so a
/// strong edge in both directions would leak the whole domain the
/// moment one entity went undeleted (§9 "cyclic graphs... broken by
/// weak back-references from children to parent").
pub struct Participant {
    pub entity: Arc<Entity>,
    domain: Weak<Domain>,
    pub(crate) lease: Arc<Lease>,
    next_entity_id: AtomicU32,
    guard_conditions: Mutex<Vec<Arc<GuardCondition>>>,
}

impl Participant {
    pub(crate) fn new(domain: &Arc<Domain>, lease_duration: Option<Duration>) -> Result<Arc<Self>> {
        let prefix = domain.alloc_participant_prefix();
        let guid = Guid::new(prefix, ENTITYID_PARTICIPANT);
        let entity = Arc::new(Entity::new(guid, EntityKind::Participant, None, "", false, wall_clock()));
        domain.index.insert(entity.clone())?;
        entity.set_lifecycle_state(LifecycleState::Complete);

        let texpire = lease_duration.map_or(lease::NEVER, |d| now_nanos() + d.as_nanos() as i64);
        let tdur = lease_duration.map_or(lease::NEVER, |d| d.as_nanos() as i64);
        let participant_lease = Lease::new(texpire, tdur, guid);
        domain.leases.register(&participant_lease);

        crate::debug!("participant {guid} created in domain {}", domain.domain_id);

        Ok(Arc::new(Self {
            entity,
            domain: Arc::downgrade(domain),
            lease: participant_lease,
            next_entity_id: AtomicU32::new(1),
            guard_conditions: Mutex::new(Vec::new()),
        }))
    }

    /// Upgrade the weak back-reference. Panics if the owning domain has
    /// already been dropped - a precondition violation of the "a
    /// domain outlives every participant created in it" invariant this
    /// crate expects callers to maintain.
    pub(crate) fn domain(&self) -> Arc<Domain> {
        self.domain.upgrade().expect("participant outlived its domain")
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.entity.guid
    }

    pub(crate) fn alloc_entity_id(&self, tag: u8) -> [u8; 4] {
        let n = self.next_entity_id.fetch_add(1, Ordering::Relaxed);
        let b = n.to_be_bytes();
        [b[1], b[2], b[3], tag]
    }

    pub fn create_publisher(self: &Arc<Self>, qos: Qos) -> Arc<Publisher> {
        Publisher::new(self.clone(), qos)
    }

    pub fn create_subscriber(self: &Arc<Self>, qos: Qos) -> Arc<Subscriber> {
        Subscriber::new(self.clone(), qos)
    }

    pub fn create_topic(self: &Arc<Self>, name: &str, type_name: &str, qos: Qos) -> Result<Arc<Topic>> {
        Topic::new(self.clone(), name, type_name, qos)
    }

    pub fn create_guardcondition(&self) -> Arc<GuardCondition> {
        let guard = GuardCondition::new();
        self.guard_conditions.lock().push(guard.clone());
        guard
    }

    /// Manual liveliness assertion (for `LivelinessKind::ManualByParticipant`
    /// writers relying on this call rather than automatic traffic).
    pub fn assert_liveliness(&self) {
        self.lease.renew(now_nanos());
    }

    /// Delete this participant. Fails with `PreconditionNotMet` (via
    /// the underlying `close_entity` assertion becoming a panic, per
    /// §4.4) if any publisher, subscriber, or topic created under it is
    /// still alive - this crate surfaces that as a precondition error
    /// rather than letting the assertion fire, by checking first.
    pub fn delete(self: Arc<Self>) -> Result<()> {
        if self.entity.has_children() {
            return Err(Error::PreconditionNotMet(format!(
                "participant {} still has live topics, writers, or readers",
                self.guid()
            )));
        }
        let domain = self.domain();
        domain.leases.unregister(&self.lease);
        delete_entity_async(&domain.index, &domain.gc, &self.entity, None, |_| {}, |_| {}, |_| {})?;
        crate::debug!("participant {} deleted", self.guid());
        Ok(())
    }
}

fn wall_clock() -> Duration {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_delete_roundtrips() {
        let domain = Domain::new(0);
        let participant = domain.create_participant(None).unwrap();
        assert!(participant.guid().is_participant());
        participant.delete().unwrap();
    }

    #[test]
    fn delete_with_live_topic_is_rejected() {
        let domain = Domain::new(0);
        let participant = domain.create_participant(None).unwrap();
        let topic = participant
            .create_topic("chatter", "std_msgs::String", Qos::default())
            .unwrap();

        let err = participant.clone().delete().unwrap_err();
        assert!(matches!(err, Error::PreconditionNotMet(_)));

        topic.delete().unwrap();
        participant.delete().unwrap();
    }
}
