// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic: the named, typed binding writers and readers match against.
//! Backed by a real [`Entity`] (§3 - topics are one of the indexed
//! entity kinds) and, with the `topic-registry` feature, a shared
//! [`TopicRegistry`](crate::core::topicreg::TopicRegistry) definition.

use std::sync::Arc;

use crate::core::entity::{delete_entity_async, Entity, EntityKind, LifecycleState};
use crate::core::qos::Qos;
#[cfg(feature = "topic-registry")]
use crate::core::typelib::TypeId;
use crate::dds::domain::{kind_tag, now_nanos};
use crate::dds::participant::Participant;
use crate::error::Result;

pub struct Topic {
    pub entity: Arc<Entity>,
    pub type_name: Box<str>,
    participant: Arc<Participant>,
    #[cfg(feature = "topic-registry")]
    registry_key: crate::core::topicreg::TopicKey,
}

impl Topic {
    pub(crate) fn new(participant: Arc<Participant>, name: &str, type_name: &str, qos: Qos) -> Result<Arc<Self>> {
        let domain = participant.domain();
        let entity_id = participant.alloc_entity_id(kind_tag::TOPIC);
        let guid = crate::core::guid::Guid::new(participant.guid().prefix, entity_id);
        let entity = Arc::new(Entity::new(
            guid,
            EntityKind::Topic,
            Some(participant.guid()),
            name,
            false,
            created_at(),
        ));
        entity.set_qos(qos.clone());
        domain.index.insert(entity.clone())?;
        participant.entity.pin();
        participant.entity.add_child(guid);
        entity.set_lifecycle_state(LifecycleState::Complete);

        #[cfg(feature = "topic-registry")]
        let registry_key = {
            let type_id = TypeId::from_representation(type_name.as_bytes());
            let (key, merged_qos) = domain.topics.new_topic(type_id, type_name, qos)?;
            entity.set_qos((*merged_qos).clone());
            key
        };

        crate::debug!("topic '{name}' ({type_name}) created under participant {}", participant.guid());

        Ok(Arc::new(Self {
            entity,
            type_name: type_name.into(),
            participant,
            #[cfg(feature = "topic-registry")]
            registry_key,
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.entity.topic_name
    }

    #[must_use]
    pub fn qos(&self) -> Qos {
        self.entity.qos()
    }

    pub fn delete(self: Arc<Self>) -> Result<()> {
        let domain = self.participant.domain();

        #[cfg(feature = "topic-registry")]
        domain.topics.release_topic(self.registry_key);

        delete_entity_async(
            &domain.index,
            &domain.gc,
            &self.entity,
            Some(&self.participant.entity),
            |_| {},
            |_| {},
            |_| {},
        )?;
        crate::debug!("topic '{}' deleted", self.name());
        Ok(())
    }
}

fn created_at() -> std::time::Duration {
    std::time::Duration::from_nanos(now_nanos().max(0) as u64)
}
