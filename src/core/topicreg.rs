// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic definition registry (§4.10, `topic-registry` feature): an
//! MD5-keyed hash table sharing one topic definition (type, QoS) between
//! every local and proxy topic that announces the same pair - regardless
//! of what name either side calls the topic, which is why the topic
//! name itself never enters the key.

use std::sync::Arc;

use dashmap::DashMap;
use md5::{Digest, Md5};
use parking_lot::Mutex;

use crate::core::qos::{DestinationOrderKind, DurabilityKind, History, LivelinessKind, OwnershipKind, Qos, ReliabilityKind};
use crate::core::typelib::TypeId;
use crate::error::{Error, Result};

/// `MD5(serialized(TypeID) ++ serialized(QoS minus type-information))`
/// (§3, §4.10). Two registrations sharing a type and QoS land on the
/// same key even under different topic names or domains - that sharing
/// is the entire point of this registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopicKey([u8; 16]);

impl TopicKey {
    #[must_use]
    pub fn compute(type_id: TypeId, qos: &Qos) -> Self {
        let mut hasher = Md5::new();
        hasher.update(type_id.as_bytes());
        hasher.update(serialize_qos(qos));
        let result = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&result[..16]);
        Self(bytes)
    }
}

/// Deterministic byte encoding of every policy field `Qos` carries,
/// `present`/`aliased` included. There is no type-identity field on
/// `Qos` itself to strip - "minus type-information" just means the
/// `TypeID` is hashed as its own, separate component rather than folded
/// in here (§3).
fn serialize_qos(qos: &Qos) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&qos.present.to_le_bytes());
    buf.extend_from_slice(&qos.aliased.to_le_bytes());
    buf.push(match qos.reliability {
        ReliabilityKind::BestEffort => 0,
        ReliabilityKind::Reliable => 1,
    });
    buf.extend_from_slice(&(qos.max_blocking_time.as_nanos() as u64).to_le_bytes());
    buf.push(match qos.durability {
        DurabilityKind::Volatile => 0,
        DurabilityKind::TransientLocal => 1,
        DurabilityKind::Transient => 2,
        DurabilityKind::Persistent => 3,
    });
    match qos.history {
        History::KeepLast(depth) => {
            buf.push(0);
            buf.extend_from_slice(&depth.to_le_bytes());
        }
        History::KeepAll => buf.push(1),
    }
    serialize_optional_duration(&mut buf, qos.deadline);
    buf.push(match qos.liveliness_kind {
        LivelinessKind::Automatic => 0,
        LivelinessKind::ManualByParticipant => 1,
        LivelinessKind::ManualByTopic => 2,
    });
    serialize_optional_duration(&mut buf, qos.liveliness_lease_duration);
    buf.push(match qos.ownership {
        OwnershipKind::Shared => 0,
        OwnershipKind::Exclusive => 1,
    });
    buf.extend_from_slice(&qos.ownership_strength.to_le_bytes());
    buf.extend_from_slice(&(qos.partitions.len() as u32).to_le_bytes());
    for partition in qos.partitions.iter() {
        buf.extend_from_slice(&(partition.len() as u32).to_le_bytes());
        buf.extend_from_slice(partition.as_bytes());
    }
    buf.extend_from_slice(&(qos.user_data.len() as u32).to_le_bytes());
    buf.extend_from_slice(&qos.user_data);
    serialize_optional_duration(&mut buf, qos.lifespan);
    buf.push(match qos.destination_order {
        DestinationOrderKind::ByReceptionTimestamp => 0,
        DestinationOrderKind::BySourceTimestamp => 1,
    });
    match qos.resource_limits_max_samples {
        Some(max) => {
            buf.push(1);
            buf.extend_from_slice(&max.to_le_bytes());
        }
        None => buf.push(0),
    }
    buf
}

fn serialize_optional_duration(buf: &mut Vec<u8>, duration: Option<std::time::Duration>) {
    match duration {
        Some(d) => {
            buf.push(1);
            buf.extend_from_slice(&(d.as_nanos() as u64).to_le_bytes());
        }
        None => buf.push(0),
    }
}

struct TopicDefinition {
    refcount: u32,
    type_name: Box<str>,
    qos: Arc<Qos>,
}

/// One registry instance is shared by every domain participant in the
/// process (§4.10 groups local and proxy topics into a single table).
#[derive(Default)]
pub struct TopicRegistry {
    definitions: DashMap<TopicKey, Mutex<TopicDefinition>>,
}

impl TopicRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference an existing definition for `(type_id, qos)`, or
    /// construct one if this is the first registration. Because the key
    /// is derived from the QoS itself, two registrations landing on the
    /// same key are, short of an MD5 collision, already guaranteed to
    /// agree on QoS - there is no "first registrant wins" case to fall
    /// into here, unlike a name-keyed registry.
    pub fn new_topic(&self, type_id: TypeId, type_name: &str, qos: Qos) -> Result<(TopicKey, Arc<Qos>)> {
        let key = TopicKey::compute(type_id, &qos);
        let entry = self.definitions.entry(key).or_insert_with(|| {
            Mutex::new(TopicDefinition {
                refcount: 0,
                type_name: Box::from(type_name),
                qos: Arc::new(qos),
            })
        });
        let mut def = entry.lock();
        def.refcount += 1;
        Ok((key, def.qos.clone()))
    }

    /// Drop one reference. Returns `true` if this was the last one,
    /// in which case the definition is removed from the table.
    pub fn release_topic(&self, key: TopicKey) -> bool {
        let Some(entry) = self.definitions.get(&key) else {
            return false;
        };
        let last = {
            let mut def = entry.lock();
            assert!(def.refcount > 0, "topic definition refcount underflow");
            def.refcount -= 1;
            def.refcount == 0
        };
        drop(entry);
        if last {
            self.definitions.remove(&key);
        }
        last
    }

    #[must_use]
    pub fn qos(&self, key: TopicKey) -> Option<Arc<Qos>> {
        self.definitions.get(&key).map(|e| e.lock().qos.clone())
    }

    #[must_use]
    pub fn type_name(&self, key: TopicKey) -> Option<Box<str>> {
        self.definitions.get(&key).map(|e| e.lock().type_name.clone())
    }

    /// Atomically swap `key`'s QoS, then invoke `on_updated` with the
    /// new snapshot - the caller's hook to publish the builtin
    /// topic-qos-changed event and trigger the new-topic version
    /// broadcast (§4.10).
    pub fn update_topic_qos(&self, key: TopicKey, new_qos: Qos, mut on_updated: impl FnMut(TopicKey, &Qos)) -> Result<()> {
        let Some(entry) = self.definitions.get(&key) else {
            return Err(Error::PreconditionNotMet(format!(
                "update_topic_qos on unknown topic key {:02x?}",
                key.0
            )));
        };
        let snapshot = {
            let mut def = entry.lock();
            def.qos = Arc::new(new_qos);
            def.qos.clone()
        };
        on_updated(key, &snapshot);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
