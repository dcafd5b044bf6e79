// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entity index (§4.3): O(1) GUID lookup via a concurrent hash table,
//! plus ordered enumeration by `(kind, topic_name, guid)` for
//! discovery matching.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use super::epoch::{AwakeGuard, EpochRegistry};
use super::{Entity, EntityKind};
use crate::core::guid::Guid;
use crate::error::{Error, Result};

type TreeKey = (EntityKind, Box<str>, Guid);

/// Single structure per domain providing GUID lookup and ordered
/// enumeration. Cheap to clone (wraps `Arc`-shared maps internally
/// would be the usual move, but callers in this crate hold the index
/// itself behind an `Arc<Domain>`, so plain ownership is simplest).
pub struct EntityIndex {
    by_guid: DashMap<Guid, Arc<Entity>>,
    tree: RwLock<BTreeMap<TreeKey, Arc<Entity>>>,
    epochs: EpochRegistry,
}

impl Default for EntityIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_guid: DashMap::new(),
            tree: RwLock::new(BTreeMap::new()),
            epochs: EpochRegistry::new(),
        }
    }

    fn tree_key(entity: &Entity) -> TreeKey {
        (entity.kind, entity.topic_name.clone(), entity.guid)
    }

    /// Insert a newly constructed entity. Fatal (per §7, "duplicate
    /// insertion into an index") if the GUID is already present.
    pub fn insert(&self, entity: Arc<Entity>) -> Result<()> {
        if self.by_guid.contains_key(&entity.guid) {
            return Err(Error::internal(format!(
                "duplicate entity index insertion for {}",
                entity.guid
            )));
        }
        self.tree.write().insert(Self::tree_key(&entity), entity.clone());
        self.by_guid.insert(entity.guid, entity);
        Ok(())
    }

    /// Remove an entity, making it invisible to future lookups and
    /// enumeration. Entities obtained from an enumeration that started
    /// before this call remain valid for the calling thread's current
    /// awake period (§4.3).
    pub fn remove(&self, guid: &Guid) -> Option<Arc<Entity>> {
        let entity = self.by_guid.remove(guid).map(|(_, e)| e)?;
        self.tree.write().remove(&Self::tree_key(&entity));
        Some(entity)
    }

    #[must_use]
    pub fn lookup_by_guid(&self, guid: &Guid) -> Option<Arc<Entity>> {
        self.by_guid.get(guid).map(|e| e.clone())
    }

    /// Mark the calling thread awake; hold the guard for as long as
    /// entities returned by `enumerate_topic`/`enumerate_prefix` in
    /// this traversal are dereferenced.
    #[must_use]
    pub fn enter(&self) -> AwakeGuard<'_> {
        self.epochs.enter()
    }

    /// Block until every thread awake at call time has made progress.
    /// The GC calls this between removing an entity from the index and
    /// physically freeing it.
    pub fn barrier(&self) {
        self.epochs.barrier();
    }

    /// All entities of `kind` on `topic_name`, ordered by GUID.
    #[must_use]
    pub fn enumerate_topic(&self, kind: EntityKind, topic_name: &str) -> Vec<Arc<Entity>> {
        let lo = (kind, Box::from(topic_name), Guid::zero());
        let hi = (kind, Box::from(topic_name), Guid::new([0xff; 12], [0xff; 4]));
        self.tree
            .read()
            .range(lo..=hi)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// As `enumerate_topic`, further restricted to entities whose GUID
    /// shares `prefix` (i.e. belong to one participant).
    #[must_use]
    pub fn enumerate_prefix(
        &self,
        kind: EntityKind,
        topic_name: &str,
        prefix: &[u8; 12],
    ) -> Vec<Arc<Entity>> {
        self.enumerate_topic(kind, topic_name)
            .into_iter()
            .filter(|e| &e.guid.prefix == prefix)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_guid.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_guid.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entity(n: u8, kind: EntityKind, topic: &str) -> Arc<Entity> {
        Arc::new(Entity::new(
            Guid::new([n; 12], [0, 0, 0, n]),
            kind,
            None,
            topic,
            false,
            Duration::from_secs(0),
        ))
    }

    #[test]
    fn lookup_returns_exact_match() {
        let index = EntityIndex::new();
        let e = entity(1, EntityKind::Reader, "chatter");
        let guid = e.guid;
        index.insert(e).unwrap();
        let found = index.lookup_by_guid(&guid).unwrap();
        assert_eq!(found.guid, guid);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let index = EntityIndex::new();
        let e1 = entity(1, EntityKind::Reader, "chatter");
        let e2 = entity(1, EntityKind::Reader, "chatter");
        index.insert(e1).unwrap();
        assert!(index.insert(e2).is_err());
    }

    #[test]
    fn enumerate_topic_is_scoped_and_ordered() {
        let index = EntityIndex::new();
        index.insert(entity(2, EntityKind::Reader, "chatter")).unwrap();
        index.insert(entity(1, EntityKind::Reader, "chatter")).unwrap();
        index.insert(entity(5, EntityKind::Reader, "other")).unwrap();
        index.insert(entity(3, EntityKind::Writer, "chatter")).unwrap();

        let readers = index.enumerate_topic(EntityKind::Reader, "chatter");
        assert_eq!(readers.len(), 2);
        assert!(readers[0].guid.prefix[0] < readers[1].guid.prefix[0]);
    }

    #[test]
    fn remove_drops_from_both_structures() {
        let index = EntityIndex::new();
        let e = entity(9, EntityKind::Topic, "chatter");
        let guid = e.guid;
        index.insert(e).unwrap();
        index.remove(&guid);
        assert!(index.lookup_by_guid(&guid).is_none());
        assert!(index.enumerate_topic(EntityKind::Topic, "chatter").is_empty());
    }
}
