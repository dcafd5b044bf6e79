// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two-phase delete protocol (§4.4): `close_entity` runs synchronously
//! on the caller's thread and makes the entity invisible to matching;
//! `collect_entity` runs on the GC thread after a thread-progress
//! barrier and frees what `close_entity` could not safely touch while
//! other threads might still be enumerating the index.

use std::sync::Arc;

use super::gc::{Gc, GcAction};
use super::index::EntityIndex;
use super::{Entity, LifecycleState};
use crate::error::{Error, Result};

/// Outcome of a `close_entity` call that did not abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Closed,
}

/// Steps 1-4 of §4.4's delete protocol: detach from the parent,
/// publish the builtin "deleted" event, remove from the entity index,
/// and run the entity's own `close` hook. Returns
/// `PreconditionNotMet` if `entity` is already closing or deleted.
///
/// Panics if `entity` still has live children - per §7 this is a fatal
/// assertion, not a recoverable error: "deletion of an entity with
/// still-living children".
pub fn close_entity(
    index: &EntityIndex,
    entity: &Arc<Entity>,
    parent: Option<&Arc<Entity>>,
    mut on_deleted_topic_event: impl FnMut(&Entity),
    mut close: impl FnMut(&Entity),
) -> Result<DeleteOutcome> {
    assert!(
        !entity.has_children(),
        "delete({}) with still-living children",
        entity.guid
    );

    match entity.lifecycle_state() {
        LifecycleState::Initializing | LifecycleState::Complete => {}
        _ => {
            return Err(Error::PreconditionNotMet(format!(
                "entity {} is already closing or deleted",
                entity.guid
            )))
        }
    }

    if let Some(parent) = parent {
        parent.remove_child(entity.guid);
    }

    on_deleted_topic_event(entity);
    index.remove(&entity.guid);
    entity.set_lifecycle_state(LifecycleState::Closing);

    close(entity);
    entity.set_lifecycle_state(LifecycleState::DeleteScheduled);

    Ok(DeleteOutcome::Closed)
}

/// Step 5: run after a thread-progress barrier on the GC thread. Frees
/// caches, detaches subscriptions, unregisters leases (via `collect`),
/// then releases the entity's reference to its parent.
pub fn collect_entity(
    index: &EntityIndex,
    entity: &Arc<Entity>,
    parent: Option<&Arc<Entity>>,
    mut collect: impl FnMut(&Entity),
) {
    index.barrier();
    collect(entity);
    entity.set_lifecycle_state(LifecycleState::Collected);
    if let Some(parent) = parent {
        parent.unpin();
    }
}

/// Convenience wrapper invoking `close_entity` then, synchronously,
/// `collect_entity`. Reserved for the implicitly created participant,
/// which "deletes synchronously" rather than going through the
/// asynchronous GC queue (§5 "Cancellation") - every other entity kind
/// goes through [`delete_entity_async`] instead.
pub fn delete_entity_sync(
    index: &EntityIndex,
    entity: &Arc<Entity>,
    parent: Option<&Arc<Entity>>,
    on_deleted_topic_event: impl FnMut(&Entity),
    close: impl FnMut(&Entity),
    collect: impl FnMut(&Entity),
) -> Result<DeleteOutcome> {
    let outcome = close_entity(index, entity, parent, on_deleted_topic_event, close)?;
    collect_entity(index, entity, parent, collect);
    Ok(outcome)
}

/// Close `entity` synchronously, then hand its collection off to `gc`
/// instead of running it inline (§5 "Cancellation": deletion is always
/// asynchronous to the caller, bar the implicit-participant carve-out
/// `delete_entity_sync` is reserved for). The entity is already
/// invisible to lookups and matching by the time this returns - only
/// the parent unpin and the caller's `collect` hook are deferred.
pub fn delete_entity_async(
    index: &EntityIndex,
    gc: &Gc,
    entity: &Arc<Entity>,
    parent: Option<&Arc<Entity>>,
    on_deleted_topic_event: impl FnMut(&Entity),
    close: impl FnMut(&Entity),
    collect: impl FnOnce(&Entity) + Send + 'static,
) -> Result<DeleteOutcome> {
    let outcome = close_entity(index, entity, parent, on_deleted_topic_event, close)?;
    gc.enqueue(
        entity.iid,
        GcAction::Collect {
            entity: entity.clone(),
            parent: parent.cloned(),
            collect: Box::new(collect),
        },
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::EntityKind;
    use crate::core::guid::Guid;
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
    fn delete_makes_entity_invisible_and_runs_hooks() {
        let index = EntityIndex::new();
        let parent = entity(1, EntityKind::Participant, "");
        let child = entity(2, EntityKind::Reader, "chatter");
        parent.add_child(child.guid);
        index.insert(parent.clone()).unwrap();
        index.insert(child.clone()).unwrap();

        let mut published = false;
        let mut closed = false;
        let mut collected = false;
        delete_entity_sync(
            &index,
            &child,
            Some(&parent),
            |_| published = true,
            |_| closed = true,
            |_| collected = true,
        )
        .unwrap();

        assert!(published && closed && collected);
        assert!(index.lookup_by_guid(&child.guid).is_none());
        assert!(!parent.children().contains(&child.guid));
        assert_eq!(child.lifecycle_state(), LifecycleState::Collected);
    }

    #[test]
    fn double_delete_is_precondition_not_met() {
        let index = EntityIndex::new();
        let e = entity(3, EntityKind::Topic, "chatter");
        index.insert(e.clone()).unwrap();
        delete_entity_sync(&index, &e, None, |_| {}, |_| {}, |_| {}).unwrap();
        let err = delete_entity_sync(&index, &e, None, |_| {}, |_| {}, |_| {}).unwrap_err();
        assert!(matches!(err, Error::PreconditionNotMet(_)));
    }

    #[test]
    #[should_panic(expected = "still-living children")]
    fn delete_with_living_children_aborts() {
        let index = EntityIndex::new();
        let parent = entity(4, EntityKind::Participant, "");
        let child = entity(5, EntityKind::Reader, "chatter");
        parent.add_child(child.guid);
        index.insert(parent.clone()).unwrap();
        let _ = close_entity(&index, &parent, None, |_| {}, |_| {});
    }
}
