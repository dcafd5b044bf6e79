// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Asynchronous collection queue (§4.4, §5): `close_entity` runs on the
//! caller's thread, but the actual frees in `collect_entity` are always
//! deferred onto this queue rather than run inline - the implicitly
//! created participant is the one exception, via
//! [`super::delete_entity_sync`]. `drain_ready` is a caller-driven pump,
//! in the same spirit as [`crate::core::rt::executor::TimedEventExecutor::run_once`]:
//! this crate never spawns a GC thread of its own (§4.1).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};

use super::index::EntityIndex;
use super::Entity;
use crate::core::handle::Iid;

/// What to run once a request's barrier has passed. Only variant today
/// is a deferred `collect_entity`; kept as an enum since the spec names
/// it `GcAction` and a second kind (e.g. batched proxy teardown) is a
/// plausible future addition.
pub enum GcAction {
    Collect {
        entity: Arc<Entity>,
        parent: Option<Arc<Entity>>,
        collect: Box<dyn FnOnce(&Entity) + Send>,
    },
}

/// One deferred collection. `barrier_epoch` records the queue's
/// generation at enqueue time; `drain_ready` only runs a request once
/// it has bumped the generation past this value and barriered the
/// index in between; that barrier call is what actually proves no
/// thread could still be dereferencing the entity (§5).
pub struct GcRequest {
    pub entity: Iid,
    pub barrier_epoch: u64,
    pub action: GcAction,
}

/// MPSC queue of deferred collections plus the generation counter
/// `barrier_epoch` is compared against.
pub struct Gc {
    sender: Sender<GcRequest>,
    receiver: Receiver<GcRequest>,
    generation: AtomicU64,
}

impl Default for Gc {
    fn default() -> Self {
        Self::new()
    }
}

impl Gc {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            sender,
            receiver,
            generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Queue `action` for collection under `entity`'s handle, stamped
    /// with the queue's current generation.
    pub fn enqueue(&self, entity: Iid, action: GcAction) {
        let barrier_epoch = self.generation();
        self.sender
            .send(GcRequest { entity, barrier_epoch, action })
            .expect("gc receiver dropped while its own sender is still alive");
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Run one collection pass: bump the generation, barrier `index`
    /// once (covering every request already queued - they were all
    /// enqueued at an older generation, by construction), then run
    /// every request pulled this pass. Requests enqueued concurrently
    /// with this call are left for the next one. Returns the number of
    /// requests collected.
    pub fn drain_ready(&self, index: &EntityIndex) -> usize {
        self.generation.fetch_add(1, Ordering::AcqRel);

        let mut pending = Vec::new();
        while let Ok(req) = self.receiver.try_recv() {
            pending.push(req);
        }
        if pending.is_empty() {
            return 0;
        }

        index.barrier();

        let collected = pending.len();
        for req in pending {
            let GcAction::Collect { entity, parent, collect } = req.action;
            let mut collect = Some(collect);
            super::lifecycle::collect_entity(index, &entity, parent.as_ref(), |e| {
                if let Some(c) = collect.take() {
                    c(e);
                }
            });
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{EntityKind, LifecycleState};
    use crate::core::guid::Guid;
    use std::sync::atomic::AtomicBool;
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
    fn drain_ready_with_an_empty_queue_does_nothing() {
        let index = EntityIndex::new();
        let gc = Gc::new();
        assert_eq!(gc.drain_ready(&index), 0);
    }

    #[test]
    fn enqueued_request_runs_its_collect_hook_and_unpins_the_parent() {
        let index = EntityIndex::new();
        let parent = entity(1, EntityKind::Participant, "");
        let child = entity(2, EntityKind::Topic, "chatter");
        parent.pin();
        parent.add_child(child.guid);
        index.insert(parent.clone()).unwrap();
        index.insert(child.clone()).unwrap();

        crate::core::entity::close_entity(&index, &child, Some(&parent), |_| {}, |_| {}).unwrap();

        let gc = Gc::new();
        let collected = Arc::new(AtomicBool::new(false));
        let collected_in_hook = collected.clone();
        gc.enqueue(
            child.iid,
            GcAction::Collect {
                entity: child.clone(),
                parent: Some(parent.clone()),
                collect: Box::new(move |_| collected_in_hook.store(true, Ordering::SeqCst)),
            },
        );
        assert_eq!(gc.pending_count(), 1);

        assert_eq!(gc.drain_ready(&index), 1);
        assert!(collected.load(Ordering::SeqCst));
        assert_eq!(child.lifecycle_state(), LifecycleState::Collected);
        assert_eq!(parent.refcount(), 1);
        assert_eq!(gc.pending_count(), 0);
    }

    #[test]
    fn a_second_drain_with_nothing_new_collects_nothing_more() {
        let index = EntityIndex::new();
        let gc = Gc::new();
        let e = entity(3, EntityKind::Topic, "chatter");
        index.insert(e.clone()).unwrap();
        crate::core::entity::close_entity(&index, &e, None, |_| {}, |_| {}).unwrap();
        gc.enqueue(
            e.iid,
            GcAction::Collect {
                entity: e.clone(),
                parent: None,
                collect: Box::new(|_| {}),
            },
        );
        assert_eq!(gc.drain_ready(&index), 1);
        assert_eq!(gc.drain_ready(&index), 0);
    }
}
