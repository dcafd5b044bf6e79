// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entity common header, tree, two-phase delete, the GUID index, and
//! the awake/asleep epoch mechanism guarding safe enumeration (§3,
//! §4.3, §4.4).

pub mod epoch;
pub mod gc;
pub mod index;
pub mod lifecycle;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::guid::Guid;
use crate::core::handle::Iid;
use crate::core::qos::Qos;

pub use gc::{Gc, GcAction, GcRequest};
pub use index::EntityIndex;
pub use lifecycle::{close_entity, collect_entity, delete_entity_async, delete_entity_sync, DeleteOutcome};

/// What an [`Entity`] is. High bits of the GUID's entity id encode the
/// same distinction on the wire; this is the in-process tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Participant,
    ProxyParticipant,
    Topic,
    Writer,
    Reader,
    ProxyWriter,
    ProxyReader,
}

impl EntityKind {
    /// True for the two kinds representing a remote counterpart
    /// discovered over SEDP rather than created locally.
    #[must_use]
    pub fn is_proxy(self) -> bool {
        matches!(
            self,
            EntityKind::ProxyParticipant | EntityKind::ProxyWriter | EntityKind::ProxyReader
        )
    }

    #[must_use]
    pub fn is_endpoint(self) -> bool {
        matches!(
            self,
            EntityKind::Writer | EntityKind::Reader | EntityKind::ProxyWriter | EntityKind::ProxyReader
        )
    }
}

/// Lifecycle state machine driving the two-phase delete protocol of
/// §4.4: *init → complete → close → delete scheduled → collect*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Initializing,
    Complete,
    Closing,
    DeleteScheduled,
    Collected,
}

struct MutableState {
    lifecycle: LifecycleState,
    children: Vec<Guid>,
}

/// Every live object in the entity tree carries this header. `qos` is
/// guarded by its own lock distinct from `state`, so a snapshot reader
/// can read QoS without taking the broader state lock (§3, §5
/// "Shared resources").
pub struct Entity {
    pub guid: Guid,
    pub kind: EntityKind,
    pub iid: Iid,
    pub created_at: Duration,
    pub onlylocal: bool,
    pub parent: Option<Guid>,
    pub topic_name: Box<str>,

    state: Mutex<MutableState>,
    qos: Mutex<Qos>,
    refcount: AtomicU32,
    pincount: AtomicU32,
}

impl Entity {
    #[must_use]
    pub fn new(
        guid: Guid,
        kind: EntityKind,
        parent: Option<Guid>,
        topic_name: impl Into<Box<str>>,
        onlylocal: bool,
        created_at: Duration,
    ) -> Self {
        Self {
            guid,
            kind,
            iid: Iid::allocate(),
            created_at,
            onlylocal,
            parent,
            topic_name: topic_name.into(),
            state: Mutex::new(MutableState {
                lifecycle: LifecycleState::Initializing,
                children: Vec::new(),
            }),
            qos: Mutex::new(Qos::default()),
            refcount: AtomicU32::new(1),
            pincount: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.state.lock().lifecycle
    }

    pub fn set_lifecycle_state(&self, state: LifecycleState) {
        self.state.lock().lifecycle = state;
    }

    /// True once `guid` must no longer be returned by entity-index
    /// lookups or enumeration (§3 invariant: "a live GUID is present
    /// in the entity index iff the entity has not begun closing").
    #[must_use]
    pub fn is_visible(&self) -> bool {
        matches!(
            self.lifecycle_state(),
            LifecycleState::Initializing | LifecycleState::Complete
        )
    }

    #[must_use]
    pub fn qos(&self) -> Qos {
        self.qos.lock().clone()
    }

    pub fn set_qos(&self, qos: Qos) {
        *self.qos.lock() = qos;
    }

    pub fn add_child(&self, child: Guid) {
        self.state.lock().children.push(child);
    }

    pub fn remove_child(&self, child: Guid) {
        self.state.lock().children.retain(|&g| g != child);
    }

    #[must_use]
    pub fn children(&self) -> Vec<Guid> {
        self.state.lock().children.clone()
    }

    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.state.lock().children.is_empty()
    }

    /// Acquire a strong reference. A child's existence implies a pin
    /// on its parent (§3 invariant); callers establishing a
    /// parent/child edge must pin the parent first.
    pub fn pin(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Release a strong reference. Returns the count *after* the
    /// release; reaching zero means the entity is ready to be handed
    /// to the GC queue. Panics (fatal per §7) on negative refcount.
    pub fn unpin(&self) -> u32 {
        let prev = self.refcount.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "entity refcount underflow");
        prev - 1
    }

    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }
}
