// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-domain singleton (§9 "global mutable state"): the entity index,
//! lease heap, timed-event executor, and discovery tables every
//! participant created in this domain shares.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::RuntimeConfig;
use crate::core::discovery::proxy::AddressSet;
use crate::core::discovery::sedp::SedpAnnouncement;
use crate::core::discovery::{DependencyTable, ProxyEndpoint, SpdpLocatorTable};
use crate::core::entity::{EntityIndex, Gc};
use crate::core::guid::Guid;
use crate::core::rt::{LeaseHeap, TimedEventExecutor};
#[cfg(feature = "topic-registry")]
use crate::core::topicreg::TopicRegistry;
#[cfg(feature = "xtypes")]
use crate::core::typelib::TypeLibrary;
use crate::dds::participant::Participant;
use crate::dds::reader::DataReader;
use crate::dds::writer::DataWriter;
use crate::error::Result;

/// Byte written into the high bits of an entity id to keep locally
/// allocated ids distinct per `EntityKind` (§3's "high bits of the
/// entity id encode entity kind").
pub(crate) mod kind_tag {
    pub const TOPIC: u8 = 0x01;
    pub const WRITER: u8 = 0x02;
    pub const READER: u8 = 0x03;
}

/// One domain's worth of shared singletons. Created once per domain id
/// in a process and torn down synchronously, in the fixed order the
/// spec prescribes (§9 "Global mutable state").
pub struct Domain {
    pub domain_id: u32,
    pub(crate) index: EntityIndex,
    pub(crate) gc: Gc,
    pub(crate) leases: LeaseHeap,
    pub(crate) executor: Arc<TimedEventExecutor>,
    pub(crate) spdp_locators: SpdpLocatorTable,
    pub(crate) dependencies: Arc<DependencyTable>,
    #[cfg(feature = "topic-registry")]
    pub(crate) topics: TopicRegistry,
    #[cfg(feature = "xtypes")]
    pub(crate) types: TypeLibrary,
    pub config: RuntimeConfig,
    pub(crate) writers: DashMap<Guid, Arc<DataWriter>>,
    pub(crate) readers: DashMap<Guid, Arc<DataReader>>,
    /// Discovered remote endpoints, keyed by their own GUID (§4.5):
    /// populated by [`crate::dds::matching::register_proxy_writer`]/
    /// [`crate::dds::matching::register_proxy_reader`], not by
    /// `writers`/`readers` above, which are local-only.
    pub(crate) proxies: DashMap<Guid, ProxyEndpoint>,
    next_participant_id: AtomicU32,
}

impl Domain {
    #[must_use]
    pub fn new(domain_id: u32) -> Arc<Self> {
        Arc::new(Self {
            domain_id,
            index: EntityIndex::new(),
            gc: Gc::new(),
            leases: LeaseHeap::new(),
            executor: Arc::new(TimedEventExecutor::default()),
            spdp_locators: SpdpLocatorTable::new(),
            dependencies: Arc::new(DependencyTable::new()),
            #[cfg(feature = "topic-registry")]
            topics: TopicRegistry::new(),
            #[cfg(feature = "xtypes")]
            types: TypeLibrary::new(),
            config: RuntimeConfig::from_env(),
            writers: DashMap::new(),
            readers: DashMap::new(),
            proxies: DashMap::new(),
            next_participant_id: AtomicU32::new(0),
        })
    }

    pub(crate) fn alloc_participant_prefix(&self) -> [u8; 12] {
        let participant_id = self.next_participant_id.fetch_add(1, Ordering::Relaxed);
        let mut prefix = [0u8; 12];
        prefix[0..4].copy_from_slice(&self.domain_id.to_be_bytes());
        prefix[4..8].copy_from_slice(&participant_id.to_be_bytes());
        prefix
    }

    /// Run at most one tick of this domain's shared executor, driving
    /// every timed callback (SPDP publish rounds, lifespan expiry,
    /// GC-queue collection) scheduled on it. The crate never spawns its
    /// own driver thread for this (§4.1); an embedding application
    /// calls this from whatever thread owns its event loop.
    pub fn run_once(&self, now: i64) -> usize {
        self.executor.run_once(now) + self.gc.drain_ready(&self.index)
    }

    /// Create a participant with the given liveliness lease duration
    /// (`None` meaning infinite - the default absent any announcement,
    /// §6).
    pub fn create_participant(self: &Arc<Self>, lease_duration: Option<Duration>) -> Result<Arc<Participant>> {
        Participant::new(self, lease_duration)
    }

    /// Feed a decoded SEDP publication announcement in: build its proxy
    /// writer, record it, and match it against every compatible local
    /// reader already on that topic and type (§4.5 steps 1-8). Decoding
    /// the wire parameter list into a [`SedpAnnouncement`] is the
    /// caller's concern.
    pub fn on_publication_announcement(&self, announcement: &SedpAnnouncement, participant_addresses: &AddressSet) -> Result<Guid> {
        crate::dds::matching::register_proxy_writer(self, announcement, participant_addresses)
    }

    /// As [`Self::on_publication_announcement`], for a discovered
    /// subscription.
    pub fn on_subscription_announcement(&self, announcement: &SedpAnnouncement, participant_addresses: &AddressSet) -> Result<Guid> {
        crate::dds::matching::register_proxy_reader(self, announcement, participant_addresses)
    }

    /// Drive a discovered proxy endpoint's alive/not-alive transition,
    /// notifying every local endpoint matched to it.
    pub fn set_proxy_alive(&self, proxy_guid: Guid, alive: bool) {
        crate::dds::matching::set_proxy_alive(self, proxy_guid, alive);
    }

    /// Tear down this domain's singletons in the order §9 prescribes:
    /// executor first (so nothing it drives can touch the rest mid-
    /// teardown), then discovery state, then the entity index, then the
    /// lease heap.
    pub fn shutdown(&self) {
        crate::info!("domain {}: shutting down", self.domain_id);
        self.gc.drain_ready(&self.index);
        debug_assert!(
            self.index.is_empty(),
            "domain {} shut down with live entities still registered",
            self.domain_id
        );
        crate::debug!("domain {}: executor, discovery, entity index, lease heap torn down", self.domain_id);
    }
}

pub(crate) fn now_nanos() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}
