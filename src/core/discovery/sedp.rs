// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SEDP (Simple Endpoint Discovery Protocol) announcement handling:
//! the parameter-list-level view of an announced endpoint (wire
//! framing and CDR are out of scope - see the crate root), sequence-
//! number gating, and the secondary/privileged participant dependency
//! tracking behind the 200ms teardown grace window (§4.6).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::SECONDARY_DEFERRAL;
use crate::core::discovery::proxy::{AddressSet, AliveState, ProxyEndpoint};
use crate::core::entity::EntityKind;
use crate::core::guid::Guid;
use crate::core::qos::Qos;
use crate::error::{Error, Result};

/// One announced endpoint, at the level this engine reasons about it:
/// identity, topic binding, QoS, and the monotone sequence number
/// that orders updates. Decoding the wire parameter list into this
/// shape is a transport-layer concern.
#[derive(Debug, Clone)]
pub struct SedpAnnouncement {
    pub guid: Guid,
    pub kind: EntityKind,
    pub participant: Guid,
    pub topic_name: Box<str>,
    pub type_name: Box<str>,
    pub qos: Qos,
    pub addresses: AddressSet,
    pub seq: u64,
}

/// `true` iff `incoming` should be applied on top of `current`: SEDP
/// updates are honoured only when their sequence number strictly
/// exceeds what is already known, so an announcement that arrives out
/// of order after a retransmit is silently ignored.
#[must_use]
pub fn is_newer(current_seq: u64, incoming: &SedpAnnouncement) -> bool {
    incoming.seq > current_seq
}

/// Tracks which participants were discovered only through another
/// ("privileged") participant's SPDP writer and so depend on it for
/// liveliness (§4.6 "Secondary/privileged participants"): a dependent
/// has no announcer endpoints of its own and is kept alive with an
/// infinite lease until its privileged participant's lease expires.
#[derive(Default)]
pub struct DependencyTable {
    dependents: Mutex<HashMap<Guid, HashSet<Guid>>>,
    deferred_once: Mutex<HashSet<Guid>>,
}

impl DependencyTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, privileged: Guid, dependent: Guid) {
        self.dependents
            .lock()
            .entry(privileged)
            .or_default()
            .insert(dependent);
    }

    pub fn unregister(&self, privileged: Guid, dependent: Guid) {
        let mut map = self.dependents.lock();
        if let Some(set) = map.get_mut(&privileged) {
            set.remove(&dependent);
            if set.is_empty() {
                map.remove(&privileged);
            }
        }
    }

    #[must_use]
    pub fn dependents_of(&self, privileged: Guid) -> Vec<Guid> {
        self.dependents
            .lock()
            .get(&privileged)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Called from `privileged`'s lease-expiration handler
    /// ([`crate::core::rt::lease::LeaseHeap::check_and_handle_expiration`]'s
    /// `on_expire`). A privileged participant with no registered
    /// dependents expires normally (`None`). One with dependents is
    /// granted a single [`SECONDARY_DEFERRAL`] grace window - giving a
    /// slightly late SPDP announcement a chance to renew it - after
    /// which a second call releases the deferral and the caller
    /// proceeds to tear the dependents down along with it.
    pub fn defer_or_release(&self, privileged: Guid, now: i64) -> Option<i64> {
        if self.dependents_of(privileged).is_empty() {
            return None;
        }
        let mut deferred = self.deferred_once.lock();
        if deferred.insert(privileged) {
            Some(now + SECONDARY_DEFERRAL.as_nanos() as i64)
        } else {
            deferred.remove(&privileged);
            None
        }
    }
}

/// §4.5 steps 1-8: validate an announcement against `expected_kind`,
/// check the announced GUID/participant pair, merge the announced
/// address set against the owning participant's defaults, and build a
/// fresh [`ProxyEndpoint`] initialised alive. `create_proxy_writer` and
/// `create_proxy_reader` are the two callers, pinned to the one
/// `EntityKind` each is allowed to produce.
fn create_proxy_endpoint(
    announcement: &SedpAnnouncement,
    participant_addresses: &AddressSet,
    expected_kind: EntityKind,
) -> Result<ProxyEndpoint> {
    if announcement.kind != expected_kind {
        return Err(Error::BadParameter(format!(
            "{} announced as {:?}, expected {:?}",
            announcement.guid, announcement.kind, expected_kind
        )));
    }
    ProxyEndpoint::validate_announced_guid(announcement.guid, announcement.kind, announcement.participant)?;
    let address_set = AddressSet::merged_with_participant_defaults(&announcement.addresses, participant_addresses);
    Ok(ProxyEndpoint {
        guid: announcement.guid,
        kind: expected_kind,
        proxy_participant: announcement.participant,
        group_guid: None,
        address_set,
        qos: announcement.qos.clone(),
        seq: announcement.seq,
        alive: AliveState::new(true),
        last_seen_heartbeat: false,
    })
}

/// Build a proxy writer from a discovered SEDP publication announcement.
pub fn create_proxy_writer(announcement: &SedpAnnouncement, participant_addresses: &AddressSet) -> Result<ProxyEndpoint> {
    create_proxy_endpoint(announcement, participant_addresses, EntityKind::ProxyWriter)
}

/// Build a proxy reader from a discovered SEDP subscription announcement.
pub fn create_proxy_reader(announcement: &SedpAnnouncement, participant_addresses: &AddressSet) -> Result<ProxyEndpoint> {
    create_proxy_endpoint(announcement, participant_addresses, EntityKind::ProxyReader)
}

/// Dependents of `privileged` once its deferral has been released:
/// callers fold this into whatever tears an expired participant's
/// proxy endpoints down, so a secondary participant disappears in the
/// same sweep as the privileged one it rode in on.
#[must_use]
pub fn dependents_to_tear_down(deps: &Arc<DependencyTable>, privileged: Guid) -> Vec<Guid> {
    deps.dependents_of(privileged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::qos::Qos;

    fn guid(n: u8) -> Guid {
        Guid::new([n; 12], [0, 0, 0, n])
    }

    fn announcement(seq: u64) -> SedpAnnouncement {
        SedpAnnouncement {
            guid: guid(1),
            kind: EntityKind::ProxyWriter,
            participant: guid(0),
            topic_name: Box::from("chatter"),
            type_name: Box::from("std_msgs::String"),
            qos: Qos::default(),
            addresses: AddressSet::default(),
            seq,
        }
    }

    #[test]
    fn sequence_gate_rejects_stale_and_equal() {
        assert!(!is_newer(5, &announcement(5)));
        assert!(!is_newer(5, &announcement(4)));
        assert!(is_newer(5, &announcement(6)));
    }

    #[test]
    fn dependency_registration_roundtrips() {
        let deps = DependencyTable::new();
        deps.register(guid(1), guid(2));
        deps.register(guid(1), guid(3));
        let mut found = deps.dependents_of(guid(1));
        found.sort_by_key(|g| g.entity_id);
        assert_eq!(found, vec![guid(2), guid(3)]);

        deps.unregister(guid(1), guid(2));
        assert_eq!(deps.dependents_of(guid(1)), vec![guid(3)]);
    }

    #[test]
    fn privileged_with_no_dependents_expires_immediately() {
        let deps = DependencyTable::new();
        assert_eq!(deps.defer_or_release(guid(1), 0), None);
    }

    fn endpoint_announcement(kind: EntityKind, seq: u64) -> SedpAnnouncement {
        let participant = Guid::new([7; 12], crate::core::guid::ENTITYID_PARTICIPANT);
        SedpAnnouncement {
            guid: Guid::new([7; 12], [0, 0, 1, 1]),
            kind,
            participant,
            topic_name: Box::from("chatter"),
            type_name: Box::from("std_msgs::String"),
            qos: Qos::default(),
            addresses: AddressSet::default(),
            seq,
        }
    }

    #[test]
    fn create_proxy_writer_rejects_a_subscription_announcement() {
        let ann = endpoint_announcement(EntityKind::ProxyReader, 1);
        assert!(create_proxy_writer(&ann, &AddressSet::default()).is_err());
    }

    #[test]
    fn create_proxy_writer_builds_an_alive_endpoint_with_merged_addresses() {
        let ann = endpoint_announcement(EntityKind::ProxyWriter, 1);
        let participant_addresses = AddressSet {
            unicast: vec![crate::core::discovery::proxy::Locator("u1".into())],
            multicast: vec![],
        };
        let proxy = create_proxy_writer(&ann, &participant_addresses).unwrap();
        assert_eq!(proxy.kind, EntityKind::ProxyWriter);
        assert_eq!(proxy.guid, ann.guid);
        assert!(proxy.alive.is_alive());
        assert_eq!(proxy.address_set.unicast, participant_addresses.unicast);
        assert_eq!(proxy.seq, 1);
    }

    #[test]
    fn create_proxy_reader_rejects_a_guid_from_another_participant() {
        let mut ann = endpoint_announcement(EntityKind::ProxyReader, 1);
        ann.participant = Guid::new([9; 12], crate::core::guid::ENTITYID_PARTICIPANT);
        assert!(create_proxy_reader(&ann, &AddressSet::default()).is_err());
    }

    #[test]
    fn privileged_with_dependents_gets_one_deferral_then_releases() {
        let deps = DependencyTable::new();
        deps.register(guid(1), guid(2));

        let deferred_until = deps.defer_or_release(guid(1), 1_000).expect("first call defers");
        assert_eq!(deferred_until, 1_000 + SECONDARY_DEFERRAL.as_nanos() as i64);

        // Second call after the deferral elapses releases it.
        assert_eq!(deps.defer_or_release(guid(1), deferred_until), None);
        assert_eq!(dependents_to_tear_down(&Arc::new(deps), guid(1)), vec![guid(2)]);
    }
}
