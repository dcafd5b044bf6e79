// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Proxy endpoints: the remote counterpart of a local writer/reader
//! (§3, §4.5). Creation/update validation, address-set construction,
//! and the alive/not-alive state machine with its virtual clock.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::entity::EntityKind;
use crate::core::guid::Guid;
use crate::core::qos::Qos;
use crate::error::{Error, Result};

/// Opaque network address. Transport addressing itself is out of
/// scope here; this is only the handle discovery passes around to
/// build and compare address sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator(pub String);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSet {
    pub unicast: Vec<Locator>,
    pub multicast: Vec<Locator>,
}

impl AddressSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unicast.is_empty() && self.multicast.is_empty()
    }

    /// Build a proxy's effective address set from what was announced
    /// plus the owning participant's default addresses (§4.5 step 5):
    /// an empty announcement falls back entirely to the participant's
    /// addresses; an announcement naming only multicast locators
    /// borrows the participant's unicast set (and vice versa);
    /// otherwise the announcement is used as-is.
    #[must_use]
    pub fn merged_with_participant_defaults(announced: &AddressSet, participant: &AddressSet) -> AddressSet {
        if announced.is_empty() {
            return participant.clone();
        }
        let mut merged = announced.clone();
        if merged.multicast.is_empty() {
            merged.multicast = participant.multicast.clone();
        }
        if merged.unicast.is_empty() {
            merged.unicast = participant.unicast.clone();
        }
        merged
    }
}

/// Remote participant's discovery-relevant state.
pub struct ProxyParticipant {
    pub guid: Guid,
    pub default_addresses: AddressSet,
    /// Set when this participant was discovered only via another
    /// ("privileged") participant's SPDP writer and is missing its own
    /// SEDP announcer endpoints (§4.6 "Secondary/privileged
    /// participants"). The dependent's own lease is set to infinity;
    /// it is torn down when the privileged one dies instead.
    pub dependent_on: Option<Guid>,
}

/// Tracks a boolean alive/not-alive flag plus a strictly monotone
/// virtual clock, used by both proxy endpoints and local writers
/// (§4.5 "Alive state machine"). A reader walk notifying matched peers
/// may have to drop its lock mid-walk; `vclock()` lets it detect a
/// concurrent transition and abort rather than propagate stale state.
#[derive(Default)]
pub struct AliveState {
    alive: std::sync::atomic::AtomicBool,
    vclock: AtomicU32,
}

impl AliveState {
    #[must_use]
    pub fn new(initially_alive: bool) -> Self {
        Self {
            alive: std::sync::atomic::AtomicBool::new(initially_alive),
            vclock: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn vclock(&self) -> u32 {
        self.vclock.load(Ordering::Acquire)
    }

    /// Precondition `!alive`. Flips to alive and bumps the vclock,
    /// returning the new value for the caller's walk to compare
    /// against as it notifies matched peers.
    pub fn begin_alive_transition(&self) -> u32 {
        assert!(!self.is_alive(), "set_alive precondition violated: already alive");
        self.alive.store(true, Ordering::Release);
        self.vclock.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Precondition `alive`. Symmetric with `begin_alive_transition`.
    pub fn begin_not_alive_transition(&self) -> u32 {
        assert!(self.is_alive(), "set_not_alive precondition violated: not alive");
        self.alive.store(false, Ordering::Release);
        self.vclock.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// `true` while no further alive/not-alive transition has happened
    /// since `observed`; a notification walk checks this between steps
    /// and stops as soon as it returns `false`.
    #[must_use]
    pub fn is_current(&self, observed: u32) -> bool {
        self.vclock() == observed
    }
}

/// Remote counterpart of a local writer or reader.
pub struct ProxyEndpoint {
    pub guid: Guid,
    pub kind: EntityKind,
    pub proxy_participant: Guid,
    pub group_guid: Option<Guid>,
    pub address_set: AddressSet,
    pub qos: Qos,
    pub seq: u64,
    pub alive: AliveState,
    /// Proxy writers only: whether a heartbeat has ever been observed.
    pub last_seen_heartbeat: bool,
}

impl ProxyEndpoint {
    /// §4.5 step 1: the announced GUID's kind must match the SEDP
    /// record's kind, and a claimed owning participant GUID must share
    /// the endpoint's prefix.
    pub fn validate_announced_guid(
        endpoint_guid: Guid,
        announced_kind: EntityKind,
        participant_guid: Guid,
    ) -> Result<()> {
        if !announced_kind.is_endpoint() {
            return Err(Error::BadParameter(format!(
                "{endpoint_guid} announced as non-endpoint kind {announced_kind:?}"
            )));
        }
        if !endpoint_guid.belongs_to(&participant_guid) {
            return Err(Error::BadParameter(format!(
                "{endpoint_guid} does not belong to announced participant {participant_guid}"
            )));
        }
        Ok(())
    }

    /// §4.5 "Update": only apply if `new_seq` strictly exceeds the
    /// stored sequence number. Returns whether the update was applied.
    #[must_use]
    pub fn accept_seq(&mut self, new_seq: u64) -> bool {
        if new_seq <= self.seq {
            return false;
        }
        self.seq = new_seq;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(s: &str) -> Locator {
        Locator(s.to_string())
    }

    #[test]
    fn empty_announcement_falls_back_entirely() {
        let participant = AddressSet {
            unicast: vec![loc("u1")],
            multicast: vec![loc("m1")],
        };
        let merged = AddressSet::merged_with_participant_defaults(&AddressSet::default(), &participant);
        assert_eq!(merged, participant);
    }

    #[test]
    fn multicast_only_announcement_borrows_unicast() {
        let announced = AddressSet {
            unicast: vec![],
            multicast: vec![loc("m-announced")],
        };
        let participant = AddressSet {
            unicast: vec![loc("u-default")],
            multicast: vec![loc("m-default")],
        };
        let merged = AddressSet::merged_with_participant_defaults(&announced, &participant);
        assert_eq!(merged.multicast, vec![loc("m-announced")]);
        assert_eq!(merged.unicast, vec![loc("u-default")]);
    }

    #[test]
    fn unicast_only_announcement_borrows_multicast() {
        let announced = AddressSet {
            unicast: vec![loc("u-announced")],
            multicast: vec![],
        };
        let participant = AddressSet {
            unicast: vec![loc("u-default")],
            multicast: vec![loc("m-default")],
        };
        let merged = AddressSet::merged_with_participant_defaults(&announced, &participant);
        assert_eq!(merged.unicast, vec![loc("u-announced")]);
        assert_eq!(merged.multicast, vec![loc("m-default")]);
    }

    #[test]
    fn alive_transition_walk_detects_concurrent_change() {
        let state = AliveState::new(false);
        let observed = state.begin_alive_transition();
        assert!(state.is_current(observed));

        // A concurrent set_not_alive invalidates the in-progress walk.
        state.begin_not_alive_transition();
        assert!(!state.is_current(observed));
    }

    #[test]
    #[should_panic(expected = "already alive")]
    fn alive_transition_precondition_enforced() {
        let state = AliveState::new(true);
        state.begin_alive_transition();
    }

    #[test]
    fn seq_gate_only_accepts_strictly_increasing() {
        let mut ep = ProxyEndpoint {
            guid: Guid::new([1; 12], [0, 0, 0, 1]),
            kind: EntityKind::ProxyWriter,
            proxy_participant: Guid::new([1; 12], [0, 0, 1, 0xc1]),
            group_guid: None,
            address_set: AddressSet::default(),
            qos: Qos::default(),
            seq: 5,
            alive: AliveState::new(true),
            last_seen_heartbeat: false,
        };
        assert!(!ep.accept_seq(5));
        assert!(!ep.accept_seq(4));
        assert!(ep.accept_seq(6));
        assert_eq!(ep.seq, 6);
    }

    #[test]
    fn validate_announced_guid_rejects_mismatched_prefix() {
        let endpoint = Guid::new([1; 12], [0, 0, 0, 4]);
        let other_participant = Guid::new([2; 12], [0, 0, 1, 0xc1]);
        assert!(ProxyEndpoint::validate_announced_guid(endpoint, EntityKind::ProxyReader, other_participant).is_err());

        let owning_participant = Guid::new([1; 12], [0, 0, 1, 0xc1]);
        assert!(ProxyEndpoint::validate_announced_guid(endpoint, EntityKind::ProxyReader, owning_participant).is_ok());
    }
}
