// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-pair QoS compatibility (the RXO - requested/offered - subset of
//! §4.5 step 8 and testable property 3).

use crate::core::qos::{DurabilityKind, History, LivelinessKind, Qos};

/// `true` iff a reader requesting `reader` and a writer offering
/// `writer` may be matched: every RXO policy this engine understands
/// is compatible.
#[must_use]
pub fn is_compatible(reader: &Qos, writer: &Qos) -> bool {
    reliability_compatible(reader, writer)
        && durability_compatible(reader, writer)
        && deadline_compatible(reader, writer)
        && liveliness_compatible(reader, writer)
        && ownership_compatible(reader, writer)
        && history_compatible(reader, writer)
}

fn reliability_compatible(reader: &Qos, writer: &Qos) -> bool {
    use crate::core::qos::ReliabilityKind::{BestEffort, Reliable};
    match (reader.reliability, writer.reliability) {
        (Reliable, BestEffort) => false,
        _ => true,
    }
}

fn durability_rank(kind: DurabilityKind) -> u8 {
    match kind {
        DurabilityKind::Volatile => 0,
        DurabilityKind::TransientLocal => 1,
        DurabilityKind::Transient => 2,
        DurabilityKind::Persistent => 3,
    }
}

fn durability_compatible(reader: &Qos, writer: &Qos) -> bool {
    durability_rank(writer.durability) >= durability_rank(reader.durability)
}

fn deadline_compatible(reader: &Qos, writer: &Qos) -> bool {
    match (reader.deadline, writer.deadline) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(requested), Some(offered)) => offered <= requested,
    }
}

fn liveliness_rank(kind: LivelinessKind) -> u8 {
    match kind {
        LivelinessKind::Automatic => 0,
        LivelinessKind::ManualByParticipant => 1,
        LivelinessKind::ManualByTopic => 2,
    }
}

fn liveliness_compatible(reader: &Qos, writer: &Qos) -> bool {
    if liveliness_rank(writer.liveliness_kind) < liveliness_rank(reader.liveliness_kind) {
        return false;
    }
    match (
        reader.liveliness_lease_duration,
        writer.liveliness_lease_duration,
    ) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(requested), Some(offered)) => offered <= requested,
    }
}

fn ownership_compatible(reader: &Qos, writer: &Qos) -> bool {
    reader.ownership == writer.ownership
}

fn history_compatible(reader: &Qos, writer: &Qos) -> bool {
    match (reader.history, writer.history) {
        (History::KeepLast(requested), History::KeepLast(offered)) => requested <= offered,
        _ => true,
    }
}

/// Exact string match - the topic-name half of §4.5 step 8's "same
/// topic" precondition.
#[must_use]
pub fn is_topic_match(reader_topic: &str, writer_topic: &str) -> bool {
    reader_topic == writer_topic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::qos::{OwnershipKind, ReliabilityKind};
    use std::time::Duration;

    #[test]
    fn best_effort_reader_matches_any_writer() {
        let mut reader = Qos::default();
        reader.reliability = ReliabilityKind::BestEffort;
        let mut writer = Qos::default();
        writer.reliability = ReliabilityKind::BestEffort;
        assert!(is_compatible(&reader, &writer));
    }

    #[test]
    fn reliable_reader_rejects_best_effort_writer() {
        let mut reader = Qos::default();
        reader.reliability = ReliabilityKind::Reliable;
        let writer = Qos::default(); // BestEffort
        assert!(!is_compatible(&reader, &writer));
    }

    #[test]
    fn durability_writer_must_offer_at_least_requested() {
        let mut reader = Qos::default();
        reader.durability = DurabilityKind::Transient;
        let mut writer = Qos::default();
        writer.durability = DurabilityKind::TransientLocal;
        assert!(!is_compatible(&reader, &writer));
        writer.durability = DurabilityKind::Persistent;
        assert!(is_compatible(&reader, &writer));
    }

    #[test]
    fn deadline_writer_period_must_not_exceed_requested() {
        let mut reader = Qos::default();
        reader.deadline = Some(Duration::from_millis(100));
        let mut writer = Qos::default();
        writer.deadline = Some(Duration::from_millis(200));
        assert!(!is_compatible(&reader, &writer));
        writer.deadline = Some(Duration::from_millis(50));
        assert!(is_compatible(&reader, &writer));
    }

    #[test]
    fn ownership_kind_must_match_exactly() {
        let mut reader = Qos::default();
        reader.ownership = OwnershipKind::Exclusive;
        let writer = Qos::default(); // Shared
        assert!(!is_compatible(&reader, &writer));
    }

    #[test]
    fn history_keep_last_reader_depth_bounded_by_writer_depth() {
        let mut reader = Qos::default();
        reader.history = History::KeepLast(10);
        let mut writer = Qos::default();
        writer.history = History::KeepLast(5);
        assert!(!is_compatible(&reader, &writer));
        writer.history = History::KeepLast(20);
        assert!(is_compatible(&reader, &writer));
    }
}
