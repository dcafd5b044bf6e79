// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery matching glue between the shared per-domain writer/reader
//! tables and the RXO compatibility check (§4.5 step 8, testable
//! property 3): establishes a matched-reader entry on each side when a
//! newly created writer or reader finds a compatible counterpart
//! already present on the same topic and type.

use std::sync::Arc;

use crate::core::delivery::{MatchedReader, SerType};
use crate::core::discovery::is_compatible;
use crate::core::discovery::proxy::AddressSet;
use crate::core::discovery::sedp::{create_proxy_reader, create_proxy_writer, SedpAnnouncement};
use crate::core::entity::EntityKind;
use crate::core::guid::Guid;
use crate::dds::condition::StatusMask;
use crate::dds::domain::Domain;
use crate::dds::reader::DataReader;
use crate::dds::writer::DataWriter;
use crate::error::Result;

/// Opaque, purely local grouping key for a sample's wire type - unlike
/// [`crate::core::topicreg::TopicKey`] this never crosses the wire, so
/// an FNV-1a hash of the type name is sufficient (§4.7's own doc: used
/// only to group consecutive matched readers sharing one sertype).
#[must_use]
pub(crate) fn sertype_of(type_name: &str) -> SerType {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;
    let mut hash = FNV_OFFSET;
    for byte in type_name.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Find every already-registered reader on `writer`'s topic with a
/// matching type name and compatible QoS, and wire up both sides.
pub(crate) fn match_new_writer(domain: &Domain, writer: &Arc<DataWriter>) {
    let writer_qos = writer.qos();
    for entry in &domain.readers {
        let reader = entry.value();
        if reader.topic.name() != writer.topic.name() || reader.type_name != writer.type_name {
            continue;
        }
        if !is_compatible(&reader.qos(), &writer_qos) {
            continue;
        }
        writer.add_matched(MatchedReader {
            guid: reader.guid(),
            sertype: reader.sertype,
            store: reader.clone(),
        });
        reader.add_matched_writer(writer.guid());
        writer.raise_status(StatusMask::PUBLICATION_MATCHED);
        reader.raise_status(StatusMask::SUBSCRIPTION_MATCHED);
        crate::debug!("writer {} matched reader {}", writer.guid(), reader.guid());
    }
}

/// As [`match_new_writer`], from the reader side: scan already-
/// registered writers on the same topic and type.
pub(crate) fn match_new_reader(domain: &Domain, reader: &Arc<DataReader>) {
    let reader_qos = reader.qos();
    for entry in &domain.writers {
        let writer = entry.value();
        if writer.topic.name() != reader.topic.name() || writer.type_name != reader.type_name {
            continue;
        }
        if !is_compatible(&reader_qos, &writer.qos()) {
            continue;
        }
        writer.add_matched(MatchedReader {
            guid: reader.guid(),
            sertype: reader.sertype,
            store: reader.clone(),
        });
        reader.add_matched_writer(writer.guid());
        writer.raise_status(StatusMask::PUBLICATION_MATCHED);
        reader.raise_status(StatusMask::SUBSCRIPTION_MATCHED);
        crate::debug!("reader {} matched writer {}", reader.guid(), writer.guid());
    }
}

/// §4.5 steps 1-8, reader side: build a proxy writer from a discovered
/// SEDP publication announcement, record it in the domain's proxy
/// table, and match it against every compatible local reader already on
/// that topic and type - raising `SUBSCRIPTION_MATCHED` on each.
pub(crate) fn register_proxy_writer(
    domain: &Domain,
    announcement: &SedpAnnouncement,
    participant_addresses: &AddressSet,
) -> Result<Guid> {
    let proxy = create_proxy_writer(announcement, participant_addresses)?;
    let guid = proxy.guid;
    domain.proxies.insert(guid, proxy);

    for entry in &domain.readers {
        let reader = entry.value();
        if reader.topic.name() != announcement.topic_name.as_ref() || reader.type_name.as_ref() != announcement.type_name.as_ref() {
            continue;
        }
        if !is_compatible(&reader.qos(), &announcement.qos) {
            continue;
        }
        reader.add_matched_proxy_writer(guid);
        reader.raise_status(StatusMask::SUBSCRIPTION_MATCHED);
        crate::debug!("reader {} matched proxy writer {guid}", reader.guid());
    }
    Ok(guid)
}

/// As [`register_proxy_writer`], from the writer side: matches against
/// local writers, raising `PUBLICATION_MATCHED`.
pub(crate) fn register_proxy_reader(
    domain: &Domain,
    announcement: &SedpAnnouncement,
    participant_addresses: &AddressSet,
) -> Result<Guid> {
    let proxy = create_proxy_reader(announcement, participant_addresses)?;
    let guid = proxy.guid;
    domain.proxies.insert(guid, proxy);

    for entry in &domain.writers {
        let writer = entry.value();
        if writer.topic.name() != announcement.topic_name.as_ref() || writer.type_name.as_ref() != announcement.type_name.as_ref() {
            continue;
        }
        if !is_compatible(&announcement.qos, &writer.qos()) {
            continue;
        }
        writer.add_matched_proxy_reader(guid);
        writer.raise_status(StatusMask::PUBLICATION_MATCHED);
        crate::debug!("writer {} matched proxy reader {guid}", writer.guid());
    }
    Ok(guid)
}

/// Drive a proxy endpoint's alive/not-alive transition and notify every
/// local endpoint matched to it (§4.5 "Alive state machine"). Only
/// proxy writers carry a liveliness status meaningful to a local reader
/// in this engine's model; a proxy reader's liveliness has no bearing
/// on a local writer's status bits.
pub(crate) fn set_proxy_alive(domain: &Domain, proxy_guid: Guid, alive: bool) {
    let kind = {
        let Some(mut proxy) = domain.proxies.get_mut(&proxy_guid) else {
            return;
        };
        let observed = if alive {
            proxy.alive.begin_alive_transition()
        } else {
            proxy.alive.begin_not_alive_transition()
        };
        let kind = proxy.kind;
        drop(proxy);

        if kind == EntityKind::ProxyWriter {
            for entry in &domain.readers {
                let reader = entry.value();
                if !reader.matched_proxy_writers().contains(&proxy_guid) {
                    continue;
                }
                let Some(proxy) = domain.proxies.get(&proxy_guid) else {
                    break;
                };
                if !proxy.alive.is_current(observed) {
                    break;
                }
                drop(proxy);
                reader.raise_status(StatusMask::LIVELINESS_CHANGED);
                if !alive {
                    reader.raise_status(StatusMask::LIVELINESS_LOST);
                }
            }
        }
        kind
    };
    crate::debug!("proxy {proxy_guid} ({kind:?}) alive={alive}");
}
