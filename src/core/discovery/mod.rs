// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery engine: SPDP participant announcement scheduling, SEDP
//! endpoint announcement handling, the proxy entity model those
//! protocols populate, and per-pair QoS matching (§4.5, §4.6).

pub mod matcher;
pub mod proxy;
pub mod sedp;
pub mod spdp;

pub use matcher::{is_compatible, is_topic_match};
pub use proxy::{AddressSet, AliveState, Locator, ProxyEndpoint, ProxyParticipant};
pub use sedp::{create_proxy_reader, create_proxy_writer, DependencyTable, SedpAnnouncement};
pub use spdp::SpdpLocatorTable;
