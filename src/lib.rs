// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # rdds - entity lifecycle and discovery engine for a DDS middleware
//!
//! This crate implements the participant/endpoint lifecycle and the
//! wire-independent half of RTPS discovery (SPDP/SEDP) for a DDS
//! publish/subscribe middleware: the entity graph and its two-phase
//! deletion, the proxy endpoint matching and liveliness machinery, the
//! timed-event executor that drives both, and the local delivery fast
//! path from a writer to its matched readers' history caches.
//!
//! Wire framing, transports, CDR payload encoding and the DDS-Security
//! plugin are out of scope: this crate consumes and produces decoded
//! value types at the boundary (see [`core::discovery::sedp`] and
//! [`core::discovery::spdp`]) and leaves the bytes-on-the-wire part to
//! a transport crate built on top.
//!
//! ## Modules overview
//!
//! - [`dds`] - public entity API (Domain, Participant, Publisher/Subscriber, Writer/Reader, Topic)
//! - [`core`] - entity graph, timed-event executor, discovery engine, local delivery
//! - [`config`] - RTPS-ish constants and runtime configuration
//! - [`error`] - error taxonomy shared by every fallible operation
//! - [`logging`] - compile-time configurable logging

extern crate self as rdds;

/// Global configuration (lease/SPDP defaults, runtime overrides).
pub mod config;
/// Entity graph, executor, discovery engine, and local delivery (the hard core).
pub mod core;
/// Public DDS entity API.
pub mod dds;
/// Error taxonomy and `Result` alias.
pub mod error;
/// Compile-time configurable logging system (zero-cost when disabled).
pub mod logging;

pub use dds::{DataReader, DataWriter, Domain, Participant, Publisher, Subscriber, Topic};
pub use error::{Error, Result};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
