// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy shared by every fallible operation in this crate.
//!
//! Mirrors the abstract error kinds used across the DDS/RTPS core:
//! caller-visible argument errors, precondition violations, QoS
//! incompatibility, bounded-wait timeouts, and internal failures that
//! are always logged before being returned.

use std::fmt;

/// Errors returned by `rdds` entity and discovery operations.
#[derive(Debug)]
pub enum Error {
    /// Caller-visible argument error (null where non-null required, wrong
    /// entity kind, out-of-range value).
    BadParameter(String),
    /// Operation issued on an entity in a state that disallows it (delete
    /// of an already-deleted entity, matching before completion, etc).
    PreconditionNotMet(String),
    /// Entity kind does not support the requested operation.
    IllegalOperation(String),
    /// Access-control denial.
    NotAllowedBySecurity(String),
    /// Merged QoS (announced ∪ defaults) fails validity after the union.
    InconsistentPolicy(String),
    /// A bounded wait expired without the awaited condition becoming true.
    Timeout,
    /// Feature compiled out or deliberately not implemented.
    Unsupported(String),
    /// Allocation or resource-limit failure; state remains consistent.
    OutOfResources(String),
    /// Unexpected internal failure. Always logged before being returned.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadParameter(msg) => write!(f, "bad parameter: {msg}"),
            Error::PreconditionNotMet(msg) => write!(f, "precondition not met: {msg}"),
            Error::IllegalOperation(msg) => write!(f, "illegal operation: {msg}"),
            Error::NotAllowedBySecurity(msg) => write!(f, "not allowed by security: {msg}"),
            Error::InconsistentPolicy(msg) => write!(f, "inconsistent policy: {msg}"),
            Error::Timeout => write!(f, "timeout"),
            Error::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Error::OutOfResources(msg) => write!(f, "out of resources: {msg}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Build an `Internal` error, logging it at `error!` level as it is
    /// constructed (internal faults are always logged, per the error
    /// handling design).
    pub fn internal(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        crate::logging::logger::log_error(&msg);
        Error::Internal(msg)
    }
}

/// Convenient alias for results using the crate's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;
