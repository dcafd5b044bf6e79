// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global configuration - single source of truth for the constants and
//! runtime knobs the discovery and lifecycle engine depends on.
//!
//! Two levels, mirroring the teacher's split:
//!
//! - **Static**: compile-time defaults (lease duration, SPDP interval
//!   bounds, resource limits).
//! - **Dynamic**: [`RuntimeConfig`], a lock-free key/value overlay
//!   loaded from the text file named by the `RDDS_CONFIG_URI`
//!   environment variable (a `file://` URI to a flat `key=value` text
//!   config; the wire/XML profile formats some DDS vendors support are
//!   out of scope here).

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Participant lease duration used when none is announced: infinite.
pub const DEFAULT_LEASE_DURATION: Option<Duration> = None;

/// Upper bound on the computed SPDP publish interval (§4.6).
pub const SPDP_PUBLISH_INTERVAL_MAX: Duration = Duration::from_secs(30);

/// Lower bound on the computed SPDP publish interval.
pub const SPDP_PUBLISH_INTERVAL_MIN: Duration = Duration::from_millis(10);

/// Safety margin subtracted from `4 * lease_dur / 5` once the lease
/// duration is at least 10s, so the last republish still lands inside
/// the remote's lease window.
pub const SPDP_SAFETY_MARGIN: Duration = Duration::from_secs(2);

/// Lease duration threshold above which the safety margin applies.
pub const SPDP_SAFETY_MARGIN_THRESHOLD: Duration = Duration::from_secs(10);

/// Coalescing window for the aging-locator probe callback.
pub const AGING_COALESCE_WINDOW: Duration = Duration::from_secs(1);

/// Minimum number of probe rounds an aging locator survives.
pub const AGING_MIN_ROUNDS: u32 = 10;

/// Minimum total wall-clock time an aging locator survives.
pub const AGING_MIN_DURATION: Duration = Duration::from_secs(10 * 60);

/// Grace window before a secondary (dependent) proxy participant is
/// torn down after its privileged participant's lease expires.
pub const SECONDARY_DEFERRAL: Duration = Duration::from_millis(200);

/// Backoff between retries of a rejected reliable-reader store in the
/// local delivery engine (§4.7).
pub const DELIVERY_RETRY_BACKOFF: Duration = Duration::from_millis(1);

/// Computes the SPDP publish interval for a given lease duration,
/// per §4.6 / §6: `min(30s, 4*lease_dur/5)`, floored at 10ms, with a 2s
/// safety margin subtracted once `lease_dur >= 10s`.
#[must_use]
pub fn spdp_publish_interval(lease_dur: Option<Duration>) -> Duration {
    let base = match lease_dur {
        None => SPDP_PUBLISH_INTERVAL_MAX,
        Some(dur) => {
            let four_fifths = dur.mul_f64(0.8);
            four_fifths.min(SPDP_PUBLISH_INTERVAL_MAX)
        }
    };
    let margined = if lease_dur.is_some_and(|d| d >= SPDP_SAFETY_MARGIN_THRESHOLD) {
        base.checked_sub(SPDP_SAFETY_MARGIN).unwrap_or(base)
    } else {
        base
    };
    margined.max(SPDP_PUBLISH_INTERVAL_MIN)
}

/// Initial age (probe count) for a newly-aging locator, per §4.6:
/// `max(10, 10*60s / base_interval)`.
#[must_use]
pub fn initial_aging_count(base_interval: Duration) -> u32 {
    if base_interval.is_zero() {
        return AGING_MIN_ROUNDS;
    }
    let by_duration = (AGING_MIN_DURATION.as_secs_f64() / base_interval.as_secs_f64()).ceil();
    (by_duration as u32).max(AGING_MIN_ROUNDS)
}

/// Shared runtime configuration overlay (thread-safe, lock-free).
///
/// `DashMap` gives lock-free, sharded key/value overrides; `ArcSwap`
/// gives an atomically-replaceable structured snapshot for the handful
/// of values read on every hot-path iteration (currently just the
/// default lease duration).
#[derive(Clone)]
pub struct RuntimeConfig {
    default_lease: Arc<ArcSwap<Option<Duration>>>,
    overrides: Arc<DashMap<Arc<str>, Arc<str>>>,
}

impl RuntimeConfig {
    /// Build an empty runtime config (no overrides applied).
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_lease: Arc::new(ArcSwap::new(Arc::new(DEFAULT_LEASE_DURATION))),
            overrides: Arc::new(DashMap::new()),
        }
    }

    /// Load overrides from the `key=value` text file named by
    /// `RDDS_CONFIG_URI`, if set. Missing or malformed files are
    /// silently ignored: configuration is best-effort, never fatal.
    #[must_use]
    pub fn from_env() -> Self {
        let cfg = Self::new();
        if let Ok(uri) = std::env::var("RDDS_CONFIG_URI") {
            cfg.load_uri(&uri);
        }
        cfg
    }

    fn load_uri(&self, uri: &str) {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        let Ok(text) = std::fs::read_to_string(path) else {
            crate::warn!("RuntimeConfig: could not read config uri {uri}");
            return;
        };
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                self.set(key.trim(), value.trim());
            }
        }
    }

    /// Set an override key to an arbitrary string value.
    pub fn set(&self, key: &str, value: &str) {
        if key == "liveliness.lease_duration_ms" {
            if let Ok(ms) = value.parse::<u64>() {
                self.default_lease
                    .store(Arc::new(Some(Duration::from_millis(ms))));
            }
        }
        self.overrides
            .insert(Arc::from(key), Arc::from(value));
    }

    /// Read an override key back out, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        self.overrides.get(key).map(|v| v.clone())
    }

    /// Default participant lease duration, `None` meaning infinite.
    #[must_use]
    pub fn default_lease_duration(&self) -> Option<Duration> {
        **self.default_lease.load()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_interval_uses_configured_lease() {
        let interval = spdp_publish_interval(Some(Duration::from_secs(1)));
        assert_eq!(interval, Duration::from_millis(800));
    }

    #[test]
    fn publish_interval_applies_safety_margin_above_threshold() {
        let interval = spdp_publish_interval(Some(Duration::from_secs(20)));
        // 4*20/5 = 16s, minus the 2s margin = 14s
        assert_eq!(interval, Duration::from_secs(14));
    }

    #[test]
    fn publish_interval_defaults_to_max_when_infinite() {
        assert_eq!(spdp_publish_interval(None), SPDP_PUBLISH_INTERVAL_MAX);
    }

    #[test]
    fn initial_aging_count_respects_both_bounds() {
        assert_eq!(initial_aging_count(Duration::from_secs(120)), 10);
        assert_eq!(initial_aging_count(Duration::from_secs(10)), 60);
    }

    #[test]
    fn runtime_config_roundtrips_overrides() {
        let cfg = RuntimeConfig::new();
        cfg.set("discovery.domain_tag", "lab-a");
        assert_eq!(cfg.get("discovery.domain_tag").as_deref(), Some("lab-a"));
    }
}
