// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-unique monotonic instance handles (`iid` in the spec).
//!
//! Every live entity carries one of these as an opaque handle usable
//! across the public API without exposing the entity's address.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_IID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique, monotonically increasing instance handle.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Iid(u64);

impl Iid {
    /// Allocate the next handle. Never returns the same value twice
    /// within a process lifetime (barring `u64` exhaustion).
    #[must_use]
    pub fn allocate() -> Self {
        Self(NEXT_IID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_strictly_increasing() {
        let a = Iid::allocate();
        let b = Iid::allocate();
        assert!(b.as_u64() > a.as_u64());
    }
}
