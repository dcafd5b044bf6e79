// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Listener-exclusive invocation (§5 "Listener exclusivity"): at most
//! one listener callback runs at a time across all callers sharing one
//! gate, and a caller arriving while one is running waits its turn
//! rather than running concurrently.

use std::sync::{Condvar, Mutex};

#[derive(Default)]
struct GateState {
    pending: u32,
    executing: bool,
}

/// One gate per listener-bearing entity (or per group of entities that
/// share a listener, e.g. a subscriber's `data_on_readers`).
#[derive(Default)]
pub struct ListenerGate {
    state: Mutex<GateState>,
    cv: Condvar,
}

impl ListenerGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` under the exclusive protocol: increment `pending` and
    /// wait while another invocation is executing, then flip to
    /// executing and call `f` without holding the state lock, so `f`
    /// may itself re-enter unrelated gates or sleep without deadlocking
    /// this one. On return, decrement and wake the next waiter.
    pub fn invoke_exclusive(&self, f: impl FnOnce()) {
        {
            let mut state = self.state.lock().unwrap();
            state.pending += 1;
            while state.executing {
                state = self.cv.wait(state).unwrap();
            }
            state.pending -= 1;
            state.executing = true;
        }

        f();

        let mut state = self.state.lock().unwrap();
        state.executing = false;
        drop(state);
        self.cv.notify_all();
    }

    #[must_use]
    pub fn pending(&self) -> u32 {
        self.state.lock().unwrap().pending
    }
}
