// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-address advisory locks
//!
//! Locks are keyed by `Addr` and held for the duration of a transaction.
//! Re-acquisition by the same transaction is a no-op, so callers can reach
//! the same address through several code paths without tracking state.

use keel_core::Addr;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};

/// Unique, monotonically issued transaction identifier
pub type TransId = u64;

/// Advisory lock table keyed by address
pub struct LockMap {
    held: Mutex<HashMap<Addr, TransId>>,
    cond: Condvar,
}

impl LockMap {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            cond: Condvar::new(),
        }
    }

    /// Acquire `addr` for `tid`, blocking while another holder has it
    ///
    /// Returns `true` on the first acquisition by this transaction and
    /// `false` on re-entry.
    pub fn acquire(&self, addr: Addr, tid: TransId) -> bool {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match held.get(&addr).copied() {
                None => {
                    held.insert(addr, tid);
                    tracing::trace!(?addr, tid, "lock acquired");
                    return true;
                }
                Some(owner) if owner == tid => return false,
                Some(owner) => {
                    tracing::trace!(?addr, tid, owner, "waiting for address lock");
                    held = self.cond.wait(held).unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }

    /// Release `addr` if `tid` holds it
    pub fn release(&self, addr: Addr, tid: TransId) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if held.get(&addr) == Some(&tid) {
            held.remove(&addr);
            tracing::trace!(?addr, tid, "lock released");
            self.cond.notify_all();
        }
    }

    /// Is `addr` currently held by anyone?
    pub fn is_held(&self, addr: &Addr) -> bool {
        let held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.contains_key(addr)
    }
}

impl Default for LockMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "lockmap_tests.rs"]
mod tests;
