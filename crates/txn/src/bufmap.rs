// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-transaction buffer staging
//!
//! A `Buf` holds exactly the bytes its address covers; staged mutations mark
//! it dirty. The dirty subset is the transaction's commit list; clean
//! entries are discarded at release time.

use keel_core::Addr;
use std::collections::HashMap;

/// One staged buffer: the addressed bytes plus a dirty flag
#[derive(Debug, Clone)]
pub struct Buf {
    pub addr: Addr,
    pub data: Vec<u8>,
    pub dirty: bool,
}

impl Buf {
    /// A clean buf holding freshly loaded bytes
    pub fn new(addr: Addr, data: Vec<u8>) -> Self {
        Self {
            addr,
            data,
            dirty: false,
        }
    }

    /// Replace the staged bytes and mark the buf dirty
    ///
    /// `bytes` must match the buf's length; callers validate before staging.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.copy_from_slice(bytes);
        self.dirty = true;
    }
}

/// The private staging map of one transaction
#[derive(Debug, Default)]
pub struct BufMap {
    bufs: HashMap<Addr, Buf>,
}

impl BufMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, buf: Buf) {
        self.bufs.insert(buf.addr, buf);
    }

    pub fn lookup(&self, addr: &Addr) -> Option<&Buf> {
        self.bufs.get(addr)
    }

    pub fn lookup_mut(&mut self, addr: &Addr) -> Option<&mut Buf> {
        self.bufs.get_mut(addr)
    }

    pub fn delete(&mut self, addr: &Addr) -> Option<Buf> {
        self.bufs.remove(addr)
    }

    /// Number of staged bufs with unpersisted mutations
    pub fn ndirty(&self) -> usize {
        self.bufs.values().filter(|b| b.dirty).count()
    }

    /// The commit list: every dirty buf
    pub fn dirty_bufs(&self) -> impl Iterator<Item = &Buf> {
        self.bufs.values().filter(|b| b.dirty)
    }

    /// Addresses of every staged buf, clean or dirty
    pub fn addrs(&self) -> Vec<Addr> {
        self.bufs.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }
}

#[cfg(test)]
#[path = "bufmap_tests.rs"]
mod tests;
