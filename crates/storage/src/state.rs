// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory WAL state
//!
//! One mutex in `wal.rs` guards all of this. The log layout in memory:
//!
//! ```text
//! [ installed | logged | publishing | unstable ]
//! ^           ^        ^            ^
//! 0       mem_start disk_end   next_disk_end ... mem_end
//! ```
//!
//! Entries at positions `>= next_disk_end` are unstable: they can be lost on
//! crash and later writes to the same address absorb them in place. The
//! logger only ever clones `[disk_end, next_disk_end)` while the mutex is
//! held, so in-place absorption above `next_disk_end` aliases nothing.

use keel_core::{Bnum, LogPosition, Update, LOG_SIZE};
use std::collections::HashMap;

pub struct WalState {
    /// Updates at positions `[mem_start, mem_start + mem_log.len())`
    pub(crate) mem_log: Vec<Update>,
    /// Oldest position still in memory; equals on-disk `start`
    pub(crate) mem_start: LogPosition,
    /// First position not yet durably logged; equals on-disk `end`
    pub(crate) disk_end: LogPosition,
    /// Logger's target; clients raise this to publish
    pub(crate) next_disk_end: LogPosition,
    /// Most recent position of each staged address
    pub(crate) mem_log_map: HashMap<Bnum, LogPosition>,
    pub(crate) shutdown: bool,
    pub(crate) nthread: u64,
}

impl WalState {
    /// Seed state from recovery: `mem_log` covers `[start, end)`
    pub(crate) fn new(start: LogPosition, end: LogPosition, mem_log: Vec<Update>) -> Self {
        let mut mem_log_map = HashMap::new();
        for (i, update) in mem_log.iter().enumerate() {
            // later occurrences win
            mem_log_map.insert(update.bnum, start + i as u64);
        }
        Self {
            mem_log,
            mem_start: start,
            disk_end: end,
            next_disk_end: end,
            mem_log_map,
            shutdown: false,
            nthread: 0,
        }
    }

    /// One past the newest staged position
    pub(crate) fn mem_end(&self) -> LogPosition {
        self.mem_start + self.mem_log.len() as u64
    }

    /// Stage updates, absorbing repeats of not-yet-published addresses
    ///
    /// An earlier entry for the same address is overwritten in place when its
    /// position is `>= next_disk_end`; entries below that are owned by the
    /// logger and get a fresh position instead.
    pub(crate) fn mem_write(&mut self, updates: Vec<Update>) {
        let mut pos = self.mem_end();
        for update in updates {
            let bnum = update.bnum;
            let prior = self.mem_log_map.get(&bnum).copied();
            match prior {
                Some(old) if old >= self.next_disk_end => {
                    tracing::debug!(bnum, pos, old, "absorbed staged write");
                    self.mem_log[(old - self.mem_start) as usize] = update;
                }
                _ => {
                    match prior {
                        Some(old) => tracing::debug!(bnum, pos, old, "staged write (replaces map entry)"),
                        None => tracing::debug!(bnum, pos, "staged write"),
                    }
                    self.mem_log.push(update);
                    self.mem_log_map.insert(bnum, pos);
                    pos += 1;
                }
            }
        }
        debug_assert!(self.mem_log.len() as u64 <= LOG_SIZE);
    }

    /// Drop the installed prefix `[mem_start, install_end)`
    pub(crate) fn cut_mem_log(&mut self, install_end: LogPosition) {
        for pos in self.mem_start..install_end {
            let bnum = self.mem_log[(pos - self.mem_start) as usize].bnum;
            if self.mem_log_map.get(&bnum) == Some(&pos) {
                tracing::debug!(bnum, pos, "dropped installed map entry");
                self.mem_log_map.remove(&bnum);
            }
        }
        self.mem_log.drain(..(install_end - self.mem_start) as usize);
        self.mem_start = install_end;
    }

    /// Check the structural invariants
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        assert!(self.mem_start <= self.disk_end);
        assert!(self.disk_end <= self.next_disk_end);
        assert!(self.next_disk_end <= self.mem_end());
        assert!(self.mem_log.len() as u64 <= LOG_SIZE);
        assert!(self.next_disk_end - self.mem_start <= LOG_SIZE);
        for (&bnum, &pos) in &self.mem_log_map {
            assert!(pos >= self.mem_start && pos < self.mem_end());
            assert_eq!(self.mem_log[(pos - self.mem_start) as usize].bnum, bnum);
        }
        let mut newest = std::collections::HashMap::new();
        for (i, update) in self.mem_log.iter().enumerate() {
            newest.insert(update.bnum, self.mem_start + i as u64);
        }
        assert_eq!(newest, self.mem_log_map, "map must index the newest occurrence of every staged address");
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
