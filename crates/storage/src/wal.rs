// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log public API and background tasks
//!
//! `Walog::open` runs recovery and spawns the logger and installer threads;
//! `shutdown` stops and joins them. One mutex guards all in-memory state;
//! the logger and installer condvars pair with it.
//!
//! Reads without an address lock may race concurrent writers and return
//! either the pre- or post-write value; callers needing read-after-write on
//! an address hold its lock in the transaction layer.

use crate::circular::CircularLog;
use crate::state::WalState;
use keel_core::{Block, BlockDevice, Bnum, DiskError, LogPosition, Update, LOG_SIZE};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use thiserror::Error;

/// Errors from WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("append of {count} updates exceeds log capacity {capacity}")]
    TooManyUpdates { count: usize, capacity: u64 },
    #[error("log position counter would overflow")]
    PositionOverflow,
    #[error("disk error: {0}")]
    Disk(#[from] DiskError),
    #[error("failed to spawn background task: {0}")]
    Spawn(#[source] std::io::Error),
}

struct WalInner {
    device: Arc<dyn BlockDevice>,
    circ: Mutex<CircularLog>,
    mem: Mutex<WalState>,
    cond_logger: Condvar,
    cond_install: Condvar,
    cond_shut: Condvar,
}

impl WalInner {
    fn lock_mem(&self) -> MutexGuard<'_, WalState> {
        self.mem.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_circ(&self) -> MutexGuard<'_, CircularLog> {
        self.circ.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The write-ahead log
pub struct Walog {
    inner: Arc<WalInner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Walog {
    /// Recover from the device and start the background tasks
    ///
    /// Recovery reads the durable range `[start, end)` back into memory and
    /// is idempotent; nothing is written until clients append.
    pub fn open(device: Arc<dyn BlockDevice>) -> Result<Self, WalError> {
        let mut circ = CircularLog::new(Arc::clone(&device));
        let (start, end, updates) = circ.recover()?;
        tracing::info!(start, end, entries = updates.len(), "wal recovered");

        let mut state = WalState::new(start, end, updates);
        state.nthread = 2;

        let inner = Arc::new(WalInner {
            device,
            circ: Mutex::new(circ),
            mem: Mutex::new(state),
            cond_logger: Condvar::new(),
            cond_install: Condvar::new(),
            cond_shut: Condvar::new(),
        });

        let logger = {
            let inner = Arc::clone(&inner);
            std::thread::Builder::new()
                .name("wal-logger".into())
                .spawn(move || logger_loop(&inner))
                .map_err(WalError::Spawn)?
        };
        let installer = {
            let inner = Arc::clone(&inner);
            std::thread::Builder::new()
                .name("wal-installer".into())
                .spawn(move || installer_loop(&inner))
                .map_err(WalError::Spawn)?
        };

        Ok(Self {
            inner,
            handles: Mutex::new(vec![logger, installer]),
        })
    }

    /// Ring capacity in blocks
    pub fn log_size(&self) -> u64 {
        LOG_SIZE
    }

    /// Stage a batch of updates as one atomic transaction
    ///
    /// Blocks while the in-memory log lacks room; while blocked it publishes
    /// everything staged so the logger and installer can drain. Returns the
    /// log position identifying this transaction for `flush`.
    pub fn mem_append(&self, updates: Vec<Update>) -> Result<LogPosition, WalError> {
        if updates.len() as u64 > LOG_SIZE {
            return Err(WalError::TooManyUpdates {
                count: updates.len(),
                capacity: LOG_SIZE,
            });
        }

        let inner = &self.inner;
        let mut mem = inner.lock_mem();
        loop {
            if mem.mem_end().checked_add(updates.len() as u64).is_none() {
                return Err(WalError::PositionOverflow);
            }
            if mem.mem_log.len() + updates.len() <= LOG_SIZE as usize {
                break;
            }
            tracing::debug!(
                staged = mem.mem_log.len(),
                incoming = updates.len(),
                "log full; waiting for space"
            );
            mem.next_disk_end = mem.mem_end();
            inner.cond_logger.notify_all();
            mem = inner.cond_logger.wait(mem).unwrap_or_else(|e| e.into_inner());
        }

        mem.mem_write(updates);
        let txn = mem.mem_end();
        tracing::debug!(txn, "mem append");
        Ok(txn)
    }

    /// Wait until the transaction at `txn` is durably logged
    ///
    /// Returns immediately when `txn` is already durable. A completed flush
    /// implies every update at a position `<= txn` is crash-durable.
    pub fn flush(&self, txn: LogPosition) {
        let inner = &self.inner;
        let mut mem = inner.lock_mem();
        let target = txn.min(mem.mem_end());
        if target > mem.next_disk_end {
            mem.next_disk_end = target;
        }
        inner.cond_logger.notify_all();
        while mem.disk_end < target {
            mem = inner.cond_logger.wait(mem).unwrap_or_else(|e| e.into_inner());
        }
        tracing::debug!(txn, disk_end = mem.disk_end, "flush complete");
    }

    /// Make every currently staged transaction durable
    pub fn flush_all(&self) {
        let target = self.inner.lock_mem().mem_end();
        self.flush(target);
    }

    /// Read `bnum` from the staged log, if present
    pub fn read_mem(&self, bnum: Bnum) -> Option<Block> {
        let mem = self.inner.lock_mem();
        mem.mem_log_map.get(&bnum).map(|&pos| {
            tracing::trace!(bnum, pos, "read hit staged log");
            mem.mem_log[(pos - mem.mem_start) as usize].block.clone()
        })
    }

    /// Read `bnum` straight from the home device, bypassing the staged log
    pub fn read_installed(&self, bnum: Bnum) -> Result<Block, WalError> {
        Ok(self.inner.device.read(bnum)?)
    }

    /// Read `bnum`: staged value if present, else the home block
    pub fn read(&self, bnum: Bnum) -> Result<Block, WalError> {
        match self.read_mem(bnum) {
            Some(block) => Ok(block),
            None => self.read_installed(bnum),
        }
    }

    /// Stop the background tasks and wait for them to exit
    ///
    /// The logger drains what has been published and the installer drains
    /// what has been logged; unpublished staged updates are dropped, exactly
    /// as a crash would drop them. `mem_append` must not be called after
    /// this.
    pub fn shutdown(&self) {
        tracing::debug!("wal shutdown requested");
        {
            let inner = &self.inner;
            let mut mem = inner.lock_mem();
            mem.shutdown = true;
            inner.cond_logger.notify_all();
            inner.cond_install.notify_all();
            while mem.nthread > 0 {
                mem = inner.cond_shut.wait(mem).unwrap_or_else(|e| e.into_inner());
            }
        }
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
        tracing::debug!("wal shutdown complete");
    }
}

/// Background device failures are fatal; the on-disk log stays
/// crash-consistent, so aborting here is equivalent to a crash.
fn fatal(task: &str, err: &DiskError) -> ! {
    tracing::error!(task, error = %err, "background device failure; aborting");
    std::process::abort();
}

/// Mirror published updates to the on-disk ring
fn logger_loop(inner: &WalInner) {
    let mut mem = inner.lock_mem();
    loop {
        if mem.shutdown && mem.next_disk_end == mem.disk_end {
            break;
        }
        if mem.next_disk_end == mem.disk_end {
            mem = inner.cond_logger.wait(mem).unwrap_or_else(|e| e.into_inner());
            continue;
        }

        let start = mem.disk_end;
        let new_end = mem.next_disk_end;
        let lo = (start - mem.mem_start) as usize;
        let hi = (new_end - mem.mem_start) as usize;
        // The slice below next_disk_end is frozen: absorption only rewrites
        // entries at positions >= next_disk_end.
        let batch: Vec<Update> = mem.mem_log[lo..hi].to_vec();
        drop(mem);

        let result = inner.lock_circ().append(start, &batch);
        if let Err(err) = result {
            fatal("logger", &err);
        }

        mem = inner.lock_mem();
        mem.disk_end = new_end;
        tracing::debug!(start, new_end, count = batch.len(), "logged batch");
        inner.cond_logger.notify_all();
        inner.cond_install.notify_all();
    }
    mem.nthread -= 1;
    inner.cond_shut.notify_all();
    tracing::debug!("logger exited");
}

/// Copy logged updates to their home addresses and reclaim ring space
fn installer_loop(inner: &WalInner) {
    let mut mem = inner.lock_mem();
    loop {
        if mem.shutdown && mem.mem_start == mem.disk_end {
            break;
        }
        if mem.mem_start == mem.disk_end {
            mem = inner.cond_install.wait(mem).unwrap_or_else(|e| e.into_inner());
            continue;
        }

        let install_end = mem.disk_end;
        let count = (install_end - mem.mem_start) as usize;
        let batch: Vec<Update> = mem.mem_log[..count].to_vec();
        drop(mem);

        for update in &batch {
            if let Err(err) = inner.device.write(update.bnum, &update.block) {
                fatal("installer", &err);
            }
        }
        let result = inner.lock_circ().advance_start(install_end);
        if let Err(err) = result {
            fatal("installer", &err);
        }

        mem = inner.lock_mem();
        mem.cut_mem_log(install_end);
        tracing::debug!(install_end, count, "installed batch");
        inner.cond_logger.notify_all();
    }
    mem.nthread -= 1;
    inner.cond_shut.notify_all();
    tracing::debug!("installer exited");
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
