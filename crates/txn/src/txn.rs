// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The transaction manager
//!
//! `Txn` is the shared manager: it owns the WAL handle, the lock map, and
//! the transaction-id allocator. `BufTxn` is one two-phase transaction:
//! acquire and stage while open, then `commit_wait` consumes it. The
//! OPEN → COMMITTING → DONE state machine is enforced by ownership, so
//! staging after commit does not compile.
//!
//! Sub-block commits are assembled by read-modify-write against the WAL
//! image; the manager's commit mutex serializes that assembly so two
//! transactions splicing disjoint slices of one block cannot lose updates.

use crate::bufmap::{Buf, BufMap};
use crate::error::TxnError;
use crate::lockmap::{LockMap, TransId};
use keel_core::{Addr, Block, Bnum, Update, BLOCK_SIZE};
use keel_storage::{WalError, Walog};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Shared transaction manager
pub struct Txn {
    wal: Arc<Walog>,
    locks: LockMap,
    next_tid: AtomicU64,
    commit_lock: Mutex<()>,
}

impl Txn {
    pub fn new(wal: Arc<Walog>) -> Arc<Self> {
        Arc::new(Self {
            wal,
            locks: LockMap::new(),
            next_tid: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
        })
    }

    /// Log capacity in blocks; the upper bound on one commit's dirty set
    pub fn log_size(&self) -> u64 {
        self.wal.log_size()
    }

    /// Make every transaction appended so far durable
    pub fn flush_all(&self) {
        self.wal.flush_all();
    }
}

/// One buffered two-phase transaction
pub struct BufTxn {
    txn: Arc<Txn>,
    tid: TransId,
    bufs: BufMap,
}

impl BufTxn {
    /// Start a transaction against the shared manager
    pub fn begin(txn: &Arc<Txn>) -> Self {
        let tid = txn.next_tid.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(tid, "begin transaction");
        Self {
            txn: Arc::clone(txn),
            tid,
            bufs: BufMap::new(),
        }
    }

    pub fn id(&self) -> TransId {
        self.tid
    }

    /// Number of dirty bufs staged so far
    pub fn ndirty(&self) -> usize {
        self.bufs.ndirty()
    }

    /// Lock `addr` and return its staged buf, loading through the WAL on
    /// first touch
    pub fn read_buf(&mut self, addr: Addr) -> Result<&Buf, TxnError> {
        self.ensure_staged(addr)?;
        self.bufs.lookup(&addr).ok_or(TxnError::NotStaged { addr })
    }

    /// Stage `bytes` over the buf at `addr`, marking it dirty
    pub fn overwrite(&mut self, addr: Addr, bytes: &[u8]) -> Result<(), TxnError> {
        self.ensure_staged(addr)?;
        let buf = self
            .bufs
            .lookup_mut(&addr)
            .ok_or(TxnError::NotStaged { addr })?;
        if bytes.len() != buf.data.len() {
            return Err(TxnError::SizeMismatch {
                expected: buf.data.len(),
                actual: bytes.len(),
            });
        }
        buf.write_bytes(bytes);
        Ok(())
    }

    /// Drop the staged buf for `addr` and release its lock early
    ///
    /// Any staged mutation of that buf is discarded.
    pub fn release(&mut self, addr: Addr) {
        if self.bufs.delete(&addr).is_some() {
            self.txn.locks.release(addr, self.tid);
        }
    }

    /// Commit the dirty set as one atomic batch
    ///
    /// With `wait`, blocks until the batch is durably logged. With `abort`,
    /// the dirty set still carries whatever rollback metadata the caller
    /// staged (e.g. a freed allocator slot) and is committed the same way.
    /// All held locks are released on return. Returns `Ok(false)` when the
    /// batch does not fit the log.
    pub fn commit_wait(self, wait: bool, abort: bool) -> Result<bool, TxnError> {
        if abort {
            tracing::debug!(tid = self.tid, ndirty = self.bufs.ndirty(), "abort: committing rollback state");
        }

        let txn_pos = {
            let _commit = self
                .txn
                .commit_lock
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let updates = self.assemble_updates()?;
            match self.txn.wal.mem_append(updates) {
                Ok(pos) => pos,
                Err(err @ (WalError::TooManyUpdates { .. } | WalError::PositionOverflow)) => {
                    tracing::warn!(tid = self.tid, error = %err, "commit rejected");
                    return Ok(false);
                }
                Err(err) => return Err(err.into()),
            }
        };

        if wait {
            self.txn.wal.flush(txn_pos);
        }
        tracing::debug!(tid = self.tid, txn = txn_pos, wait, "transaction committed");
        Ok(true)
        // dropping self releases the locks
    }

    /// Make every transaction appended so far durable; locks stay held
    pub fn flush(&self) {
        self.txn.flush_all();
    }

    fn ensure_staged(&mut self, addr: Addr) -> Result<(), TxnError> {
        if !addr.is_byte_aligned() {
            return Err(TxnError::UnalignedAddr { addr });
        }
        if addr.byte_range().end > BLOCK_SIZE {
            return Err(TxnError::OutOfBounds { addr });
        }
        self.txn.locks.acquire(addr, self.tid);
        if self.bufs.lookup(&addr).is_none() {
            let block = self.txn.wal.read(addr.blkno)?;
            let data = block.as_bytes()[addr.byte_range()].to_vec();
            self.bufs.insert(Buf::new(addr, data));
        }
        Ok(())
    }

    /// Fold the dirty set into one update per block
    ///
    /// A whole-block buf is the block image; sub-block bufs splice into the
    /// current WAL image. Caller holds the commit mutex.
    fn assemble_updates(&self) -> Result<Vec<Update>, TxnError> {
        let mut groups: BTreeMap<Bnum, Vec<&Buf>> = BTreeMap::new();
        for buf in self.bufs.dirty_bufs() {
            groups.entry(buf.addr.blkno).or_default().push(buf);
        }

        let mut updates = Vec::with_capacity(groups.len());
        for (blkno, bufs) in groups {
            let mut block = match bufs.iter().rev().find(|b| b.addr.is_block()) {
                Some(whole) => Block::from_bytes(&whole.data),
                None => self.txn.wal.read(blkno)?,
            };
            for buf in &bufs {
                if !buf.addr.is_block() {
                    block.as_bytes_mut()[buf.addr.byte_range()].copy_from_slice(&buf.data);
                }
            }
            updates.push(Update::new(blkno, block));
        }
        Ok(updates)
    }
}

impl Drop for BufTxn {
    fn drop(&mut self) {
        for addr in self.bufs.addrs() {
            self.txn.locks.release(addr, self.tid);
        }
    }
}

#[cfg(test)]
#[path = "txn_tests.rs"]
mod tests;
