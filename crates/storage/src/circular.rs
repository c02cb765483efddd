// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The on-disk circular log
//!
//! Block 0 holds header 1 (`end` plus the home address of every ring slot),
//! block 1 holds header 2 (`start`), and blocks `LOG_START ..
//! LOG_START + LOG_SIZE` hold the payload ring. Payload slots are always
//! written before the header-1 commit that references them; header 2 moves
//! only after every referenced home block has been installed.

use keel_core::{Block, BlockDevice, Bnum, DiskError, LogPosition, Update};
use keel_core::{HDRADDRS, LOG_HDR, LOG_HDR2, LOG_SIZE, LOG_START};
use std::sync::Arc;

/// Decoded log header 1
struct Hdr {
    end: LogPosition,
    addrs: Vec<Bnum>,
}

/// Fixed-capacity ring of log slots plus the two header blocks
pub struct CircularLog {
    device: Arc<dyn BlockDevice>,
    addrs: Vec<Bnum>,
}

impl CircularLog {
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self {
            device,
            addrs: vec![0; HDRADDRS],
        }
    }

    /// Read both headers and reconstruct the durably logged updates
    ///
    /// Returns `(start, end, updates)` where `updates` covers positions
    /// `[start, end)` in order. Recovery writes nothing, so running it twice
    /// yields the same result.
    pub fn recover(&mut self) -> Result<(LogPosition, LogPosition, Vec<Update>), DiskError> {
        let hdr = self.read_hdr()?;
        let start = self.read_hdr2()?;
        self.addrs = hdr.addrs;

        let mut updates = Vec::with_capacity((hdr.end - start) as usize);
        for pos in start..hdr.end {
            let slot = (pos % LOG_SIZE) as usize;
            let block = self.device.read(LOG_START + pos % LOG_SIZE)?;
            tracing::trace!(pos, bnum = self.addrs[slot], "recovered log slot");
            updates.push(Update::new(self.addrs[slot], block));
        }

        tracing::debug!(start, end = hdr.end, entries = updates.len(), "circular log recovered");
        Ok((start, hdr.end, updates))
    }

    /// Append `updates` at positions `start..`, then commit them
    ///
    /// The payload slots land first; the header-1 write that follows is the
    /// commit point making `[.., start + updates.len())` crash-durable.
    pub fn append(&mut self, start: LogPosition, updates: &[Update]) -> Result<LogPosition, DiskError> {
        for (i, update) in updates.iter().enumerate() {
            let pos = start + i as u64;
            self.device.write(LOG_START + pos % LOG_SIZE, &update.block)?;
            self.addrs[(pos % LOG_SIZE) as usize] = update.bnum;
        }

        let end = start + updates.len() as u64;
        self.write_hdr(end)?;
        Ok(end)
    }

    /// Record that everything below `new_start` has been installed
    pub fn advance_start(&self, new_start: LogPosition) -> Result<(), DiskError> {
        let mut block = Block::zeroed();
        block.put_u64_le(0, new_start);
        self.device.write(LOG_HDR2, &block)
    }

    fn write_hdr(&self, end: LogPosition) -> Result<(), DiskError> {
        let mut block = Block::zeroed();
        block.put_u64_le(0, end);
        for (i, &bnum) in self.addrs.iter().enumerate() {
            block.put_u64_le(8 + i * 8, bnum);
        }
        self.device.write(LOG_HDR, &block)
    }

    fn read_hdr(&self) -> Result<Hdr, DiskError> {
        let block = self.device.read(LOG_HDR)?;
        let end = block.get_u64_le(0);
        let addrs = (0..HDRADDRS).map(|i| block.get_u64_le(8 + i * 8)).collect();
        Ok(Hdr { end, addrs })
    }

    fn read_hdr2(&self) -> Result<LogPosition, DiskError> {
        let block = self.device.read(LOG_HDR2)?;
        Ok(block.get_u64_le(0))
    }
}

#[cfg(test)]
#[path = "circular_tests.rs"]
mod tests;
