// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Block devices
//!
//! The journal takes its device as a constructor parameter; there is no
//! global disk. `write` must be durable before returning; the log's
//! header-write commit point depends on it.

use crate::block::{Block, Bnum, BLOCK_SIZE};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from block-device operations
#[derive(Debug, Error)]
pub enum DiskError {
    #[error("block {bnum} out of range (disk holds {size} blocks)")]
    OutOfRange { bnum: Bnum, size: u64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Synchronous fixed-size block storage
pub trait BlockDevice: Send + Sync {
    /// Read the block at `bnum`
    fn read(&self, bnum: Bnum) -> Result<Block, DiskError>;

    /// Durably write the block at `bnum`
    fn write(&self, bnum: Bnum, block: &Block) -> Result<(), DiskError>;

    /// Device capacity in blocks
    fn size(&self) -> u64;
}

/// In-memory device for tests and recovery scenarios
pub struct MemDisk {
    blocks: Mutex<Vec<Block>>,
}

impl MemDisk {
    /// A zero-filled device of `size` blocks
    pub fn new(size: u64) -> Self {
        Self {
            blocks: Mutex::new(vec![Block::zeroed(); size as usize]),
        }
    }
}

impl BlockDevice for MemDisk {
    fn read(&self, bnum: Bnum) -> Result<Block, DiskError> {
        let blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        blocks
            .get(bnum as usize)
            .cloned()
            .ok_or(DiskError::OutOfRange {
                bnum,
                size: blocks.len() as u64,
            })
    }

    fn write(&self, bnum: Bnum, block: &Block) -> Result<(), DiskError> {
        let mut blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        let size = blocks.len() as u64;
        match blocks.get_mut(bnum as usize) {
            Some(slot) => {
                *slot = block.clone();
                Ok(())
            }
            None => Err(DiskError::OutOfRange { bnum, size }),
        }
    }

    fn size(&self) -> u64 {
        let blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        blocks.len() as u64
    }
}

/// File-backed device
///
/// Every write is followed by `sync_data`, so the durability contract holds
/// at the cost of one fsync per block write.
pub struct FileDisk {
    file: File,
    size: u64,
}

impl FileDisk {
    /// Open or create a disk image of `size` blocks at `path`
    pub fn open(path: &Path, size: u64) -> Result<Self, DiskError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        file.set_len(size * BLOCK_SIZE as u64)?;
        tracing::debug!(path = %path.display(), size, "file disk opened");
        Ok(Self { file, size })
    }

    fn check(&self, bnum: Bnum) -> Result<(), DiskError> {
        if bnum >= self.size {
            return Err(DiskError::OutOfRange {
                bnum,
                size: self.size,
            });
        }
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    fn read(&self, bnum: Bnum) -> Result<Block, DiskError> {
        self.check(bnum)?;
        let mut block = Block::zeroed();
        self.file
            .read_exact_at(block.as_bytes_mut(), bnum * BLOCK_SIZE as u64)?;
        Ok(block)
    }

    fn write(&self, bnum: Bnum, block: &Block) -> Result<(), DiskError> {
        self.check(bnum)?;
        self.file
            .write_all_at(block.as_bytes(), bnum * BLOCK_SIZE as u64)?;
        self.file.sync_data()?;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
