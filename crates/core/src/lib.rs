// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-core: block, address, and device types for the Keel journal

pub mod addr;
pub mod block;
pub mod device;

pub use addr::Addr;
pub use block::{Block, Bnum, LogPosition, Update};
pub use block::{BLOCK_SIZE, HDRADDRS, HDR_META, LOG_HDR, LOG_HDR2, LOG_SIZE, LOG_START, NBITBLOCK};
pub use device::{BlockDevice, DiskError, FileDisk, MemDisk};
