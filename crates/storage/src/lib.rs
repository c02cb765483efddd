// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-storage: crash-safe write-ahead logging
//!
//! ## Architecture
//!
//! ```text
//! clients ── mem_append ──▶ WalState (in memory, absorbing)
//!                               │ logger thread
//!                               ▼
//!                          CircularLog (ring + two headers)
//!                               │ installer thread
//!                               ▼
//!                          home blocks on the device
//! ```
//!
//! The header-1 write is the commit point: once it is durable, the logged
//! prefix survives any crash. The installer copies logged updates to their
//! home addresses and reclaims ring space by advancing header 2.

pub mod circular;
pub mod state;
pub mod wal;

pub use circular::CircularLog;
pub use wal::{WalError, Walog};
