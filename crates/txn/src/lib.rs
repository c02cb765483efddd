// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-txn: two-phase buffered transactions
//!
//! A transaction acquires per-address locks, stages reads and writes in a
//! private buffer map, and commits its dirty set to the write-ahead log as
//! one atomic batch. Aborts take the same path so rollback metadata reaches
//! the log.

pub mod bufmap;
pub mod error;
pub mod lockmap;
pub mod txn;

pub use bufmap::{Buf, BufMap};
pub use error::TxnError;
pub use lockmap::{LockMap, TransId};
pub use txn::{BufTxn, Txn};
