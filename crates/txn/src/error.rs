// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the transaction layer

use keel_core::Addr;
use keel_storage::WalError;
use thiserror::Error;

/// Errors from transaction operations
#[derive(Debug, Error)]
pub enum TxnError {
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
    #[error("address {addr:?} is not byte-aligned")]
    UnalignedAddr { addr: Addr },
    #[error("address {addr:?} extends past its block")]
    OutOfBounds { addr: Addr },
    #[error("no buffer staged for {addr:?}")]
    NotStaged { addr: Addr },
    #[error("overwrite size mismatch: buffer holds {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}
