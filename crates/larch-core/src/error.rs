//! Error types for all LarchDB operations.

use std::io;
use thiserror::Error;

use crate::types::Address;

/// Top-level error type for LarchDB operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("key not found: {}", String::from_utf8_lossy(.0))]
    KeyNotFound(Vec<u8>),
}

impl Error {
    /// True if this error reports an absent key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_))
    }

    /// True if the operation was rejected because the store is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Storage(StorageError::Closed))
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupted record at address {address}: {reason}")]
    Corruption { address: Address, reason: String },

    #[error("failed to acquire database file lock: {0}")]
    LockFailed(io::Error),

    #[error("database file is locked")]
    FileLocked,

    #[error("database is closed")]
    Closed,

    #[error("record exceeds maximum size of {max} bytes (got {actual})")]
    RecordTooLarge { max: u64, actual: u64 },
}

impl StorageError {
    pub(crate) fn corruption(address: Address, reason: impl Into<String>) -> Self {
        StorageError::Corruption {
            address,
            reason: reason.into(),
        }
    }
}

/// Failures decoding a record payload into a referent.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("empty payload cannot be decoded")]
    Empty,

    #[error("truncated payload: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown record kind tag: {0:#04x}")]
    UnknownKind(u8),

    #[error("record kind mismatch: expected {expected:?}, got {actual:?}")]
    KindMismatch {
        expected: crate::encoding::RecordKind,
        actual: crate::encoding::RecordKind,
    },

    #[error("node record has no value address")]
    MissingValue,

    #[error("{0} trailing bytes after node record")]
    TrailingBytes(usize),

    #[error("key exceeds maximum size of {max} bytes (got {actual})")]
    KeyTooLarge { max: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
