//! Core types: record addresses and file-format constants.

/// Byte offset of a record's length prefix within the database file.
///
/// `0` is reserved: it lies inside the superblock, so no record can live
/// there, and it doubles as the "unwritten" / "empty tree" sentinel.
pub type Address = u64;

/// Size of the superblock at the start of every database file.
pub const SUPERBLOCK_SIZE: u64 = 4096;

/// Size of the big-endian length prefix in front of every record.
pub const LENGTH_PREFIX_SIZE: u64 = 8;

/// Default upper bound on a single record's payload length (1 GB).
pub const DEFAULT_MAX_RECORD_LEN: u64 = 1_000_000_000;

/// Maximum key size in bytes.
pub const MAX_KEY_SIZE: usize = 64 * 1024;
