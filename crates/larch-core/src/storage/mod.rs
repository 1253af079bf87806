//! Storage engine: append-only record file, superblock, locking.

pub mod file;
pub mod lock;
pub mod superblock;

use crate::error::StorageError;
use crate::types::{Address, DEFAULT_MAX_RECORD_LEN, LENGTH_PREFIX_SIZE, SUPERBLOCK_SIZE};

/// Abstraction over append-only record reads and writes.
///
/// References and tree operations never touch the file directly; they go
/// through this trait so the same code runs against the file-backed
/// [`ByteStore`](file::ByteStore) and the in-memory test store.
pub trait RecordStore {
    /// Read the payload of the record whose length prefix starts at `address`.
    fn read_record(&self, address: Address) -> Result<Vec<u8>, StorageError>;
    /// Append a record and return the address of its length prefix.
    fn write_record(&mut self, payload: &[u8]) -> Result<Address, StorageError>;
}

/// A [`RecordStore`] that also owns the root pointer and the writer lock.
pub trait RootStore: RecordStore {
    /// The committed root address, or `None` for the empty tree.
    fn root_address(&self) -> Result<Option<Address>, StorageError>;
    /// Publish `root` as the committed root and release the writer lock.
    fn commit_root_address(&mut self, root: Option<Address>) -> Result<(), StorageError>;
    /// Take the writer lock; `true` if this call took it.
    fn acquire_lock(&mut self) -> Result<bool, StorageError>;
    /// Release the writer lock if held.
    fn release_lock(&mut self) -> Result<(), StorageError>;
    /// Whether this handle currently holds the writer lock.
    fn is_locked(&self) -> bool;
    /// Largest payload [`write_record`](RecordStore::write_record) accepts.
    fn max_record_len(&self) -> u64;
}

/// Decode and bound-check a record length prefix.
pub(crate) fn parse_length(
    address: Address,
    prefix: [u8; LENGTH_PREFIX_SIZE as usize],
    max_len: u64,
) -> Result<u64, StorageError> {
    let len = u64::from_be_bytes(prefix);
    if len > max_len {
        return Err(StorageError::corruption(
            address,
            format!("invalid record length {len} (max {max_len})"),
        ));
    }
    Ok(len)
}

pub(crate) fn check_record_address(address: Address) -> Result<(), StorageError> {
    if address < SUPERBLOCK_SIZE {
        return Err(StorageError::corruption(
            address,
            "address lies inside the superblock",
        ));
    }
    Ok(())
}

/// In-memory record store backed by a `Vec<u8>` laid out exactly like the
/// file format. Used for testing.
///
/// Counts record writes so tests can observe how many records an operation
/// appended.
pub struct InMemoryRecordStore {
    data: Vec<u8>,
    locked: bool,
    writes: usize,
    max_record_len: u64,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; SUPERBLOCK_SIZE as usize],
            locked: false,
            writes: 0,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
        }
    }

    /// Cap record payloads at `max` bytes, like
    /// [`DatabaseOptions::max_record_len`](crate::options::DatabaseOptions::max_record_len).
    pub fn with_max_record_len(mut self, max: u64) -> Self {
        self.max_record_len = max;
        self
    }

    /// Number of records appended so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Total size of the backing buffer, superblock included.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.len() as u64 == SUPERBLOCK_SIZE
    }

    /// Raw bytes of the backing buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn read_record(&self, address: Address) -> Result<Vec<u8>, StorageError> {
        check_record_address(address)?;
        let past_end = || StorageError::corruption(address, "address past end of buffer");

        let start = usize::try_from(address).map_err(|_| past_end())?;
        let prefix_end = start
            .checked_add(LENGTH_PREFIX_SIZE as usize)
            .ok_or_else(past_end)?;
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE as usize];
        prefix.copy_from_slice(self.data.get(start..prefix_end).ok_or_else(past_end)?);

        let len = parse_length(address, prefix, self.max_record_len)?;
        let payload_end = usize::try_from(len)
            .ok()
            .and_then(|len| prefix_end.checked_add(len))
            .ok_or_else(|| StorageError::corruption(address, "truncated record payload"))?;
        self.data
            .get(prefix_end..payload_end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| StorageError::corruption(address, "truncated record payload"))
    }

    fn write_record(&mut self, payload: &[u8]) -> Result<Address, StorageError> {
        let len = payload.len() as u64;
        if len > self.max_record_len {
            return Err(StorageError::RecordTooLarge {
                max: self.max_record_len,
                actual: len,
            });
        }
        let address = self.data.len() as Address;
        self.data.extend_from_slice(&len.to_be_bytes());
        self.data.extend_from_slice(payload);
        self.writes += 1;
        Ok(address)
    }
}

impl RootStore for InMemoryRecordStore {
    fn root_address(&self) -> Result<Option<Address>, StorageError> {
        let mut buf = [0u8; superblock::ROOT_POINTER_SIZE];
        buf.copy_from_slice(&self.data[..superblock::ROOT_POINTER_SIZE]);
        Ok(superblock::Superblock::from_bytes(&buf)?.root())
    }

    fn commit_root_address(&mut self, root: Option<Address>) -> Result<(), StorageError> {
        let mut buf = [0u8; superblock::ROOT_POINTER_SIZE];
        superblock::Superblock::new(root).write_to(&mut buf);
        self.data[..superblock::ROOT_POINTER_SIZE].copy_from_slice(&buf);
        self.locked = false;
        Ok(())
    }

    fn acquire_lock(&mut self) -> Result<bool, StorageError> {
        if self.locked {
            return Ok(false);
        }
        self.locked = true;
        Ok(true)
    }

    fn release_lock(&mut self) -> Result<(), StorageError> {
        self.locked = false;
        Ok(())
    }

    fn is_locked(&self) -> bool {
        self.locked
    }

    fn max_record_len(&self) -> u64 {
        self.max_record_len
    }
}
