use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::StorageError;
use crate::options::{DatabaseOptions, SyncMode};
use crate::types::{Address, LENGTH_PREFIX_SIZE, SUPERBLOCK_SIZE};

use super::lock::FileLock;
use super::superblock::{ROOT_POINTER_SIZE, Superblock};
use super::{RecordStore, RootStore, check_record_address, parse_length};

/// The open file together with the lock that gates writes to it.
struct OpenFile {
    file: File,
    lock: FileLock,
}

/// Append-only record storage for the database file.
///
/// Reads and writes use `pread`/`pwrite` (via `FileExt::read_exact_at` /
/// `write_all_at`), so there is no shared seek position. Records are only
/// ever appended; the root pointer at offset 0 is the only rewritten field.
pub struct ByteStore {
    open: Option<OpenFile>,
    path: PathBuf,
    sync_mode: SyncMode,
    max_record_len: u64,
}

impl ByteStore {
    /// Open the database file at `path`, creating it if needed, and make
    /// sure the superblock region exists.
    pub fn open(path: &Path, options: &DatabaseOptions) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let lock = FileLock::new(file.try_clone()?);

        let mut store = Self {
            open: Some(OpenFile { file, lock }),
            path: path.to_path_buf(),
            sync_mode: options.get_sync_mode(),
            max_record_len: options.get_max_record_len(),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Pad the file with zeros to at least `SUPERBLOCK_SIZE` bytes.
    ///
    /// A fresh file therefore starts with a root pointer of 0 (empty tree).
    pub fn initialize(&mut self) -> Result<(), StorageError> {
        self.with_lock(|store| {
            let file = store.file()?;
            let len = file.metadata()?.len();
            if len < SUPERBLOCK_SIZE {
                debug!(path = %store.path.display(), len, "initializing superblock");
                file.set_len(SUPERBLOCK_SIZE)?;
                if store.sync_mode == SyncMode::Full {
                    file.sync_all()?;
                }
            }
            Ok(())
        })
    }

    fn file(&self) -> Result<&File, StorageError> {
        self.open
            .as_ref()
            .map(|open| &open.file)
            .ok_or(StorageError::Closed)
    }

    /// Take the writer lock, blocking until granted.
    ///
    /// Returns `true` if this call moved the lock from unheld to held.
    pub fn acquire_lock(&mut self) -> Result<bool, StorageError> {
        let open = self.open.as_mut().ok_or(StorageError::Closed)?;
        open.lock.acquire()
    }

    /// Release the writer lock. No-op if it is not held or the store is closed.
    pub fn release_lock(&mut self) -> Result<(), StorageError> {
        match self.open.as_mut() {
            Some(open) => open.lock.release(),
            None => Ok(()),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.open.as_ref().is_some_and(|open| open.lock.is_held())
    }

    /// Run `f` with the writer lock held.
    ///
    /// If the lock was already held, it stays held afterwards; otherwise it is
    /// taken for the duration of `f` and released whether `f` succeeds or not.
    pub fn with_lock<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let acquired = self.acquire_lock()?;
        let result = f(self);
        if acquired {
            let released = self.release_lock();
            return result.and_then(|value| released.map(|()| value));
        }
        result
    }

    /// Read the committed root address. `None` means the tree is empty.
    pub fn read_root_address(&self) -> Result<Option<Address>, StorageError> {
        let mut buf = [0u8; ROOT_POINTER_SIZE];
        read_exact_or_corrupt(self.file()?, &mut buf, 0, "truncated superblock")?;
        Ok(Superblock::from_bytes(&buf)?.root())
    }

    /// Publish `root` as the committed root and release the writer lock.
    ///
    /// Record data is flushed before the pointer is written, so the pointer
    /// never names a node that is not yet durable.
    pub fn commit_root_address(&mut self, root: Option<Address>) -> Result<(), StorageError> {
        if let Some(address) = root {
            check_record_address(address)?;
        }
        self.acquire_lock()?;
        let written = self.write_root_pointer(root);
        let released = self.release_lock();
        written.and(released)
    }

    fn write_root_pointer(&self, root: Option<Address>) -> Result<(), StorageError> {
        let file = self.file()?;
        if self.sync_mode == SyncMode::Full {
            file.sync_data()?;
        }
        let mut buf = [0u8; ROOT_POINTER_SIZE];
        Superblock::new(root).write_to(&mut buf);
        file.write_all_at(&buf, 0)?;
        if self.sync_mode == SyncMode::Full {
            file.sync_data()?;
        }
        debug!(root = root.unwrap_or(0), "committed root address");
        Ok(())
    }

    /// Append a length-prefixed record and return the address of its prefix.
    pub fn write(&mut self, payload: &[u8]) -> Result<Address, StorageError> {
        let len = payload.len() as u64;
        if len > self.max_record_len {
            return Err(StorageError::RecordTooLarge {
                max: self.max_record_len,
                actual: len,
            });
        }

        self.with_lock(|store| {
            let file = store.file()?;
            let address = file.metadata()?.len();
            if address < SUPERBLOCK_SIZE {
                return Err(StorageError::corruption(
                    address,
                    "file is shorter than the superblock",
                ));
            }

            let mut record = Vec::with_capacity(LENGTH_PREFIX_SIZE as usize + payload.len());
            record.extend_from_slice(&len.to_be_bytes());
            record.extend_from_slice(payload);
            file.write_all_at(&record, address)?;

            trace!(address, len, "wrote record");
            Ok(address)
        })
    }

    /// Read the payload of the record at `address`.
    ///
    /// The prefix and the payload it claims must both lie inside the file;
    /// anything else is corruption, caught before the payload is allocated.
    pub fn read(&self, address: Address) -> Result<Vec<u8>, StorageError> {
        let file = self.file()?;
        check_record_address(address)?;
        let file_len = file.metadata()?.len();

        let payload_start = address
            .checked_add(LENGTH_PREFIX_SIZE)
            .filter(|&end| end <= file_len)
            .ok_or_else(|| StorageError::corruption(address, "address past end of file"))?;

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE as usize];
        read_exact_or_corrupt(file, &mut prefix, address, "truncated length prefix")?;
        let len = parse_length(address, prefix, self.max_record_len)?;

        if payload_start
            .checked_add(len)
            .is_none_or(|end| end > file_len)
        {
            return Err(StorageError::corruption(
                address,
                format!("record length {len} runs past end of file ({file_len} bytes)"),
            ));
        }

        let mut payload = vec![0u8; len as usize];
        read_exact_or_corrupt(file, &mut payload, payload_start, "truncated record payload")?;

        trace!(address, len, "read record");
        Ok(payload)
    }

    /// Close the file. Any held lock is dropped with the descriptor.
    pub fn close(&mut self) {
        if self.open.take().is_some() {
            debug!(path = %self.path.display(), "closed byte store");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.open.is_none()
    }

    /// Current length of the file in bytes.
    pub fn file_len(&self) -> Result<u64, StorageError> {
        Ok(self.file()?.metadata()?.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Largest payload a single record may carry.
    pub fn max_record_len(&self) -> u64 {
        self.max_record_len
    }
}

/// `read_exact_at`, with a short read reported as corruption at `address`.
fn read_exact_or_corrupt(
    file: &File,
    buf: &mut [u8],
    offset: u64,
    reason: &str,
) -> Result<(), StorageError> {
    match file.read_exact_at(buf, offset) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(StorageError::corruption(offset, reason))
        }
        Err(e) => Err(StorageError::Io(e)),
    }
}

impl RecordStore for ByteStore {
    fn read_record(&self, address: Address) -> Result<Vec<u8>, StorageError> {
        self.read(address)
    }

    fn write_record(&mut self, payload: &[u8]) -> Result<Address, StorageError> {
        self.write(payload)
    }
}

impl RootStore for ByteStore {
    fn root_address(&self) -> Result<Option<Address>, StorageError> {
        self.read_root_address()
    }

    fn commit_root_address(&mut self, root: Option<Address>) -> Result<(), StorageError> {
        ByteStore::commit_root_address(self, root)
    }

    fn acquire_lock(&mut self) -> Result<bool, StorageError> {
        ByteStore::acquire_lock(self)
    }

    fn release_lock(&mut self) -> Result<(), StorageError> {
        ByteStore::release_lock(self)
    }

    fn is_locked(&self) -> bool {
        ByteStore::is_locked(self)
    }

    fn max_record_len(&self) -> u64 {
        ByteStore::max_record_len(self)
    }
}
