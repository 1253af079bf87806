use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::error::{Error, StorageError};
use crate::options::DatabaseOptions;
use crate::storage::file::ByteStore;
use crate::tree::ops::KeyValuePair;

use super::coordinator::Coordinator;

struct DatabaseState {
    store: ByteStore,
    coordinator: Coordinator,
}

struct DatabaseInner {
    state: Mutex<DatabaseState>,
    path: PathBuf,
    options: DatabaseOptions,
}

/// The main database handle.
///
/// `Database` is cheaply clonable (`Arc`-based) and `Send + Sync`; clones
/// share one file handle and one transaction. Separate handles opened on the
/// same path arbitrate writes through the file lock.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open the database at `path`, creating it if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_with_options(path, DatabaseOptions::default())
    }

    pub fn open_with_options(
        path: impl AsRef<Path>,
        options: DatabaseOptions,
    ) -> Result<Self, Error> {
        let path = path.as_ref();
        let store = ByteStore::open(path, &options)?;
        info!(path = %path.display(), sync_mode = ?options.get_sync_mode(), "opened database");

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                state: Mutex::new(DatabaseState {
                    store,
                    coordinator: Coordinator::new(),
                }),
                path: path.to_path_buf(),
                options,
            }),
        })
    }

    /// Run `f` on the open state; fails with `Closed` before any I/O otherwise.
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut DatabaseState) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut state = self.inner.state.lock();
        if state.store.is_closed() {
            return Err(StorageError::Closed.into());
        }
        f(&mut state)
    }

    /// Get the value stored under `key`.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
        self.with_state(|state| state.coordinator.read(&state.store, key.as_ref()))
    }

    /// Set `key` to `value`. Not durable or visible to other handles until
    /// [`commit`](Self::commit).
    pub fn set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<(), Error> {
        self.with_state(|state| {
            state
                .coordinator
                .write(&mut state.store, key.as_ref(), value.as_ref())
        })
    }

    /// Remove `key`. Fails with `KeyNotFound` if it is absent.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<(), Error> {
        self.with_state(|state| state.coordinator.erase(&mut state.store, key.as_ref()))
    }

    /// Make all pending writes durable and visible, atomically.
    pub fn commit(&self) -> Result<(), Error> {
        self.with_state(|state| state.coordinator.commit(&mut state.store))
    }

    /// All key-value pairs in ascending key order.
    pub fn list_all(&self) -> Result<Vec<KeyValuePair>, Error> {
        self.with_state(|state| state.coordinator.list_all(&state.store))
    }

    /// Number of keys.
    pub fn len(&self) -> Result<u64, Error> {
        self.with_state(|state| state.coordinator.len(&state.store))
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> Result<bool, Error> {
        self.with_state(|state| state.coordinator.contains(&state.store, key.as_ref()))
    }

    /// Close the underlying file. Uncommitted writes are discarded and every
    /// later operation on this handle (and its clones) fails with `Closed`.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.coordinator.has_pending() {
            info!(path = %self.inner.path.display(), "discarding uncommitted writes on close");
        }
        state.coordinator = Coordinator::new();
        state.store.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().store.is_closed()
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.inner.options
    }
}
