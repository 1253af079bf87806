use tracing::{debug, warn};

use crate::error::{Result, StorageError};
use crate::reference::Value;
use crate::storage::RootStore;
use crate::tree::node::record_len;
use crate::tree::ops::{self, KeyValuePair};
use crate::tree::{NodeRef, ValueRef};

/// Sequences root resolution, tree mutation, and commit against a store's
/// writer lock.
///
/// States:
/// ```text
/// Unlocked-Clean --write/erase--> Locked-Dirty --commit--> Unlocked-Clean
/// ```
/// Reads never change state. While unlocked, every read starts from the
/// store's latest committed root; while a mutation is pending, reads and
/// further mutations see the in-memory root instead.
pub struct Coordinator {
    root: NodeRef,
    pending: bool,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            root: NodeRef::empty(),
            pending: false,
        }
    }

    /// The in-memory root, possibly stale while unlocked.
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// True if mutations have been applied but not committed.
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    fn refresh_root<S: RootStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        let address = store.root_address()?;
        debug!(root = address.unwrap_or(0), "refreshing tree root");
        self.root = NodeRef::from_address(address.unwrap_or(0));
        Ok(())
    }

    fn refresh_if_unlocked<S: RootStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        if !store.is_locked() {
            self.refresh_root(store)?;
        }
        Ok(())
    }

    /// Look up `key`, observing the latest commit unless a mutation is pending.
    pub fn read<S: RootStore + ?Sized>(&mut self, store: &S, key: &[u8]) -> Result<Vec<u8>> {
        self.refresh_if_unlocked(store)?;
        ops::lookup(store, &self.root, key)
    }

    /// All pairs in key order, under the same root rule as [`read`](Self::read).
    pub fn list_all<S: RootStore + ?Sized>(&mut self, store: &S) -> Result<Vec<KeyValuePair>> {
        self.refresh_if_unlocked(store)?;
        ops::in_order_traversal(store, &self.root)
    }

    /// Number of keys, under the same root rule as [`read`](Self::read).
    pub fn len<S: RootStore + ?Sized>(&mut self, store: &S) -> Result<u64> {
        self.refresh_if_unlocked(store)?;
        ops::len(store, &self.root)
    }

    pub fn contains<S: RootStore + ?Sized>(&mut self, store: &S, key: &[u8]) -> Result<bool> {
        self.refresh_if_unlocked(store)?;
        ops::contains(store, &self.root, key)
    }

    /// Map `key` to `value` in memory. Visible to this coordinator at once,
    /// to other handles only after [`commit`](Self::commit).
    ///
    /// Fails with `RecordTooLarge` before taking the lock if either record
    /// would exceed the store's limit.
    pub fn write<S: RootStore + ?Sized>(
        &mut self,
        store: &mut S,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let max = store.max_record_len();
        let largest = (1 + value.len() as u64).max(record_len(key.len()));
        if largest > max {
            return Err(StorageError::RecordTooLarge {
                max,
                actual: largest,
            }
            .into());
        }

        let value = ValueRef::new(Value::from(value));
        self.mutate(store, |store, root| ops::insert(store, root, key, value))
    }

    /// Remove `key` in memory. Fails with `KeyNotFound` if it is absent,
    /// leaving the current root unchanged.
    pub fn erase<S: RootStore + ?Sized>(&mut self, store: &mut S, key: &[u8]) -> Result<()> {
        self.mutate(store, |store, root| ops::delete(store, root, key))
    }

    fn mutate<S: RootStore + ?Sized>(
        &mut self,
        store: &mut S,
        op: impl FnOnce(&S, &NodeRef) -> Result<NodeRef>,
    ) -> Result<()> {
        // Build on the latest commit when this call starts the transaction;
        // otherwise keep composing on the pending in-memory root.
        let acquired = store.acquire_lock()?;
        let refreshed = if acquired {
            self.refresh_root(&*store)
        } else {
            Ok(())
        };

        match refreshed.and_then(|()| op(&*store, &self.root)) {
            Ok(new_root) => {
                self.root = new_root;
                self.pending = true;
                Ok(())
            }
            Err(e) => {
                if !self.pending
                    && let Err(release) = store.release_lock()
                {
                    warn!(error = %release, "failed to release lock after rejected mutation");
                }
                Err(e)
            }
        }
    }

    /// Persist every dirty node reachable from the root, then publish the
    /// root address. Releases the writer lock. No-op if nothing is pending.
    ///
    /// If persisting fails the lock stays held and the commit can be retried.
    /// If publishing fails the lock is gone, so the transaction is abandoned
    /// and later reads start again from the last committed root.
    pub fn commit<S: RootStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        if !self.pending {
            return Ok(());
        }
        let address = self.root.persist(store)?;
        if let Err(e) = store.commit_root_address(address) {
            if !store.is_locked() {
                warn!(error = %e, "root commit failed; abandoning transaction");
                self.pending = false;
                self.root = NodeRef::empty();
            }
            return Err(e.into());
        }
        self.pending = false;
        debug!(root = address.unwrap_or(0), "transaction committed");
        Ok(())
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
