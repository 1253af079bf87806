//! Lazily-resolved, copy-on-write references to stored records.
//!
//! A [`Reference`] is either empty, an address that has not been read yet,
//! a referent that has not been written yet (dirty), or both once it has
//! been resolved or persisted. Clones share one slot: when a dirty referent
//! reachable from several in-memory tree versions is persisted, it is written
//! once and every holder sees the assigned address.

mod value;

pub use value::Value;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::encoding::{RecordKind, split_kind};
use crate::error::{EncodingError, Result};
use crate::storage::RecordStore;
use crate::types::Address;

/// A type that can live behind a [`Reference`].
///
/// Implemented by the closed set of stored kinds: [`Value`] and
/// [`Node`](crate::tree::Node).
pub trait Referent: Sized + Send + Sync {
    /// Tag written in front of every payload of this kind.
    const KIND: RecordKind;

    /// Encode the body (without the kind tag). Called only after
    /// [`persist_children`](Self::persist_children) has succeeded.
    fn encode_body(&self, buf: &mut Vec<u8>) -> std::result::Result<(), EncodingError>;

    /// Decode a body produced by [`encode_body`](Self::encode_body).
    fn decode_body(body: &[u8]) -> std::result::Result<Self, EncodingError>;

    /// Persist every reference this referent points at, so their addresses
    /// are known before it is encoded.
    fn persist_children<S: RecordStore + ?Sized>(&self, _store: &mut S) -> Result<()> {
        Ok(())
    }
}

struct Slot<T> {
    /// 0 while unwritten.
    address: AtomicU64,
    referent: OnceLock<Arc<T>>,
}

/// Shared, lazily-resolved pointer to a stored `T`.
pub struct Reference<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Referent> Reference<T> {
    fn from_parts(address: Address, referent: Option<Arc<T>>) -> Self {
        let cell = OnceLock::new();
        if let Some(referent) = referent {
            let _ = cell.set(referent);
        }
        Self {
            slot: Arc::new(Slot {
                address: AtomicU64::new(address),
                referent: cell,
            }),
        }
    }

    /// A reference to nothing (an absent child, or the empty tree).
    pub fn empty() -> Self {
        Self::from_parts(0, None)
    }

    /// A reference to an already-written record; `0` yields an empty reference.
    pub fn from_address(address: Address) -> Self {
        Self::from_parts(address, None)
    }

    /// A dirty reference to an in-memory referent.
    pub fn new(referent: T) -> Self {
        Self::from_parts(0, Some(Arc::new(referent)))
    }

    /// Address of the record, if it has been written (or was loaded from one).
    pub fn address(&self) -> Option<Address> {
        match self.slot.address.load(Ordering::Acquire) {
            0 => None,
            address => Some(address),
        }
    }

    /// True if the referent exists only in memory.
    pub fn is_dirty(&self) -> bool {
        self.address().is_none() && self.slot.referent.get().is_some()
    }

    /// True if this reference points at nothing.
    pub fn is_empty(&self) -> bool {
        self.address().is_none() && self.slot.referent.get().is_none()
    }

    /// Whether two references share the same slot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Return the referent, reading and decoding it from `store` on first use.
    ///
    /// Returns `None` for an empty reference.
    pub fn resolve<S: RecordStore + ?Sized>(&self, store: &S) -> Result<Option<Arc<T>>> {
        if let Some(referent) = self.slot.referent.get() {
            return Ok(Some(Arc::clone(referent)));
        }
        let Some(address) = self.address() else {
            return Ok(None);
        };

        let payload = store.read_record(address)?;
        let body = split_kind(&payload, T::KIND)?;
        let decoded = Arc::new(T::decode_body(body)?);
        // A concurrent resolve may have won; both decoded the same bytes.
        let _ = self.slot.referent.set(decoded);
        Ok(self.slot.referent.get().cloned())
    }

    /// Write the referent (and, first, everything it points at) if it is
    /// dirty. Returns the record address, or `None` for an empty reference.
    ///
    /// Persisting an already-written reference issues no write.
    pub fn persist<S: RecordStore + ?Sized>(&self, store: &mut S) -> Result<Option<Address>> {
        if !self.is_dirty() {
            return Ok(self.address());
        }
        if let Some(referent) = self.slot.referent.get() {
            referent.persist_children(store)?;
        }
        self.persist_shallow(store)
    }

    /// Write only this referent; everything it points at must already have
    /// an address. No-op unless dirty.
    pub(crate) fn persist_shallow<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
    ) -> Result<Option<Address>> {
        if !self.is_dirty() {
            return Ok(self.address());
        }
        let Some(referent) = self.slot.referent.get() else {
            return Ok(None);
        };

        let mut payload = vec![T::KIND as u8];
        referent.encode_body(&mut payload)?;
        let address = store.write_record(&payload)?;
        self.slot.address.store(address, Ordering::Release);
        Ok(Some(address))
    }

    /// True if dropping this reference would also drop its cached referent.
    pub(crate) fn is_sole_owner(&self) -> bool {
        Arc::strong_count(&self.slot) == 1
            && self
                .slot
                .referent
                .get()
                .is_some_and(|referent| Arc::strong_count(referent) == 1)
    }

    /// Take the cached referent out, if this is its only owner.
    pub(crate) fn into_sole_referent(self) -> Option<T> {
        let slot = Arc::into_inner(self.slot)?;
        slot.referent.into_inner().and_then(Arc::into_inner)
    }
}

impl<T> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("address", &self.slot.address.load(Ordering::Acquire))
            .field("resolved", &self.slot.referent.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::InMemoryRecordStore;

    #[test]
    fn test_states() {
        let empty = Reference::<Value>::empty();
        assert!(empty.is_empty());
        assert!(!empty.is_dirty());

        let dirty = Reference::new(Value::from("v"));
        assert!(dirty.is_dirty());
        assert!(!dirty.is_empty());
        assert_eq!(dirty.address(), None);

        let stored = Reference::<Value>::from_address(4096);
        assert!(!stored.is_dirty());
        assert!(!stored.is_empty());
        assert_eq!(stored.address(), Some(4096));

        assert!(Reference::<Value>::from_address(0).is_empty());
    }

    #[test]
    fn test_persist_then_resolve_fresh_reference() {
        let mut store = InMemoryRecordStore::new();
        let reference = Reference::new(Value::from("payload"));

        let address = reference.persist(&mut store).unwrap().unwrap();
        assert!(!reference.is_dirty());
        assert_eq!(reference.address(), Some(address));

        let fresh = Reference::<Value>::from_address(address);
        let value = fresh.resolve(&store).unwrap().unwrap();
        assert_eq!(value.as_bytes(), b"payload");
    }

    #[test]
    fn test_persist_twice_writes_once() {
        let mut store = InMemoryRecordStore::new();
        let reference = Reference::new(Value::from("once"));

        let first = reference.persist(&mut store).unwrap();
        let second = reference.persist(&mut store).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_clones_share_assigned_address() {
        let mut store = InMemoryRecordStore::new();
        let reference = Reference::new(Value::from("shared"));
        let alias = reference.clone();
        assert!(alias.ptr_eq(&reference));

        reference.persist(&mut store).unwrap();
        assert!(!alias.is_dirty());
        assert_eq!(alias.persist(&mut store).unwrap(), reference.address());
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_resolve_caches_referent() {
        let mut store = InMemoryRecordStore::new();
        let address = Reference::new(Value::from("cached"))
            .persist(&mut store)
            .unwrap()
            .unwrap();

        let reference = Reference::<Value>::from_address(address);
        let a = reference.resolve(&store).unwrap().unwrap();
        let b = reference.resolve(&store).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_empty_resolves_to_none_and_persists_nothing() {
        let mut store = InMemoryRecordStore::new();
        let empty = Reference::<Value>::empty();
        assert!(empty.resolve(&store).unwrap().is_none());
        assert_eq!(empty.persist(&mut store).unwrap(), None);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_sole_owner() {
        let reference = Reference::new(Value::from("mine"));
        assert!(reference.is_sole_owner());

        let alias = reference.clone();
        assert!(!reference.is_sole_owner());
        drop(alias);

        let value = reference.into_sole_referent().unwrap();
        assert_eq!(value.as_bytes(), b"mine");

        // An unresolved reference owns no referent.
        assert!(!Reference::<Value>::from_address(4096).is_sole_owner());
    }

    #[test]
    fn test_resolve_empty_payload_fails() {
        let mut store = InMemoryRecordStore::new();
        let address = store.write_record(&[]).unwrap();
        let reference = Reference::<Value>::from_address(address);
        assert!(matches!(
            reference.resolve(&store),
            Err(Error::Encoding(EncodingError::Empty))
        ));
    }

    #[test]
    fn test_resolve_wrong_kind_fails() {
        let mut store = InMemoryRecordStore::new();
        let address = store
            .write_record(&[RecordKind::Node as u8, 0, 0])
            .unwrap();
        let reference = Reference::<Value>::from_address(address);
        assert!(matches!(
            reference.resolve(&store),
            Err(Error::Encoding(EncodingError::KindMismatch { .. }))
        ));
    }
}
