//! Copy-on-write binary search tree operations: lookup, insert, delete, and
//! in-order traversal.
//!
//! No rebalancing is done, so depth follows insertion order and can reach
//! `n` for sorted input.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{EncodingError, Error, Result};
use crate::storage::RecordStore;
use crate::types::MAX_KEY_SIZE;

use super::{Node, NodeRef, ValueRef};

/// A key-value pair returned by traversals.
pub type KeyValuePair = (Vec<u8>, Vec<u8>);

/// Find the value stored under `key`.
pub fn lookup<S: RecordStore + ?Sized>(store: &S, root: &NodeRef, key: &[u8]) -> Result<Vec<u8>> {
    let mut current = root.resolve(store)?;
    while let Some(node) = current {
        current = match key.cmp(node.key()) {
            Ordering::Less => node.left().resolve(store)?,
            Ordering::Greater => node.right().resolve(store)?,
            Ordering::Equal => {
                let value = node
                    .value()
                    .resolve(store)?
                    .ok_or(EncodingError::MissingValue)?;
                return Ok(value.as_bytes().to_vec());
            }
        };
    }
    Err(Error::KeyNotFound(key.to_vec()))
}

/// True if `key` is present.
pub fn contains<S: RecordStore + ?Sized>(store: &S, root: &NodeRef, key: &[u8]) -> Result<bool> {
    match lookup(store, root, key) {
        Ok(_) => Ok(true),
        Err(Error::KeyNotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Which child of an ancestor the walk descended into.
#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Ancestors of the current position, root first.
type Path = Vec<(Arc<Node>, Side)>;

/// Copy every ancestor on `path` bottom-up, hanging `child` where the walk
/// left off. `adjust` maps each ancestor's old subtree size to its new one.
fn rebuild(mut path: Path, mut child: NodeRef, adjust: impl Fn(u64) -> u64) -> NodeRef {
    while let Some((node, side)) = path.pop() {
        let size = adjust(node.size());
        let copy = match side {
            Side::Left => node.with_left(child, size),
            Side::Right => node.with_right(child, size),
        };
        child = NodeRef::new(copy);
    }
    child
}

/// Return a new root with `key` mapped to `value`.
///
/// Only the nodes on the path to `key` are copied. If the key already exists,
/// its node is copied with just the value reference replaced.
pub fn insert<S: RecordStore + ?Sized>(
    store: &S,
    root: &NodeRef,
    key: &[u8],
    value: ValueRef,
) -> Result<NodeRef> {
    if key.len() > MAX_KEY_SIZE {
        return Err(EncodingError::KeyTooLarge {
            max: MAX_KEY_SIZE,
            actual: key.len(),
        }
        .into());
    }

    let mut path = Path::new();
    let mut current = root.resolve(store)?;
    while let Some(node) = current {
        let side = match key.cmp(node.key()) {
            Ordering::Less => Side::Left,
            Ordering::Greater => Side::Right,
            Ordering::Equal => {
                let replaced = NodeRef::new(node.with_value(value));
                return Ok(rebuild(path, replaced, |size| size));
            }
        };
        current = match side {
            Side::Left => node.left().resolve(store)?,
            Side::Right => node.right().resolve(store)?,
        };
        path.push((node, side));
    }

    let leaf = NodeRef::new(Node::leaf(key.to_vec(), value));
    Ok(rebuild(path, leaf, |size| size + 1))
}

/// Return a new root without `key`.
///
/// A node with at most one child is replaced by that child. A node with two
/// children takes over the key and value of its in-order successor, which is
/// then removed from the right subtree.
pub fn delete<S: RecordStore + ?Sized>(store: &S, root: &NodeRef, key: &[u8]) -> Result<NodeRef> {
    let mut path = Path::new();
    let mut current = root.resolve(store)?;
    let target = loop {
        let Some(node) = current else {
            return Err(Error::KeyNotFound(key.to_vec()));
        };
        let side = match key.cmp(node.key()) {
            Ordering::Less => Side::Left,
            Ordering::Greater => Side::Right,
            Ordering::Equal => break node,
        };
        current = match side {
            Side::Left => node.left().resolve(store)?,
            Side::Right => node.right().resolve(store)?,
        };
        path.push((node, side));
    };

    let shrink = |size: u64| size.saturating_sub(1);
    let replacement = if target.left().is_empty() {
        target.right().clone()
    } else {
        match remove_minimum(store, target.right())? {
            None => target.left().clone(),
            Some((successor, right)) => {
                NodeRef::new(target.with_successor(&successor, right, shrink(target.size())))
            }
        }
    };
    Ok(rebuild(path, replacement, shrink))
}

/// Remove the leftmost node of a non-empty subtree. Returns that node and
/// the copied subtree without it, or `None` if the subtree is empty.
fn remove_minimum<S: RecordStore + ?Sized>(
    store: &S,
    node_ref: &NodeRef,
) -> Result<Option<(Arc<Node>, NodeRef)>> {
    let Some(mut current) = node_ref.resolve(store)? else {
        return Ok(None);
    };
    let mut path = Path::new();
    while let Some(left) = current.left().resolve(store)? {
        path.push((current, Side::Left));
        current = left;
    }
    let rest = rebuild(path, current.right().clone(), |size| size.saturating_sub(1));
    Ok(Some((current, rest)))
}

/// The leftmost node of the subtree at `node_ref`, or `None` if it is empty.
pub fn find_minimum<S: RecordStore + ?Sized>(
    store: &S,
    node_ref: &NodeRef,
) -> Result<Option<Arc<Node>>> {
    let Some(mut current) = node_ref.resolve(store)? else {
        return Ok(None);
    };
    while let Some(left) = current.left().resolve(store)? {
        current = left;
    }
    Ok(Some(current))
}

/// All key-value pairs in ascending key order.
///
/// Walks left, self, right with an explicit stack, so a degenerate (list
/// shaped) tree does not deepen the call stack.
pub fn in_order_traversal<S: RecordStore + ?Sized>(
    store: &S,
    root: &NodeRef,
) -> Result<Vec<KeyValuePair>> {
    let mut result = Vec::new();
    let mut stack: Vec<Arc<Node>> = Vec::new();
    let mut current = root.resolve(store)?;

    loop {
        while let Some(node) = current {
            current = node.left().resolve(store)?;
            stack.push(node);
        }
        let Some(node) = stack.pop() else {
            break;
        };
        let value = node
            .value()
            .resolve(store)?
            .ok_or(EncodingError::MissingValue)?;
        result.push((node.key().to_vec(), value.as_bytes().to_vec()));
        current = node.right().resolve(store)?;
    }

    Ok(result)
}

/// Number of keys in the tree.
pub fn len<S: RecordStore + ?Sized>(store: &S, root: &NodeRef) -> Result<u64> {
    Ok(root.resolve(store)?.map_or(0, |node| node.size()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Value;
    use crate::storage::InMemoryRecordStore;

    fn val(s: &str) -> ValueRef {
        ValueRef::new(Value::from(s))
    }

    fn build(store: &InMemoryRecordStore, keys: &[u8]) -> NodeRef {
        let mut root = NodeRef::empty();
        for &k in keys {
            root = insert(store, &root, &[k], val(&k.to_string())).unwrap();
        }
        root
    }

    fn keys(store: &InMemoryRecordStore, root: &NodeRef) -> Vec<u8> {
        in_order_traversal(store, root)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k[0])
            .collect()
    }

    #[test]
    fn test_lookup_empty_tree() {
        let store = InMemoryRecordStore::new();
        match lookup(&store, &NodeRef::empty(), b"a") {
            Err(Error::KeyNotFound(k)) => assert_eq!(k, b"a"),
            other => panic!("expected KeyNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = InMemoryRecordStore::new();
        let root = build(&store, &[5, 3, 8]);
        assert_eq!(lookup(&store, &root, &[3]).unwrap(), b"3");
        assert_eq!(lookup(&store, &root, &[8]).unwrap(), b"8");
        assert!(lookup(&store, &root, &[4]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_insert_existing_replaces_value_only() {
        let store = InMemoryRecordStore::new();
        let root = build(&store, &[5, 3, 8]);
        let old_root = root.resolve(&store).unwrap().unwrap();

        let new_root = insert(&store, &root, &[5], val("five")).unwrap();
        let node = new_root.resolve(&store).unwrap().unwrap();

        assert_eq!(lookup(&store, &new_root, &[5]).unwrap(), b"five");
        assert!(node.left().ptr_eq(old_root.left()));
        assert!(node.right().ptr_eq(old_root.right()));
        assert_eq!(node.size(), 3);
        // The previous version still sees the old value.
        assert_eq!(lookup(&store, &root, &[5]).unwrap(), b"5");
    }

    #[test]
    fn test_insert_shares_untouched_sibling() {
        let store = InMemoryRecordStore::new();
        let root = build(&store, &[5, 3, 8]);
        let before = root.resolve(&store).unwrap().unwrap();

        let after = insert(&store, &root, &[9], val("9")).unwrap();
        let after = after.resolve(&store).unwrap().unwrap();

        assert!(after.left().ptr_eq(before.left()));
        assert!(!after.right().ptr_eq(before.right()));
        assert!(after.value().ptr_eq(before.value()));
        assert_eq!(after.size(), 4);
    }

    #[test]
    fn test_traversal_is_sorted_and_unique() {
        let store = InMemoryRecordStore::new();
        let root = build(&store, &[50, 20, 80, 10, 30, 70, 90, 30, 10, 60]);
        assert_eq!(keys(&store, &root), vec![10, 20, 30, 50, 60, 70, 80, 90]);
        assert_eq!(len(&store, &root).unwrap(), 8);
    }

    #[test]
    fn test_delete_leaf_and_single_child() {
        let store = InMemoryRecordStore::new();
        let root = build(&store, &[5, 3, 8, 1]);

        let root = delete(&store, &root, &[1]).unwrap();
        assert_eq!(keys(&store, &root), vec![3, 5, 8]);

        // 3 now has no children; 8 has none either. Add a child to 8.
        let root = insert(&store, &root, &[9], val("9")).unwrap();
        let root = delete(&store, &root, &[8]).unwrap();
        assert_eq!(keys(&store, &root), vec![3, 5, 9]);
        assert_eq!(len(&store, &root).unwrap(), 3);
    }

    #[test]
    fn test_delete_two_children_uses_successor() {
        let store = InMemoryRecordStore::new();
        let root = build(&store, &[5, 3, 8, 1, 4, 7, 9]);

        let new_root = delete(&store, &root, &[5]).unwrap();
        assert_eq!(keys(&store, &new_root), vec![1, 3, 4, 7, 8, 9]);

        let node = new_root.resolve(&store).unwrap().unwrap();
        assert_eq!(node.key(), &[7]);
        assert_eq!(lookup(&store, &new_root, &[7]).unwrap(), b"7");
        assert_eq!(node.size(), 6);

        // The old version is unchanged.
        assert_eq!(keys(&store, &root), vec![1, 3, 4, 5, 7, 8, 9]);
    }

    #[test]
    fn test_delete_missing_key() {
        let store = InMemoryRecordStore::new();
        let root = build(&store, &[5, 3, 8]);
        match delete(&store, &root, &[6]) {
            Err(Error::KeyNotFound(k)) => assert_eq!(k, vec![6]),
            other => panic!("expected KeyNotFound, got {other:?}"),
        }
        assert!(delete(&store, &NodeRef::empty(), &[1]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_last_key_yields_empty_tree() {
        let store = InMemoryRecordStore::new();
        let root = build(&store, &[1]);
        let root = delete(&store, &root, &[1]).unwrap();
        assert!(root.is_empty());
        assert_eq!(len(&store, &root).unwrap(), 0);
        assert!(in_order_traversal(&store, &root).unwrap().is_empty());
    }

    #[test]
    fn test_find_minimum() {
        let store = InMemoryRecordStore::new();
        let root = build(&store, &[5, 3, 8, 4]);
        let min = find_minimum(&store, &root).unwrap().unwrap();
        assert_eq!(min.key(), &[3]);
        assert!(find_minimum(&store, &NodeRef::empty()).unwrap().is_none());
    }

    #[test]
    fn test_operations_over_persisted_tree() {
        let mut store = InMemoryRecordStore::new();
        let root = build(&store, &[5, 3, 8, 1, 4, 7, 9]);
        let address = root.persist(&mut store).unwrap().unwrap();

        let reloaded = NodeRef::from_address(address);
        let root = delete(&store, &reloaded, &[3]).unwrap();
        let root = insert(&store, &root, &[6], val("6")).unwrap();
        assert_eq!(keys(&store, &root), vec![1, 4, 5, 6, 7, 8, 9]);
        assert_eq!(len(&store, &root).unwrap(), 7);
    }

    #[test]
    fn test_size_tracks_key_count() {
        let store = InMemoryRecordStore::new();
        let inserts = [42u8, 7, 99, 7, 13, 250, 0, 42, 128, 64];
        let mut root = NodeRef::empty();
        let mut expected = std::collections::BTreeSet::new();
        for &k in &inserts {
            root = insert(&store, &root, &[k], val("v")).unwrap();
            expected.insert(k);
            assert_eq!(len(&store, &root).unwrap(), expected.len() as u64);
        }
        for &k in &[7u8, 42, 0, 250] {
            root = delete(&store, &root, &[k]).unwrap();
            expected.remove(&k);
            assert_eq!(len(&store, &root).unwrap(), expected.len() as u64);
        }
        assert_eq!(keys(&store, &root), expected.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_contains() {
        let store = InMemoryRecordStore::new();
        let root = build(&store, &[2, 1]);
        assert!(contains(&store, &root, &[1]).unwrap());
        assert!(!contains(&store, &root, &[3]).unwrap());
    }

    #[test]
    fn test_key_too_large() {
        let store = InMemoryRecordStore::new();
        let key = vec![0u8; MAX_KEY_SIZE + 1];
        assert!(matches!(
            insert(&store, &NodeRef::empty(), &key, val("v")),
            Err(Error::Encoding(EncodingError::KeyTooLarge { .. }))
        ));
    }

    fn sorted_chain(store: &InMemoryRecordStore, count: u64) -> NodeRef {
        let mut root = NodeRef::empty();
        for i in 0..count {
            root = insert(store, &root, &i.to_be_bytes(), val("v")).unwrap();
        }
        root
    }

    #[test]
    fn test_sorted_inserts_build_deep_tree() {
        let store = InMemoryRecordStore::new();
        let root = sorted_chain(&store, 5_000);

        assert_eq!(len(&store, &root).unwrap(), 5_000);
        assert_eq!(lookup(&store, &root, &4_999u64.to_be_bytes()).unwrap(), b"v");
        let pairs = in_order_traversal(&store, &root).unwrap();
        assert_eq!(pairs.len(), 5_000);
        assert_eq!(pairs[0].0, 0u64.to_be_bytes());
        assert_eq!(pairs[4_999].0, 4_999u64.to_be_bytes());
    }

    #[test]
    fn test_deep_tree_delete_and_replace() {
        let store = InMemoryRecordStore::new();
        let root = sorted_chain(&store, 5_000);

        let root = delete(&store, &root, &4_999u64.to_be_bytes()).unwrap();
        let root = delete(&store, &root, &2_500u64.to_be_bytes()).unwrap();
        let root = insert(&store, &root, &4_000u64.to_be_bytes(), val("new")).unwrap();

        assert_eq!(len(&store, &root).unwrap(), 4_998);
        assert_eq!(lookup(&store, &root, &4_000u64.to_be_bytes()).unwrap(), b"new");
        assert!(!contains(&store, &root, &2_500u64.to_be_bytes()).unwrap());
        assert!(!contains(&store, &root, &4_999u64.to_be_bytes()).unwrap());
    }

    #[test]
    fn test_deep_tree_persist_and_reload() {
        let mut store = InMemoryRecordStore::new();
        let root = sorted_chain(&store, 5_000);
        let address = root.persist(&mut store).unwrap().unwrap();
        drop(root);

        let reloaded = NodeRef::from_address(address);
        assert_eq!(in_order_traversal(&store, &reloaded).unwrap().len(), 5_000);
        // Drops a fully resolved 5k-deep chain.
        drop(reloaded);
    }

    #[test]
    fn test_delete_two_children_deep_successor() {
        let store = InMemoryRecordStore::new();
        // Root [0, 0] with left child [0] and a right subtree whose minimum,
        // [0, 0, 0], sits at the end of a 200-node left spine.
        let mut root = insert(&store, &NodeRef::empty(), &[0, 0], val("root")).unwrap();
        root = insert(&store, &root, &[0], val("left")).unwrap();
        root = insert(&store, &root, &[9, 0], val("right")).unwrap();
        for i in (1..=200u8).rev() {
            root = insert(&store, &root, &[1, i], val("spine")).unwrap();
        }
        root = insert(&store, &root, &[0, 0, 0], val("deep")).unwrap();
        let before = len(&store, &root).unwrap();
        assert_eq!(before, 204);

        let root = delete(&store, &root, &[0, 0]).unwrap();

        let node = root.resolve(&store).unwrap().unwrap();
        assert_eq!(node.key(), &[0, 0, 0]);
        assert_eq!(node.size(), before - 1);
        assert_eq!(lookup(&store, &root, &[0, 0, 0]).unwrap(), b"deep");
        let keys: Vec<Vec<u8>> = in_order_traversal(&store, &root)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
