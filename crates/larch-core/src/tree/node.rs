use crate::encoding::RecordKind;
use crate::encoding::binary::{FieldReader, put_bytes, put_u64};
use crate::error::{EncodingError, Result};
use crate::reference::Referent;
use crate::storage::RecordStore;
use crate::types::MAX_KEY_SIZE;

use super::{NodeRef, ValueRef};

/// An immutable binary-search-tree node.
///
/// Record body layout (after the kind tag):
/// ```text
/// left:  u64 BE   (0 = no left child)
/// key:   u32 BE length + bytes
/// value: u64 BE   (never 0)
/// right: u64 BE   (0 = no right child)
/// size:  u64 BE   (nodes in this subtree, including itself)
/// ```
#[derive(Debug)]
pub struct Node {
    left: NodeRef,
    key: Vec<u8>,
    value: ValueRef,
    right: NodeRef,
    size: u64,
}

/// Payload length of a node record holding a `key_len`-byte key: kind tag,
/// left, key length, value, right and size fields.
pub const fn record_len(key_len: usize) -> u64 {
    (1 + 8 + 4 + 8 + 8 + 8 + key_len) as u64
}

impl Node {
    /// A node with no children.
    pub fn leaf(key: Vec<u8>, value: ValueRef) -> Self {
        Self {
            left: NodeRef::empty(),
            key,
            value,
            right: NodeRef::empty(),
            size: 1,
        }
    }

    pub fn left(&self) -> &NodeRef {
        &self.left
    }

    pub fn right(&self) -> &NodeRef {
        &self.right
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &ValueRef {
        &self.value
    }

    /// Number of nodes in the subtree rooted here.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Copy with a new left subtree; the value and right subtree are shared.
    pub fn with_left(&self, left: NodeRef, size: u64) -> Self {
        Self {
            left,
            key: self.key.clone(),
            value: self.value.clone(),
            right: self.right.clone(),
            size,
        }
    }

    /// Copy with a new right subtree; the value and left subtree are shared.
    pub fn with_right(&self, right: NodeRef, size: u64) -> Self {
        Self {
            left: self.left.clone(),
            key: self.key.clone(),
            value: self.value.clone(),
            right,
            size,
        }
    }

    /// Copy with only the value replaced.
    pub fn with_value(&self, value: ValueRef) -> Self {
        Self {
            left: self.left.clone(),
            key: self.key.clone(),
            value,
            right: self.right.clone(),
            size: self.size,
        }
    }

    /// Copy that takes over `successor`'s key and value, with `right` as the
    /// new right subtree. Used when deleting a node with two children.
    pub fn with_successor(&self, successor: &Node, right: NodeRef, size: u64) -> Self {
        Self {
            left: self.left.clone(),
            key: successor.key.clone(),
            value: successor.value.clone(),
            right,
            size,
        }
    }
}

impl Referent for Node {
    const KIND: RecordKind = RecordKind::Node;

    fn encode_body(&self, buf: &mut Vec<u8>) -> std::result::Result<(), EncodingError> {
        if self.key.len() > MAX_KEY_SIZE {
            return Err(EncodingError::KeyTooLarge {
                max: MAX_KEY_SIZE,
                actual: self.key.len(),
            });
        }
        let value = self.value.address().ok_or(EncodingError::MissingValue)?;

        put_u64(buf, self.left.address().unwrap_or(0));
        put_bytes(buf, &self.key);
        put_u64(buf, value);
        put_u64(buf, self.right.address().unwrap_or(0));
        put_u64(buf, self.size);
        Ok(())
    }

    fn decode_body(body: &[u8]) -> std::result::Result<Self, EncodingError> {
        let mut reader = FieldReader::new(body);
        let left = reader.u64()?;
        let key = reader.bytes()?.to_vec();
        let value = reader.u64()?;
        let right = reader.u64()?;
        let size = reader.u64()?;
        if reader.remaining() != 0 {
            return Err(EncodingError::TrailingBytes(reader.remaining()));
        }
        if value == 0 {
            return Err(EncodingError::MissingValue);
        }

        Ok(Self {
            left: NodeRef::from_address(left),
            key,
            value: ValueRef::from_address(value),
            right: NodeRef::from_address(right),
            size,
        })
    }

    /// Children are written before their parent: value, then left, then
    /// right. Walks dirty descendants with an explicit post-order stack, so
    /// a degenerate tree does not deepen the call stack.
    fn persist_children<S: RecordStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        self.value.persist(store)?;

        let mut stack = vec![(self.right.clone(), false), (self.left.clone(), false)];
        while let Some((node_ref, children_written)) = stack.pop() {
            if !node_ref.is_dirty() {
                continue;
            }
            if children_written {
                node_ref.persist_shallow(store)?;
                continue;
            }
            let Some(node) = node_ref.resolve(&*store)? else {
                continue;
            };
            node.value.persist(store)?;
            stack.push((node_ref, true));
            stack.push((node.right.clone(), false));
            stack.push((node.left.clone(), false));
        }
        Ok(())
    }
}

/// Unlink solely-owned descendants one at a time; the default drop glue
/// would recurse once per tree level.
impl Drop for Node {
    fn drop(&mut self) {
        let mut detached = Vec::new();
        detach_sole_child(&mut self.left, &mut detached);
        detach_sole_child(&mut self.right, &mut detached);

        while let Some(child) = detached.pop() {
            if let Some(mut node) = child.into_sole_referent() {
                detach_sole_child(&mut node.left, &mut detached);
                detach_sole_child(&mut node.right, &mut detached);
            }
        }
    }
}

fn detach_sole_child(child: &mut NodeRef, detached: &mut Vec<NodeRef>) {
    if child.is_sole_owner() {
        detached.push(std::mem::replace(child, NodeRef::empty()));
    }
}
