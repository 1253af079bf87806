//! Persistent binary search tree over [`Reference`]s.
//!
//! Every operation returns a new root reference and leaves the nodes of the
//! old tree untouched: only the nodes on the root-to-target path are copied,
//! everything else is shared between the two versions.

pub mod node;
pub mod ops;

pub use node::Node;

use crate::reference::{Reference, Value};

/// Reference to a tree node; empty for an absent child or the empty tree.
pub type NodeRef = Reference<Node>;

/// Reference to a stored value.
pub type ValueRef = Reference<Value>;
