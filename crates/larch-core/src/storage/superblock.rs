use crate::error::StorageError;
use crate::types::{Address, SUPERBLOCK_SIZE};

/// Number of superblock bytes occupied by the root pointer.
pub const ROOT_POINTER_SIZE: usize = 8;

/// The fixed header at the start of the database file.
///
/// Layout (within the 4096-byte superblock):
/// ```text
/// [0..8]     root_address: u64 big-endian (0 = empty tree)
/// [8..4096]  reserved, zero
/// ```
///
/// Only the root pointer is ever rewritten; an aligned 8-byte write is the
/// single atomic step that publishes a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Superblock {
    pub root_address: Address,
}

impl Superblock {
    /// A superblock pointing at `root`, or at the empty tree for `None`.
    pub fn new(root: Option<Address>) -> Self {
        Self {
            root_address: root.unwrap_or(0),
        }
    }

    /// Parse the root pointer bytes.
    ///
    /// A non-zero root that points back into the superblock cannot be a
    /// record address and is reported as corruption.
    pub fn from_bytes(buf: &[u8; ROOT_POINTER_SIZE]) -> Result<Self, StorageError> {
        let root_address = u64::from_be_bytes(*buf);
        if root_address != 0 && root_address < SUPERBLOCK_SIZE {
            return Err(StorageError::corruption(
                0,
                format!("root address {root_address} points inside the superblock"),
            ));
        }
        Ok(Self { root_address })
    }

    pub fn write_to(&self, buf: &mut [u8; ROOT_POINTER_SIZE]) {
        buf.copy_from_slice(&self.root_address.to_be_bytes());
    }

    /// The committed root, or `None` for the empty tree.
    pub fn root(&self) -> Option<Address> {
        (self.root_address != 0).then_some(self.root_address)
    }
}
