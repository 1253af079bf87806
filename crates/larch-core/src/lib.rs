//! # LarchDB
//!
//! An embedded key-value store backed by a single append-only file.
//!
//! LarchDB keeps an ordered mapping of byte-string keys to byte-string values
//! in a persistent (copy-on-write) binary search tree. Mutations copy the
//! root-to-leaf path and leave every persisted node untouched; a commit
//! appends the new nodes to the file and then swaps the root address in the
//! superblock as its final step, so a crash at any point leaves the previous
//! commit intact.
//!
//! ## Quick Start
//!
//! ```no_run
//! use larch_core::api::Database;
//!
//! let db = Database::open("my_database.larch").unwrap();
//!
//! db.set(b"greeting", b"hello").unwrap();
//! db.commit().unwrap();
//!
//! assert_eq!(db.get(b"greeting").unwrap(), b"hello");
//! ```

pub mod api;
pub mod encoding;
pub mod error;
pub mod options;
pub mod reference;
pub mod storage;
pub mod tree;
pub mod types;
