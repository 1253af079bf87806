//! Public API: the database handle and the transaction coordinator.

pub mod coordinator;
pub mod database;

pub use crate::options::{DatabaseOptions, SyncMode};
pub use crate::tree::ops::KeyValuePair;
pub use coordinator::Coordinator;
pub use database::Database;
