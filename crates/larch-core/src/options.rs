//! Open-time configuration for a database file.

use crate::types::DEFAULT_MAX_RECORD_LEN;

/// Durability mode for commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fsync record data before and after the root-address swap (default).
    /// Maximum durability.
    #[default]
    Full,
    /// Skip fsync entirely. Data may be lost on crash but writes are
    /// orders of magnitude faster. Useful for bulk loads and tests.
    None,
}

/// Options controlling how a database file is opened.
///
/// ```
/// use larch_core::options::{DatabaseOptions, SyncMode};
///
/// let options = DatabaseOptions::new()
///     .sync_mode(SyncMode::None)
///     .max_record_len(16 * 1024 * 1024);
/// assert_eq!(options.get_sync_mode(), SyncMode::None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOptions {
    sync_mode: SyncMode,
    max_record_len: u64,
}

impl DatabaseOptions {
    pub fn new() -> Self {
        Self {
            sync_mode: SyncMode::Full,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
        }
    }

    /// Set the commit durability mode.
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Set the largest payload a single record may carry. Reads of records
    /// claiming a larger length are treated as corruption.
    pub fn max_record_len(mut self, len: u64) -> Self {
        self.max_record_len = len;
        self
    }

    pub fn get_sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn get_max_record_len(&self) -> u64 {
        self.max_record_len
    }
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self::new()
    }
}
