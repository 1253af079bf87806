use std::fs::File;

use fs2::FileExt;

use crate::error::StorageError;

/// Advisory exclusive lock on the database file (`flock(2)` on Unix).
///
/// The lock is not reentrant: [`acquire`](Self::acquire) reports whether it
/// actually took the lock, so only the caller that took it releases it.
/// A held lock is released when this struct is dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    held: bool,
}

impl FileLock {
    /// Wrap a handle to the file that will carry the lock.
    pub fn new(file: File) -> Self {
        Self { file, held: false }
    }

    /// Take the exclusive lock, blocking until it is granted.
    ///
    /// Returns `true` if this call moved the lock from unheld to held and
    /// `false` if it was already held.
    pub fn acquire(&mut self) -> Result<bool, StorageError> {
        if self.held {
            return Ok(false);
        }
        self.file
            .lock_exclusive()
            .map_err(StorageError::LockFailed)?;
        self.held = true;
        Ok(true)
    }

    /// Try to take the exclusive lock without blocking.
    /// Returns `Err(StorageError::FileLocked)` if another handle holds it.
    pub fn try_acquire(&mut self) -> Result<bool, StorageError> {
        if self.held {
            return Ok(false);
        }
        self.file
            .try_lock_exclusive()
            .map_err(|_| StorageError::FileLocked)?;
        self.held = true;
        Ok(true)
    }

    /// Release the lock if held. Releasing an unheld lock is a no-op.
    pub fn release(&mut self) -> Result<(), StorageError> {
        if !self.held {
            return Ok(());
        }
        FileExt::unlock(&self.file).map_err(StorageError::LockFailed)?;
        self.held = false;
        Ok(())
    }

    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if self.held {
            let _ = FileExt::unlock(&self.file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::path::Path;
    use tempfile::tempdir;

    fn open(path: &Path) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .unwrap()
    }

    #[test]
    fn test_acquire_reports_transition() {
        let dir = tempdir().unwrap();
        let mut lock = FileLock::new(open(&dir.path().join("test.db")));

        assert!(lock.acquire().unwrap());
        assert!(lock.is_held());
        // Second acquire is a no-op.
        assert!(!lock.acquire().unwrap());

        lock.release().unwrap();
        assert!(!lock.is_held());
        assert!(lock.acquire().unwrap());
    }

    #[test]
    fn test_exclusive_blocks_other_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut first = FileLock::new(open(&path));
        let mut second = FileLock::new(open(&path));

        first.acquire().unwrap();
        // flock is per open file description, so a second open of the same
        // path in this process contends with the first.
        match second.try_acquire() {
            Err(StorageError::FileLocked) => {}
            other => panic!("expected FileLocked, got {other:?}"),
        }

        first.release().unwrap();
        assert!(second.try_acquire().unwrap());
    }

    #[test]
    fn test_release_unheld_is_noop() {
        let dir = tempdir().unwrap();
        let mut lock = FileLock::new(open(&dir.path().join("test.db")));
        lock.release().unwrap();
        assert!(!lock.is_held());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut lock = FileLock::new(open(&path));
            lock.acquire().unwrap();
        }
        let mut again = FileLock::new(open(&path));
        assert!(again.try_acquire().unwrap());
    }
}
