//! store::lock
//!
//! OS-level lock on a database snapshot file.
//!
//! Every process that opens the same snapshot locks the sibling file
//! `<snapshot>.lock` around each read and transaction. Readers share the
//! lock; a transaction holds it exclusively from reloading the snapshot
//! until the new snapshot has been renamed into place.
//!
//! Acquisition blocks until the lock is free. The lock is released when
//! the guard is dropped.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    Shared,
    Exclusive,
}

/// A held lock on a snapshot's lock file.
#[derive(Debug)]
pub(crate) struct SnapshotLock {
    path: PathBuf,
    file: Option<File>,
}

impl SnapshotLock {
    /// Lock the lock file that belongs to `snapshot`, waiting if needed.
    pub(crate) fn acquire(snapshot: &Path, mode: LockMode) -> Result<Self, StoreError> {
        let path = lock_path(snapshot);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| lock_error(parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| lock_error(&path, e))?;

        let locked = match mode {
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        };
        locked.map_err(|e| lock_error(&path, e))?;

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

/// `db.json` -> `db.json.lock`, in the same directory.
pub(crate) fn lock_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    snapshot.with_file_name(name)
}

fn lock_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::LockError {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_file_sits_next_to_snapshot() {
        let snapshot = Path::new("/var/lib/inkpress/db.json");
        assert_eq!(lock_path(snapshot), Path::new("/var/lib/inkpress/db.json.lock"));
    }

    #[test]
    fn acquire_creates_missing_directories() {
        let temp = TempDir::new().unwrap();
        let snapshot = temp.path().join("nested/db.json");

        let lock = SnapshotLock::acquire(&snapshot, LockMode::Exclusive).unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn shared_locks_coexist() {
        let temp = TempDir::new().unwrap();
        let snapshot = temp.path().join("db.json");

        let _a = SnapshotLock::acquire(&snapshot, LockMode::Shared).unwrap();
        let _b = SnapshotLock::acquire(&snapshot, LockMode::Shared).unwrap();
    }

    #[test]
    fn exclusive_lock_excludes_other_handles_until_dropped() {
        let temp = TempDir::new().unwrap();
        let snapshot = temp.path().join("db.json");

        let lock = SnapshotLock::acquire(&snapshot, LockMode::Exclusive).unwrap();
        let other = File::open(lock.path()).unwrap();
        assert!(FileExt::try_lock_exclusive(&other).is_err());

        drop(lock);
        FileExt::try_lock_exclusive(&other).unwrap();
        FileExt::unlock(&other).unwrap();
    }
}
