//! Exclusive `<path>.lock` files.
//!
//! The lock file is created with `create_new`, receives the complete new
//! contents, and is renamed over the target on [`LockFile::commit`]. Readers
//! of the target therefore only ever see the old or the new file. Dropping an
//! uncommitted lock removes it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{LockError, UtilError};
use crate::Result;

const LOCK_SUFFIX: &str = "lock";

pub struct LockFile {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
    done: bool,
}

/// `refs/heads/main` -> `refs/heads/main.lock`
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".");
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

impl LockFile {
    /// Take the lock for `target`, creating missing parent directories.
    pub fn acquire(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let lock_path = lock_path_for(&target);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|source| match source.kind() {
                io::ErrorKind::AlreadyExists => LockError::AlreadyLocked {
                    path: lock_path.clone(),
                },
                _ => LockError::Create {
                    path: lock_path.clone(),
                    source,
                },
            })?;

        Ok(Self {
            target,
            lock_path,
            file: Some(file),
            done: false,
        })
    }

    /// Like [`acquire`](Self::acquire) but `Ok(None)` when somebody else holds it.
    pub fn try_acquire(target: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::acquire(target) {
            Ok(lock) => Ok(Some(lock)),
            Err(UtilError::Lock(LockError::AlreadyLocked { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Flush, close, and rename the lock over the target.
    pub fn commit(mut self) -> Result<()> {
        let commit_err = |path: &Path, source| LockError::Commit {
            path: path.to_path_buf(),
            source,
        };
        if let Some(mut file) = self.file.take() {
            file.flush().map_err(|e| commit_err(&self.lock_path, e))?;
            file.sync_all().map_err(|e| commit_err(&self.lock_path, e))?;
        }
        fs::rename(&self.lock_path, &self.target).map_err(|e| commit_err(&self.lock_path, e))?;
        self.done = true;
        Ok(())
    }

    /// Discard the lock and leave the target untouched.
    pub fn rollback(mut self) -> Result<()> {
        self.file.take();
        self.done = true;
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(f) => f.write(buf),
            None => Err(io::Error::other("lock file already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.done {
            self.file.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("HEAD");
        fs::write(&target, "old").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        assert!(dir.path().join("HEAD.lock").exists());
        lock.write_all(b"new").unwrap();
        lock.commit().unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        assert!(!dir.path().join("HEAD.lock").exists());
    }

    #[test]
    fn drop_without_commit_keeps_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("config");
        fs::write(&target, "keep").unwrap();
        {
            let mut lock = LockFile::acquire(&target).unwrap();
            lock.write_all(b"discard").unwrap();
        }
        assert_eq!(fs::read_to_string(&target).unwrap(), "keep");
        assert!(!lock_path_for(&target).exists());
    }

    #[test]
    fn rollback_removes_lock() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        let lock = LockFile::acquire(&target).unwrap();
        lock.rollback().unwrap();
        assert!(!target.exists());
        assert!(!lock_path_for(&target).exists());
    }

    #[test]
    fn second_lock_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("packed-refs");
        let _held = LockFile::acquire(&target).unwrap();

        let err = LockFile::acquire(&target).err().unwrap();
        assert!(matches!(err, UtilError::Lock(LockError::AlreadyLocked { .. })));
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
        assert!(LockFile::try_acquire(&target).unwrap().is_none());
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("refs/heads/feature/x");
        let mut lock = LockFile::acquire(&target).unwrap();
        lock.write_all(b"abc\n").unwrap();
        lock.commit().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"abc\n");
    }
}
