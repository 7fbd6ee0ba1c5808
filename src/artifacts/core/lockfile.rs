//! Exclusive `<file>.lock` guards for mutable repository files
//!
//! Refs, the index and pending-operation files are rewritten by first creating
//! `<path>.lock` with create-new semantics, writing the new content to it and
//! then renaming it over the original. The creation fails immediately when the
//! lock file already exists, which is how a second writer is turned away.
//! Readers never take the lock: they only ever observe the old or the new file.

use crate::errors::RepoError;
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Lockfile {
    file_path: PathBuf,
    lock_path: PathBuf,
    lock: Option<File>,
}

impl Lockfile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let file_path = path.as_ref().to_path_buf();
        let mut lock_path = file_path.clone().into_os_string();
        lock_path.push(".lock");

        Lockfile {
            file_path,
            lock_path: PathBuf::from(lock_path),
            lock: None,
        }
    }

    /// Take the lock, or fail with `RepoError::Locked` if someone else holds it.
    pub fn acquire(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut lockfile = Self::new(path);
        lockfile.hold_for_update()?;
        Ok(lockfile)
    }

    pub fn hold_for_update(&mut self) -> anyhow::Result<()> {
        if self.lock.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
        {
            Ok(file) => {
                self.lock = Some(file);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(RepoError::Locked(self.lock_path.clone()).into())
            }
            Err(err) => Err(err)
                .with_context(|| format!("failed to create lock {}", self.lock_path.display())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_held(&self) -> bool {
        self.lock.is_some()
    }

    /// Replace the target file with what was written to the lock.
    pub fn commit(mut self) -> anyhow::Result<()> {
        let mut lock = self.take_lock()?;
        lock.flush()?;
        drop(lock);

        std::fs::rename(&self.lock_path, &self.file_path).with_context(|| {
            format!(
                "failed to move {} into place",
                self.lock_path.display()
            )
        })
    }

    /// Release the lock leaving the target file untouched.
    pub fn rollback(mut self) -> anyhow::Result<()> {
        drop(self.take_lock()?);
        std::fs::remove_file(&self.lock_path)
            .with_context(|| format!("failed to remove {}", self.lock_path.display()))
    }

    fn take_lock(&mut self) -> anyhow::Result<File> {
        self.lock
            .take()
            .with_context(|| format!("not holding lock on {}", self.file_path.display()))
    }
}

impl Write for Lockfile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.lock.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::other(format!(
                "not holding lock on {}",
                self.file_path.display()
            ))),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        // a lock that was neither committed nor rolled back is discarded
        if self.lock.take().is_some() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn dir() -> TempDir {
        tempfile::tempdir().expect("failed to create temp dir")
    }

    #[rstest]
    fn commit_replaces_target_file(dir: TempDir) {
        let target = dir.path().join("HEAD");
        std::fs::write(&target, "old").unwrap();

        let mut lock = Lockfile::acquire(&target).unwrap();
        lock.write_all(b"new").unwrap();
        lock.commit().unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
        assert!(!dir.path().join("HEAD.lock").exists());
    }

    #[rstest]
    fn second_writer_fails_fast(dir: TempDir) {
        let target = dir.path().join("refs").join("heads").join("master");

        let _held = Lockfile::acquire(&target).unwrap();
        let err = Lockfile::acquire(&target).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::Locked(_))
        ));
    }

    #[rstest]
    fn dropping_releases_lock(dir: TempDir) {
        let target = dir.path().join("index");

        {
            let mut lock = Lockfile::acquire(&target).unwrap();
            lock.write_all(b"partial").unwrap();
        }

        assert!(!target.exists());
        assert!(Lockfile::acquire(&target).is_ok());
    }

    #[rstest]
    fn rollback_keeps_original(dir: TempDir) {
        let target = dir.path().join("ORIG_HEAD");
        std::fs::write(&target, "keep").unwrap();

        let mut lock = Lockfile::acquire(&target).unwrap();
        lock.write_all(b"discard").unwrap();
        lock.rollback().unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "keep");
    }
}
