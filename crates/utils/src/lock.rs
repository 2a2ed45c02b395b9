//! Process-keyed lock files.
//!
//! A lock is a plain file named `<prefix>-<pid>.lock` inside a directory
//! (usually the git metadata directory). It is created with `create_new`, so
//! a second acquisition from the same process for the same directory fails
//! until the first guard is dropped.

use std::{
    fs::OpenOptions,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Path of the lock file `prefix` would use in `dir` for this process.
    pub fn path_for(dir: &Path, prefix: &str) -> PathBuf {
        dir.join(format!("{prefix}-{}.lock", std::process::id()))
    }

    /// Try to take the lock. Returns `Ok(None)` if it is already held.
    pub fn try_acquire(dir: &Path, prefix: &str) -> io::Result<Option<Self>> {
        let path = Self::path_for(dir, prefix);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Some(Self { path })),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(lock = %path.display(), "lock already held");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), %err, "failed to remove lock file");
        }
    }
}
