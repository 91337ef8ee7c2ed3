//! File-based locking to prevent concurrent backup runs

use anyhow::{Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lock file shared by every run on this host
pub struct RunLock {
    lock: RwLock<File>,
    lock_path: PathBuf,
}

/// Held for the duration of a fleet run
pub struct RunLockGuard<'a> {
    _guard: RwLockWriteGuard<'a, File>,
    lock_path: &'a Path,
}

impl RunLock {
    /// Open the lock file, creating it and its directory if needed
    pub fn open_at(lock_path: impl Into<PathBuf>) -> Result<Self> {
        let lock_path = lock_path.into();
        debug!("Opening run lock: {:?}", lock_path);

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create lock directory")?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {:?}", lock_path))?;

        Ok(Self {
            lock: RwLock::new(file),
            lock_path,
        })
    }

    /// Take the exclusive lock without waiting
    /// Returns error if another run already holds it
    pub fn try_hold(&mut self) -> Result<RunLockGuard<'_>> {
        let guard = self.lock.try_write().with_context(|| {
            format!(
                "Another backup run is in progress (lock held: {:?})",
                self.lock_path
            )
        })?;

        info!("Acquired run lock: {:?}", self.lock_path);
        Ok(RunLockGuard {
            _guard: guard,
            lock_path: &self.lock_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for RunLockGuard<'_> {
    fn drop(&mut self) {
        info!("Released run lock: {:?}", self.lock_path);
    }
}
