//! File-based locking to prevent concurrent runs against one backup directory

use anyhow::{Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the lock file inside the backup directory
pub const LOCK_FILE_NAME: &str = ".dump-manager.lock";

/// Advisory lock on a backup directory
///
/// The lock file is left in place after release; removing it would let a
/// losing contender delete the file a running holder has locked.
pub struct RunLock {
    lock: RwLock<File>,
    lock_path: PathBuf,
}

impl RunLock {
    /// Open (or create) the lock file for `backup_dir`
    pub fn open(backup_dir: &Path) -> Result<Self> {
        let lock_path = backup_dir.join(LOCK_FILE_NAME);

        debug!("Opening lock file: {:?}", lock_path);

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

    /// Take the exclusive lock without blocking
    /// Returns error if another run holds it
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        let guard = self.lock.try_write().with_context(|| {
            format!(
                "Another dump-manager run holds the lock: {:?}",
                self.lock_path
            )
        })?;

        info!("Acquired run lock: {:?}", self.lock_path);
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}
