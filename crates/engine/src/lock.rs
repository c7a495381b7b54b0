//! Per-ranch restore locks
//!
//! At most one restore may run against a ranch. Every [`RanchLocks`] built
//! with [`RanchLocks::new`] or [`RanchLocks::with_lock_dir`] shares one
//! process-wide registry, so separate orchestrators exclude each other. With a
//! lock directory configured, an exclusive `fs2` lock on
//! `ranch-<id>.restore.lock` covers other processes too.

use crate::error::{VaultError, VaultResult};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use ranchvault_core::{RanchId, RestoreLockError};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

type Registry = Arc<Mutex<HashSet<RanchId>>>;

/// Ranches with a restore in progress anywhere in this process
static PROCESS_LOCKS: Lazy<Registry> = Lazy::new(Registry::default);

/// Registry of ranches with a restore in progress
#[derive(Debug, Clone)]
pub struct RanchLocks {
    held: Registry,
    lock_dir: Option<PathBuf>,
}

impl Default for RanchLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl RanchLocks {
    /// Process-wide in-process locks only
    pub fn new() -> Self {
        Self {
            held: Arc::clone(&PROCESS_LOCKS),
            lock_dir: None,
        }
    }

    /// Process-wide locks plus lock files under `dir`
    pub fn with_lock_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new().lock_files_in(dir)
    }

    /// A registry shared only by clones of the returned value
    ///
    /// Stands in for a separate process, e.g. one test fixture per ranch
    /// store.
    pub fn isolated() -> Self {
        Self {
            held: Registry::default(),
            lock_dir: None,
        }
    }

    /// Also take lock files under `dir`
    pub fn lock_files_in(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    /// Take the lock for `ranch`, or fail with `RestoreLockError` if held
    pub fn try_acquire(&self, ranch: RanchId) -> VaultResult<RanchLockGuard> {
        if !self.held.lock().insert(ranch) {
            debug!(target: "ranchvault::lock", ranch_id = %ranch, "Restore lock held in process");
            return Err(RestoreLockError { ranch }.into());
        }

        // Registered from here on; the guard releases it on any exit
        let mut guard = RanchLockGuard {
            ranch,
            held: Arc::clone(&self.held),
            _file: None,
        };
        if let Some(dir) = &self.lock_dir {
            guard._file = Some(lock_file(dir, ranch)?);
        }
        debug!(target: "ranchvault::lock", ranch_id = %ranch, "Restore lock acquired");
        Ok(guard)
    }

    /// Whether a restore currently holds `ranch` in this process
    pub fn is_locked(&self, ranch: RanchId) -> bool {
        self.held.lock().contains(&ranch)
    }
}

fn lock_file(dir: &Path, ranch: RanchId) -> VaultResult<File> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("ranch-{}.restore.lock", ranch));
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&path)?;
    fs2::FileExt::try_lock_exclusive(&file).map_err(|_| {
        debug!(
            target: "ranchvault::lock",
            ranch_id = %ranch,
            path = %path.display(),
            "Restore lock file held by another process"
        );
        VaultError::from(RestoreLockError { ranch })
    })?;
    Ok(file)
}

/// Releases the ranch when dropped
#[derive(Debug)]
pub struct RanchLockGuard {
    ranch: RanchId,
    held: Registry,
    // The OS releases the file lock when the handle closes
    _file: Option<File>,
}

impl RanchLockGuard {
    /// The locked ranch
    pub fn ranch(&self) -> RanchId {
        self.ranch
    }
}

impl Drop for RanchLockGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.ranch);
        debug!(target: "ranchvault::lock", ranch_id = %self.ranch, "Restore lock released");
    }
}
