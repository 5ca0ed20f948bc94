//! Maintenance mode around reverts.
//!
//! A revert holds an exclusive OS lock on `<state>/rewind.lock` and leaves a
//! `.maintenance` marker next to it for as long as it runs. Readers that must
//! not observe a half-applied revert take the same lock shared.

use crate::error::{Error, Result};
use chrono::Utc;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const LOCK_FILE: &str = "rewind.lock";
pub const MAINTENANCE_MARKER: &str = ".maintenance";

#[derive(Debug, Clone)]
pub struct Maintenance {
    lock_path: PathBuf,
    marker_path: PathBuf,
}

impl Maintenance {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            lock_path: state_dir.join(LOCK_FILE),
            marker_path: state_dir.join(MAINTENANCE_MARKER),
        }
    }

    fn open(&self) -> Result<File> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        Ok(file)
    }

    /// Blocks until no one else holds the lock, then enters maintenance.
    pub fn enter(&self) -> Result<MaintenanceGuard> {
        let file = self.open()?;
        FileExt::lock_exclusive(&file)
            .map_err(|e| Error::LockFailed(format!("{}: {}", self.lock_path.display(), e)))?;
        self.guard(file)
    }

    /// Enters maintenance only if the lock is free right now.
    pub fn try_enter(&self) -> Result<Option<MaintenanceGuard>> {
        let file = self.open()?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => self.guard(file).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn guard(&self, file: File) -> Result<MaintenanceGuard> {
        fs::write(&self.marker_path, Utc::now().to_rfc3339())?;
        debug!(lock = %self.lock_path.display(), "Entered maintenance");
        Ok(MaintenanceGuard {
            file,
            marker_path: self.marker_path.clone(),
        })
    }

    /// Shared lock: waits out a running revert.
    pub fn read(&self) -> Result<ReadGuard> {
        let file = self.open()?;
        FileExt::lock_shared(&file)
            .map_err(|e| Error::LockFailed(format!("{}: {}", self.lock_path.display(), e)))?;
        Ok(ReadGuard { file })
    }

    /// Runs `f` in maintenance mode; the lock is released even if `f` fails.
    pub fn with_exclusive<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.enter()?;
        f()
    }

    /// Whether a revert is running, judged by the marker file.
    pub fn is_active(&self) -> bool {
        self.marker_path.exists()
    }
}

pub struct MaintenanceGuard {
    file: File,
    marker_path: PathBuf,
}

impl Drop for MaintenanceGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.marker_path) {
            warn!(error = %e, "Failed to remove maintenance marker");
        }
        let _ = FileExt::unlock(&self.file);
        debug!("Left maintenance");
    }
}

pub struct ReadGuard {
    file: File,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
