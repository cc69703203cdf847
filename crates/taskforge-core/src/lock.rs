//! Per-feature run marker.
//!
//! A run holds `.taskforge/locks/<feature>.lock` from start to finish. The file
//! is created with create-new semantics, so a second run over the same feature
//! fails fast. The guard removes the file on drop; a crashed run leaves it
//! behind until `taskforge unlock` clears it.

use crate::error::{Result, TaskforgeError};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub feature: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(root: &Path, feature: &str) -> Result<Self> {
        let path = paths::lock_path(root, feature);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(concurrent(feature, &path));
            }
            Err(e) => return Err(e.into()),
        };
        let info = LockInfo {
            feature: feature.to_string(),
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        file.write_all(serde_yaml::to_string(&info)?.as_bytes())?;
        tracing::debug!(lock = %path.display(), "acquired run lock");
        Ok(Self { path })
    }

    /// Fail if another run holds the lock, without taking it.
    pub fn check(root: &Path, feature: &str) -> Result<()> {
        let path = paths::lock_path(root, feature);
        if path.exists() {
            return Err(concurrent(feature, &path));
        }
        Ok(())
    }

    /// Read the marker left by a run, if any.
    pub fn holder(root: &Path, feature: &str) -> Result<Option<LockInfo>> {
        match crate::io::read_optional(&paths::lock_path(root, feature))? {
            Some(data) => Ok(serde_yaml::from_str(&data).ok()),
            None => Ok(None),
        }
    }

    /// Remove a stale marker. Returns true if one existed.
    pub fn clear(root: &Path, feature: &str) -> Result<bool> {
        crate::io::remove_optional(&paths::lock_path(root, feature))
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}

fn concurrent(feature: &str, path: &Path) -> TaskforgeError {
    TaskforgeError::ConcurrentRunDetected {
        feature: feature.to_string(),
        lock: path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_rejected() {
        let dir = TempDir::new().unwrap();
        let _lock = RunLock::acquire(dir.path(), "checkout").unwrap();
        let err = RunLock::acquire(dir.path(), "checkout").unwrap_err();
        assert!(matches!(err, TaskforgeError::ConcurrentRunDetected { .. }));
        assert!(RunLock::check(dir.path(), "checkout").is_err());
        // Other features are unaffected.
        assert!(RunLock::acquire(dir.path(), "search").is_ok());
    }

    #[test]
    fn drop_releases() {
        let dir = TempDir::new().unwrap();
        {
            let _lock = RunLock::acquire(dir.path(), "checkout").unwrap();
            let holder = RunLock::holder(dir.path(), "checkout").unwrap().unwrap();
            assert_eq!(holder.pid, std::process::id());
        }
        assert!(RunLock::check(dir.path(), "checkout").is_ok());
        assert!(RunLock::acquire(dir.path(), "checkout").is_ok());
    }

    #[test]
    fn clear_removes_stale_marker() {
        let dir = TempDir::new().unwrap();
        let lock = RunLock::acquire(dir.path(), "checkout").unwrap();
        std::mem::forget(lock);
        assert!(RunLock::check(dir.path(), "checkout").is_err());
        assert!(RunLock::clear(dir.path(), "checkout").unwrap());
        assert!(!RunLock::clear(dir.path(), "checkout").unwrap());
    }
}
