//! Atomic file replacement and the per-project lock file.
//!
//! Every store file is written to `{path}.tmp` in the same directory,
//! flushed with `sync_all()`, then renamed over the final path. A crash
//! mid-write leaves the previous version intact.
//!
//! A lock left by a killed process expires after [`STALE_LOCK_AFTER`];
//! it can also be removed by hand.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::StoreError;

/// Name of the lock file inside a project directory.
pub const LOCK_FILE: &str = ".lock";

/// Age after which a lock file is treated as abandoned.
pub const STALE_LOCK_AFTER: Duration = Duration::from_secs(30 * 60);

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Atomically replace `path` with `data`, creating parent directories.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
    }

    let tmp = tmp_path(path);
    let mut file = File::create(&tmp).map_err(StoreError::io(&tmp))?;
    file.write_all(data).map_err(StoreError::io(&tmp))?;
    file.sync_all().map_err(StoreError::io(&tmp))?;
    fs::rename(&tmp, path).map_err(StoreError::io(path))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub(crate) fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(StoreError::json(path))?;
    atomic_write(path, &json)
}

/// Exclusive hold on one project, released when dropped.
#[derive(Debug)]
pub(crate) struct ProjectLock {
    path: PathBuf,
}

impl ProjectLock {
    /// Create `dir/.lock`, failing with [`StoreError::Locked`] if it
    /// already exists and is younger than [`STALE_LOCK_AFTER`].
    ///
    /// An older lock is taken to belong to a killed process: it is
    /// removed and acquisition retried once.
    pub(crate) fn acquire(dir: &Path, id: &str) -> Result<Self, StoreError> {
        let path = dir.join(LOCK_FILE);
        if let Some(lock) = Self::try_create(&path)? {
            return Ok(lock);
        }
        if !is_stale(&path, SystemTime::now()) {
            return Err(StoreError::Locked(id.to_owned()));
        }

        tracing::warn!(%id, path = %path.display(), "removing stale project lock");
        match fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(StoreError::io(&path)(e)),
            _ => {}
        }
        Self::try_create(&path)?.ok_or_else(|| StoreError::Locked(id.to_owned()))
    }

    /// `None` when the lock file already exists.
    fn try_create(path: &Path) -> Result<Option<Self>, StoreError> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(StoreError::io(path)(e)),
        };
        // Owner pid, for whoever has to clean up by hand.
        writeln!(file, "{}", std::process::id()).map_err(StoreError::io(path))?;
        Ok(Some(Self { path: path.to_path_buf() }))
    }
}

/// Whether the lock at `path` was last modified more than
/// [`STALE_LOCK_AFTER`] before `now`. Unreadable locks count as fresh.
fn is_stale(path: &Path, now: SystemTime) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| now.duration_since(modified).ok())
        .is_some_and(|age| age > STALE_LOCK_AFTER)
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release project lock");
        }
    }
}
