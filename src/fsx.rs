//! Filesystem wrapper.
//!
//! Re-exports `std::fs` so call-sites can `use crate::fsx as fs;` and adds the few
//! helpers every operation needs: best-effort cleanup of partial output, parent
//! directory creation and timestamp conversion.

use crate::error::{ArchiveError, Result};
use chrono::{Local, NaiveDateTime, TimeZone};
use std::io;
use std::path::Path;
use std::time::SystemTime;
use tracing::warn;

pub use std::fs::*;
use std::fs::TryLockError;

/// Deletes `path`, ignoring a missing file and logging any other failure.
///
/// Used on failure paths only; a cleanup error never replaces the original error.
pub fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove partial output"),
    }
}

/// Creates the parent directory of `path` if it has one.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io(e, parent))
        }
        _ => Ok(()),
    }
}

/// Opens `path` for writing and holds an exclusive lock on it for the life of the handle.
///
/// Fails without touching existing content when another handle already holds the lock.
pub fn create_exclusive(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| ArchiveError::io(e, path))?;
    file.try_lock().map_err(|e| {
        let e = match e {
            TryLockError::WouldBlock => io::Error::new(
                io::ErrorKind::WouldBlock,
                "destination is already open for writing elsewhere",
            ),
            TryLockError::Error(e) => e,
        };
        ArchiveError::io(e, path)
    })?;
    file.set_len(0).map_err(|e| ArchiveError::io(e, path))?;
    Ok(file)
}

/// Local wall-clock time of `t`, the representation container headers store.
pub fn local_timestamp(t: SystemTime) -> NaiveDateTime {
    chrono::DateTime::<Local>::from(t).naive_local()
}

/// Inverse of [`local_timestamp`]; `None` for wall-clock times skipped by a DST change.
pub fn system_time(modified: NaiveDateTime) -> Option<SystemTime> {
    Local
        .from_local_datetime(&modified)
        .earliest()
        .map(SystemTime::from)
}

/// Stamps an extracted file with the entry's recorded modification time.
pub fn set_entry_mtime(file: &File, modified: NaiveDateTime) -> io::Result<()> {
    match system_time(modified) {
        Some(t) => file.set_modified(t),
        None => Ok(()),
    }
}
