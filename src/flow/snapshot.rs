// snapshot-sync/src/flow/snapshot.rs
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::{AppError, Result};

/// Removes the snapshot directory so the next pull starts from nothing.
/// A directory that does not exist is already clean.
pub fn reset_snapshot_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            info!(path = %path.display(), "Removed existing snapshot directory");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No snapshot directory to remove");
            Ok(())
        }
        Err(source) => Err(AppError::SnapshotReset {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotSummary {
    pub files: usize,
    pub bytes: u64,
}

/// Counts the files under `path` and their total size.
pub fn summarize_snapshot(path: &Path) -> Result<SnapshotSummary> {
    let mut summary = SnapshotSummary::default();
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|err| {
            AppError::Io(err.into_io_error().unwrap_or_else(|| {
                io::Error::other(format!("filesystem loop under {}", path.display()))
            }))
        })?;
        if entry.file_type().is_file() {
            summary.files += 1;
            summary.bytes += entry.metadata().map_err(io::Error::from)?.len();
        }
    }
    Ok(summary)
}

/// Fails unless `path` is an existing directory.
pub fn require_snapshot_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "Snapshot directory {} does not exist. Run a pull first.",
            path.display()
        )))
    }
}
