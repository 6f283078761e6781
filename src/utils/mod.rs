pub mod logging;

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};
use which::which;

use crate::errors::{AppError, Result};

/// Project-local directory npm installs CLI shims into.
const LOCAL_BIN_DIR: &str = "node_modules/.bin";

#[cfg(windows)]
const PLATFORM_SUFFIXES: &[&str] = &[".cmd", ".exe"];
#[cfg(not(windows))]
const PLATFORM_SUFFIXES: &[&str] = &[];

/// Locates the vendor CLI.
///
/// Probe order: an explicit override, `node_modules/.bin/<name>` under the
/// project directory, the platform suffix variants of that path, then `PATH`.
pub fn find_vendor_cli(
    project_dir: &Path,
    name: &str,
    explicit: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            info!(path = %path.display(), "Using configured vendor CLI");
            return Ok(path.to_path_buf());
        }
        error!(path = %path.display(), "Configured vendor CLI does not exist");
        return Err(AppError::ExecutableNotFound(path.display().to_string()));
    }

    for candidate in local_candidates(project_dir, name) {
        debug!(candidate = %candidate.display(), "Probing for vendor CLI");
        if candidate.is_file() {
            info!(path = %candidate.display(), "Found project-local vendor CLI");
            return Ok(candidate);
        }
    }

    match which(name) {
        Ok(path) => {
            info!(path = %path.display(), "Found vendor CLI in PATH");
            Ok(path)
        }
        Err(err) => {
            error!(executable = name, error = %err, "Vendor CLI not found locally or in PATH");
            Err(AppError::ExecutableNotFound(name.to_string()))
        }
    }
}

/// Finds a system tool (e.g. `git`) in `PATH`.
pub fn find_system_executable(name: &str) -> Result<PathBuf> {
    which(name).map_err(|err| {
        error!(executable = name, error = %err, "Executable not found in PATH");
        AppError::ExecutableNotFound(name.to_string())
    })
}

fn local_candidates(project_dir: &Path, name: &str) -> Vec<PathBuf> {
    let bin_dir = project_dir.join(LOCAL_BIN_DIR);
    let mut candidates = vec![bin_dir.join(name)];
    candidates.extend(
        PLATFORM_SUFFIXES
            .iter()
            .map(|suffix| bin_dir.join(format!("{name}{suffix}"))),
    );
    candidates
}
