use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required environment variable(s): {0}. Please set them in your .env file.")]
    MissingCredential(String),

    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("Command `{command}` exited with code {code}: {stderr}")]
    Command {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Command `{command}` timed out after {elapsed:?}")]
    Timeout {
        command: String,
        elapsed: Duration,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to reset snapshot directory {}: {source}", .path.display())]
    SnapshotReset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    /// Process exit status for this error.
    ///
    /// A failed child propagates its own code; everything else is 1.
    /// Codes outside `1..=255` cannot be reported verbatim and also map to 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Command { code, .. } => u8::try_from(*code)
                .ok()
                .filter(|c| *c != 0)
                .unwrap_or(1),
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
