// snapshot-sync/src/runner/invocation.rs
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::errors::{AppError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// One external command, built once and consumed by a single run.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    args: Vec<String>,
    input: Option<String>,
    timeout: Duration,
    env: Option<HashMap<String, String>>,
    working_dir: Option<PathBuf>,
}

impl CommandInvocation {
    /// `args[0]` is the executable, the rest are passed through verbatim.
    pub fn new<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        if args.first().is_none_or(|program| program.is_empty()) {
            return Err(AppError::Config("command cannot be empty".to_string()));
        }
        Ok(CommandInvocation {
            args,
            input: None,
            timeout: DEFAULT_TIMEOUT,
            env: None,
            working_dir: None,
        })
    }

    /// Text written to the child's stdin, which is then closed.
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(AppError::Config("timeout must be positive".to_string()));
        }
        self.timeout = timeout;
        Ok(self)
    }

    /// Replaces the inherited environment entirely.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn program(&self) -> &str {
        &self.args[0]
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn input_len(&self) -> usize {
        self.input.as_ref().map_or(0, String::len)
    }

    pub(crate) fn take_input(&mut self) -> Option<String> {
        self.input.take()
    }

    /// Human-readable command line. Never includes the stdin payload.
    pub fn display(&self) -> String {
        self.args.join(" ")
    }

    /// Builds the process with all three standard streams piped (stdin is
    /// null when there is no payload).
    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.args[0]);
        command.args(&self.args[1..]);
        if let Some(env) = &self.env {
            command.env_clear().envs(env);
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command.stdin(if self.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);
        command
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}
