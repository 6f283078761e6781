//! Supervised execution of external commands.
//!
//! Every run ends in exactly one of: success, non-zero exit, timeout, or
//! missing executable. Anything but success comes back as an [`AppError`]
//! carrying whatever output the child produced; nothing is retried.

// snapshot-sync/src/runner/mod.rs
pub mod invocation;

pub use invocation::{CommandInvocation, InvocationResult};

use std::fmt;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, error, info, warn};

use crate::errors::{AppError, Result};

/// How long output readers may keep draining once the child is gone.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);
const READ_CHUNK: usize = 8 * 1024;

/// Runs commands and logs through the dispatcher it was built with.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    dispatch: Dispatch,
}

impl CommandRunner {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Runs to completion with output captured, bounded by the invocation's
    /// timeout. On a timeout the child is killed.
    pub async fn run(&self, invocation: CommandInvocation) -> Result<InvocationResult> {
        self.run_captured(invocation)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    /// Runs with stdout and stderr echoed line by line as they arrive and the
    /// input payload delivered eagerly. The wait is unbounded.
    pub async fn run_interactive(&self, invocation: CommandInvocation) -> Result<InvocationResult> {
        self.run_streaming(invocation)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn run_captured(&self, mut invocation: CommandInvocation) -> Result<InvocationResult> {
        let label = invocation.display();
        let timeout = invocation.timeout();
        info!(
            command = %label,
            timeout_secs = timeout.as_secs_f64(),
            input_bytes = invocation.input_len(),
            "Running command"
        );

        let start = Instant::now();
        let mut child = spawn_child(&invocation, &label)?;
        let stdout = StreamCapture::spawn(child.stdout.take());
        let stderr = StreamCapture::spawn(child.stderr.take());
        let writer = spawn_input_writer(child.stdin.take(), invocation.take_input());

        let status = match time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let elapsed = start.elapsed();
                if let Err(err) = child.kill().await {
                    warn!(command = %label, error = %err, "Failed to kill timed-out command");
                }
                abort_writer(writer);
                let stdout = stdout.finish(OUTPUT_GRACE).await.unwrap_or_default();
                let stderr = stderr.finish(OUTPUT_GRACE).await.unwrap_or_default();
                error!(
                    command = %label,
                    elapsed_secs = elapsed.as_secs_f64(),
                    stdout = %stdout,
                    stderr = %stderr,
                    "Command timed out"
                );
                return Err(AppError::Timeout {
                    command: label,
                    elapsed,
                    stdout,
                    stderr,
                });
            }
        };

        abort_writer(writer);
        let stdout = stdout.finish(OUTPUT_GRACE).await?;
        let stderr = stderr.finish(OUTPUT_GRACE).await?;
        conclude(label, status, stdout, stderr, start.elapsed())
    }

    async fn run_streaming(&self, mut invocation: CommandInvocation) -> Result<InvocationResult> {
        let label = invocation.display();
        info!(
            command = %label,
            input_bytes = invocation.input_len(),
            "Running interactive command"
        );

        let start = Instant::now();
        let mut child = spawn_child(&invocation, &label)?;
        let stdout_reader = spawn_line_echo(child.stdout.take(), OutputStream::Stdout);
        let stderr_reader = spawn_line_echo(child.stderr.take(), OutputStream::Stderr);

        if let (Some(mut stdin), Some(input)) = (child.stdin.take(), invocation.take_input()) {
            if let Err(err) = stdin.write_all(input.as_bytes()).await {
                debug!(command = %label, error = %err, "Command closed stdin before reading input");
            }
            drop(stdin);
        }

        let status = child.wait().await?;
        let stdout = String::from_utf8_lossy(&stdout_reader.await?).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_reader.await?).into_owned();
        conclude(label, status, stdout, stderr, start.elapsed())
    }
}

fn spawn_child(invocation: &CommandInvocation, label: &str) -> Result<Child> {
    match invocation.to_command().spawn() {
        Ok(child) => {
            debug!(command = %label, child_pid = ?child.id(), "Command spawned");
            Ok(child)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            error!(
                command = %label,
                executable = invocation.program(),
                "Executable not found"
            );
            Err(AppError::ExecutableNotFound(invocation.program().to_string()))
        }
        Err(err) => {
            error!(command = %label, error = %err, "Failed to spawn command");
            Err(AppError::Io(err))
        }
    }
}

fn conclude(
    label: String,
    status: ExitStatus,
    stdout: String,
    stderr: String,
    elapsed: Duration,
) -> Result<InvocationResult> {
    let exit_code = exit_code_from_status(status);
    if status.success() {
        debug!(command = %label, stdout = %stdout, stderr = %stderr, "Command output");
        info!(
            command = %label,
            exit_code,
            elapsed_ms = elapsed.as_millis() as u64,
            "Command completed"
        );
        Ok(InvocationResult {
            stdout,
            stderr,
            exit_code,
        })
    } else {
        error!(
            command = %label,
            exit_code,
            stdout = %stdout,
            stderr = %stderr,
            "Command failed"
        );
        Err(AppError::Command {
            command: label,
            code: exit_code,
            stdout,
            stderr,
        })
    }
}

/// Extract an exit code from a process status, mapping signals to 128+N on Unix.
fn exit_code_from_status(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .unwrap_or_else(|| status.signal().map_or(1, |s| 128 + s))
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(1)
    }
}

fn spawn_input_writer(stdin: Option<ChildStdin>, input: Option<String>) -> Option<JoinHandle<()>> {
    let (mut stdin, input) = (stdin?, input?);
    let task = async move {
        if let Err(err) = stdin.write_all(input.as_bytes()).await {
            debug!(error = %err, "Command closed stdin before reading input");
        }
    };
    Some(tokio::spawn(task.with_current_subscriber()))
}

fn abort_writer(writer: Option<JoinHandle<()>>) {
    if let Some(writer) = writer {
        writer.abort();
    }
}

/// Drains one output stream into a buffer that stays readable even if the
/// stream never closes.
struct StreamCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl StreamCapture {
    fn spawn<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let task = async move {
            let Some(mut stream) = stream else {
                return;
            };
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                    Err(err) => {
                        warn!(error = %err, "Failed to read command output");
                        break;
                    }
                }
            }
        };
        Self {
            buffer,
            task: tokio::spawn(task.with_current_subscriber()),
        }
    }

    /// Waits up to `grace` for the stream to close, then returns what was read.
    async fn finish(mut self, grace: Duration) -> Result<String> {
        match time::timeout(grace, &mut self.task).await {
            Ok(joined) => joined?,
            Err(_) => {
                debug!("Output stream still open after the command ended; keeping what was read");
                self.task.abort();
            }
        }
        let bytes = self.buffer.lock().await;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// How long a partial line may sit unlogged before it is echoed anyway.
const PARTIAL_LINE_FLUSH: Duration = Duration::from_millis(250);

/// Echoes each line of `stream` to the log as soon as it arrives and returns
/// the raw bytes once the stream closes. A trailing partial line, such as a
/// prompt waiting for input, is echoed after [`PARTIAL_LINE_FLUSH`].
fn spawn_line_echo<R>(stream: Option<R>, source: OutputStream) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let task = async move {
        let mut captured = Vec::new();
        let Some(mut stream) = stream else {
            return captured;
        };
        let mut pending = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let read = if pending.is_empty() {
                stream.read(&mut chunk).await
            } else {
                match time::timeout(PARTIAL_LINE_FLUSH, stream.read(&mut chunk)).await {
                    Ok(read) => read,
                    Err(_) => {
                        echo_line(source, &pending);
                        pending.clear();
                        continue;
                    }
                }
            };
            match read {
                Ok(0) => break,
                Ok(n) => {
                    captured.extend_from_slice(&chunk[..n]);
                    pending.extend_from_slice(&chunk[..n]);
                    while let Some(end) = pending.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=end).collect();
                        echo_line(source, &line);
                    }
                }
                Err(err) => {
                    warn!(stream = %source, error = %err, "Failed to read command output");
                    break;
                }
            }
        }
        if !pending.is_empty() {
            echo_line(source, &pending);
        }
        captured
    };
    tokio::spawn(task.with_current_subscriber())
}

fn echo_line(source: OutputStream, raw: &[u8]) {
    let line = String::from_utf8_lossy(raw);
    info!(stream = %source, "{}", line.trim_end_matches(&['\r', '\n'][..]));
}
