//! Child-process execution for the external-tool converters.
//!
//! ## Why a trait?
//!
//! The media and office converters only decide *which* arguments to pass and
//! *how* to read the outcome. Spawning is isolated behind [`CommandRunner`] so
//! those decisions can be exercised in tests with a recording runner, without
//! ffmpeg or LibreOffice installed.
//!
//! [`SystemRunner`] is the production implementation: `tokio::process` with
//! both pipes drained, a bounded wait, and `kill_on_drop` so an expired wait
//! terminates the child instead of leaking it.

use crate::error::ConvertError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// A successful run with empty output streams.
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Default::default()
        }
    }

    /// A failed run with the given exit code and stderr text.
    pub fn failure(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            code: Some(code),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Captured stderr as (lossy) UTF-8 with surrounding whitespace removed.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Turn a non-zero exit into [`ConvertError::ConversionFailed`] carrying
    /// the child's stderr.
    pub fn ensure_success(self, converter: &str) -> Result<Self, ConvertError> {
        if self.is_success() {
            return Ok(self);
        }
        let stderr = self.stderr_text();
        let detail = match (self.code, stderr.is_empty()) {
            (_, false) => stderr,
            (Some(code), true) => format!("exited with status {code} and no diagnostic output"),
            (None, true) => "terminated by signal with no diagnostic output".to_string(),
        };
        Err(ConvertError::ConversionFailed {
            converter: converter.to_string(),
            detail,
        })
    }
}

/// Spawns an external program and waits for it to finish.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, draining stdout and stderr.
    ///
    /// Implementations must not interpret the exit status; a non-zero exit is
    /// returned as a normal [`ProcessOutput`]. Errors are reserved for spawn
    /// failures and expired `timeout`s.
    async fn run(
        &self,
        program: &str,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput, ConvertError>;
}

/// Runs commands as real child processes resolved through `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput, ConvertError> {
        debug!("spawn {} {:?}", program, args);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConvertError::failed(program, format!("failed to spawn '{program}': {e}")))?;

        // wait_with_output drains both pipes concurrently, so a chatty child
        // cannot block on a full stderr buffer.
        let waiting = child.wait_with_output();
        let output = match timeout {
            Some(limit) => match tokio::time::timeout(limit, waiting).await {
                Ok(result) => result,
                Err(_) => {
                    // Dropping the future drops the child; kill_on_drop reaps it.
                    warn!("{} exceeded {:?}, killing", program, limit);
                    return Err(ConvertError::Timeout {
                        program: program.to_string(),
                        secs: ceil_secs(limit),
                    });
                }
            },
            None => waiting.await,
        }
        .map_err(|e| ConvertError::failed(program, format!("waiting for '{program}': {e}")))?;

        debug!("{} exited with {:?}", program, output.status.code());

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Whole seconds, rounded up so a sub-second limit never reads as 0s.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
