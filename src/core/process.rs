//! External process execution with a hard time budget.
//!
//! Every adapter that shells out goes through [`run_command`], so stdin
//! handling, output capture and timeout behaviour are the same for all
//! tools. A child that outlives its budget is killed.

use crate::core::error::ScanError;
use crate::core::traits::AdapterConfig;

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Captured output of one tool run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutput {
    /// Engine that produced the output.
    pub engine: String,

    /// Process exit code; `None` when killed by a signal or not a process.
    pub exit_code: Option<i32>,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// Whether the exit status counts as a normal completion for this tool.
    pub completed_normally: bool,

    /// Wall-clock time of the run.
    #[serde(skip)]
    pub duration: Duration,
}

impl RawOutput {
    /// Creates output for a run that completed normally.
    pub fn completed(engine: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            completed_normally: true,
            duration: Duration::ZERO,
        }
    }

    /// Creates output for a run that exited abnormally.
    pub fn abnormal(engine: impl Into<String>, exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            completed_normally: false,
            duration: Duration::ZERO,
        }
    }

    /// Returns the diagnostic stream for a failed run.
    ///
    /// Falls back to stdout when the tool wrote nothing to stderr.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.exit_code {
            Some(code) => format!("{} exited with status {}", self.engine, code),
            None => format!("{} terminated by signal", self.engine),
        }
    }

    /// Sets the captured standard output.
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Sets the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Runs `program` with `args`, capturing output, within `timeout`.
///
/// `normal_exit_codes` lists the statuses that mean the tool did its job;
/// ClamAV for instance exits `1` when it found something.
///
/// # Errors
///
/// - `EngineUnavailable` if the program cannot be spawned.
/// - `Timeout` if it does not finish in time (the child is killed).
pub async fn run_command(
    engine: &str,
    program: &Path,
    args: &[OsString],
    timeout: Duration,
    normal_exit_codes: &[i32],
) -> Result<RawOutput, ScanError> {
    let start = Instant::now();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            tracing::error!(engine = %engine, program = %program.display(), error = %e, "Failed to spawn scanner");
            if e.kind() == std::io::ErrorKind::NotFound {
                ScanError::engine_unavailable(engine, format!("{} not found", program.display()))
            } else {
                ScanError::engine_unavailable(engine, e.to_string())
            }
        })?;

    tracing::debug!(engine = %engine, program = %program.display(), args = ?args, "Scanner started");

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(ScanError::Io)?,
        Err(_) => {
            tracing::warn!(engine = %engine, timeout_ms = timeout.as_millis() as u64, "Scanner timed out");
            return Err(ScanError::timeout(engine, start.elapsed()));
        }
    };

    let exit_code = output.status.code();
    let completed_normally = exit_code
        .map(|code| normal_exit_codes.contains(&code))
        .unwrap_or(false);

    tracing::debug!(
        engine = %engine,
        exit_code = ?exit_code,
        completed_normally,
        duration_ms = start.elapsed().as_millis() as u64,
        "Scanner finished"
    );

    Ok(RawOutput {
        engine: engine.to_string(),
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        completed_normally,
        duration: start.elapsed(),
    })
}

/// Runs the program configured in `config` with its timeout.
pub async fn run_configured<C: AdapterConfig>(
    engine: &str,
    config: &C,
    args: &[OsString],
    normal_exit_codes: &[i32],
) -> Result<RawOutput, ScanError> {
    run_command(engine, config.program(), args, config.timeout(), normal_exit_codes).await
}

/// Probes a tool by running `<program> --version`.
pub async fn probe_version(engine: &str, program: &Path) -> Result<(), ScanError> {
    let output = run_command(
        engine,
        program,
        &[OsString::from("--version")],
        Duration::from_secs(10),
        &[0],
    )
    .await?;

    if output.completed_normally {
        Ok(())
    } else {
        Err(ScanError::engine_unavailable(engine, output.diagnostic()))
    }
}
