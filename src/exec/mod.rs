//! Sandbox command execution.
//!
//! The [`Sandbox`] trait is the only path to the task filesystem and shell;
//! the file and search managers compose it rather than touching the
//! filesystem themselves. Two implementations exist: [`LocalSandbox`] runs
//! commands under a local working root (used by the test suites and the
//! `--root` CLI mode) and [`DockerSandbox`] runs them inside a task
//! container via `docker exec`.

pub mod docker;
pub mod local;

pub use docker::DockerSandbox;
pub use local::LocalSandbox;

use async_trait::async_trait;

use crate::error::ExecError;

/// Result of a single sandbox command execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed (timeout) or died on a signal.
    pub exit_code: Option<i32>,
    /// Wall-clock duration of the execution in seconds.
    pub duration_secs: f64,
    pub timed_out: bool,
    /// True when stdout or stderr was cut at the output byte cap.
    pub truncated: bool,
}

/// Command execution inside the task environment.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `cmd` through the sandbox shell, blocking until it exits or
    /// `timeout_secs` elapses. Implementations clamp the timeout to the
    /// configured hard cap and kill the whole process group on expiry.
    async fn exec(
        &self,
        cmd: &str,
        timeout_secs: u64,
        cwd: Option<&str>,
    ) -> Result<ExecOutcome, ExecError>;

    /// Start `cmd` without waiting and return an opaque handle. Output (when
    /// the implementation captures any) is available via
    /// [`Sandbox::poll_background`].
    async fn exec_background(&self, cmd: &str) -> Result<String, ExecError>;

    /// Read up to `tail_lines` of captured output for a background handle.
    /// Returns `None` when the handle is unknown or the implementation does
    /// not capture background output.
    async fn poll_background(&self, handle: &str, tail_lines: usize) -> Option<Vec<String>>;
}

/// Cut `output` at `max_bytes` (on a char boundary) and append a visible
/// truncation marker. Output at exactly the cap passes through untouched.
pub fn truncate_output(output: &str, max_bytes: usize) -> (String, bool) {
    if output.len() <= max_bytes {
        return (output.to_string(), false);
    }
    let mut cut = max_bytes;
    while cut > 0 && !output.is_char_boundary(cut) {
        cut -= 1;
    }
    let truncated = format!(
        "{}\n[output truncated to {} bytes]",
        &output[..cut],
        max_bytes
    );
    (truncated, true)
}

/// Quote a string for safe interpolation into a shell command line.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
