//! Docker sandbox: runs commands inside the task container via
//! `docker exec <container> bash -c <cmd>`.
//!
//! The timeout race kills the local `docker exec` client process group; the
//! container itself is owned (and eventually torn down) by the harness.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::{truncate_output, ExecOutcome, Sandbox};
use crate::error::ExecError;

pub struct DockerSandbox {
    container_name: String,
    max_timeout_secs: u64,
    max_output_bytes: usize,
}

impl DockerSandbox {
    pub fn new(container_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            max_timeout_secs: 300,
            max_output_bytes: 100 * 1024,
        }
    }

    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn exec(
        &self,
        cmd: &str,
        timeout_secs: u64,
        cwd: Option<&str>,
    ) -> Result<ExecOutcome, ExecError> {
        let timeout = timeout_secs.clamp(1, self.max_timeout_secs);

        let mut command = Command::new("docker");
        command.arg("exec");
        if let Some(dir) = cwd {
            command.args(["-w", dir]);
        }
        command.args([self.container_name.as_str(), "bash", "-c", cmd]);

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnFailed(e.to_string()))?;

        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::OutputCapture("stdout".to_string()))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::OutputCapture("stderr".to_string()))?;

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let start = Instant::now();
        let (exit_code, timed_out) = tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => (status.code(), false),
                    Err(e) => return Err(ExecError::SpawnFailed(e.to_string())),
                }
            }
            _ = tokio::time::sleep(Duration::from_secs(timeout)) => {
                if let Some(pid) = child.id() {
                    let pgid = nix::unistd::Pid::from_raw(pid as i32);
                    let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL);
                }
                let _ = child.kill().await;
                let _ = child.wait().await;
                (None, true)
            }
        };
        let duration_secs = start.elapsed().as_secs_f64();

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();

        let (stdout, out_cut) = truncate_output(
            &String::from_utf8_lossy(&stdout_bytes),
            self.max_output_bytes,
        );
        let (stderr, err_cut) = truncate_output(
            &String::from_utf8_lossy(&stderr_bytes),
            self.max_output_bytes,
        );

        Ok(ExecOutcome {
            stdout,
            stderr,
            exit_code,
            duration_secs,
            timed_out,
            truncated: out_cut || err_cut,
        })
    }

    async fn exec_background(&self, cmd: &str) -> Result<String, ExecError> {
        // Detached exec: the container keeps the process, nothing to poll.
        let status = Command::new("docker")
            .args(["exec", "-d", self.container_name.as_str(), "bash", "-c", cmd])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ExecError::SpawnFailed(e.to_string()))?;

        if !status.success() {
            return Err(ExecError::SpawnFailed(format!(
                "docker exec -d exited with {:?}",
                status.code()
            )));
        }
        Ok(format!("detached:{}", uuid::Uuid::new_v4()))
    }

    async fn poll_background(&self, _handle: &str, _tail_lines: usize) -> Option<Vec<String>> {
        None
    }
}
