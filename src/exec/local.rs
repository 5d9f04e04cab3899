//! Local sandbox: runs commands via `sh -c` under a working root.
//!
//! Each child runs in its own process group so a timeout can SIGKILL the
//! whole tree, not just the shell. Background commands capture output into
//! a bounded ring buffer keyed by an opaque handle.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use uuid::Uuid;

use super::{truncate_output, ExecOutcome, Sandbox};
use crate::error::ExecError;

/// Maximum number of lines retained per background ring buffer.
const BACKGROUND_BUFFER_CAPACITY: usize = 1000;

type RingBuffer = Arc<Mutex<VecDeque<String>>>;

pub struct LocalSandbox {
    root: PathBuf,
    max_timeout_secs: u64,
    max_output_bytes: usize,
    background: Mutex<HashMap<String, RingBuffer>>,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_timeout_secs: 300,
            max_output_bytes: 100 * 1024,
            background: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    pub fn with_max_timeout_secs(mut self, max: u64) -> Self {
        self.max_timeout_secs = max;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// SIGKILL the process group of `pid`, then reap the child.
    async fn kill_group(child: &mut tokio::process::Child) {
        if let Some(pid) = child.id() {
            let pgid = nix::unistd::Pid::from_raw(pid as i32);
            let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL);
        }
        // Fall back to killing the direct child if the group signal missed,
        // then reap to avoid zombies.
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn exec(
        &self,
        cmd: &str,
        timeout_secs: u64,
        cwd: Option<&str>,
    ) -> Result<ExecOutcome, ExecError> {
        let timeout = timeout_secs.clamp(1, self.max_timeout_secs);
        let workdir = cwd.map(PathBuf::from).unwrap_or_else(|| self.root.clone());

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(&workdir)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnFailed(e.to_string()))?;

        // Drain both pipes concurrently so a chatty child never deadlocks on
        // a full pipe while we wait for it.
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
                Self::kill_group(&mut child).await;
                (None, true)
            }
        };
        let duration_secs = start.elapsed().as_secs_f64();

        // The pipes close once the child (and its group) is gone, so these
        // complete even on the timeout path.
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
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(&self.root)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecError::SpawnFailed(e.to_string()))?;

        let handle = Uuid::new_v4().to_string();
        let buffer: RingBuffer =
            Arc::new(Mutex::new(VecDeque::with_capacity(BACKGROUND_BUFFER_CAPACITY)));
        self.background
            .lock()
            .unwrap()
            .insert(handle.clone(), buffer.clone());

        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, buffer.clone(), "");
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, buffer.clone(), "[stderr] ");
        }

        // Reap the child when it exits and record the status line.
        tokio::spawn(async move {
            let status = child.wait().await;
            let line = match status {
                Ok(status) => format!("[process exited with {:?}]", status.code()),
                Err(e) => format!("[process wait failed: {e}]"),
            };
            push_line(&buffer, line);
        });

        Ok(handle)
    }

    async fn poll_background(&self, handle: &str, tail_lines: usize) -> Option<Vec<String>> {
        let buffers = self.background.lock().unwrap();
        buffers.get(handle).map(|buf| {
            let buf = buf.lock().unwrap();
            let start = buf.len().saturating_sub(tail_lines);
            buf.iter().skip(start).cloned().collect()
        })
    }
}

fn spawn_line_reader(
    pipe: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    buffer: RingBuffer,
    prefix: &'static str,
) {
    tokio::spawn(async move {
        let reader = BufReader::new(pipe);
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            push_line(&buffer, format!("{prefix}{line}"));
        }
    });
}

fn push_line(buffer: &RingBuffer, line: String) {
    let mut buf = buffer.lock().unwrap();
    if buf.len() >= BACKGROUND_BUFFER_CAPACITY {
        buf.pop_front();
    }
    buf.push_back(line);
}
