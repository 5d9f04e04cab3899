//! File operations executed through the sandbox shell.
//!
//! Content crosses the shell boundary as base64 in both directions so
//! arbitrary bytes survive quoting. Occurrence counting for edits and the
//! multi-edit sequence run in-process on the fetched content: the file is
//! only written back after every edit has been applied, which makes
//! multi-edit atomic (the file is either fully updated or untouched).

use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{TimeZone, Utc};

use super::{ErrorKind, OpError};
use crate::exec::{shell_quote, Sandbox};

/// Timeout for the plumbing commands the manager issues.
const FILE_OP_TIMEOUT_SECS: u64 = 60;

// Probe markers distinguishing failure modes in one shell round-trip.
const MARK_OK: &str = "__FM_OK__";
const MARK_NOT_FOUND: &str = "__FM_NOT_FOUND__";
const MARK_NOT_A_FILE: &str = "__FM_NOT_A_FILE__";
const MARK_NO_READ: &str = "__FM_NO_READ__";
const MARK_NO_WRITE: &str = "__FM_NO_WRITE__";
const MARK_NO_PARENT: &str = "__FM_NO_PARENT__";
const MARK_MISSING: &str = "__FM_MISSING__";

pub struct FileManager {
    sandbox: Arc<dyn Sandbox>,
}

impl FileManager {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }

    async fn run(&self, cmd: &str) -> Result<String, OpError> {
        let outcome = self
            .sandbox
            .exec(cmd, FILE_OP_TIMEOUT_SECS, None)
            .await
            .map_err(|e| OpError::new(ErrorKind::ExecFailed, e.to_string()))?;
        if outcome.timed_out {
            return Err(OpError::new(
                ErrorKind::Timeout,
                "file operation timed out in the sandbox",
            ));
        }
        Ok(outcome.stdout)
    }

    fn require_absolute(path: &str) -> Result<(), OpError> {
        if !Path::new(path).is_absolute() {
            return Err(OpError::new(
                ErrorKind::InvalidPath,
                format!("Path must be absolute, got '{path}'"),
            ));
        }
        Ok(())
    }

    /// Fetch raw file content. Shared by read, edit, and multi-edit.
    async fn fetch(&self, path: &str) -> Result<String, OpError> {
        Self::require_absolute(path)?;
        let q = shell_quote(path);
        let cmd = format!(
            "if [ ! -e {q} ]; then echo {MARK_NOT_FOUND}; \
             elif [ ! -f {q} ]; then echo {MARK_NOT_A_FILE}; \
             elif [ ! -r {q} ]; then echo {MARK_NO_READ}; \
             else echo {MARK_OK}; base64 < {q}; fi"
        );
        let output = self.run(&cmd).await?;
        let mut lines = output.lines();
        match lines.next().map(str::trim) {
            Some(MARK_OK) => {
                let encoded: String = lines.collect::<Vec<_>>().concat();
                let bytes = BASE64.decode(encoded.trim()).map_err(|e| {
                    OpError::new(ErrorKind::ExecFailed, format!("base64 decode failed: {e}"))
                })?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Some(MARK_NOT_FOUND) => Err(OpError::new(
                ErrorKind::NotFound,
                format!("File not found: {path}"),
            )),
            Some(MARK_NOT_A_FILE) => Err(OpError::new(
                ErrorKind::NotAFile,
                format!("Not a regular file: {path}"),
            )),
            Some(MARK_NO_READ) => Err(OpError::new(
                ErrorKind::PermissionDenied,
                format!("No read permission: {path}"),
            )),
            other => Err(OpError::new(
                ErrorKind::ExecFailed,
                format!("Unexpected probe output: {other:?}"),
            )),
        }
    }

    /// Write raw content, requiring the parent directory to already exist.
    async fn store(&self, path: &str, content: &str) -> Result<(), OpError> {
        Self::require_absolute(path)?;
        let q = shell_quote(path);
        let encoded = shell_quote(&BASE64.encode(content.as_bytes()));
        let cmd = format!(
            "d=$(dirname {q}); \
             if [ ! -d \"$d\" ]; then echo {MARK_NO_PARENT}; \
             elif [ -e {q} ] && [ ! -w {q} ]; then echo {MARK_NO_WRITE}; \
             elif [ ! -e {q} ] && [ ! -w \"$d\" ]; then echo {MARK_NO_WRITE}; \
             else printf '%s' {encoded} | base64 -d > {q} && echo {MARK_OK}; fi"
        );
        let output = self.run(&cmd).await?;
        match output.lines().next().map(str::trim) {
            Some(MARK_OK) => Ok(()),
            Some(MARK_NO_PARENT) => Err(OpError::new(
                ErrorKind::MissingParent,
                format!("Parent directory does not exist for: {path}"),
            )),
            Some(MARK_NO_WRITE) => Err(OpError::new(
                ErrorKind::PermissionDenied,
                format!("No write permission: {path}"),
            )),
            other => Err(OpError::new(
                ErrorKind::ExecFailed,
                format!("Write failed, probe output: {other:?}"),
            )),
        }
    }

    /// Read a file as numbered lines (`cat -n` style). `offset` is the
    /// 1-based first line to show; `limit` caps the number of lines.
    pub async fn read(
        &self,
        path: &str,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<String, OpError> {
        let content = self.fetch(path).await?;
        let start = offset.unwrap_or(1).max(1) as usize;
        let take = limit.map(|l| l as usize).unwrap_or(usize::MAX);

        let numbered: Vec<String> = content
            .lines()
            .enumerate()
            .skip(start - 1)
            .take(take)
            .map(|(i, line)| format!("{:>6}\t{}", i + 1, line))
            .collect();

        if numbered.is_empty() {
            return Ok(format!("{path} is empty (or offset is past the end)"));
        }
        Ok(numbered.join("\n"))
    }

    pub async fn write(&self, path: &str, content: &str) -> Result<String, OpError> {
        self.store(path, content).await?;
        Ok(format!("Wrote {} bytes to {path}", content.len()))
    }

    /// Literal string replacement. Without `replace_all`, the old string
    /// must occur exactly once.
    pub async fn edit(
        &self,
        path: &str,
        old_string: &str,
        new_string: &str,
        replace_all: bool,
    ) -> Result<String, OpError> {
        let content = self.fetch(path).await?;
        let (updated, message) =
            apply_edit(&content, path, old_string, new_string, replace_all)?;
        self.store(path, &updated).await?;
        Ok(message)
    }

    /// Apply edits sequentially; each edit sees the result of the prior one.
    /// The first failure aborts with the file untouched on disk.
    pub async fn multi_edit(
        &self,
        path: &str,
        edits: &[(String, String, bool)],
    ) -> Result<String, OpError> {
        let mut content = self.fetch(path).await?;
        let mut messages = Vec::with_capacity(edits.len());

        for (i, (old, new, replace_all)) in edits.iter().enumerate() {
            match apply_edit(&content, path, old, new, *replace_all) {
                Ok((updated, message)) => {
                    content = updated;
                    messages.push(format!("Edit {}: {message}", i + 1));
                }
                Err(err) => {
                    return Err(OpError::new(
                        err.kind,
                        format!("Edit {} failed, file unchanged: {}", i + 1, err.message),
                    ));
                }
            }
        }

        self.store(path, &content).await?;
        Ok(messages.join("\n"))
    }

    /// Size, mode, mtime, and file type per path. Missing paths are
    /// reported inline rather than failing the whole request.
    pub async fn metadata(&self, paths: &[String]) -> Result<String, OpError> {
        let mut blocks = Vec::with_capacity(paths.len());
        for path in paths {
            Self::require_absolute(path)?;
            let q = shell_quote(path);
            let cmd = format!(
                "if [ ! -e {q} ]; then echo {MARK_MISSING}; \
                 else stat -c '%s|%a|%Y|%F' {q}; fi"
            );
            let output = self.run(&cmd).await?;
            let line = output.lines().next().unwrap_or("").trim();
            if line == MARK_MISSING {
                blocks.push(format!("{path}: not found"));
                continue;
            }
            let fields: Vec<&str> = line.splitn(4, '|').collect();
            if fields.len() == 4 {
                let mtime = fields[2]
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| fields[2].to_string());
                blocks.push(format!(
                    "{path}:\n  Size: {} bytes\n  Mode: {}\n  Modified: {mtime}\n  Type: {}",
                    fields[0], fields[1], fields[3]
                ));
            } else {
                blocks.push(format!("{path}: unable to stat ({line})"));
            }
        }
        Ok(blocks.join("\n\n"))
    }
}

/// Pure edit application; shared by edit and multi-edit.
fn apply_edit(
    content: &str,
    path: &str,
    old_string: &str,
    new_string: &str,
    replace_all: bool,
) -> Result<(String, String), OpError> {
    let occurrences = content.matches(old_string).count();
    if occurrences == 0 {
        return Err(OpError::new(
            ErrorKind::NotFound,
            format!("old_string not found in {path} (whitespace must match exactly)"),
        ));
    }
    if occurrences > 1 && !replace_all {
        return Err(OpError::new(
            ErrorKind::AmbiguousEdit,
            format!(
                "old_string occurs {occurrences} times in {path}; \
                 add more context or set replace_all"
            ),
        ));
    }

    if replace_all {
        Ok((
            content.replace(old_string, new_string),
            format!("replaced {occurrences} occurrence(s) in {path}"),
        ))
    } else {
        Ok((
            content.replacen(old_string, new_string, 1),
            format!("replaced 1 occurrence in {path}"),
        ))
    }
}
