//! Content and filename search through the sandbox shell.
//!
//! Both operations fetch one row past the configured cap so truncation is
//! exact: a result set at the cap passes through unmarked, one past it gets
//! the marker.

use std::sync::Arc;

use super::{ErrorKind, OpError};
use crate::exec::{shell_quote, Sandbox};

const SEARCH_TIMEOUT_SECS: u64 = 60;

pub struct SearchManager {
    sandbox: Arc<dyn Sandbox>,
    max_results: usize,
}

impl SearchManager {
    pub fn new(sandbox: Arc<dyn Sandbox>, max_results: usize) -> Self {
        Self {
            sandbox,
            max_results,
        }
    }

    async fn run(&self, cmd: &str) -> Result<String, OpError> {
        let outcome = self
            .sandbox
            .exec(cmd, SEARCH_TIMEOUT_SECS, None)
            .await
            .map_err(|e| OpError::new(ErrorKind::ExecFailed, e.to_string()))?;
        if outcome.timed_out {
            return Err(OpError::new(ErrorKind::Timeout, "search timed out"));
        }
        Ok(outcome.stdout)
    }

    /// Cap rows and append the truncation marker when the cap was exceeded.
    fn bound(&self, mut rows: Vec<String>, what: &str) -> String {
        if rows.len() > self.max_results {
            rows.truncate(self.max_results);
            rows.push(format!(
                "[results truncated to {} {what}]",
                self.max_results
            ));
        }
        rows.join("\n")
    }

    /// Regex search over file contents. Returns `file:line_no:line` rows.
    pub async fn grep(
        &self,
        pattern: &str,
        path: Option<&str>,
        include: Option<&str>,
    ) -> Result<String, OpError> {
        let search_path = path.unwrap_or(".");
        let include_flag = include
            .map(|glob| format!("--include={} ", shell_quote(glob)))
            .unwrap_or_default();
        let cmd = format!(
            "grep -rnH --color=never {include_flag}-e {} {} 2>/dev/null | head -n {}",
            shell_quote(pattern),
            shell_quote(search_path),
            self.max_results + 1
        );

        let output = self.run(&cmd).await?;
        let rows: Vec<String> = output.lines().map(|l| l.to_string()).collect();
        if rows.is_empty() {
            return Ok("No matches found".to_string());
        }
        Ok(self.bound(rows, "matches"))
    }

    /// Find files by shell-style name pattern. Patterns with a `/` match
    /// against the whole path (with `**/` collapsed for `find -path`).
    pub async fn glob(&self, pattern: &str, path: Option<&str>) -> Result<String, OpError> {
        let search_path = path.unwrap_or(".").trim_end_matches('/');
        let search_path = if search_path.is_empty() { "/" } else { search_path };

        let cmd = if pattern.contains('/') {
            let full = format!("{search_path}/{}", pattern.replace("**/", "*/"));
            format!(
                "find {} -path {} -type f 2>/dev/null | head -n {}",
                shell_quote(search_path),
                shell_quote(&full),
                self.max_results + 1
            )
        } else {
            format!(
                "find {} -name {} -type f 2>/dev/null | head -n {}",
                shell_quote(search_path),
                shell_quote(pattern),
                self.max_results + 1
            )
        };

        let output = self.run(&cmd).await?;
        let mut rows: Vec<String> = output.lines().map(|l| l.to_string()).collect();
        if rows.is_empty() {
            return Ok("No files found matching pattern".to_string());
        }
        // Bound first (find emits in directory order), then sort what is shown.
        let truncated = rows.len() > self.max_results;
        rows.truncate(self.max_results);
        rows.sort();
        if truncated {
            rows.push(format!("[results truncated to {} files]", self.max_results));
        }
        Ok(rows.join("\n"))
    }

    /// Directory listing used for `dir/` bootstrap items.
    pub async fn list_dir(&self, path: &str) -> Result<String, OpError> {
        let q = shell_quote(path);
        let cmd = format!(
            "if [ ! -e {q} ]; then echo __SM_NOT_FOUND__; \
             elif [ ! -d {q} ]; then echo __SM_NOT_A_DIR__; \
             else ls -la {q} 2>/dev/null; fi"
        );
        let output = self.run(&cmd).await?;
        match output.lines().next().map(str::trim) {
            Some("__SM_NOT_FOUND__") => Err(OpError::new(
                ErrorKind::NotFound,
                format!("Path not found: {path}"),
            )),
            Some("__SM_NOT_A_DIR__") => Err(OpError::new(
                ErrorKind::NotAFile,
                format!("Not a directory: {path}"),
            )),
            _ => Ok(output),
        }
    }
}
