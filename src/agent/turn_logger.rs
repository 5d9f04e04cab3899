//! Durable per-turn JSON logs for replay and debugging.
//!
//! Each agent gets its own subdirectory under the configured logging root;
//! every turn lands as `turn_NNN.json` and a `summary.json` records totals
//! at the end. Uses synchronous `std::fs` since writes are small and
//! per-turn. Logging failures are warned about, never fatal to the run.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use super::history::Turn;

/// Snapshot of a turn as written to disk, including the rendered prompt the
/// agent actually saw.
#[derive(Debug, Serialize)]
pub struct LoggedTurn<'a> {
    pub agent_id: &'a str,
    pub turn_index: usize,
    pub timestamp: String,
    pub prompt_rendered: &'a str,
    pub raw_response: &'a str,
    pub actions: &'a [String],
    pub env_responses: &'a [String],
    pub tokens_in: u64,
    pub tokens_out: u64,
}

pub struct TurnLogger {
    dir: Option<PathBuf>,
}

impl TurnLogger {
    /// Create a logger writing under `{base}/{agent_id}/`. A `None` base
    /// disables logging entirely.
    pub fn new(base: Option<&Path>, agent_id: &str) -> Self {
        let dir = base.map(|b| b.join(agent_id));
        if let Some(dir) = &dir {
            if let Err(e) = fs::create_dir_all(dir) {
                tracing::warn!("Failed to create turn log dir {}: {e}", dir.display());
                return Self { dir: None };
            }
        }
        Self { dir }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn log_turn(&self, turn: &Turn, prompt_rendered: &str) {
        let Some(dir) = &self.dir else { return };
        let record = LoggedTurn {
            agent_id: &turn.agent_id,
            turn_index: turn.turn_index,
            timestamp: Utc::now().to_rfc3339(),
            prompt_rendered,
            raw_response: &turn.raw_response,
            actions: &turn.actions,
            env_responses: &turn.env_responses,
            tokens_in: turn.tokens_in,
            tokens_out: turn.tokens_out,
        };
        let path = dir.join(format!("turn_{:03}.json", turn.turn_index));
        self.write_json(&path, &record);
    }

    pub fn log_summary(&self, summary: &impl Serialize) {
        let Some(dir) = &self.dir else { return };
        self.write_json(&dir.join("summary.json"), summary);
    }

    fn write_json(&self, path: &Path, value: &impl Serialize) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    tracing::warn!("Failed to write turn log {}: {e}", path.display());
                }
            }
            Err(e) => tracing::warn!("Failed to serialize turn log: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_turn(index: usize) -> Turn {
        Turn {
            agent_id: "task_001".to_string(),
            turn_index: index,
            raw_response: "<bash>\ncmd: 'ls'\n</bash>".to_string(),
            actions: vec!["bash: ls".to_string()],
            env_responses: vec!["<bash_output>\nsrc\n</bash_output>".to_string()],
            tokens_in: 10,
            tokens_out: 4,
        }
    }

    #[test]
    fn writes_turn_files_in_agent_subdir() {
        let tmp = TempDir::new().unwrap();
        let logger = TurnLogger::new(Some(tmp.path()), "task_001");
        logger.log_turn(&sample_turn(1), "the rendered prompt");
        logger.log_turn(&sample_turn(2), "the second prompt");

        let first = tmp.path().join("task_001/turn_001.json");
        let second = tmp.path().join("task_001/turn_002.json");
        assert!(first.exists());
        assert!(second.exists());

        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(first).unwrap()).unwrap();
        assert_eq!(parsed["agent_id"], "task_001");
        assert_eq!(parsed["turn_index"], 1);
        assert_eq!(parsed["prompt_rendered"], "the rendered prompt");
        assert_eq!(parsed["tokens_in"], 10);
    }

    #[test]
    fn summary_lands_next_to_turns() {
        let tmp = TempDir::new().unwrap();
        let logger = TurnLogger::new(Some(tmp.path()), "orchestrator");
        logger.log_summary(&serde_json::json!({"turns": 3, "completed": true}));
        let path = tmp.path().join("orchestrator/summary.json");
        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed["turns"], 3);
    }

    #[test]
    fn disabled_logger_is_a_no_op() {
        let logger = TurnLogger::disabled();
        logger.log_turn(&sample_turn(1), "prompt");
        logger.log_summary(&serde_json::json!({}));
    }
}
