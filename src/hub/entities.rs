//! Shared vocabulary for tasks, contexts, and subagent reports.
//!
//! These are plain records addressed by id: the hub owns contexts, tasks
//! reference context ids, and reports carry the producing task's id. All
//! types serialize for the turn logs.

use serde::{Deserialize, Serialize};

/// Subagent variant a task is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Explorer,
    Coder,
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentType::Explorer => write!(f, "explorer"),
            AgentType::Coder => write!(f, "coder"),
        }
    }
}

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// One-glyph marker used in the rendered task board.
    pub fn symbol(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "○",
            TaskStatus::Running => "◐",
            TaskStatus::Completed => "●",
            TaskStatus::Failed => "✗",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A file or directory to be read into the subagent's prompt at launch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapItem {
    pub path: String,
    pub reason: String,
}

/// An immutable, id-addressed knowledge artifact in the Context Store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    pub id: String,
    pub content: String,
    /// `"orchestrator"` or the producing task id.
    pub created_by: String,
    pub created_at: String,
}

/// A context as carried inside a report, before ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextItem {
    pub id: String,
    pub content: String,
}

/// How a subagent invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    Completed,
    Failed,
    /// Synthesized by the runtime on turn-budget exhaustion.
    Forced,
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalStatus::Completed => write!(f, "completed"),
            FinalStatus::Failed => write!(f, "failed"),
            FinalStatus::Forced => write!(f, "forced"),
        }
    }
}

/// The single structured output of a subagent invocation.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub task_id: String,
    pub contexts: Vec<ContextItem>,
    pub comments: String,
    pub final_status: FinalStatus,
}

/// Compact ingestion record kept on the task after the report is absorbed.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDigest {
    pub context_ids_stored: Vec<String>,
    pub comments: String,
    pub final_status: FinalStatus,
}

/// Creation-time task fields, as emitted by `task_create`.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub agent_type: AgentType,
    pub title: String,
    pub description: String,
    pub context_refs: Vec<String>,
    pub context_bootstrap: Vec<BootstrapItem>,
}

/// A unit of delegated work, owned by the hub.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub agent_type: AgentType,
    pub title: String,
    pub description: String,
    pub context_refs: Vec<String>,
    pub context_bootstrap: Vec<BootstrapItem>,
    pub status: TaskStatus,
    pub result: Option<ReportDigest>,
    pub failure_reason: Option<String>,
    /// Non-fatal ingestion notes (e.g. duplicate context ids skipped).
    pub warnings: Vec<String>,
    pub created_at: String,
    pub launched_at: Option<String>,
    pub completed_at: Option<String>,
}
