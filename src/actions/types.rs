//! Typed action payloads and the closed [`Action`] union.
//!
//! Each payload struct mirrors the schema of one action tag; serde does the
//! field-level validation (required fields, type coercion, unknown-field
//! rejection) and [`Action::validate`] adds the range and cross-field rules
//! the derive cannot express.

use serde::Deserialize;

use crate::hub::{AgentType, BootstrapItem, ContextItem, FinalStatus};

/// Default bash timeout when the payload omits one.
pub const DEFAULT_BASH_TIMEOUT_SECS: u64 = 30;
/// Hard cap on a bash timeout.
pub const MAX_BASH_TIMEOUT_SECS: u64 = 300;
/// Cap on paths per metadata request.
pub const MAX_METADATA_PATHS: usize = 10;

fn default_true() -> bool {
    true
}

fn default_bash_timeout() -> u64 {
    DEFAULT_BASH_TIMEOUT_SECS
}

fn default_finish_message() -> String {
    "Task completed".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BashAction {
    pub cmd: String,
    #[serde(default = "default_true")]
    pub block: bool,
    #[serde(default = "default_bash_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FinishAction {
    #[serde(default = "default_finish_message")]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoOp {
    Add,
    Complete,
    Delete,
    ViewAll,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TodoOperation {
    pub action: TodoOp,
    pub content: Option<String>,
    pub task_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchTodoAction {
    pub operations: Vec<TodoOperation>,
    #[serde(default)]
    pub view_all: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadAction {
    pub file_path: String,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteAction {
    pub file_path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditAction {
    pub file_path: String,
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditOperation {
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiEditAction {
    pub file_path: String,
    pub edits: Vec<EditOperation>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileMetadataAction {
    pub file_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrepAction {
    pub pattern: String,
    pub path: Option<String>,
    pub include: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobAction {
    pub pattern: String,
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddNoteAction {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskCreateAction {
    pub agent_type: AgentType,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub context_refs: Vec<String>,
    #[serde(default)]
    pub context_bootstrap: Vec<BootstrapItem>,
    #[serde(default)]
    pub auto_launch: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddContextAction {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchSubagentAction {
    pub task_id: String,
}

fn default_report_status() -> ReportStatus {
    ReportStatus::Completed
}

/// Self-declared outcome on a report tag. `forced` is runtime-only and not
/// accepted from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Completed,
    Failed,
}

impl From<ReportStatus> for FinalStatus {
    fn from(status: ReportStatus) -> Self {
        match status {
            ReportStatus::Completed => FinalStatus::Completed,
            ReportStatus::Failed => FinalStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportAction {
    #[serde(default)]
    pub contexts: Vec<ContextItem>,
    #[serde(default)]
    pub comments: String,
    #[serde(default = "default_report_status")]
    pub status: ReportStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteTempScriptAction {
    pub file_path: String,
    pub content: String,
}

/// One tagged directive emitted by an agent in a single LLM response.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Bash(BashAction),
    Finish(FinishAction),
    Todo(BatchTodoAction),
    ReadFile(ReadAction),
    WriteFile(WriteAction),
    EditFile(EditAction),
    MultiEditFile(MultiEditAction),
    FileMetadata(FileMetadataAction),
    Grep(GrepAction),
    Glob(GlobAction),
    AddNote(AddNoteAction),
    ViewAllNotes,
    TaskCreate(TaskCreateAction),
    AddContext(AddContextAction),
    LaunchSubagent(LaunchSubagentAction),
    Report(ReportAction),
    WriteTempScript(WriteTempScriptAction),
}

impl Action {
    /// Tag used when wrapping this action's environment response.
    pub fn output_tag(&self) -> &'static str {
        match self {
            Action::Bash(_) => "bash",
            Action::Finish(_) => "finish",
            Action::Todo(_) => "todo",
            Action::ReadFile(_)
            | Action::WriteFile(_)
            | Action::EditFile(_)
            | Action::MultiEditFile(_)
            | Action::FileMetadata(_)
            | Action::WriteTempScript(_) => "file",
            Action::Grep(_) | Action::Glob(_) => "search",
            Action::AddNote(_) | Action::ViewAllNotes => "scratchpad",
            Action::TaskCreate(_) => "task",
            Action::AddContext(_) => "context",
            Action::LaunchSubagent(_) => "subagent",
            Action::Report(_) => "report",
        }
    }

    /// Compact, single-line description for logs and history records.
    pub fn describe(&self) -> String {
        match self {
            Action::Bash(a) => format!("bash: {}", first_line(&a.cmd)),
            Action::Finish(a) => format!("finish: {}", first_line(&a.message)),
            Action::Todo(a) => format!("todo: {} ops", a.operations.len()),
            Action::ReadFile(a) => format!("file read: {}", a.file_path),
            Action::WriteFile(a) => format!("file write: {}", a.file_path),
            Action::EditFile(a) => format!("file edit: {}", a.file_path),
            Action::MultiEditFile(a) => {
                format!("file multi_edit: {} ({} edits)", a.file_path, a.edits.len())
            }
            Action::FileMetadata(a) => format!("file metadata: {} paths", a.file_paths.len()),
            Action::Grep(a) => format!("search grep: {}", a.pattern),
            Action::Glob(a) => format!("search glob: {}", a.pattern),
            Action::AddNote(_) => "scratchpad add_note".to_string(),
            Action::ViewAllNotes => "scratchpad view_all_notes".to_string(),
            Action::TaskCreate(a) => format!("task_create: {}", a.title),
            Action::AddContext(a) => format!("add_context: {}", a.id),
            Action::LaunchSubagent(a) => format!("launch_subagent: {}", a.task_id),
            Action::Report(a) => format!("report: {} contexts", a.contexts.len()),
            Action::WriteTempScript(a) => format!("write_temp_script: {}", a.file_path),
        }
    }

    /// Rules the serde derive cannot express: ranges, non-empty fields, and
    /// per-operation requirements.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Action::Bash(a) => {
                if a.cmd.trim().is_empty() {
                    return Err("'cmd' must not be empty".to_string());
                }
                if a.timeout_secs == 0 || a.timeout_secs > MAX_BASH_TIMEOUT_SECS {
                    return Err(format!(
                        "'timeout_secs' must be in 1..={MAX_BASH_TIMEOUT_SECS}, got {}",
                        a.timeout_secs
                    ));
                }
            }
            Action::Todo(a) => {
                if a.operations.is_empty() {
                    return Err("'operations' must not be empty".to_string());
                }
                for (i, op) in a.operations.iter().enumerate() {
                    match op.action {
                        TodoOp::Add => {
                            if op.content.as_deref().unwrap_or("").is_empty() {
                                return Err(format!(
                                    "operation {} ('add') requires 'content'",
                                    i + 1
                                ));
                            }
                        }
                        TodoOp::Complete | TodoOp::Delete => {
                            if op.task_id.is_none() {
                                return Err(format!(
                                    "operation {} requires a positive 'task_id'",
                                    i + 1
                                ));
                            }
                        }
                        TodoOp::ViewAll => {}
                    }
                }
            }
            Action::ReadFile(a) => {
                if a.file_path.is_empty() {
                    return Err("'file_path' must not be empty".to_string());
                }
                if a.limit == Some(0) {
                    return Err("'limit' must be positive".to_string());
                }
            }
            Action::WriteFile(a) => {
                if a.file_path.is_empty() {
                    return Err("'file_path' must not be empty".to_string());
                }
            }
            Action::EditFile(a) => {
                if a.old_string.is_empty() {
                    return Err("'old_string' must not be empty".to_string());
                }
                if a.old_string == a.new_string {
                    return Err("'old_string' and 'new_string' are identical".to_string());
                }
            }
            Action::MultiEditFile(a) => {
                if a.edits.is_empty() {
                    return Err("'edits' must not be empty".to_string());
                }
                for (i, edit) in a.edits.iter().enumerate() {
                    if edit.old_string.is_empty() {
                        return Err(format!("edit {} has an empty 'old_string'", i + 1));
                    }
                }
            }
            Action::FileMetadata(a) => {
                if a.file_paths.is_empty() || a.file_paths.len() > MAX_METADATA_PATHS {
                    return Err(format!(
                        "'file_paths' must contain 1..={MAX_METADATA_PATHS} paths, got {}",
                        a.file_paths.len()
                    ));
                }
            }
            Action::Grep(a) => {
                if a.pattern.is_empty() {
                    return Err("'pattern' must not be empty".to_string());
                }
            }
            Action::Glob(a) => {
                if a.pattern.is_empty() {
                    return Err("'pattern' must not be empty".to_string());
                }
            }
            Action::AddNote(a) => {
                if a.content.trim().is_empty() {
                    return Err("cannot add an empty note".to_string());
                }
            }
            Action::TaskCreate(a) => {
                if a.title.trim().is_empty() {
                    return Err("'title' must not be empty".to_string());
                }
                if a.description.trim().is_empty() {
                    return Err("'description' must not be empty".to_string());
                }
                for (i, item) in a.context_bootstrap.iter().enumerate() {
                    if item.path.is_empty() || item.reason.is_empty() {
                        return Err(format!(
                            "context_bootstrap[{i}] needs non-empty 'path' and 'reason'"
                        ));
                    }
                }
            }
            Action::AddContext(a) => {
                if a.id.trim().is_empty() || a.content.is_empty() {
                    return Err("'id' and 'content' must not be empty".to_string());
                }
            }
            Action::LaunchSubagent(a) => {
                if a.task_id.trim().is_empty() {
                    return Err("'task_id' must not be empty".to_string());
                }
            }
            Action::Report(a) => {
                for (i, ctx) in a.contexts.iter().enumerate() {
                    if ctx.id.trim().is_empty() {
                        return Err(format!("contexts[{i}] has an empty 'id'"));
                    }
                }
            }
            Action::WriteTempScript(a) => {
                if a.file_path.is_empty() {
                    return Err("'file_path' must not be empty".to_string());
                }
            }
            Action::Finish(_) | Action::ViewAllNotes => {}
        }
        Ok(())
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}
