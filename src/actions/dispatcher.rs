//! Routes parsed actions to their handlers.
//!
//! The dispatcher enforces capability scope before any handler runs: the
//! orchestrator never reaches the sandbox, subagents never reach the hub,
//! and an Explorer's writes are rejected up front. Every handler returns a
//! uniform [`ExecutionResult`]; nothing here unwinds the runtime.

use std::path::Path;
use std::sync::Arc;

use super::file_manager::FileManager;
use super::search_manager::SearchManager;
use super::state::{Scratchpad, TodoList};
use super::types::*;
use super::{format_tool_output, Action, ErrorKind, ExecutionResult};
use crate::agent::subagent::{BootstrapFile, Subagent, SubagentSpec};
use crate::config::AppConfig;
use crate::exec::Sandbox;
use crate::hub::{AgentType, FinalStatus, OrchestratorHub, TaskSpec};
use crate::llm::LlmClient;

/// What a subagent session is allowed to do, selected at construction from
/// its agent type.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub can_write: bool,
    pub temp_script: bool,
}

impl Capabilities {
    pub fn for_agent_type(agent_type: AgentType) -> Self {
        match agent_type {
            AgentType::Explorer => Self {
                can_write: false,
                temp_script: true,
            },
            AgentType::Coder => Self {
                can_write: true,
                temp_script: false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum Scope {
    Orchestrator,
    Subagent(Capabilities),
}

/// Accounting for one subagent launch, drained by the orchestrator for the
/// final stats.
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub task_id: String,
    pub agent_type: AgentType,
    pub turns: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub final_status: FinalStatus,
}

pub struct Dispatcher {
    scope: Scope,
    config: AppConfig,
    sandbox: Arc<dyn Sandbox>,
    files: FileManager,
    search: SearchManager,
    todos: TodoList,
    scratchpad: Scratchpad,
    hub: Option<OrchestratorHub>,
    llm: Option<Arc<dyn LlmClient>>,
    launches: Vec<LaunchRecord>,
}

impl Dispatcher {
    /// Dispatcher for the orchestrator: hub access, no sandbox actions.
    pub fn orchestrator(
        sandbox: Arc<dyn Sandbox>,
        hub: OrchestratorHub,
        llm: Arc<dyn LlmClient>,
        config: &AppConfig,
    ) -> Self {
        Self::build(Scope::Orchestrator, sandbox, Some(hub), Some(llm), config)
    }

    /// Dispatcher for one subagent session with its capability set.
    pub fn subagent(
        sandbox: Arc<dyn Sandbox>,
        caps: Capabilities,
        config: &AppConfig,
    ) -> Self {
        Self::build(Scope::Subagent(caps), sandbox, None, None, config)
    }

    fn build(
        scope: Scope,
        sandbox: Arc<dyn Sandbox>,
        hub: Option<OrchestratorHub>,
        llm: Option<Arc<dyn LlmClient>>,
        config: &AppConfig,
    ) -> Self {
        Self {
            scope,
            config: config.clone(),
            files: FileManager::new(sandbox.clone()),
            search: SearchManager::new(sandbox.clone(), config.max_search_results),
            sandbox,
            todos: TodoList::new(),
            scratchpad: Scratchpad::new(),
            hub,
            llm,
            launches: Vec::new(),
        }
    }

    pub fn scratchpad(&self) -> &Scratchpad {
        &self.scratchpad
    }

    pub fn todos(&self) -> &TodoList {
        &self.todos
    }

    /// Drain launch accounting collected since the last call.
    pub fn take_launches(&mut self) -> Vec<LaunchRecord> {
        std::mem::take(&mut self.launches)
    }

    /// Execute a full turn's worth of actions in document order. In subagent
    /// scope, runs of consecutive blocking bash actions execute concurrently
    /// in groups of up to three, outputs stitched back in input order.
    /// Execution stops after a `finish`.
    pub async fn execute_all(&mut self, actions: &[Action]) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(actions.len());
        let parallel_bash = matches!(self.scope, Scope::Subagent(_));
        let mut i = 0;

        while i < actions.len() {
            if parallel_bash {
                let mut j = i;
                while j < actions.len()
                    && j - i < 3
                    && matches!(&actions[j], Action::Bash(b) if b.block)
                {
                    j += 1;
                }
                if j - i > 1 {
                    let this = &*self;
                    let group = actions[i..j].iter().map(|action| async move {
                        match action {
                            Action::Bash(bash) => this.run_bash(bash).await,
                            _ => unreachable!("group only holds bash actions"),
                        }
                    });
                    results.extend(futures::future::join_all(group).await);
                    i = j;
                    continue;
                }
            }

            let action = &actions[i];
            let result = self.dispatch(action).await;
            let finished = matches!(action, Action::Finish(_)) && result.ok;
            results.push(result);
            i += 1;
            if finished {
                break;
            }
        }

        results
    }

    /// Route one action to its handler, scope permitting.
    pub async fn dispatch(&mut self, action: &Action) -> ExecutionResult {
        if let Some(message) = self.scope_violation(action) {
            return ExecutionResult::failure(ErrorKind::CapabilityViolation, message);
        }

        match action {
            Action::Bash(a) => self.run_bash(a).await,
            Action::Finish(a) => {
                ExecutionResult::success(format!("Task marked as complete: {}", a.message))
            }
            Action::Todo(a) => self.handle_todo(a),
            Action::ReadFile(a) => self
                .files
                .read(&a.file_path, a.offset, a.limit)
                .await
                .map(ExecutionResult::success)
                .unwrap_or_else(Into::into),
            Action::WriteFile(a) => self
                .files
                .write(&a.file_path, &a.content)
                .await
                .map(ExecutionResult::success)
                .unwrap_or_else(Into::into),
            Action::EditFile(a) => self
                .files
                .edit(&a.file_path, &a.old_string, &a.new_string, a.replace_all)
                .await
                .map(ExecutionResult::success)
                .unwrap_or_else(Into::into),
            Action::MultiEditFile(a) => {
                let edits: Vec<(String, String, bool)> = a
                    .edits
                    .iter()
                    .map(|e| (e.old_string.clone(), e.new_string.clone(), e.replace_all))
                    .collect();
                self.files
                    .multi_edit(&a.file_path, &edits)
                    .await
                    .map(ExecutionResult::success)
                    .unwrap_or_else(Into::into)
            }
            Action::FileMetadata(a) => self
                .files
                .metadata(&a.file_paths)
                .await
                .map(ExecutionResult::success)
                .unwrap_or_else(Into::into),
            Action::WriteTempScript(a) => self
                .files
                .write(&a.file_path, &a.content)
                .await
                .map(ExecutionResult::success)
                .unwrap_or_else(Into::into),
            Action::Grep(a) => self
                .search
                .grep(&a.pattern, a.path.as_deref(), a.include.as_deref())
                .await
                .map(ExecutionResult::success)
                .unwrap_or_else(Into::into),
            Action::Glob(a) => self
                .search
                .glob(&a.pattern, a.path.as_deref())
                .await
                .map(ExecutionResult::success)
                .unwrap_or_else(Into::into),
            Action::AddNote(a) => {
                let index = self.scratchpad.add_note(&a.content);
                ExecutionResult::success(format!("Added note {index} to scratchpad"))
            }
            Action::ViewAllNotes => ExecutionResult::success(self.scratchpad.view_all()),
            Action::TaskCreate(a) => self.handle_task_create(a).await,
            Action::AddContext(a) => self.handle_add_context(a),
            Action::LaunchSubagent(a) => self.handle_launch(&a.task_id).await,
            Action::Report(_) => {
                ExecutionResult::success("Report submission recorded".to_string())
            }
        }
    }

    fn scope_violation(&self, action: &Action) -> Option<String> {
        match &self.scope {
            Scope::Orchestrator => match action {
                Action::Bash(_)
                | Action::ReadFile(_)
                | Action::WriteFile(_)
                | Action::EditFile(_)
                | Action::MultiEditFile(_)
                | Action::FileMetadata(_)
                | Action::Grep(_)
                | Action::Glob(_)
                | Action::WriteTempScript(_) => Some(
                    "The orchestrator cannot touch the sandbox; delegate to a subagent"
                        .to_string(),
                ),
                Action::Report(_) => {
                    Some("Only subagents submit reports; use finish to end the task".to_string())
                }
                _ => None,
            },
            Scope::Subagent(caps) => match action {
                Action::TaskCreate(_)
                | Action::AddContext(_)
                | Action::LaunchSubagent(_)
                | Action::Finish(_) => Some(format!(
                    "{} is orchestrator-only; submit findings via report",
                    action.describe()
                )),
                Action::WriteFile(_) | Action::EditFile(_) | Action::MultiEditFile(_)
                    if !caps.can_write =>
                {
                    Some(
                        "Explorer sessions are read-only; use write_temp_script for \
                         throwaway probes under /tmp"
                            .to_string(),
                    )
                }
                Action::WriteTempScript(a) => {
                    if !caps.temp_script {
                        Some("write_temp_script is explorer-only; use file write".to_string())
                    } else if !Path::new(&a.file_path).starts_with(&self.config.temp_root) {
                        Some(format!(
                            "write_temp_script must target {}, got '{}'",
                            self.config.temp_root.display(),
                            a.file_path
                        ))
                    } else {
                        None
                    }
                }
                _ => None,
            },
        }
    }

    async fn run_bash(&self, action: &BashAction) -> ExecutionResult {
        if !action.block {
            return match self.sandbox.exec_background(&action.cmd).await {
                Ok(handle) => ExecutionResult::success(format!(
                    "Command started in background with handle {handle}"
                )),
                Err(e) => ExecutionResult::failure(ErrorKind::ExecFailed, e.to_string()),
            };
        }

        match self.sandbox.exec(&action.cmd, action.timeout_secs, None).await {
            Ok(outcome) => {
                let mut sections = Vec::new();
                if !outcome.stdout.is_empty() {
                    sections.push(outcome.stdout.clone());
                }
                if !outcome.stderr.is_empty() {
                    sections.push(format!("[stderr]\n{}", outcome.stderr));
                }
                if sections.is_empty() {
                    sections.push("(no output)".to_string());
                }

                if outcome.timed_out {
                    sections.push(format!(
                        "[command timed out after {}s and was killed]",
                        action.timeout_secs.min(self.config.max_timeout_secs)
                    ));
                    return ExecutionResult::observed(ErrorKind::Timeout, sections.join("\n"));
                }
                match outcome.exit_code {
                    Some(0) => ExecutionResult::success(sections.join("\n")),
                    code => {
                        sections.push(format!("[exit code: {}]", code.unwrap_or(-1)));
                        ExecutionResult::observed(ErrorKind::NonZeroExit, sections.join("\n"))
                    }
                }
            }
            Err(e) => ExecutionResult::failure(ErrorKind::ExecFailed, e.to_string()),
        }
    }

    fn handle_todo(&mut self, action: &BatchTodoAction) -> ExecutionResult {
        let mut lines = Vec::new();
        let mut error_kind = None;

        for op in &action.operations {
            match op.action {
                TodoOp::Add => {
                    let content = op.content.as_deref().unwrap_or_default();
                    let id = self.todos.add(content);
                    lines.push(format!("Added todo [{id}]: {}", preview(content)));
                }
                TodoOp::Complete => match self.todos.complete(op.task_id.unwrap_or(0)) {
                    Ok((content, already_done)) => {
                        if already_done {
                            lines.push(format!(
                                "Todo {} is already completed",
                                op.task_id.unwrap_or(0)
                            ));
                        } else {
                            lines.push(format!(
                                "Completed todo [{}]: {}",
                                op.task_id.unwrap_or(0),
                                preview(&content)
                            ));
                        }
                    }
                    Err(e) => {
                        error_kind = Some(e.kind);
                        lines.push(format!("[ERROR] {}", e.message));
                    }
                },
                TodoOp::Delete => match self.todos.delete(op.task_id.unwrap_or(0)) {
                    Ok(content) => lines.push(format!(
                        "Deleted todo [{}]: {}",
                        op.task_id.unwrap_or(0),
                        preview(&content)
                    )),
                    Err(e) => {
                        error_kind = Some(e.kind);
                        lines.push(format!("[ERROR] {}", e.message));
                    }
                },
                TodoOp::ViewAll => {}
            }
        }

        let mut payload = lines.join("\n");
        if action.view_all || action.operations.iter().any(|op| op.action == TodoOp::ViewAll) {
            if !payload.is_empty() {
                payload.push_str("\n\n");
            }
            payload.push_str(&self.todos.view_all());
        }

        match error_kind {
            Some(kind) => ExecutionResult::observed(kind, payload),
            None => ExecutionResult::success(payload),
        }
    }

    async fn handle_task_create(&mut self, action: &TaskCreateAction) -> ExecutionResult {
        let Some(hub) = &self.hub else {
            return ExecutionResult::failure(
                ErrorKind::CapabilityViolation,
                "No hub in this session",
            );
        };

        let spec = TaskSpec {
            agent_type: action.agent_type,
            title: action.title.clone(),
            description: action.description.clone(),
            context_refs: action.context_refs.clone(),
            context_bootstrap: action.context_bootstrap.clone(),
        };

        match hub.create_task(spec) {
            Ok(task_id) => {
                let mut payload = format!("Created task {task_id}: {}", action.title);
                if action.auto_launch {
                    let launch = self.handle_launch(&task_id).await;
                    payload.push('\n');
                    payload.push_str(&launch.payload);
                    if !launch.ok {
                        return ExecutionResult {
                            payload,
                            ..launch
                        };
                    }
                }
                ExecutionResult::success(payload)
            }
            Err(e) => ExecutionResult::failure(ErrorKind::ValidationError, e.to_string()),
        }
    }

    fn handle_add_context(&mut self, action: &AddContextAction) -> ExecutionResult {
        let Some(hub) = &self.hub else {
            return ExecutionResult::failure(
                ErrorKind::CapabilityViolation,
                "No hub in this session",
            );
        };
        match hub.add_context(&action.id, &action.content, "orchestrator") {
            Ok(()) => ExecutionResult::success(format!("Added context '{}' to store", action.id)),
            Err(e) => ExecutionResult::failure(ErrorKind::ValidationError, e.to_string()),
        }
    }

    /// Launch a subagent for a pending task and run it to completion.
    /// Synchronous from the orchestrator's perspective; the hub lock is
    /// never held across the run.
    async fn handle_launch(&mut self, task_id: &str) -> ExecutionResult {
        let (Some(hub), Some(llm)) = (self.hub.clone(), self.llm.clone()) else {
            return ExecutionResult::failure(
                ErrorKind::CapabilityViolation,
                "No hub in this session",
            );
        };

        let task = match hub.mark_running(task_id) {
            Ok(task) => task,
            Err(e) => return ExecutionResult::failure(ErrorKind::ValidationError, e.to_string()),
        };

        let contexts = hub.resolve_contexts(&task.context_refs);
        let mut bootstrap = Vec::with_capacity(task.context_bootstrap.len());
        for item in &task.context_bootstrap {
            let content = if item.path.ends_with('/') {
                self.search.list_dir(&item.path).await
            } else {
                self.files.read(&item.path, None, Some(1000)).await
            };
            match content {
                Ok(content) => bootstrap.push(BootstrapFile {
                    path: item.path.clone(),
                    reason: item.reason.clone(),
                    content: Some(content),
                }),
                Err(e) => {
                    tracing::warn!(path = %item.path, "Bootstrap path unreadable: {}", e.message);
                    bootstrap.push(BootstrapFile {
                        path: item.path.clone(),
                        reason: item.reason.clone(),
                        content: None,
                    });
                }
            }
        }

        let spec = SubagentSpec {
            task_id: task.id.clone(),
            agent_type: task.agent_type,
            title: task.title.clone(),
            description: task.description.clone(),
            contexts,
            bootstrap,
        };

        tracing::info!(task_id = %task.id, agent_type = %task.agent_type, "Launching subagent");
        let subagent = Subagent::new(spec, self.sandbox.clone(), llm, &self.config);
        // Boxed: the launch path recursively re-enters the dispatch machinery
        // through the subagent's own turn loop.
        let outcome = Box::pin(subagent.run()).await;

        let summary = hub.ingest_report(&outcome.report);
        self.launches.push(LaunchRecord {
            task_id: task.id.clone(),
            agent_type: task.agent_type,
            turns: outcome.turns,
            tokens_in: outcome.tokens_in,
            tokens_out: outcome.tokens_out,
            final_status: summary.final_status,
        });

        let mut lines = vec![format!(
            "Subagent finished task {} with status '{}'",
            task.id, summary.final_status
        )];
        if summary.stored_context_ids.is_empty() {
            lines.push("Contexts stored: (none)".to_string());
        } else {
            lines.push(format!(
                "Contexts stored: {}",
                summary.stored_context_ids.join(", ")
            ));
        }
        for dup in &summary.duplicate_context_ids {
            lines.push(format!(
                "Warning: context '{dup}' already existed and was skipped"
            ));
        }
        if !outcome.report.comments.is_empty() {
            lines.push(format!("Comments: {}", outcome.report.comments));
        }
        ExecutionResult::success(lines.join("\n"))
    }
}

/// Shorten state content for echo lines.
fn preview(content: &str) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() > 60 {
        let cut: String = flat.chars().take(60).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

/// Wrap a batch of execution results into environment response strings.
pub fn render_env_responses(actions: &[Action], results: &[ExecutionResult]) -> Vec<String> {
    actions
        .iter()
        .zip(results)
        .map(|(action, result)| format_tool_output(action.output_tag(), &result.payload))
        .collect()
}
