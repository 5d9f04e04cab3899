//! Central coordination hub: task registry plus Context Store.
//!
//! [`OrchestratorHub`] is the single source of truth for delegated tasks and
//! accumulated context artifacts. It wraps its state behind `Arc<Mutex<..>>`
//! for shared access from the dispatcher and the launch path; contention is
//! negligible (the workload is one orchestrator with sequential launches),
//! so one coarse lock keeps both registries consistent.
//!
//! Locks are never held across a subagent run: launch fetches under the
//! lock, runs unlocked, and re-locks to ingest the report.

pub mod entities;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

pub use entities::{
    AgentType, BootstrapItem, Context, ContextItem, FinalStatus, Report, ReportDigest, Task,
    TaskSpec, TaskStatus,
};

use crate::error::HubError;

/// Maximum words allowed in a task title.
const MAX_TITLE_WORDS: usize = 7;

/// Outcome of absorbing one report into the store.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub task_id: String,
    pub stored_context_ids: Vec<String>,
    pub duplicate_context_ids: Vec<String>,
    pub final_status: FinalStatus,
}

#[derive(Default)]
struct HubState {
    tasks: HashMap<String, Task>,
    task_order: Vec<String>,
    contexts: HashMap<String, Context>,
    context_order: Vec<String>,
    task_counter: u64,
    /// Terminal transitions in completion order, for the finish gate.
    completion_log: Vec<(AgentType, TaskStatus)>,
}

#[derive(Clone, Default)]
pub struct OrchestratorHub {
    state: Arc<Mutex<HubState>>,
}

impl OrchestratorHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task. Validates that every context ref resolves right
    /// now and that the title fits the board.
    pub fn create_task(&self, spec: TaskSpec) -> Result<String, HubError> {
        let mut state = self.state.lock().unwrap();

        let word_count = spec.title.split_whitespace().count();
        if word_count > MAX_TITLE_WORDS {
            return Err(HubError::TitleTooLong {
                title: spec.title,
                got: word_count,
                max: MAX_TITLE_WORDS,
            });
        }

        let missing: Vec<String> = spec
            .context_refs
            .iter()
            .filter(|r| !state.contexts.contains_key(*r))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(HubError::MissingContextRefs(missing));
        }

        state.task_counter += 1;
        let task_id = format!("task_{:03}", state.task_counter);

        let task = Task {
            id: task_id.clone(),
            agent_type: spec.agent_type,
            title: spec.title,
            description: spec.description,
            context_refs: spec.context_refs,
            context_bootstrap: spec.context_bootstrap,
            status: TaskStatus::Pending,
            result: None,
            failure_reason: None,
            warnings: Vec::new(),
            created_at: Utc::now().to_rfc3339(),
            launched_at: None,
            completed_at: None,
        };

        state.task_order.push(task_id.clone());
        state.tasks.insert(task_id.clone(), task);
        tracing::info!(task_id = %task_id, "Created task");
        Ok(task_id)
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.state.lock().unwrap().tasks.get(task_id).cloned()
    }

    /// Transition a pending task to running. Launching anything else is a
    /// protocol violation surfaced to the orchestrator.
    pub fn mark_running(&self, task_id: &str) -> Result<Task, HubError> {
        let mut state = self.state.lock().unwrap();
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| HubError::UnknownTask(task_id.to_string()))?;
        if task.status != TaskStatus::Pending {
            return Err(HubError::TaskNotPending {
                task_id: task_id.to_string(),
                status: task.status.to_string(),
            });
        }
        task.status = TaskStatus::Running;
        task.launched_at = Some(Utc::now().to_rfc3339());
        Ok(task.clone())
    }

    /// Store an orchestrator-authored context. Ids are write-once.
    pub fn add_context(
        &self,
        id: &str,
        content: &str,
        created_by: &str,
    ) -> Result<(), HubError> {
        let mut state = self.state.lock().unwrap();
        Self::insert_context(&mut state, id, content, created_by)
    }

    fn insert_context(
        state: &mut HubState,
        id: &str,
        content: &str,
        created_by: &str,
    ) -> Result<(), HubError> {
        if state.contexts.contains_key(id) {
            return Err(HubError::DuplicateContext(id.to_string()));
        }
        state.context_order.push(id.to_string());
        state.contexts.insert(
            id.to_string(),
            Context {
                id: id.to_string(),
                content: content.to_string(),
                created_by: created_by.to_string(),
                created_at: Utc::now().to_rfc3339(),
            },
        );
        Ok(())
    }

    /// Resolve context refs to full contexts, preserving ref order. Refs are
    /// validated at task creation, so a miss here is only defensive.
    pub fn resolve_contexts(&self, refs: &[String]) -> Vec<Context> {
        let state = self.state.lock().unwrap();
        refs.iter()
            .filter_map(|r| {
                let found = state.contexts.get(r).cloned();
                if found.is_none() {
                    tracing::warn!(context_ref = %r, "Context ref did not resolve");
                }
                found
            })
            .collect()
    }

    /// Absorb a subagent report: contexts in report order (duplicates skip
    /// with a warning on the task), then the terminal status transition.
    /// Atomic with respect to snapshots: everything lands under one lock.
    pub fn ingest_report(&self, report: &Report) -> IngestSummary {
        let mut state = self.state.lock().unwrap();

        let mut stored = Vec::new();
        let mut duplicates = Vec::new();
        for ctx in &report.contexts {
            match Self::insert_context(&mut state, &ctx.id, &ctx.content, &report.task_id) {
                Ok(()) => stored.push(ctx.id.clone()),
                Err(_) => duplicates.push(ctx.id.clone()),
            }
        }

        if let Some(task) = state.tasks.get_mut(&report.task_id) {
            for dup in &duplicates {
                task.warnings
                    .push(format!("context '{dup}' already exists; kept the first write"));
            }
            task.result = Some(ReportDigest {
                context_ids_stored: stored.clone(),
                comments: report.comments.clone(),
                final_status: report.final_status,
            });
            task.status = match report.final_status {
                FinalStatus::Completed => TaskStatus::Completed,
                FinalStatus::Failed | FinalStatus::Forced => TaskStatus::Failed,
            };
            task.failure_reason = match report.final_status {
                FinalStatus::Completed => None,
                FinalStatus::Failed => Some("subagent reported failure".to_string()),
                FinalStatus::Forced => {
                    Some("turn budget exhausted without a report".to_string())
                }
            };
            task.completed_at = Some(Utc::now().to_rfc3339());
            let transition = (task.agent_type, task.status);
            state.completion_log.push(transition);
        } else {
            tracing::warn!(task_id = %report.task_id, "Report for unknown task");
        }

        IngestSummary {
            task_id: report.task_id.clone(),
            stored_context_ids: stored,
            duplicate_context_ids: duplicates,
            final_status: report.final_status,
        }
    }

    /// Whether a finish now would count as verified: at least one completed
    /// Explorer task after the most recent Coder task (vacuously true when
    /// no Coder ran).
    pub fn finish_is_verified(&self) -> bool {
        let state = self.state.lock().unwrap();
        let last_coder = state
            .completion_log
            .iter()
            .rposition(|(kind, _)| *kind == AgentType::Coder);
        match last_coder {
            None => true,
            Some(idx) => state.completion_log[idx + 1..]
                .iter()
                .any(|(kind, status)| {
                    *kind == AgentType::Explorer && *status == TaskStatus::Completed
                }),
        }
    }

    /// (completed, failed) terminal task tallies.
    pub fn task_tallies(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        let completed = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let failed = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();
        (completed, failed)
    }

    pub fn task_count(&self) -> usize {
        self.state.lock().unwrap().tasks.len()
    }

    pub fn context_count(&self) -> usize {
        self.state.lock().unwrap().contexts.len()
    }

    pub fn get_context(&self, id: &str) -> Option<Context> {
        self.state.lock().unwrap().contexts.get(id).cloned()
    }

    /// Deterministic rendered view of the whole board for the orchestrator's
    /// next prompt: all tasks with status and titles, all contexts with
    /// their content, in insertion order.
    pub fn snapshot(&self) -> String {
        let state = self.state.lock().unwrap();
        let mut lines = Vec::new();

        if state.task_order.is_empty() {
            lines.push("No tasks created yet.".to_string());
        } else {
            lines.push("Tasks:".to_string());
            for id in &state.task_order {
                let task = &state.tasks[id];
                lines.push(format!(
                    "  {} [{}] {} ({}, {})",
                    task.status.symbol(),
                    task.id,
                    task.title,
                    task.agent_type,
                    task.status
                ));
                if !task.context_refs.is_empty() {
                    lines.push(format!(
                        "      Context refs: {}",
                        task.context_refs.join(", ")
                    ));
                }
                if !task.context_bootstrap.is_empty() {
                    let paths: Vec<&str> = task
                        .context_bootstrap
                        .iter()
                        .map(|b| b.path.as_str())
                        .collect();
                    lines.push(format!("      Bootstrap: {}", paths.join(", ")));
                }
                if let Some(result) = &task.result {
                    lines.push(format!(
                        "      Result ({}): stored [{}] {}",
                        result.final_status,
                        result.context_ids_stored.join(", "),
                        result.comments
                    ));
                }
                if let Some(reason) = &task.failure_reason {
                    lines.push(format!("      Failure: {reason}"));
                }
                for warning in &task.warnings {
                    lines.push(format!("      Warning: {warning}"));
                }
            }
        }

        lines.push(String::new());
        if state.context_order.is_empty() {
            lines.push("Context store is empty.".to_string());
        } else {
            lines.push("Context Store:".to_string());
            for id in &state.context_order {
                let ctx = &state.contexts[id];
                lines.push(format!("  [{}] (by {})", ctx.id, ctx.created_by));
                for line in ctx.content.lines() {
                    lines.push(format!("      {line}"));
                }
            }
        }

        lines.join("\n")
    }
}
