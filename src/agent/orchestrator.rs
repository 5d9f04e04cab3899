//! Orchestrator runtime: the top-level planning loop.
//!
//! The orchestrator re-renders its whole view every turn: the verbatim
//! instruction, the hub snapshot (task board + context store), its private
//! state, and the trimmed conversation history. `finish` ends the run; on
//! budget exhaustion a finish is synthesized from the best-known state.

use std::sync::Arc;

use serde::Serialize;

use super::history::{ConversationHistory, Turn};
use super::system_msgs;
use super::turn_logger::TurnLogger;
use crate::actions::dispatcher::{render_env_responses, Dispatcher};
use crate::actions::parser::parse_response;
use crate::actions::Action;
use crate::config::AppConfig;
use crate::exec::Sandbox;
use crate::hub::{AgentType, OrchestratorHub};
use crate::llm::{ChatMessage, Completion, LlmClient};

/// Aggregate accounting for one top-level run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub orchestrator_turns: usize,
    pub explorer_launches: usize,
    pub coder_launches: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    /// Finish arrived without a verification pass after the last coder task.
    pub finish_flagged: bool,
}

/// What `perform_task` hands back to the harness.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub final_message: String,
    pub stats: RunStats,
}

pub struct Orchestrator {
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
    hub: OrchestratorHub,
    dispatcher: Dispatcher,
    history: ConversationHistory,
    logger: TurnLogger,
}

impl Orchestrator {
    pub fn new(sandbox: Arc<dyn Sandbox>, llm: Arc<dyn LlmClient>, config: &AppConfig) -> Self {
        let hub = OrchestratorHub::new();
        let dispatcher =
            Dispatcher::orchestrator(sandbox, hub.clone(), llm.clone(), config);
        let logger = TurnLogger::new(config.logging_dir.as_deref(), "orchestrator");
        Self {
            config: config.clone(),
            llm,
            hub,
            dispatcher,
            history: ConversationHistory::new(config.history_token_budget),
            logger,
        }
    }

    /// The hub backing this run. Exposed for inspection by the harness and
    /// the scenario tests.
    pub fn hub(&self) -> &OrchestratorHub {
        &self.hub
    }

    fn render_prompt(&self, instruction: &str) -> String {
        let mut sections = vec![
            format!("## Current Task\n{instruction}"),
            format!("## Task Board and Context Store\n{}", self.hub.snapshot()),
        ];
        if !self.dispatcher.todos().is_empty() {
            sections.push(format!("## Todo\n{}", self.dispatcher.todos().view_all()));
        }
        if !self.dispatcher.scratchpad().is_empty() {
            sections.push(format!(
                "## Scratchpad\n{}",
                self.dispatcher.scratchpad().view_all()
            ));
        }
        sections.push(format!(
            "## Conversation History\n{}",
            self.history.to_prompt()
        ));
        sections.join("\n\n")
    }

    async fn call_llm(&self, messages: &[ChatMessage]) -> Option<Completion> {
        for attempt in 0..2 {
            match self.llm.complete(messages, self.config.temperature).await {
                Ok(completion) => return Some(completion),
                Err(e) => {
                    tracing::warn!(attempt, "Orchestrator LLM call failed: {e}");
                }
            }
        }
        None
    }

    pub async fn run(&mut self, instruction: &str) -> TaskOutcome {
        let system = system_msgs::orchestrator();
        let mut stats = RunStats::default();
        let mut final_message: Option<String> = None;

        for turn in 1..=self.config.max_orch_turns {
            let prompt = self.render_prompt(instruction);
            let messages = [
                ChatMessage::system(system),
                ChatMessage::user(prompt.clone()),
            ];

            let Some(completion) = self.call_llm(&messages).await else {
                final_message = Some(
                    "Task aborted: the LLM gateway failed repeatedly; reporting \
                     best-known state."
                        .to_string(),
                );
                break;
            };
            stats.orchestrator_turns = turn;
            stats.tokens_in += completion.tokens_in;
            stats.tokens_out += completion.tokens_out;

            let parsed = parse_response(&completion.text);
            let results = self.dispatcher.execute_all(&parsed.actions).await;

            for launch in self.dispatcher.take_launches() {
                match launch.agent_type {
                    AgentType::Explorer => stats.explorer_launches += 1,
                    AgentType::Coder => stats.coder_launches += 1,
                }
                stats.tokens_in += launch.tokens_in;
                stats.tokens_out += launch.tokens_out;
            }

            let mut env_responses: Vec<String> = parsed
                .errors
                .iter()
                .map(|e| format!("[PARSE ERROR] {e}"))
                .collect();
            if !parsed.found_action_attempt && parsed.actions.is_empty() {
                env_responses
                    .push("No actions were attempted. Emit at least one action tag.".to_string());
            }
            env_responses.extend(render_env_responses(&parsed.actions, &results));

            let finish = parsed
                .actions
                .iter()
                .zip(&results)
                .find_map(|(action, result)| match action {
                    Action::Finish(f) if result.ok => Some(f.message.clone()),
                    _ => None,
                });

            let turn_record = Turn {
                agent_id: "orchestrator".to_string(),
                turn_index: turn,
                raw_response: completion.text,
                actions: parsed.actions.iter().map(Action::describe).collect(),
                env_responses,
                tokens_in: completion.tokens_in,
                tokens_out: completion.tokens_out,
            };
            self.logger.log_turn(&turn_record, &prompt);
            self.history.add_turn(turn_record);

            if let Some(message) = finish {
                if !self.hub.finish_is_verified() {
                    // Accepted anyway: verification is encouraged via the
                    // prompt, not enforced by the runtime.
                    tracing::warn!(
                        "Finish without an explorer verification pass after the last \
                         coder task"
                    );
                    stats.finish_flagged = true;
                }
                tracing::info!(turn, "Orchestrator finished: {message}");
                final_message = Some(message);
                break;
            }
        }

        let (completed, failed) = self.hub.task_tallies();
        stats.tasks_completed = completed;
        stats.tasks_failed = failed;

        let final_message = final_message.unwrap_or_else(|| {
            format!(
                "Turn budget exhausted after {} turns; {} task(s) completed, {} failed. \
                 Best-known state is in the context store.",
                stats.orchestrator_turns, completed, failed
            )
        });

        self.logger.log_summary(&serde_json::json!({
            "final_message": final_message,
            "stats": stats,
        }));

        TaskOutcome {
            final_message,
            stats,
        }
    }
}
