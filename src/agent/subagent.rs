//! Subagent runtime: a bounded turn loop against the sandbox.
//!
//! A subagent receives its task description, the resolved contexts, and the
//! bootstrap file contents at launch, then loops render → complete → parse
//! → execute until it submits a report or the budget runs out. One turn
//! before the budget ends the prompt warns that the next turn must report;
//! if the budget ends without one, the runtime synthesizes a forced report
//! from the scratchpad and the last turn's outputs.

use std::sync::Arc;

use super::history::{ConversationHistory, Turn};
use super::system_msgs;
use super::turn_logger::TurnLogger;
use crate::actions::dispatcher::{render_env_responses, Capabilities, Dispatcher};
use crate::actions::parser::parse_response;
use crate::actions::types::ReportAction;
use crate::actions::Action;
use crate::config::AppConfig;
use crate::exec::Sandbox;
use crate::hub::{AgentType, Context, ContextItem, FinalStatus, Report};
use crate::llm::{ChatMessage, Completion, LlmClient};

/// Cap on the last-outputs context synthesized into a forced report.
const FORCED_CONTEXT_CHAR_LIMIT: usize = 4000;

/// A bootstrap path resolved at launch time. `content: None` means the path
/// was unreadable, which degrades to a note in the prompt.
#[derive(Debug, Clone)]
pub struct BootstrapFile {
    pub path: String,
    pub reason: String,
    pub content: Option<String>,
}

/// Everything a subagent needs to start: the task plus resolved inputs.
#[derive(Debug, Clone)]
pub struct SubagentSpec {
    pub task_id: String,
    pub agent_type: AgentType,
    pub title: String,
    pub description: String,
    pub contexts: Vec<Context>,
    pub bootstrap: Vec<BootstrapFile>,
}

/// What a finished subagent hands back to the launch path.
#[derive(Debug)]
pub struct SubagentOutcome {
    pub report: Report,
    pub turns: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

pub struct Subagent {
    spec: SubagentSpec,
    dispatcher: Dispatcher,
    llm: Arc<dyn LlmClient>,
    history: ConversationHistory,
    logger: TurnLogger,
    max_turns: usize,
    temperature: f32,
}

impl Subagent {
    pub fn new(
        spec: SubagentSpec,
        sandbox: Arc<dyn Sandbox>,
        llm: Arc<dyn LlmClient>,
        config: &AppConfig,
    ) -> Self {
        let caps = Capabilities::for_agent_type(spec.agent_type);
        let max_turns = match spec.agent_type {
            AgentType::Explorer => config.max_explorer_turns,
            AgentType::Coder => config.max_coder_turns,
        };
        let logger = TurnLogger::new(config.logging_dir.as_deref(), &spec.task_id);
        Self {
            dispatcher: Dispatcher::subagent(sandbox, caps, config),
            llm,
            history: ConversationHistory::new(config.history_token_budget),
            logger,
            max_turns,
            temperature: config.temperature,
            spec,
        }
    }

    fn system_message(&self) -> &'static str {
        match self.spec.agent_type {
            AgentType::Explorer => system_msgs::explorer(),
            AgentType::Coder => system_msgs::coder(),
        }
    }

    /// Static task header: description, inlined contexts, bootstrap content.
    fn task_prompt(&self) -> String {
        let mut sections = vec![
            format!("# Task: {}", self.spec.title),
            self.spec.description.clone(),
        ];

        if !self.spec.contexts.is_empty() {
            sections.push("## Provided Context".to_string());
            for ctx in &self.spec.contexts {
                sections.push(format!("### Context: {}\n{}", ctx.id, ctx.content));
            }
        }

        if !self.spec.bootstrap.is_empty() {
            sections.push("## Relevant Files/Directories".to_string());
            for item in &self.spec.bootstrap {
                match &item.content {
                    Some(content) => sections.push(format!(
                        "### {} ({})\n{}",
                        item.path, item.reason, content
                    )),
                    None => sections.push(format!(
                        "### {} ({})\n[unreadable at launch time]",
                        item.path, item.reason
                    )),
                }
            }
        }

        sections.join("\n\n")
    }

    fn render_prompt(&self, turn: usize) -> String {
        let mut sections = vec![self.task_prompt()];

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

        if turn == self.max_turns {
            sections.push(
                "## FINAL TURN\nThis is your last turn. Respond with ONLY a <report> \
                 action carrying every context you have gathered."
                    .to_string(),
            );
        } else if turn + 1 == self.max_turns {
            sections.push(format!(
                "## TURN LIMIT WARNING\nYou are on turn {turn} of {}. You must submit \
                 your <report> next turn; wrap up now.",
                self.max_turns
            ));
        }

        sections.join("\n\n")
    }

    /// One LLM call, retried once on failure. `None` means both attempts
    /// failed and the runtime should force a report.
    async fn call_llm(&self, messages: &[ChatMessage]) -> Option<Completion> {
        for attempt in 0..2 {
            match self.llm.complete(messages, self.temperature).await {
                Ok(completion) => return Some(completion),
                Err(e) => {
                    tracing::warn!(
                        task_id = %self.spec.task_id,
                        attempt,
                        "Subagent LLM call failed: {e}"
                    );
                }
            }
        }
        None
    }

    pub async fn run(mut self) -> SubagentOutcome {
        let system = self.system_message();
        let mut tokens_in = 0u64;
        let mut tokens_out = 0u64;
        let mut turns_used = 0usize;
        let mut llm_failed = false;

        for turn in 1..=self.max_turns {
            let prompt = self.render_prompt(turn);
            let messages = [
                ChatMessage::system(system),
                ChatMessage::user(prompt.clone()),
            ];

            let Some(completion) = self.call_llm(&messages).await else {
                llm_failed = true;
                break;
            };
            turns_used = turn;
            tokens_in += completion.tokens_in;
            tokens_out += completion.tokens_out;

            let parsed = parse_response(&completion.text);
            let results = self.dispatcher.execute_all(&parsed.actions).await;

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

            let report_action: Option<ReportAction> = parsed
                .actions
                .iter()
                .zip(&results)
                .find_map(|(action, result)| match action {
                    Action::Report(report) if result.ok => Some(report.clone()),
                    _ => None,
                });

            let turn_record = Turn {
                agent_id: self.spec.task_id.clone(),
                turn_index: turn,
                raw_response: completion.text,
                actions: parsed.actions.iter().map(Action::describe).collect(),
                env_responses,
                tokens_in: completion.tokens_in,
                tokens_out: completion.tokens_out,
            };
            self.logger.log_turn(&turn_record, &prompt);
            self.history.add_turn(turn_record);

            if let Some(action) = report_action {
                let report = Report {
                    task_id: self.spec.task_id.clone(),
                    contexts: action.contexts,
                    comments: action.comments,
                    final_status: action.status.into(),
                };
                tracing::info!(
                    task_id = %self.spec.task_id,
                    turns = turn,
                    contexts = report.contexts.len(),
                    "Subagent reported"
                );
                return self.finish(report, turn, tokens_in, tokens_out);
            }
        }

        tracing::warn!(
            task_id = %self.spec.task_id,
            "Subagent exhausted its budget without reporting; forcing a report"
        );
        let report = self.forced_report(llm_failed);
        self.finish(report, turns_used.max(1), tokens_in, tokens_out)
    }

    fn finish(
        self,
        report: Report,
        turns: usize,
        tokens_in: u64,
        tokens_out: u64,
    ) -> SubagentOutcome {
        self.logger.log_summary(&serde_json::json!({
            "task_id": self.spec.task_id,
            "agent_type": self.spec.agent_type,
            "title": self.spec.title,
            "final_status": report.final_status,
            "contexts_returned": report.contexts.len(),
            "num_turns": turns,
            "tokens_in": tokens_in,
            "tokens_out": tokens_out,
        }));
        SubagentOutcome {
            report,
            turns,
            tokens_in,
            tokens_out,
        }
    }

    /// Best-effort report synthesized by the runtime: scratchpad notes and
    /// the last turn's outputs become contexts so nothing is lost.
    fn forced_report(&self, llm_failed: bool) -> Report {
        let mut contexts = Vec::new();

        let notes = self.dispatcher.scratchpad().notes();
        if !notes.is_empty() {
            contexts.push(ContextItem {
                id: format!("{}_scratchpad", self.spec.task_id),
                content: notes.join("\n\n"),
            });
        }

        if let Some(last) = self.history.last() {
            let mut outputs = last.env_responses.join("\n");
            if outputs.chars().count() > FORCED_CONTEXT_CHAR_LIMIT {
                outputs = outputs.chars().take(FORCED_CONTEXT_CHAR_LIMIT).collect();
                outputs.push_str("\n[truncated]");
            }
            if !outputs.is_empty() {
                contexts.push(ContextItem {
                    id: format!("{}_last_turn", self.spec.task_id),
                    content: outputs,
                });
            }
        }

        let comments = if llm_failed {
            format!(
                "Task incomplete: repeated LLM failures after {} turn(s). \
                 Contexts are a best-effort extraction of progress so far.",
                self.history.len()
            )
        } else {
            format!(
                "Task incomplete: reached the {}-turn budget without a report. \
                 Contexts are a best-effort extraction of progress so far.",
                self.max_turns
            )
        };

        Report {
            task_id: self.spec.task_id.clone(),
            contexts,
            comments,
            final_status: FinalStatus::Forced,
        }
    }
}
