//! Agent runtimes and the harness entry point.

pub mod history;
pub mod orchestrator;
pub mod subagent;
pub mod system_msgs;
pub mod turn_logger;

use std::sync::Arc;

pub use orchestrator::{Orchestrator, RunStats, TaskOutcome};

use crate::config::AppConfig;
use crate::exec::Sandbox;
use crate::llm::{GatewayClient, LlmClient};

/// Run one top-level task to completion. Invoked by the benchmark harness
/// per task; constructs the gateway client from the config. A missing
/// gateway configuration is fatal and produces a failed finish rather than
/// a panic or a hang.
pub async fn perform_task(
    instruction: &str,
    sandbox: Arc<dyn Sandbox>,
    config: &AppConfig,
) -> anyhow::Result<TaskOutcome> {
    let llm: Arc<dyn LlmClient> = match GatewayClient::from_config(config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Cannot start task: {e}");
            return Ok(TaskOutcome {
                final_message: format!("Task aborted before the first turn: {e}"),
                stats: RunStats::default(),
            });
        }
    };
    perform_task_with_client(instruction, sandbox, config, llm).await
}

/// Same as [`perform_task`] but with an injected LLM client. This is the
/// seam the scenario tests use to drive the full runtime with a scripted
/// model.
pub async fn perform_task_with_client(
    instruction: &str,
    sandbox: Arc<dyn Sandbox>,
    config: &AppConfig,
    llm: Arc<dyn LlmClient>,
) -> anyhow::Result<TaskOutcome> {
    let mut orchestrator = Orchestrator::new(sandbox, llm, config);
    Ok(orchestrator.run(instruction).await)
}
