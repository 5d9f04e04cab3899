//! End-to-end scenarios: the full orchestrator/subagent runtime driven by a
//! scripted LLM against a local sandbox.

use std::sync::Arc;

use overseer::agent::Orchestrator;
use overseer::config::AppConfig;
use overseer::exec::{LocalSandbox, Sandbox};
use overseer::hub::TaskStatus;
use overseer::llm::{LlmClient, Role, ScriptedClient};
use tempfile::TempDir;

fn test_config(tmp: &TempDir) -> AppConfig {
    AppConfig {
        temp_root: tmp.path().join("tmp"),
        ..AppConfig::default()
    }
}

fn setup(tmp: &TempDir, responses: Vec<String>) -> (Orchestrator, Arc<ScriptedClient>) {
    let sandbox = Arc::new(LocalSandbox::new(tmp.path()));
    let client = Arc::new(ScriptedClient::new(responses));
    let llm: Arc<dyn LlmClient> = client.clone();
    let orchestrator = Orchestrator::new(sandbox, llm, &test_config(tmp));
    (orchestrator, client)
}

/// The user-visible prompt of call `index` in the global call sequence.
fn prompt_of(client: &ScriptedClient, index: usize) -> String {
    let calls = client.calls();
    calls[index]
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================
// Scenario: trivial echo
// ============================================================

#[tokio::test]
async fn trivial_echo_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let script = vec![
        // Orchestrator turn 1: delegate and launch.
        "<task_create>\n\
         agent_type: explorer\n\
         title: 'verify echo output'\n\
         description: |\n  Run `echo hi` and report the output.\n\
         </task_create>\n\
         <launch_subagent>\n\
         task_id: task_001\n\
         </launch_subagent>"
            .to_string(),
        // Explorer turn 1: run the command.
        "<bash>\ncmd: 'echo hi'\n</bash>".to_string(),
        // Explorer turn 2: report the finding.
        "<report>\n\
         contexts:\n  - id: echo_output\n    content: 'hi'\n\
         comments: 'echo prints hi'\n\
         </report>"
            .to_string(),
        // Orchestrator turn 2: finish.
        "<finish>\nmessage: 'The sandbox printed: hi'\n</finish>".to_string(),
    ];

    let (mut orchestrator, client) = setup(&tmp, script);
    let outcome = orchestrator
        .run("Print 'hi' by running `echo hi` in the sandbox.")
        .await;

    assert!(outcome.final_message.contains("hi"));
    assert_eq!(outcome.stats.orchestrator_turns, 2);
    assert_eq!(outcome.stats.explorer_launches, 1);
    assert_eq!(outcome.stats.coder_launches, 0);
    assert_eq!(outcome.stats.tasks_completed, 1);
    assert_eq!(outcome.stats.tasks_failed, 0);
    assert!(!outcome.stats.finish_flagged, "explorer-only run needs no gate");
    assert!(outcome.stats.tokens_out > 0);

    // The report's context landed in the store with the first write's content.
    let hub = orchestrator.hub();
    assert_eq!(hub.get_context("echo_output").unwrap().content, "hi");
    let task = hub.get_task("task_001").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    // Every executed action's result reached its emitting agent's next
    // prompt: the explorer saw its bash output, the orchestrator saw the
    // launch result.
    let explorer_turn2 = prompt_of(&client, 2);
    assert!(explorer_turn2.contains("<bash_output>"));
    assert!(explorer_turn2.contains("hi"));
    let orchestrator_turn2 = prompt_of(&client, 3);
    assert!(orchestrator_turn2.contains("Subagent finished task task_001"));
    assert!(orchestrator_turn2.contains("echo_output"));
    assert_eq!(client.remaining(), 0);
}

// ============================================================
// Scenario: missing context_ref
// ============================================================

#[tokio::test]
async fn missing_context_ref_rejects_task_creation() {
    let tmp = tempfile::tempdir().unwrap();
    let script = vec![
        "<task_create>\n\
         agent_type: explorer\n\
         title: 'doomed task'\n\
         description: 'uses a ref that does not exist'\n\
         context_refs:\n  - nope_id\n\
         </task_create>"
            .to_string(),
        "<finish>\nmessage: 'giving up'\n</finish>".to_string(),
    ];

    let (mut orchestrator, client) = setup(&tmp, script);
    let outcome = orchestrator.run("irrelevant").await;

    // No task was created and the error reached the next prompt.
    assert_eq!(orchestrator.hub().task_count(), 0);
    assert_eq!(outcome.stats.tasks_completed + outcome.stats.tasks_failed, 0);
    let next_prompt = prompt_of(&client, 1);
    assert!(next_prompt.contains("Unknown context refs"));
    assert!(next_prompt.contains("nope_id"));
}

// ============================================================
// Scenario: duplicate context id across two reports
// ============================================================

#[tokio::test]
async fn duplicate_context_id_keeps_first_write() {
    let tmp = tempfile::tempdir().unwrap();
    let script = vec![
        "<task_create>\n\
         agent_type: explorer\n\
         title: 'first probe'\n\
         description: 'probe one'\n\
         auto_launch: true\n\
         </task_create>"
            .to_string(),
        "<report>\n\
         contexts:\n  - id: foo\n    content: 'first content'\n\
         comments: 'one'\n\
         </report>"
            .to_string(),
        "<task_create>\n\
         agent_type: explorer\n\
         title: 'second probe'\n\
         description: 'probe two'\n\
         auto_launch: true\n\
         </task_create>"
            .to_string(),
        "<report>\n\
         contexts:\n  - id: foo\n    content: 'second content'\n\
         comments: 'two'\n\
         </report>"
            .to_string(),
        "<finish>\nmessage: 'done'\n</finish>".to_string(),
    ];

    let (mut orchestrator, client) = setup(&tmp, script);
    orchestrator.run("collect findings").await;

    let hub = orchestrator.hub();
    assert_eq!(hub.context_count(), 1);
    assert_eq!(hub.get_context("foo").unwrap().content, "first content");
    assert_eq!(hub.get_context("foo").unwrap().created_by, "task_001");

    // The duplicate shows as a warning on the second task, not a failure.
    let second = hub.get_task("task_002").unwrap();
    assert_eq!(second.status, TaskStatus::Completed);
    assert!(second.warnings.iter().any(|w| w.contains("foo")));

    // And the orchestrator was told about the skip.
    let orchestrator_turn3 = prompt_of(&client, 4);
    assert!(orchestrator_turn3.contains("already existed"));
}

// ============================================================
// Scenario: explorer write blocked
// ============================================================

#[tokio::test]
async fn explorer_write_is_blocked_and_recoverable() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("forbidden.txt");
    let script = vec![
        "<task_create>\n\
         agent_type: explorer\n\
         title: 'try to write'\n\
         description: 'attempts a write'\n\
         auto_launch: true\n\
         </task_create>"
            .to_string(),
        format!(
            "<file>\naction: write\nfile_path: {}\ncontent: 'oops'\n</file>",
            target.display()
        ),
        "<report>\n\
         comments: 'write was blocked as expected'\n\
         </report>"
            .to_string(),
        "<finish>\nmessage: 'done'\n</finish>".to_string(),
    ];

    let (mut orchestrator, client) = setup(&tmp, script);
    let outcome = orchestrator.run("probe only").await;

    // File untouched, violation echoed, agent still reported normally.
    assert!(!target.exists());
    let explorer_turn2 = prompt_of(&client, 2);
    assert!(explorer_turn2.contains("read-only"));
    assert_eq!(
        orchestrator.hub().get_task("task_001").unwrap().status,
        TaskStatus::Completed
    );
    assert_eq!(outcome.stats.tasks_completed, 1);
}

// ============================================================
// Scenario: budget exhaustion forces a report
// ============================================================

#[tokio::test]
async fn coder_budget_exhaustion_forces_a_report() {
    let tmp = tempfile::tempdir().unwrap();
    let config = AppConfig {
        max_coder_turns: 3,
        temp_root: tmp.path().join("tmp"),
        ..AppConfig::default()
    };
    let sandbox = Arc::new(LocalSandbox::new(tmp.path()));
    let client = Arc::new(ScriptedClient::new(vec![
        "<task_create>\n\
         agent_type: coder\n\
         title: 'build the widget'\n\
         description: 'implement it'\n\
         auto_launch: true\n\
         </task_create>"
            .to_string(),
        // Coder turn 1: takes a note, never reports.
        "<scratchpad>\n\
         action: add_note\n\
         content: 'implemented half of the parser'\n\
         </scratchpad>"
            .to_string(),
        // Coder turns 2 and 3: keeps poking around.
        "<bash>\ncmd: 'echo still working'\n</bash>".to_string(),
        "<bash>\ncmd: 'echo out of time'\n</bash>".to_string(),
        // Orchestrator turn 2: finish (unverified, so it gets flagged).
        "<finish>\nmessage: 'stopping after coder stall'\n</finish>".to_string(),
    ]));
    let llm: Arc<dyn LlmClient> = client.clone();
    let mut orchestrator = Orchestrator::new(sandbox, llm, &config);

    let outcome = orchestrator.run("build the widget").await;

    // Forced report: task failed, scratchpad surfaced as a context.
    let hub = orchestrator.hub();
    let task = hub.get_task("task_001").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.failure_reason.unwrap().contains("budget"));
    let scratch = hub.get_context("task_001_scratchpad").unwrap();
    assert!(scratch.content.contains("implemented half of the parser"));
    let last_turn = hub.get_context("task_001_last_turn").unwrap();
    assert!(last_turn.content.contains("out of time"));

    assert_eq!(outcome.stats.coder_launches, 1);
    assert_eq!(outcome.stats.tasks_failed, 1);
    assert!(outcome.stats.finish_flagged, "no verification pass after coder");

    // Boundary checks: warning directive at max-1, final directive at max.
    let coder_turn2 = prompt_of(&client, 2);
    assert!(coder_turn2.contains("TURN LIMIT WARNING"));
    let coder_turn3 = prompt_of(&client, 3);
    assert!(coder_turn3.contains("FINAL TURN"));
}

// ============================================================
// Scenario: parse errors self-correct
// ============================================================

#[tokio::test]
async fn parse_errors_are_echoed_for_self_correction() {
    let tmp = tempfile::tempdir().unwrap();
    let script = vec![
        // Bad payload on turn 1.
        "<task_create>\nagent_type: wizard\ntitle: t\ndescription: d\n</task_create>".to_string(),
        // Corrected on turn 2, then finish on turn 3.
        "<task_create>\n\
         agent_type: explorer\n\
         title: 'corrected task'\n\
         description: 'fixed'\n\
         </task_create>"
            .to_string(),
        "<finish>\nmessage: 'ok'\n</finish>".to_string(),
    ];

    let (mut orchestrator, client) = setup(&tmp, script);
    orchestrator.run("demonstrate recovery").await;

    let turn2_prompt = prompt_of(&client, 1);
    assert!(turn2_prompt.contains("[PARSE ERROR]"));
    assert_eq!(orchestrator.hub().task_count(), 1);
    assert_eq!(
        orchestrator.hub().get_task("task_001").unwrap().title,
        "corrected task"
    );
}

// ============================================================
// Scenario: launching a non-pending task
// ============================================================

#[tokio::test]
async fn double_launch_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let script = vec![
        "<task_create>\n\
         agent_type: explorer\n\
         title: 'run once'\n\
         description: 'single run'\n\
         auto_launch: true\n\
         </task_create>"
            .to_string(),
        "<report>\ncomments: 'first run done'\n</report>".to_string(),
        // Orchestrator tries to launch the same task again.
        "<launch_subagent>\ntask_id: task_001\n</launch_subagent>".to_string(),
        "<finish>\nmessage: 'done'\n</finish>".to_string(),
    ];

    let (mut orchestrator, client) = setup(&tmp, script);
    orchestrator.run("run a task exactly once").await;

    // Exactly one report was ingested; the relaunch surfaced as an error.
    let relaunch_prompt = prompt_of(&client, 3);
    assert!(relaunch_prompt.contains("launch requires a pending task"));
    assert_eq!(orchestrator.hub().task_count(), 1);
    assert_eq!(client.remaining(), 0);
}

// ============================================================
// Scenario: orchestrator budget exhaustion
// ============================================================

#[tokio::test]
async fn missing_gateway_config_produces_failed_finish() {
    let tmp = tempfile::tempdir().unwrap();
    let sandbox: Arc<dyn Sandbox> = Arc::new(LocalSandbox::new(tmp.path()));
    // No LITE_LLM_API_BASE configured: fatal, but surfaced as a failed
    // finish instead of a panic.
    let config = AppConfig::default();
    let outcome = overseer::perform_task("anything", sandbox, &config)
        .await
        .unwrap();
    assert!(outcome.final_message.contains("LITE_LLM_API_BASE"));
    assert_eq!(outcome.stats.orchestrator_turns, 0);
}

#[tokio::test]
async fn orchestrator_budget_exhaustion_synthesizes_finish() {
    let tmp = tempfile::tempdir().unwrap();
    let config = AppConfig {
        max_orch_turns: 2,
        temp_root: tmp.path().join("tmp"),
        ..AppConfig::default()
    };
    let sandbox = Arc::new(LocalSandbox::new(tmp.path()));
    let client = Arc::new(ScriptedClient::new(vec![
        "<reasoning>\nstill thinking\n</reasoning>".to_string(),
        "<reasoning>\nstill thinking\n</reasoning>".to_string(),
    ]));
    let llm: Arc<dyn LlmClient> = client.clone();
    let mut orchestrator = Orchestrator::new(sandbox, llm, &config);

    let outcome = orchestrator.run("never finishes").await;
    assert!(outcome.final_message.contains("budget exhausted"));
    assert_eq!(outcome.stats.orchestrator_turns, 2);
}
