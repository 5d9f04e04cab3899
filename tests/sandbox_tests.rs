use overseer::exec::{LocalSandbox, Sandbox};
use std::time::Instant;
use tempfile::TempDir;

fn setup_root() -> TempDir {
    tempfile::tempdir().expect("failed to create temp dir")
}

// ============================================================
// Normal execution
// ============================================================

#[tokio::test]
async fn normal_execution_captures_stdout() {
    let root = setup_root();
    let sandbox = LocalSandbox::new(root.path());
    let outcome = sandbox.exec("echo hello", 5, None).await.unwrap();
    assert_eq!(outcome.stdout, "hello\n");
    assert_eq!(outcome.exit_code, Some(0));
    assert!(!outcome.timed_out);
    assert!(!outcome.truncated);
}

#[tokio::test]
async fn stderr_is_captured_separately() {
    let root = setup_root();
    let sandbox = LocalSandbox::new(root.path());
    let outcome = sandbox.exec("echo err >&2", 5, None).await.unwrap();
    assert_eq!(outcome.stderr, "err\n");
    assert_eq!(outcome.stdout, "");
    assert_eq!(outcome.exit_code, Some(0));
}

#[tokio::test]
async fn exit_codes_pass_through() {
    let root = setup_root();
    let sandbox = LocalSandbox::new(root.path());
    let outcome = sandbox.exec("exit 42", 5, None).await.unwrap();
    assert_eq!(outcome.exit_code, Some(42));
    assert!(!outcome.timed_out);
}

#[tokio::test]
async fn commands_run_in_the_sandbox_root() {
    let root = setup_root();
    let canonical = std::fs::canonicalize(root.path()).unwrap();
    let sandbox = LocalSandbox::new(&canonical);
    let outcome = sandbox.exec("pwd", 5, None).await.unwrap();
    assert_eq!(outcome.stdout.trim(), canonical.to_str().unwrap());
}

#[tokio::test]
async fn cwd_override_is_honored() {
    let root = setup_root();
    let sub = root.path().join("inner");
    std::fs::create_dir(&sub).unwrap();
    let canonical = std::fs::canonicalize(&sub).unwrap();
    let sandbox = LocalSandbox::new(root.path());
    let outcome = sandbox
        .exec("pwd", 5, Some(canonical.to_str().unwrap()))
        .await
        .unwrap();
    assert_eq!(outcome.stdout.trim(), canonical.to_str().unwrap());
}

// ============================================================
// Timeout behavior
// ============================================================

#[tokio::test]
async fn timeout_kills_the_process_group() {
    let root = setup_root();
    let sandbox = LocalSandbox::new(root.path());
    let start = Instant::now();
    let outcome = sandbox.exec("sleep 60", 1, None).await.unwrap();
    let elapsed = start.elapsed();

    assert!(outcome.timed_out, "should report timed_out");
    assert_eq!(outcome.exit_code, None, "killed process has no exit code");
    assert!(
        elapsed.as_secs() < 5,
        "timeout should fire promptly, took {elapsed:?}"
    );
}

#[tokio::test]
async fn fast_command_under_timeout_succeeds() {
    let root = setup_root();
    let sandbox = LocalSandbox::new(root.path());
    let outcome = sandbox.exec("sleep 0.1 && echo done", 5, None).await.unwrap();
    assert!(!outcome.timed_out);
    assert_eq!(outcome.stdout, "done\n");
}

#[tokio::test]
async fn timeout_keeps_partial_output() {
    let root = setup_root();
    let sandbox = LocalSandbox::new(root.path());
    let outcome = sandbox
        .exec("echo early; sleep 60", 1, None)
        .await
        .unwrap();
    assert!(outcome.timed_out);
    assert_eq!(outcome.stdout, "early\n");
}

// ============================================================
// Output truncation boundaries
// ============================================================

#[tokio::test]
async fn output_at_the_cap_is_untouched() {
    let root = setup_root();
    let sandbox = LocalSandbox::new(root.path()).with_max_output_bytes(64);
    // printf emits exactly 64 bytes.
    let outcome = sandbox
        .exec("printf '%064d' 7", 5, None)
        .await
        .unwrap();
    assert_eq!(outcome.stdout.len(), 64);
    assert!(!outcome.truncated);
}

#[tokio::test]
async fn output_one_past_the_cap_is_marked() {
    let root = setup_root();
    let sandbox = LocalSandbox::new(root.path()).with_max_output_bytes(64);
    let outcome = sandbox
        .exec("printf '%065d' 7", 5, None)
        .await
        .unwrap();
    assert!(outcome.truncated);
    assert!(outcome.stdout.contains("[output truncated to 64 bytes]"));
}

// ============================================================
// Background execution
// ============================================================

#[tokio::test]
async fn background_output_is_pollable() {
    let root = setup_root();
    let sandbox = LocalSandbox::new(root.path());
    let handle = sandbox
        .exec_background("echo one; echo two")
        .await
        .unwrap();

    // Give the reader tasks a moment to drain the pipes.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let lines = sandbox.poll_background(&handle, 10).await.unwrap();
    assert!(lines.iter().any(|l| l == "one"));
    assert!(lines.iter().any(|l| l == "two"));
}

#[tokio::test]
async fn unknown_background_handle_is_none() {
    let root = setup_root();
    let sandbox = LocalSandbox::new(root.path());
    assert!(sandbox.poll_background("no-such-handle", 10).await.is_none());
}
