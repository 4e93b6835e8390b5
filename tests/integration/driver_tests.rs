//! Integration tests for the agent driver against real child processes.
//!
//! Each test stands a `sh -c` script in for the agent CLI and asserts on the
//! exact update stream the driver produces.

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use agent_relay::agent::driver::{CANCELLED_TEXT, COMPLETED_TEXT, HEARTBEAT_TEXT, START_TEXT};
use agent_relay::agent::normalizer::STEP_START_TEXT;
use agent_relay::agent::recovery::CANCELLED_ADVICE;
use agent_relay::agent::{AgentDriver, AgentRun};
use agent_relay::config::AgentConfig;
use agent_relay::models::progress::{AgentProgressUpdate, UpdateKind};

use super::test_helpers::{script_agent, TASK, WORKFLOW_SCRIPT};

async fn run_with(
    config: AgentConfig,
    task: &str,
    cancel: CancellationToken,
) -> Vec<AgentProgressUpdate> {
    let workdir = tempfile::tempdir().expect("tempdir");
    let run = AgentRun {
        execution_id: "exec-test".into(),
        task: task.into(),
        workdir: workdir.path().to_path_buf(),
    };
    AgentDriver::new(config).run(run, cancel).collect().await
}

async fn run_script(script: &str) -> Vec<AgentProgressUpdate> {
    run_with(script_agent(script), TASK, CancellationToken::new()).await
}

fn contents(updates: &[AgentProgressUpdate]) -> Vec<&str> {
    updates.iter().map(|u| u.content.as_str()).collect()
}

fn assert_single_terminal(updates: &[AgentProgressUpdate]) -> &AgentProgressUpdate {
    let terminals = updates.iter().filter(|u| u.is_terminal()).count();
    assert_eq!(terminals, 1, "expected one terminal in {updates:#?}");
    let last = updates.last().expect("non-empty stream");
    assert!(last.is_terminal(), "terminal must be last: {updates:#?}");
    last
}

// ─── successful runs ─────────────────────────────────────────────────────────

#[tokio::test]
async fn workflow_run_streams_normalized_events() {
    let updates = run_script(WORKFLOW_SCRIPT).await;

    let kinds: Vec<_> = updates.iter().map(|u| u.kind).collect();
    assert_eq!(
        kinds,
        vec![
            UpdateKind::Narration,
            UpdateKind::Narration,
            UpdateKind::ToolInvoked,
            UpdateKind::ToolCompleted,
            UpdateKind::Finished,
        ]
    );
    assert_eq!(
        contents(&updates),
        vec![
            START_TEXT,
            STEP_START_TEXT,
            "Writing workflow.ts",
            "File created",
            "Task completed (cost: $0.0123)",
        ]
    );
    assert!(assert_single_terminal(&updates).is_success());
}

#[tokio::test]
async fn clean_exit_without_step_finish_completes() {
    let updates = run_script("exit 0").await;
    assert_eq!(contents(&updates), vec![START_TEXT, COMPLETED_TEXT]);
    assert!(assert_single_terminal(&updates).is_success());
}

#[tokio::test]
async fn non_json_output_is_narrated_and_unknown_events_dropped() {
    let updates = run_script(
        r#"echo 'Resolving packages'; printf '%s\n' '{"type":"session_idle"}'; echo; echo 'done'"#,
    )
    .await;
    assert_eq!(
        contents(&updates),
        vec![START_TEXT, "Resolving packages", "done", COMPLETED_TEXT]
    );
}

#[tokio::test]
async fn invalid_utf8_line_does_not_end_the_run() {
    let updates = run_script(
        r#"printf 'caf\351\n'
printf '%s\n' '{"type":"text","part":{"text":"after"}}'
for i in $(seq 1 2000); do echo "line $i"; done
exit 0"#,
    )
    .await;

    let texts = contents(&updates);
    assert_eq!(texts[1], "caf\u{fffd}");
    assert_eq!(texts[2], "after");
    assert_eq!(texts[texts.len() - 2], "line 2000");
    let terminal = assert_single_terminal(&updates);
    assert_eq!(terminal.content, COMPLETED_TEXT);
    assert!(terminal.is_success());
}

#[tokio::test]
async fn invalid_utf8_stderr_keeps_later_diagnostics() {
    let updates = run_script(
        r#"printf 'bad \377 byte\n' >&2; echo 'disk quota exceeded' >&2; exit 1"#,
    )
    .await;
    let recovery = assert_single_terminal(&updates)
        .recovery
        .clone()
        .expect("recovery");
    assert!(recovery.contains("disk quota exceeded"), "{recovery}");
}

#[tokio::test]
async fn task_is_passed_as_one_argument() {
    let task = "print \"quotes\"; and $(subshells) literally";
    let updates = run_with(
        script_agent(r#"printf '%s\n' "$1""#),
        task,
        CancellationToken::new(),
    )
    .await;
    assert_eq!(updates[1].content, task);
}

#[tokio::test]
async fn agent_runs_in_workdir_with_isolated_env() {
    let workdir = tempfile::tempdir().expect("tempdir");
    let run = AgentRun {
        execution_id: "exec-env".into(),
        task: TASK.into(),
        workdir: workdir.path().to_path_buf(),
    };
    let config = script_agent(
        r#"pwd; echo "CI=$CI NO_COLOR=$NO_COLOR HOME=${HOME:-none}""#,
    );
    let updates: Vec<_> = AgentDriver::new(config)
        .run(run, CancellationToken::new())
        .collect()
        .await;

    let expected_dir = workdir.path().canonicalize().expect("canonical");
    let reported = std::path::PathBuf::from(&updates[1].content)
        .canonicalize()
        .expect("canonical pwd");
    assert_eq!(reported, expected_dir);
    assert_eq!(updates[2].content, "CI=1 NO_COLOR=1 HOME=none");
}

// ─── failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_binary_fails_with_install_advice() {
    let config = AgentConfig {
        binary: "/nonexistent/agent-relay-agent".into(),
        ..script_agent("")
    };
    let updates = run_with(config, TASK, CancellationToken::new()).await;

    assert_eq!(updates.len(), 1, "no start narration for a failed spawn");
    let terminal = assert_single_terminal(&updates);
    assert!(!terminal.is_success());
    assert!(terminal.content.starts_with("Agent error:"), "{}", terminal.content);
    let recovery = terminal.recovery.as_deref().expect("recovery");
    assert!(recovery.contains("npm install -g opencode-ai"), "{recovery}");
}

#[tokio::test]
async fn exit_127_suggests_install() {
    let updates = run_script("exit 127").await;
    let terminal = assert_single_terminal(&updates);
    assert_eq!(terminal.content, "Agent failed with exit code 127");
    assert_eq!(
        terminal.recovery.as_deref(),
        Some("sh command not found. Install: npm install -g opencode-ai")
    );
}

#[tokio::test]
async fn stderr_auth_failure_suggests_reauthentication() {
    let updates = run_script("echo 'Error: invalid API key' >&2; exit 1").await;
    let terminal = assert_single_terminal(&updates);
    assert_eq!(terminal.content, "Agent failed with exit code 1");
    assert_eq!(
        terminal.recovery.as_deref(),
        Some("API authentication failed. Re-authenticate: sh auth")
    );
}

#[tokio::test]
async fn exit_1_quotes_recent_stderr() {
    let updates =
        run_script("for n in 1 2 3 4; do echo \"error line $n\" >&2; done; exit 1").await;
    let recovery = assert_single_terminal(&updates)
        .recovery
        .clone()
        .expect("recovery");
    assert!(
        recovery.contains("error line 2\nerror line 3\nerror line 4"),
        "{recovery}"
    );
    assert!(!recovery.contains("error line 1"), "{recovery}");
}

#[tokio::test]
async fn nonzero_exit_replaces_reported_success() {
    let updates = run_script(
        r#"printf '%s\n' '{"type":"step_finish","part":{"reason":"stop","cost":0.5}}'; exit 2"#,
    )
    .await;
    let terminal = assert_single_terminal(&updates);
    assert!(!terminal.is_success());
    assert_eq!(terminal.content, "Agent failed with exit code 2");
    assert!(!contents(&updates).iter().any(|c| c.starts_with("Task completed")));
}

#[tokio::test]
async fn intermediate_step_finish_does_not_end_the_run() {
    let updates = run_script(
        r#"printf '%s\n' '{"type":"step_finish","part":{"reason":"tool-calls"}}'
printf '%s\n' '{"type":"text","part":{"text":"still going"}}'"#,
    )
    .await;
    assert_eq!(
        contents(&updates),
        vec![START_TEXT, "still going", COMPLETED_TEXT]
    );
}

// ─── heartbeats ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn heartbeat_fires_once_per_silence_gap() {
    let config = AgentConfig {
        heartbeat_interval_ms: 200,
        ..script_agent("sleep 1; echo 'halfway'; sleep 1")
    };
    let updates = run_with(config, TASK, CancellationToken::new()).await;

    assert_eq!(
        contents(&updates),
        vec![START_TEXT, HEARTBEAT_TEXT, "halfway", HEARTBEAT_TEXT, COMPLETED_TEXT]
    );
}

#[tokio::test]
async fn chatty_agent_gets_no_heartbeat() {
    let config = AgentConfig {
        heartbeat_interval_ms: 2_000,
        ..script_agent("echo one; echo two")
    };
    let updates = run_with(config, TASK, CancellationToken::new()).await;
    assert!(!contents(&updates).contains(&HEARTBEAT_TEXT));
}

// ─── interruption ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancellation_ends_run_without_recovery() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let updates = run_with(script_agent("exec sleep 30"), TASK, cancel).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    let terminal = assert_single_terminal(&updates);
    assert_eq!(terminal.content, CANCELLED_TEXT);
    assert_eq!(terminal.success, Some(false));
    assert!(terminal.recovery.is_none());
}

#[tokio::test]
async fn cancelling_a_chatty_agent_ends_the_stream_at_once() {
    let cancel = CancellationToken::new();
    let driver = AgentDriver::new(script_agent(
        r#"i=0; while true; do i=$((i+1)); echo "tick $i"; sleep 0.05; done"#,
    ));
    let workdir = tempfile::tempdir().expect("tempdir");
    let run = AgentRun {
        execution_id: "exec-chatty".into(),
        task: TASK.into(),
        workdir: workdir.path().to_path_buf(),
    };

    let mut stream = std::pin::pin!(driver.run(run, cancel.clone()));
    loop {
        let update = stream.next().await.expect("update before cancel");
        assert!(!update.is_terminal(), "run ended early: {update:?}");
        if update.content == "tick 3" {
            cancel.cancel();
            break;
        }
    }

    let terminal = stream.next().await.expect("terminal after cancel");
    assert_eq!(terminal.content, CANCELLED_TEXT);
    assert!(stream.next().await.is_none(), "updates after cancellation");
}

#[tokio::test]
async fn execution_budget_times_out() {
    let config = AgentConfig {
        execution_timeout_seconds: 1,
        ..script_agent("exec sleep 30")
    };
    let started = Instant::now();
    let updates = run_with(config, TASK, CancellationToken::new()).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    let terminal = assert_single_terminal(&updates);
    assert_eq!(terminal.content, "Agent execution timed out after 1s");
    assert_eq!(terminal.recovery.as_deref(), Some(CANCELLED_ADVICE));
}

#[tokio::test]
async fn dropping_the_stream_stops_the_agent() {
    let workdir = tempfile::tempdir().expect("tempdir");
    let marker = workdir.path().join("finished");
    let run = AgentRun {
        execution_id: "exec-drop".into(),
        task: TASK.into(),
        workdir: workdir.path().to_path_buf(),
    };
    let driver = AgentDriver::new(script_agent("echo started; sleep 1; touch finished"));

    {
        let mut stream = std::pin::pin!(driver.run(run, CancellationToken::new()));
        let first = stream.next().await.expect("start update");
        assert_eq!(first.content, START_TEXT);
    }

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(!marker.exists(), "agent kept running after the stream was dropped");
}
