//! Unit tests for configuration parsing, validation, and overrides.

use agent_relay::config::{AGENT_BINARY_ENV, DATABASE_PATH_ENV};
use agent_relay::{AppError, GlobalConfig};
use serial_test::serial;

fn minimal_toml(root: &str) -> String {
    format!("sandbox_root = '{root}'\n")
}

// ─── defaults ────────────────────────────────────────────────────────────────

#[test]
fn minimal_config_uses_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config =
        GlobalConfig::from_toml_str(&minimal_toml(&temp.path().to_string_lossy())).expect("valid");

    assert_eq!(config.http_port, 3000);
    assert_eq!(config.http_host, "127.0.0.1");
    assert!(config.retention_enabled);
    assert_eq!(config.agent.binary, "opencode");
    assert_eq!(config.agent.args, vec!["run", "{task}", "--format", "json"]);
    assert_eq!(config.agent.heartbeat_interval_ms, 2000);
    assert_eq!(config.agent.execution_timeout_seconds, 60);
    assert_eq!(config.agent.stderr_window, 10);
    assert!(config.agent.pass_env.is_empty());
    assert_eq!(config.snapshot.resource_updates, 10);
    assert_eq!(config.snapshot.timeline_limit, 100);
}

#[test]
fn sandbox_root_is_created_and_canonicalized() {
    let temp = tempfile::tempdir().expect("tempdir");
    let nested = temp.path().join("a").join("b");
    let config =
        GlobalConfig::from_toml_str(&minimal_toml(&nested.to_string_lossy())).expect("valid");

    assert!(nested.is_dir());
    assert_eq!(config.sandbox_root, nested.canonicalize().expect("canonical"));
}

#[test]
fn db_path_defaults_under_sandbox_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config =
        GlobalConfig::from_toml_str(&minimal_toml(&temp.path().to_string_lossy())).expect("valid");
    assert_eq!(config.db_path(), config.sandbox_root.join("agent-relay.db"));
}

#[test]
fn public_base_url_loses_trailing_slash() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "sandbox_root = '{}'\npublic_base_url = 'https://relay.example.com/'\n",
        temp.path().to_string_lossy()
    );
    let config = GlobalConfig::from_toml_str(&toml).expect("valid");
    assert_eq!(config.public_base_url, "https://relay.example.com");
}

#[test]
fn agent_section_overrides_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        r"
sandbox_root = '{}'

[agent]
binary = 'sh'
args = ['-c', 'echo hi', '{{task}}']
heartbeat_interval_ms = 50
pass_env = ['HOME']
",
        temp.path().to_string_lossy()
    );
    let config = GlobalConfig::from_toml_str(&toml).expect("valid");
    assert_eq!(config.agent.binary, "sh");
    assert_eq!(config.agent.render_args("do it"), vec!["-c", "echo hi", "do it"]);
    assert_eq!(config.agent.pass_env, vec!["HOME"]);
}

// ─── validation ──────────────────────────────────────────────────────────────

fn expect_config_error(extra: &str) {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!("sandbox_root = '{}'\n{extra}", temp.path().to_string_lossy());
    let err = GlobalConfig::from_toml_str(&toml).expect_err("should be rejected");
    assert!(matches!(err, AppError::Config(_)), "{err}");
}

#[test]
fn zero_heartbeat_is_rejected() {
    expect_config_error("[agent]\nheartbeat_interval_ms = 0\n");
}

#[test]
fn zero_timeout_is_rejected() {
    expect_config_error("[agent]\nexecution_timeout_seconds = 0\n");
}

#[test]
fn blank_binary_is_rejected() {
    expect_config_error("[agent]\nbinary = '  '\n");
}

#[test]
fn resource_updates_above_timeline_limit_is_rejected() {
    expect_config_error("[snapshot]\nresource_updates = 20\ntimeline_limit = 5\n");
}

#[test]
fn missing_sandbox_root_is_rejected() {
    let err = GlobalConfig::from_toml_str("http_port = 1\n").expect_err("missing root");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn unreadable_file_is_config_error() {
    let err = GlobalConfig::load_from_path("/nonexistent/agent-relay.toml").expect_err("missing");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("failed to read config")));
}

// ─── workspaces ──────────────────────────────────────────────────────────────

#[test]
fn workspace_is_scoped_to_sandbox_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config =
        GlobalConfig::from_toml_str(&minimal_toml(&temp.path().to_string_lossy())).expect("valid");

    let dir = config.workspace_for("conv_123-abc").expect("valid id");
    assert_eq!(dir, config.sandbox_root.join("conv_123-abc"));

    for bad in ["", "..", "../etc", "a/b", "a b"] {
        assert!(config.workspace_for(bad).is_err(), "{bad:?} accepted");
    }
}

// ─── environment overrides ───────────────────────────────────────────────────

#[test]
#[serial]
fn env_overrides_replace_binary_and_database() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config =
        GlobalConfig::from_toml_str(&minimal_toml(&temp.path().to_string_lossy())).expect("valid");

    std::env::set_var(AGENT_BINARY_ENV, "/opt/agent/bin/opencode");
    std::env::set_var(DATABASE_PATH_ENV, "/var/lib/relay.db");
    config.apply_env_overrides();
    std::env::remove_var(AGENT_BINARY_ENV);
    std::env::remove_var(DATABASE_PATH_ENV);

    assert_eq!(config.agent.binary, "/opt/agent/bin/opencode");
    assert_eq!(config.db_path(), std::path::PathBuf::from("/var/lib/relay.db"));
}

#[test]
#[serial]
fn blank_env_override_is_ignored() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config =
        GlobalConfig::from_toml_str(&minimal_toml(&temp.path().to_string_lossy())).expect("valid");

    std::env::set_var(AGENT_BINARY_ENV, "   ");
    config.apply_env_overrides();
    std::env::remove_var(AGENT_BINARY_ENV);

    assert_eq!(config.agent.binary, "opencode");
}
