//! Global configuration parsing, validation, and environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::{AppError, Result};

/// Placeholder substituted with the task text inside [`AgentConfig::args`].
pub const TASK_PLACEHOLDER: &str = "{task}";

/// Environment variable overriding [`AgentConfig::binary`].
pub const AGENT_BINARY_ENV: &str = "AGENT_RELAY_AGENT_BINARY";

/// Environment variable overriding [`GlobalConfig::database_path`].
pub const DATABASE_PATH_ENV: &str = "AGENT_RELAY_DATABASE_PATH";

/// External coding-agent CLI invocation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent CLI binary, resolved through `PATH`.
    #[serde(default = "default_agent_binary")]
    pub binary: String,
    /// Arguments passed to the binary; `{task}` is replaced by the task text.
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
    /// Install command suggested when the binary is missing.
    #[serde(default = "default_install_command")]
    pub install_command: String,
    /// Silence window before a synthetic "still working" update.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Server-side execution budget for one run.
    #[serde(default = "default_execution_timeout_seconds")]
    pub execution_timeout_seconds: u64,
    /// Number of trailing stderr lines retained for diagnostics.
    #[serde(default = "default_stderr_window")]
    pub stderr_window: usize,
    /// Extra server environment variables forwarded to the agent, such as
    /// `HOME` for CLIs that keep credentials there.
    #[serde(default)]
    pub pass_env: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: default_agent_binary(),
            args: default_agent_args(),
            install_command: default_install_command(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            execution_timeout_seconds: default_execution_timeout_seconds(),
            stderr_window: default_stderr_window(),
            pass_env: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Execution budget as a [`Duration`].
    #[must_use]
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_seconds)
    }

    /// Build the argument vector for one run, substituting the task text.
    ///
    /// The task is always passed as a single argument; no shell is involved.
    #[must_use]
    pub fn render_args(&self, task: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                if arg == TASK_PLACEHOLDER {
                    task.to_owned()
                } else {
                    arg.clone()
                }
            })
            .collect()
    }
}

fn default_agent_binary() -> String {
    "opencode".into()
}

fn default_agent_args() -> Vec<String> {
    vec![
        "run".into(),
        TASK_PLACEHOLDER.into(),
        "--format".into(),
        "json".into(),
    ]
}

fn default_install_command() -> String {
    "npm install -g opencode-ai".into()
}

fn default_heartbeat_interval_ms() -> u64 {
    2000
}

fn default_execution_timeout_seconds() -> u64 {
    60
}

fn default_stderr_window() -> usize {
    10
}

/// Limits applied when persisting execution timelines.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotConfig {
    /// Trailing updates copied into a resource snapshot.
    #[serde(default = "default_resource_updates")]
    pub resource_updates: usize,
    /// Trailing updates stored on the `agent_result` message.
    #[serde(default = "default_timeline_limit")]
    pub timeline_limit: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            resource_updates: default_resource_updates(),
            timeline_limit: default_timeline_limit(),
        }
    }
}

fn default_resource_updates() -> usize {
    10
}

fn default_timeline_limit() -> usize {
    100
}

fn default_http_host() -> String {
    "127.0.0.1".into()
}

fn default_http_port() -> u16 {
    3000
}

fn default_public_base_url() -> String {
    "http://localhost:3000".into()
}

fn default_true() -> bool {
    true
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory holding one isolated working directory per conversation.
    pub sandbox_root: PathBuf,
    /// `SQLite` database file; defaults to `<sandbox_root>/agent-relay.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Interface the HTTP server binds to.
    #[serde(default = "default_http_host")]
    pub http_host: String,
    /// HTTP port for the API and SSE streams.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Base URL used to build share links.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Whether the hourly retention purge runs.
    #[serde(default = "default_true")]
    pub retention_enabled: bool,
    /// Agent CLI settings.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Timeline persistence limits.
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `AGENT_RELAY_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(binary) = env::var(AGENT_BINARY_ENV) {
            if !binary.trim().is_empty() {
                info!(binary, "agent binary overridden from environment");
                self.agent.binary = binary;
            }
        }
        if let Ok(path) = env::var(DATABASE_PATH_ENV) {
            if !path.trim().is_empty() {
                info!(path, "database path overridden from environment");
                self.database_path = Some(PathBuf::from(path));
            }
        }
    }

    /// Effective `SQLite` database path.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.sandbox_root.join("agent-relay.db"))
    }

    /// Isolated working directory for one conversation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRequest` if the conversation id could escape
    /// the sandbox root.
    pub fn workspace_for(&self, conversation_id: &str) -> Result<PathBuf> {
        let valid = !conversation_id.is_empty()
            && conversation_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AppError::InvalidRequest(
                "conversation id is not a valid workspace name".into(),
            ));
        }
        Ok(self.sandbox_root.join(conversation_id))
    }

    fn validate(&mut self) -> Result<()> {
        if self.agent.binary.trim().is_empty() {
            return Err(AppError::Config("agent.binary must not be empty".into()));
        }

        if self.agent.heartbeat_interval_ms == 0 {
            return Err(AppError::Config(
                "agent.heartbeat_interval_ms must be greater than zero".into(),
            ));
        }

        if self.agent.execution_timeout_seconds == 0 {
            return Err(AppError::Config(
                "agent.execution_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.agent.stderr_window == 0 {
            return Err(AppError::Config(
                "agent.stderr_window must be greater than zero".into(),
            ));
        }

        if self.snapshot.resource_updates > self.snapshot.timeline_limit {
            return Err(AppError::Config(
                "snapshot.resource_updates must not exceed snapshot.timeline_limit".into(),
            ));
        }

        fs::create_dir_all(&self.sandbox_root)
            .map_err(|err| AppError::Config(format!("sandbox_root not creatable: {err}")))?;
        let canonical_root = self
            .sandbox_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("sandbox_root invalid: {err}")))?;
        self.sandbox_root = canonical_root;

        self.public_base_url = self.public_base_url.trim_end_matches('/').to_owned();

        Ok(())
    }
}
