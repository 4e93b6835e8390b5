//! Recovery advice for failed or interrupted agent runs.
//!
//! A heuristic triage over the exit code, the trailing stderr lines, and an
//! optional spawn error. The first matching rule wins:
//!
//! 1. no exit code (and no spawn error), or exit code 130 → cancelled
//! 2. exit code 127 or `ENOENT` spawn error → binary not installed
//! 3. exit code 126 or `EACCES` spawn error → permission denied
//! 4. stderr mentions an API key / authentication problem → re-authenticate
//! 5. exit code 1 with stderr → last three stderr lines
//! 6. anything else → generic retry advice

use std::io;
use std::sync::LazyLock;

use regex::RegexSet;

use crate::config::AgentConfig;

/// Advice given when a run was cancelled by the user or a timeout.
pub const CANCELLED_ADVICE: &str = "Agent was cancelled. Try again or break into smaller steps.";

/// Advice given for an exit the table cannot classify.
pub const GENERIC_ADVICE: &str = "An unexpected error occurred. Try again or simplify the task.";

/// Case-insensitive markers of an authentication failure in stderr.
static AUTH_FAILURE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([r"(?i)api key", r"(?i)authentication", r"(?i)unauthorized"])
        .unwrap_or_else(|_| RegexSet::empty())
});

/// Errno-style classification of a failed spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnError {
    /// `ENOENT`, `EACCES`, or `EOTHER`.
    pub code: &'static str,
    /// OS error message.
    pub message: String,
}

impl From<&io::Error> for SpawnError {
    fn from(err: &io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => "ENOENT",
            io::ErrorKind::PermissionDenied => "EACCES",
            _ => "EOTHER",
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// Maps failure signals to user-facing remediation text.
#[derive(Debug, Clone)]
pub struct RecoveryAdvisor {
    tool: String,
    install_command: String,
}

impl RecoveryAdvisor {
    /// Advisor for a specific agent binary.
    #[must_use]
    pub fn new(tool: impl Into<String>, install_command: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            install_command: install_command.into(),
        }
    }

    /// Advisor configured from the agent settings.
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(&config.binary, &config.install_command)
    }

    /// Produce remediation advice. Never fails and always names a next step.
    #[must_use]
    pub fn advise(
        &self,
        exit_code: Option<i32>,
        stderr_lines: &[String],
        spawn_error: Option<&SpawnError>,
    ) -> String {
        let spawn_code = spawn_error.map(|err| err.code);

        if (exit_code.is_none() && spawn_error.is_none()) || exit_code == Some(130) {
            return CANCELLED_ADVICE.to_owned();
        }

        if exit_code == Some(127) || spawn_code == Some("ENOENT") {
            return format!(
                "{} command not found. Install: {}",
                self.tool, self.install_command
            );
        }

        if exit_code == Some(126) || spawn_code == Some("EACCES") {
            return "Permission denied. Check file permissions or run with appropriate access."
                .to_owned();
        }

        if AUTH_FAILURE.is_match(&stderr_lines.join("\n")) {
            return format!("API authentication failed. Re-authenticate: {} auth", self.tool);
        }

        if exit_code == Some(1) && !stderr_lines.is_empty() {
            let start = stderr_lines.len().saturating_sub(3);
            let last_lines = stderr_lines[start..].join("\n");
            return format!(
                "Agent failed. Recent errors:\n{last_lines}\n\nTry simplifying the task or check the error details."
            );
        }

        GENERIC_ADVICE.to_owned()
    }
}
