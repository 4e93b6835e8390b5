//! Agent process spawner.
//!
//! Spawns the agent CLI for one execution session with:
//! - `kill_on_drop(true)` so the process dies with its session.
//! - `env_clear()` plus a minimal allowlist, so server secrets never reach
//!   the agent and output stays machine-readable (`CI=1`, `NO_COLOR=1`).
//! - the task passed as a single argv element, never through a shell.
//! - the session's isolated working directory as `cwd`.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::info;

use super::recovery::SpawnError;
use crate::config::AgentConfig;

/// Environment variables inherited from the server by every agent process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    // Required for process creation on Windows.
    "SystemRoot",
];

/// Variables set explicitly on every agent process.
pub const FIXED_ENV: &[(&str, &str)] = &[("CI", "1"), ("NO_COLOR", "1")];

/// A running agent process with its output pipes detached.
#[derive(Debug)]
pub struct AgentProcess {
    /// Child handle; dropping it kills the process.
    pub child: Child,
    /// Agent stdout (JSON events).
    pub stdout: ChildStdout,
    /// Agent stderr (diagnostics).
    pub stderr: ChildStderr,
}

/// Build the command for one run without spawning it.
#[must_use]
pub fn build_command(config: &AgentConfig, task: &str, workdir: &Path) -> Command {
    let mut cmd = Command::new(&config.binary);
    cmd.args(config.render_args(task));

    cmd.env_clear();
    let forwarded = ALLOWED_ENV_VARS
        .iter()
        .copied()
        .chain(config.pass_env.iter().map(String::as_str));
    for key in forwarded {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }
    for &(key, val) in FIXED_ENV {
        cmd.env(key, val);
    }

    cmd.current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawn the agent CLI for `task` inside `workdir`.
///
/// # Errors
///
/// Returns a [`SpawnError`] classified as `ENOENT`, `EACCES`, or `EOTHER`
/// when the OS refuses to start the process or its pipes are unavailable.
pub fn spawn_agent(
    config: &AgentConfig,
    task: &str,
    workdir: &Path,
) -> std::result::Result<AgentProcess, SpawnError> {
    let mut child = build_command(config, task, workdir)
        .spawn()
        .map_err(|err| SpawnError::from(&err))?;

    let stdout = child.stdout.take().ok_or_else(|| SpawnError {
        code: "EOTHER",
        message: "failed to capture agent stdout".into(),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| SpawnError {
        code: "EOTHER",
        message: "failed to capture agent stderr".into(),
    })?;

    info!(
        pid = child.id().unwrap_or(0),
        binary = config.binary,
        workdir = %workdir.display(),
        "agent process spawned"
    );

    Ok(AgentProcess {
        child,
        stdout,
        stderr,
    })
}
