//! Agent process driver.
//!
//! Runs one agent CLI invocation and turns it into an ordered stream of
//! [`AgentProgressUpdate`]s:
//!
//! ```text
//! STARTING ──spawn ok──▶ RUNNING ──exit 0────────▶ COMPLETED
//!    │                     │  ├──exit ≠ 0─────────▶ FAILED
//!    └──spawn error──▶ FAILED ├──cancel────────────▶ CANCELLED
//!                          └──execution budget──▶ FAILED (timed out)
//! ```
//!
//! Every run ends with exactly one terminal update. A successful
//! `step_finish` seen mid-stream is held back until the process exits and is
//! only released if the exit code is zero; any other outcome replaces it.
//!
//! Stdout is framed by a reader task and handed to the driver loop through a
//! bounded channel. Stderr is collected by a second task into a sliding
//! window that feeds the [`RecoveryAdvisor`] once the process exits.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::ExitStatus;

use futures_util::{Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::AgentLineCodec;
use super::normalizer::normalize_line;
use super::recovery::{RecoveryAdvisor, SpawnError};
use super::spawner::spawn_agent;
use crate::config::AgentConfig;
use crate::models::progress::{now_millis, AgentProgressUpdate};
use crate::AppError;

/// First update of every successfully spawned run.
pub const START_TEXT: &str = "Agent started executing task...";

/// Synthetic narration emitted after a silence gap.
pub const HEARTBEAT_TEXT: &str = "Agent still working...";

/// Terminal content for a clean exit without a `step_finish` event.
pub const COMPLETED_TEXT: &str = "Agent completed successfully";

/// Terminal content for an explicit cancellation.
pub const CANCELLED_TEXT: &str = "Agent execution cancelled by user";

/// Stdout lines buffered between the reader task and the driver loop.
const LINE_CHANNEL_CAPACITY: usize = 64;

/// One agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRun {
    /// Correlation id used in logs.
    pub execution_id: String,
    /// Natural-language task handed to the agent.
    pub task: String,
    /// Working directory the agent runs in.
    pub workdir: PathBuf,
}

/// Fixed-capacity window over the most recent stderr lines.
#[derive(Debug, Clone)]
pub struct StderrWindow {
    lines: VecDeque<String>,
    capacity: usize,
}

impl StderrWindow {
    /// Empty window retaining at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a line, evicting the oldest when full. Blank lines are ignored.
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        if line.trim().is_empty() {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Retained lines, oldest first.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}

/// Why the driver stopped before the process exited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interruption {
    Cancelled,
    TimedOut,
}

/// One turn of the driver loop.
enum Tick {
    Interrupted(Interruption),
    Line(String),
    StdoutClosed,
    Heartbeat,
}

/// Spawns agent runs and streams their progress.
#[derive(Debug, Clone)]
pub struct AgentDriver {
    config: AgentConfig,
    advisor: RecoveryAdvisor,
}

impl AgentDriver {
    /// Driver for the configured agent CLI.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        let advisor = RecoveryAdvisor::from_config(&config);
        Self { config, advisor }
    }

    /// Agent settings this driver was built with.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Start `run` and return its progress stream.
    ///
    /// The stream yields a start narration, the normalized agent events in
    /// arrival order, at most one heartbeat per silence gap, and finally
    /// exactly one terminal update. Firing `cancel` terminates the process
    /// and ends the stream with a cancellation update. Dropping the stream
    /// kills the process.
    pub fn run(
        &self,
        run: AgentRun,
        cancel: CancellationToken,
    ) -> impl Stream<Item = AgentProgressUpdate> + Send + 'static {
        let config = self.config.clone();
        let advisor = self.advisor.clone();

        async_stream::stream! {
            let AgentRun { execution_id, task, workdir } = run;

            let process = match spawn_agent(&config, &task, &workdir) {
                Ok(process) => process,
                Err(err) => {
                    warn!(execution_id, code = err.code, error = %err.message, "agent spawn failed");
                    let recovery = advisor.advise(None, &[], Some(&err));
                    yield AgentProgressUpdate::failed(format!("Agent error: {}", err.message), Some(recovery));
                    return;
                }
            };
            let mut child = process.child;

            yield AgentProgressUpdate::narration(START_TEXT);

            let (line_tx, mut line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
            let stdout_task = tokio::spawn(forward_stdout(execution_id.clone(), process.stdout, line_tx));
            let mut stderr_task = tokio::spawn(collect_stderr(
                execution_id.clone(),
                process.stderr,
                StderrWindow::new(config.stderr_window),
            ));

            let deadline = Instant::now() + config.execution_timeout();
            let heartbeat = config.heartbeat_interval();
            let mut last_event = Instant::now();
            let mut heartbeat_armed = true;
            let mut held_success: Option<AgentProgressUpdate> = None;
            let mut interrupted = None;

            loop {
                let tick = tokio::select! {
                    biased;

                    () = cancel.cancelled() => Tick::Interrupted(Interruption::Cancelled),
                    () = sleep_until(deadline) => Tick::Interrupted(Interruption::TimedOut),
                    line = line_rx.recv() => line.map_or(Tick::StdoutClosed, Tick::Line),
                    () = sleep_until(last_event + heartbeat), if heartbeat_armed => Tick::Heartbeat,
                };

                match tick {
                    Tick::Interrupted(reason) => {
                        interrupted = Some(reason);
                        break;
                    }
                    Tick::StdoutClosed => break,
                    Tick::Heartbeat => {
                        heartbeat_armed = false;
                        debug!(execution_id, "agent silent, emitting heartbeat");
                        yield AgentProgressUpdate::narration(HEARTBEAT_TEXT);
                    }
                    Tick::Line(line) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        last_event = Instant::now();
                        heartbeat_armed = true;
                        match normalize_line(&line) {
                            Some(update) if update.is_terminal() => held_success = Some(update),
                            Some(update) => yield update,
                            None => {}
                        }
                    }
                }
            }

            if interrupted.is_none() {
                let exit = tokio::select! {
                    biased;

                    () = cancel.cancelled() => Err(Interruption::Cancelled),
                    () = sleep_until(deadline) => Err(Interruption::TimedOut),
                    exit = wait_for_exit(&mut child, &mut stderr_task) => Ok(exit),
                };

                match exit {
                    Ok((status, stderr_lines)) => {
                        yield finish(&execution_id, &advisor, status, &stderr_lines, held_success);
                        return;
                    }
                    Err(reason) => interrupted = Some(reason),
                }
            }

            if let Some(reason) = interrupted {
                terminate(&execution_id, &mut child);
                stdout_task.abort();
                stderr_task.abort();

                yield match reason {
                    Interruption::Cancelled => {
                        info!(execution_id, "agent run cancelled");
                        AgentProgressUpdate::failed(CANCELLED_TEXT, None)
                    }
                    Interruption::TimedOut => {
                        warn!(execution_id, timeout_secs = config.execution_timeout_seconds, "agent run timed out");
                        AgentProgressUpdate::failed(
                            format!("Agent execution timed out after {}s", config.execution_timeout_seconds),
                            Some(advisor.advise(None, &[], None)),
                        )
                    }
                };
            }
        }
    }
}

/// Build the single terminal update for a process that exited on its own.
fn finish(
    execution_id: &str,
    advisor: &RecoveryAdvisor,
    status: std::io::Result<ExitStatus>,
    stderr_lines: &[String],
    held_success: Option<AgentProgressUpdate>,
) -> AgentProgressUpdate {
    let status = match status {
        Ok(status) => status,
        Err(err) => {
            warn!(execution_id, %err, "failed to collect agent exit status");
            let spawn_error = SpawnError::from(&err);
            return AgentProgressUpdate::failed(
                format!("Agent error: {err}"),
                Some(advisor.advise(None, stderr_lines, Some(&spawn_error))),
            );
        }
    };

    let exit_code = status.code();
    info!(execution_id, ?exit_code, "agent process exited");

    if exit_code == Some(0) {
        return held_success
            .unwrap_or_else(|| AgentProgressUpdate::succeeded(now_millis(), COMPLETED_TEXT));
    }

    let content = exit_code.map_or_else(
        || "Agent terminated by signal".to_owned(),
        |code| format!("Agent failed with exit code {code}"),
    );
    AgentProgressUpdate::failed(content, Some(advisor.advise(exit_code, stderr_lines, None)))
}

/// Wait for stderr to drain and the process to exit.
async fn wait_for_exit(
    child: &mut Child,
    stderr_task: &mut JoinHandle<StderrWindow>,
) -> (std::io::Result<ExitStatus>, Vec<String>) {
    let stderr_lines = match stderr_task.await {
        Ok(window) => window.into_lines(),
        Err(err) => {
            warn!(%err, "stderr collector failed");
            Vec::new()
        }
    };
    (child.wait().await, stderr_lines)
}

/// Frame stdout into lines and hand them to the driver loop.
///
/// Oversized lines are skipped; framing resumes at the next newline.
async fn forward_stdout<R>(execution_id: String, stdout: R, line_tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, AgentLineCodec::new());
    let mut resume_after_error = false;

    loop {
        match framed.next().await {
            Some(Ok(line)) => {
                resume_after_error = false;
                if line_tx.send(line).await.is_err() {
                    debug!(execution_id, "driver loop gone, stopping stdout reader");
                    break;
                }
            }
            Some(Err(AppError::Agent(msg))) => {
                warn!(execution_id, error = msg, "skipping oversized stdout line");
                resume_after_error = true;
            }
            Some(Err(err)) => {
                warn!(execution_id, %err, "stdout read failed");
                break;
            }
            // FramedRead pauses once after a decode error.
            None if resume_after_error => resume_after_error = false,
            None => {
                debug!(execution_id, "agent stdout closed");
                break;
            }
        }
    }
}

/// Keep the trailing stderr lines until the pipe closes.
async fn collect_stderr<R>(execution_id: String, stderr: R, mut window: StderrWindow) -> StderrWindow
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stderr, AgentLineCodec::new());
    let mut resume_after_error = false;

    loop {
        match framed.next().await {
            Some(Ok(line)) => {
                resume_after_error = false;
                debug!(execution_id, line, "agent stderr");
                window.push(line);
            }
            Some(Err(AppError::Agent(_))) => resume_after_error = true,
            Some(Err(err)) => {
                warn!(execution_id, %err, "stderr read failed");
                break;
            }
            None if resume_after_error => resume_after_error = false,
            None => break,
        }
    }
    window
}

/// Ask the agent to stop. The child is killed outright when it is dropped.
#[cfg(unix)]
fn terminate(execution_id: &str, child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => {
                debug!(execution_id, pid, "sent SIGTERM to agent");
                return;
            }
            Err(err) => warn!(execution_id, pid, %err, "SIGTERM failed, killing agent"),
        }
    }
    if let Err(err) = child.start_kill() {
        debug!(execution_id, %err, "agent already exited");
    }
}

/// Ask the agent to stop. The child is killed outright when it is dropped.
#[cfg(not(unix))]
fn terminate(execution_id: &str, child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(execution_id, %err, "agent already exited");
    }
}
