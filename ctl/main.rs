#![forbid(unsafe_code)]

//! `agent-relay-ctl`: terminal client for `agent-relay`.
//!
//! Triggers an agent execution and renders its timeline as it streams, or
//! lists saved resources.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use agent_relay::client::{ExecutionTimeline, RelayClient};
use agent_relay::models::progress::{AgentProgressUpdate, UpdateKind};
use agent_relay::orchestrator::ExecuteRequest;

/// Environment variable read when `--token` is omitted.
const TOKEN_ENV: &str = "AGENT_RELAY_TOKEN";

#[derive(Debug, Parser)]
#[command(
    name = "agent-relay-ctl",
    about = "Terminal client for agent-relay",
    version,
    long_about = None
)]
struct Cli {
    /// Server base URL.
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Bearer token; falls back to `AGENT_RELAY_TOKEN`.
    #[arg(long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute an approved agent request and follow its progress.
    Execute {
        /// Conversation holding the request.
        #[arg(long)]
        conversation: String,
        /// The `agent_request` message id.
        #[arg(long)]
        message: String,
    },

    /// List saved resources.
    Resources {
        /// Filter by name or description.
        #[arg(long)]
        search: Option<String>,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let Some(token) = args.token.clone().or_else(|| std::env::var(TOKEN_ENV).ok()) else {
        eprintln!("Error: no token given (use --token or {TOKEN_ENV})");
        return ExitCode::FAILURE;
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args, token)) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli, token: String) -> agent_relay::Result<ExitCode> {
    let client = RelayClient::new(args.url, token)?;

    match args.command {
        Command::Execute {
            conversation,
            message,
        } => {
            let request = ExecuteRequest {
                message_id: Some(message),
                conversation_id: Some(conversation),
            };
            let mut printed = 0;
            let timeline = client
                .execute(&request, |timeline: &ExecutionTimeline| {
                    for update in &timeline.updates()[printed..] {
                        println!("{}", render(update));
                    }
                    printed = timeline.updates().len();
                })
                .await?;

            if let Some(resource_id) = timeline.resource_id() {
                println!("saved as resource {resource_id}");
            }
            if let Some(error) = timeline.resource_error() {
                eprintln!("resource not saved: {error}");
            }
            Ok(if timeline.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Resources { search } => {
            for resource in client.list_resources(search.as_deref()).await? {
                println!(
                    "{}  {}  runs={} forks={}",
                    resource.id, resource.name, resource.execution_count, resource.fork_count
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn render(update: &AgentProgressUpdate) -> String {
    let mut line = match update.kind {
        UpdateKind::Narration => format!("  {}", update.content),
        UpdateKind::ToolInvoked => format!(
            "→ [{}] {}",
            update.tool_name.as_deref().unwrap_or("tool"),
            update.content
        ),
        UpdateKind::ToolCompleted => format!(
            "✓ [{}] {}",
            update.tool_name.as_deref().unwrap_or("tool"),
            update.content
        ),
        UpdateKind::Finished if update.is_success() => format!("✔ {}", update.content),
        UpdateKind::Finished => format!("✘ {}", update.content),
    };
    if let Some(recovery) = &update.recovery {
        line.push_str("\n  hint: ");
        line.push_str(recovery);
    }
    line
}
