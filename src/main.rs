#![forbid(unsafe_code)]

//! `agent-relay`: agent execution streaming server binary.
//!
//! Bootstraps configuration, the `SQLite` database, the retention task, and
//! the HTTP API, then waits for a shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_relay::config::GlobalConfig;
use agent_relay::http::{self, AppState};
use agent_relay::persistence::{db, retention};
use agent_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-relay", about = "Agent execution streaming server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-relay server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.apply_env_overrides();
    if let Some(port) = args.port {
        config.http_port = port;
    }
    let config = Arc::new(config);
    info!(
        sandbox_root = %config.sandbox_root.display(),
        agent = config.agent.binary,
        "configuration loaded"
    );

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path()).await?);
    info!("database connected");

    // ── Start retention service ──────────────────────────
    let ct = CancellationToken::new();
    let retention_handle = if config.retention_enabled {
        info!("retention service started");
        Some(retention::spawn_retention_task(Arc::clone(&db), ct.clone()))
    } else {
        info!("retention disabled");
        None
    };

    // ── Start HTTP server ───────────────────────────────
    let state = Arc::new(AppState::new(Arc::clone(&config), &db).with_shutdown(ct.clone()));
    let http_ct = ct.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(state, http_ct).await {
            error!(%err, "http server failed");
        }
    });

    info!("agent-relay ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    if let Err(err) = http_handle.await {
        error!(%err, "http task panicked");
    }
    if let Some(handle) = retention_handle {
        if let Err(err) = handle.await {
            error!(%err, "retention task panicked");
        }
    }
    db.close().await;
    info!("agent-relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
