//! HTTP API and SSE transport.
//!
//! | Route                                  | Auth      | Handler                         |
//! |----------------------------------------|-----------|---------------------------------|
//! | `GET /health`                          | none      | liveness probe                  |
//! | `POST /api/agent/execute`              | bearer    | [`execute::execute_agent`]      |
//! | `GET /api/resources`                   | bearer    | [`resources::list_resources`]   |
//! | `POST /api/resources`                  | bearer    | [`resources::save_resource`]    |
//! | `DELETE /api/resources/{id}`           | bearer    | [`resources::delete_resource`]  |
//! | `POST /api/resources/{id}/execute`     | bearer    | [`resources::execute_resource`] |
//! | `POST /api/resources/{id}/share`       | bearer    | [`resources::share_resource`]   |
//! | `GET /api/resources/share/{token}`     | none      | [`resources::open_shared`]      |
//! | `POST /api/resources/share/{token}/fork` | bearer  | [`resources::fork_shared`]      |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GlobalConfig;
use crate::orchestrator::ExecutionOrchestrator;
use crate::persistence::auth_repo::AuthRepo;
use crate::persistence::db::Database;
use crate::resources::ResourceService;
use crate::{AppError, Result};

pub mod auth;
pub mod error;
pub mod execute;
pub mod resources;
pub mod sse;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Validated global configuration.
    pub config: Arc<GlobalConfig>,
    /// Bearer-token lookup.
    pub auth: AuthRepo,
    /// Agent execution coordinator.
    pub orchestrator: ExecutionOrchestrator,
    /// Resource operations.
    pub resources: ResourceService,
    /// Server shutdown token; every agent run is cancelled with it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire every service over one pool.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, db: &Arc<Database>) -> Self {
        Self {
            auth: AuthRepo::new(Arc::clone(db)),
            orchestrator: ExecutionOrchestrator::new(Arc::clone(&config), db),
            resources: ResourceService::new(Arc::clone(&config), db),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Tie agent runs to the server's shutdown token.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/agent/execute", post(execute::execute_agent))
        .route(
            "/api/resources",
            get(resources::list_resources).post(resources::save_resource),
        )
        .route("/api/resources/{id}", delete(resources::delete_resource))
        .route("/api/resources/{id}/execute", post(resources::execute_resource))
        .route("/api/resources/{id}/share", post(resources::share_resource))
        .route("/api/resources/share/{token}", get(resources::open_shared))
        .route("/api/resources/share/{token}/fork", post(resources::fork_shared))
        .with_state(state)
}

/// Serve the API until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot bind or the server
/// fails.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = format!("{}:{}", state.config.http_host, state.config.http_port);
    let addr: SocketAddr = bind
        .parse()
        .map_err(|err| AppError::Config(format!("invalid bind address {bind}: {err}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {addr}: {err}")))?;

    info!(%addr, "starting HTTP server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Config(format!("HTTP server error: {err}")))?;

    info!("HTTP server shut down");
    Ok(())
}
