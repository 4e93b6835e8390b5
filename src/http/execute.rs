//! `POST /api/agent/execute`: stream an agent run as SSE.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

use super::sse::event_stream;
use super::AppState;
use crate::models::auth::Principal;
use crate::orchestrator::ExecuteRequest;
use crate::Result;

/// Validate the request, then stream the run's progress.
///
/// Validation failures are plain JSON errors (400/401/404); once the stream
/// starts, failures arrive as terminal updates inside it.
///
/// # Errors
///
/// Returns the `AppError` from request validation.
pub async fn execute_agent(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(body): Json<ExecuteRequest>,
) -> Result<Response> {
    let prepared = state.orchestrator.prepare(&principal, body).await?;
    info!(
        execution_id = prepared.execution_id,
        user_id = principal.user_id,
        "agent execution accepted"
    );

    let cancel = state.shutdown.child_token();
    let guard = cancel.clone().drop_guard();
    let events = state.orchestrator.execute(prepared, cancel);

    let sse = Sse::new(event_stream(events, guard))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)));
    Ok(([(header::CONNECTION, "keep-alive")], sse).into_response())
}
