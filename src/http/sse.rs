//! Execution events to Server-Sent Events frames.
//!
//! Progress updates are unnamed frames (`data: <json>\n\n`). Side-channel
//! notifications after the terminal update use named events so clients that
//! only read `data:` frames ignore them.

use std::convert::Infallible;
use std::pin::pin;

use axum::response::sse::Event;
use futures_util::{Stream, StreamExt};
use serde_json::json;
use tokio_util::sync::DropGuard;
use tracing::warn;

use crate::orchestrator::ExecutionEvent;

/// Event name announcing a saved workflow resource.
pub const RESOURCE_EVENT: &str = "resource";

/// Event name announcing a persistence failure.
pub const RESOURCE_ERROR_EVENT: &str = "resource_error";

/// Encode one execution event as an SSE frame.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode_event(event: &ExecutionEvent) -> Result<Event, axum::Error> {
    match event {
        ExecutionEvent::Update(update) => Event::default().json_data(update),
        ExecutionEvent::ResourceSaved { resource_id } => Event::default()
            .event(RESOURCE_EVENT)
            .json_data(json!({ "resourceId": resource_id })),
        ExecutionEvent::ResourceFailed { error } => Event::default()
            .event(RESOURCE_ERROR_EVENT)
            .json_data(json!({ "error": error })),
    }
}

/// Adapt an execution stream for [`axum::response::Sse`].
///
/// `guard` cancels the run when the response body is dropped before the
/// stream finishes, which is how a client disconnect reaches the driver.
pub fn event_stream<S>(
    events: S,
    guard: DropGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static
where
    S: Stream<Item = ExecutionEvent> + Send + 'static,
{
    async_stream::stream! {
        let mut events = pin!(events);
        while let Some(event) = events.next().await {
            match encode_event(&event) {
                Ok(frame) => yield Ok(frame),
                Err(err) => warn!(%err, "dropping unencodable execution event"),
            }
        }
        let _token = guard.disarm();
    }
}
