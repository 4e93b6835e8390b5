//! Decoded stream events and the incremental execution timeline.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::frame::SseFrame;
use crate::agent::recovery::CANCELLED_ADVICE;
use crate::http::sse::{RESOURCE_ERROR_EVENT, RESOURCE_EVENT};
use crate::models::progress::AgentProgressUpdate;

/// Terminal content synthesized when a stream ends without one.
pub const STREAM_CANCELLED_TEXT: &str = "Agent execution cancelled";

/// A decoded stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Incremental assistant text (`{"type":"text-delta","delta":...}`).
    TextDelta(String),
    /// An agent progress update.
    Update(AgentProgressUpdate),
    /// The run was saved as a resource.
    ResourceSaved {
        /// New resource id.
        resource_id: String,
    },
    /// Saving the run failed.
    ResourceFailed {
        /// Failure description.
        error: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourcePayload {
    resource_id: String,
}

#[derive(Deserialize)]
struct ResourceErrorPayload {
    error: String,
}

impl ClientEvent {
    /// Decode a frame. Malformed or unknown frames yield `None`.
    #[must_use]
    pub fn from_frame(frame: &SseFrame) -> Option<Self> {
        let decoded = match frame.event.as_deref() {
            Some(RESOURCE_EVENT) => serde_json::from_str::<ResourcePayload>(&frame.data)
                .ok()
                .map(|payload| Self::ResourceSaved {
                    resource_id: payload.resource_id,
                }),
            Some(RESOURCE_ERROR_EVENT) => serde_json::from_str::<ResourceErrorPayload>(&frame.data)
                .ok()
                .map(|payload| Self::ResourceFailed {
                    error: payload.error,
                }),
            None | Some("message") => Self::from_data(&frame.data),
            Some(_) => None,
        };

        if decoded.is_none() {
            debug!(event = ?frame.event, "skipping undecodable frame");
        }
        decoded
    }

    fn from_data(data: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(data).ok()?;
        if value.get("type").and_then(Value::as_str) == Some("text-delta") {
            let delta = value.get("delta").and_then(Value::as_str)?;
            return Some(Self::TextDelta(delta.to_owned()));
        }
        serde_json::from_value(value).ok().map(Self::Update)
    }
}

/// Client-side view of one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionTimeline {
    updates: Vec<AgentProgressUpdate>,
    text: String,
    resource_id: Option<String>,
    resource_error: Option<String>,
}

impl ExecutionTimeline {
    /// Empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Updates after the terminal one are ignored.
    pub fn apply(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::TextDelta(delta) => self.text.push_str(&delta),
            ClientEvent::Update(update) => {
                if self.is_finished() {
                    debug!("ignoring update after terminal");
                    return;
                }
                self.updates.push(update);
            }
            ClientEvent::ResourceSaved { resource_id } => self.resource_id = Some(resource_id),
            ClientEvent::ResourceFailed { error } => self.resource_error = Some(error),
        }
    }

    /// Close the timeline at end of stream, synthesizing a cancelled
    /// terminal if none arrived.
    pub fn close(&mut self) {
        if !self.is_finished() {
            self.updates.push(AgentProgressUpdate::failed(
                STREAM_CANCELLED_TEXT,
                Some(CANCELLED_ADVICE.to_owned()),
            ));
        }
    }

    /// Updates received so far, in order.
    #[must_use]
    pub fn updates(&self) -> &[AgentProgressUpdate] {
        &self.updates
    }

    /// Accumulated text deltas.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The terminal update, once received.
    #[must_use]
    pub fn terminal(&self) -> Option<&AgentProgressUpdate> {
        self.updates.last().filter(|update| update.is_terminal())
    }

    /// Whether a terminal update has been applied.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.terminal().is_some()
    }

    /// Whether the run finished successfully.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.terminal().is_some_and(AgentProgressUpdate::is_success)
    }

    /// Resource saved from this run.
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// Persistence failure reported by the server.
    #[must_use]
    pub fn resource_error(&self) -> Option<&str> {
        self.resource_error.as_deref()
    }
}
