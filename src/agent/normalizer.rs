//! Mapping from the agent CLI's JSON event vocabulary to progress updates.
//!
//! The agent emits one JSON object per stdout line shaped as
//! `{ "type": ..., "timestamp": ..., "part": { ... } }`. Only a handful of
//! event types are meaningful to the timeline; the rest are suppressed.
//!
//! | Event type    | Condition                  | Update                         |
//! |---------------|----------------------------|--------------------------------|
//! | `step_start`  |                            | `Narration`                    |
//! | `tool_use`    | `state.status = completed` | `ToolCompleted`, success       |
//! | `tool_use`    | any other status           | `ToolInvoked`                  |
//! | `text`        |                            | `Narration` with `part.text`   |
//! | `step_finish` | `reason = stop`            | `Finished`, success, with cost |
//! | *(any other)* |                            | suppressed                     |
//!
//! Lines that are not JSON at all are surfaced verbatim as narration.

use serde_json::Value;
use tracing::debug;

use crate::models::progress::{now_millis, AgentProgressUpdate};

/// Narration emitted for `step_start`.
pub const STEP_START_TEXT: &str = "Starting new step...";

/// Fallback content for a completed tool without output.
pub const TOOL_COMPLETED_FALLBACK: &str = "Tool completed successfully";

/// Normalize one raw stdout line.
///
/// Returns `None` for blank lines and for events the timeline does not show.
#[must_use]
pub fn normalize_line(line: &str) -> Option<AgentProgressUpdate> {
    if line.trim().is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(line) {
        Ok(event) => normalize_event(&event),
        Err(err) => {
            debug!(%err, "agent emitted non-JSON output, forwarding as narration");
            Some(AgentProgressUpdate::narration(line))
        }
    }
}

/// Normalize one decoded agent event.
#[must_use]
pub fn normalize_event(event: &Value) -> Option<AgentProgressUpdate> {
    let timestamp = event
        .get("timestamp")
        .and_then(Value::as_i64)
        .unwrap_or_else(now_millis);
    let part = event.get("part").unwrap_or(&Value::Null);

    match event.get("type").and_then(Value::as_str) {
        Some("step_start") => Some(AgentProgressUpdate::narration_at(
            timestamp,
            STEP_START_TEXT,
        )),
        Some("tool_use") => Some(normalize_tool_use(timestamp, part)),
        Some("text") => Some(AgentProgressUpdate::narration_at(
            timestamp,
            str_field(part, "text").unwrap_or_default(),
        )),
        Some("step_finish") => normalize_step_finish(timestamp, part),
        other => {
            debug!(event_type = ?other, "suppressing agent event");
            None
        }
    }
}

fn normalize_tool_use(timestamp: i64, part: &Value) -> AgentProgressUpdate {
    let tool_name = str_field(part, "tool")
        .filter(|name| !name.is_empty())
        .unwrap_or("unknown");
    let state = part.get("state").unwrap_or(&Value::Null);

    if state.get("status").and_then(Value::as_str) == Some("completed") {
        let output = match state.get("output") {
            Some(Value::String(text)) if !text.is_empty() => text.clone(),
            Some(Value::Null | Value::String(_)) | None => TOOL_COMPLETED_FALLBACK.to_owned(),
            Some(other) => other.to_string(),
        };
        return AgentProgressUpdate::tool_completed(timestamp, tool_name, output);
    }

    let input = state.get("input").unwrap_or(&Value::Null);
    let description = str_field(input, "description")
        .filter(|text| !text.is_empty())
        .or_else(|| str_field(input, "command").filter(|text| !text.is_empty()))
        .map_or_else(|| format!("Calling {tool_name}"), str::to_owned);

    AgentProgressUpdate::tool_invoked(timestamp, tool_name, description)
}

fn normalize_step_finish(timestamp: i64, part: &Value) -> Option<AgentProgressUpdate> {
    let reason = str_field(part, "reason").unwrap_or("unknown");
    if reason != "stop" {
        debug!(reason, "suppressing intermediate step_finish");
        return None;
    }

    let cost = part.get("cost").and_then(Value::as_f64).unwrap_or(0.0);
    Some(AgentProgressUpdate::succeeded(
        timestamp,
        format!("Task completed (cost: ${cost:.4})"),
    ))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}
