//! Unit tests for the agent event normalizer.
//!
//! Covers:
//! - each recognized event type and its update shape
//! - tool description fallbacks
//! - suppression of unknown events and intermediate `step_finish`
//! - verbatim narration for non-JSON output

use agent_relay::agent::normalizer::{normalize_line, STEP_START_TEXT, TOOL_COMPLETED_FALLBACK};
use agent_relay::models::progress::UpdateKind;

// ── step_start / text ─────────────────────────────────────────────────────────

#[test]
fn step_start_becomes_narration() {
    let update = normalize_line(r#"{"type":"step_start","timestamp":1}"#).expect("mapped");
    assert_eq!(update.kind, UpdateKind::Narration);
    assert_eq!(update.content, STEP_START_TEXT);
    assert_eq!(update.timestamp, 1);
}

#[test]
fn text_event_carries_part_text() {
    let update =
        normalize_line(r#"{"type":"text","part":{"text":"Looking at the repo"}}"#).expect("mapped");
    assert_eq!(update.kind, UpdateKind::Narration);
    assert_eq!(update.content, "Looking at the repo");
    assert!(update.success.is_none());
}

#[test]
fn text_event_without_text_is_empty_narration() {
    let update = normalize_line(r#"{"type":"text","part":{}}"#).expect("mapped");
    assert_eq!(update.kind, UpdateKind::Narration);
    assert_eq!(update.content, "");
}

// ── tool_use ──────────────────────────────────────────────────────────────────

#[test]
fn pending_tool_uses_description() {
    let line = r#"{"type":"tool_use","part":{"tool":"write","state":{"status":"running","input":{"description":"Writing workflow.ts","command":"ignored"}}}}"#;
    let update = normalize_line(line).expect("mapped");
    assert_eq!(update.kind, UpdateKind::ToolInvoked);
    assert_eq!(update.tool_name.as_deref(), Some("write"));
    assert_eq!(update.content, "Writing workflow.ts");
    assert!(update.success.is_none(), "invocations carry no outcome");
}

#[test]
fn pending_tool_falls_back_to_command() {
    let line = r#"{"type":"tool_use","part":{"tool":"bash","state":{"status":"pending","input":{"command":"ls -la"}}}}"#;
    let update = normalize_line(line).expect("mapped");
    assert_eq!(update.content, "ls -la");
}

#[test]
fn pending_tool_falls_back_to_calling_text() {
    let line = r#"{"type":"tool_use","part":{"tool":"read","state":{"status":"pending"}}}"#;
    let update = normalize_line(line).expect("mapped");
    assert_eq!(update.content, "Calling read");
}

#[test]
fn missing_tool_name_is_unknown() {
    let line = r#"{"type":"tool_use","part":{"state":{"status":"running"}}}"#;
    let update = normalize_line(line).expect("mapped");
    assert_eq!(update.tool_name.as_deref(), Some("unknown"));
    assert_eq!(update.content, "Calling unknown");
}

#[test]
fn completed_tool_carries_output_and_success() {
    let line = r#"{"type":"tool_use","part":{"tool":"write","state":{"status":"completed","output":"File created"}}}"#;
    let update = normalize_line(line).expect("mapped");
    assert_eq!(update.kind, UpdateKind::ToolCompleted);
    assert_eq!(update.tool_name.as_deref(), Some("write"));
    assert_eq!(update.content, "File created");
    assert_eq!(update.success, Some(true));
}

#[test]
fn completed_tool_without_output_uses_fallback() {
    let line = r#"{"type":"tool_use","part":{"tool":"write","state":{"status":"completed"}}}"#;
    let update = normalize_line(line).expect("mapped");
    assert_eq!(update.content, TOOL_COMPLETED_FALLBACK);
}

// ── step_finish ───────────────────────────────────────────────────────────────

#[test]
fn step_finish_stop_is_successful_terminal_with_cost() {
    let line = r#"{"type":"step_finish","part":{"reason":"stop","cost":0.0123}}"#;
    let update = normalize_line(line).expect("mapped");
    assert!(update.is_terminal());
    assert!(update.is_success());
    assert_eq!(update.content, "Task completed (cost: $0.0123)");
}

#[test]
fn step_finish_without_cost_reports_zero() {
    let update =
        normalize_line(r#"{"type":"step_finish","part":{"reason":"stop"}}"#).expect("mapped");
    assert_eq!(update.content, "Task completed (cost: $0.0000)");
}

#[test]
fn intermediate_step_finish_is_suppressed() {
    assert!(normalize_line(r#"{"type":"step_finish","part":{"reason":"tool-calls"}}"#).is_none());
    assert!(normalize_line(r#"{"type":"step_finish","part":{}}"#).is_none());
}

// ── suppression / fallbacks ──────────────────────────────────────────────────

#[test]
fn unknown_event_type_is_suppressed() {
    assert!(normalize_line(r#"{"type":"session_idle"}"#).is_none());
    assert!(normalize_line(r#"{"no_type":true}"#).is_none());
}

#[test]
fn non_json_line_is_verbatim_narration() {
    let update = normalize_line("npm WARN deprecated something").expect("mapped");
    assert_eq!(update.kind, UpdateKind::Narration);
    assert_eq!(update.content, "npm WARN deprecated something");
}

#[test]
fn missing_timestamp_uses_current_time() {
    let before = chrono::Utc::now().timestamp_millis();
    let update = normalize_line(r#"{"type":"step_start"}"#).expect("mapped");
    assert!(update.timestamp >= before);
}
