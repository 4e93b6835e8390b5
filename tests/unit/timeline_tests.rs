//! Unit tests for client event decoding and the execution timeline.

use agent_relay::agent::recovery::CANCELLED_ADVICE;
use agent_relay::client::timeline::STREAM_CANCELLED_TEXT;
use agent_relay::client::{ClientEvent, ExecutionTimeline, SseFrame};
use agent_relay::models::progress::{AgentProgressUpdate, UpdateKind};

fn frame(event: Option<&str>, data: &str) -> SseFrame {
    SseFrame {
        event: event.map(str::to_owned),
        data: data.to_owned(),
    }
}

// ─── decoding ────────────────────────────────────────────────────────────────

#[test]
fn unnamed_frame_decodes_update() {
    let event = ClientEvent::from_frame(&frame(
        None,
        r#"{"type":"tool_call","timestamp":5,"content":"Writing","toolName":"write"}"#,
    ))
    .expect("decoded");
    let ClientEvent::Update(update) = event else {
        panic!("expected update, got {event:?}");
    };
    assert_eq!(update.kind, UpdateKind::ToolInvoked);
    assert_eq!(update.tool_name.as_deref(), Some("write"));
}

#[test]
fn text_delta_frame_decodes() {
    let event = ClientEvent::from_frame(&frame(None, r#"{"type":"text-delta","delta":"Hel"}"#));
    assert_eq!(event, Some(ClientEvent::TextDelta("Hel".into())));
}

#[test]
fn resource_events_decode() {
    let saved = ClientEvent::from_frame(&frame(Some("resource"), r#"{"resourceId":"r-1"}"#));
    assert_eq!(
        saved,
        Some(ClientEvent::ResourceSaved {
            resource_id: "r-1".into()
        })
    );

    let failed = ClientEvent::from_frame(&frame(Some("resource_error"), r#"{"error":"db"}"#));
    assert_eq!(failed, Some(ClientEvent::ResourceFailed { error: "db".into() }));
}

#[test]
fn malformed_and_unknown_frames_are_skipped() {
    assert!(ClientEvent::from_frame(&frame(None, "not json")).is_none());
    assert!(ClientEvent::from_frame(&frame(None, r#"{"type":"mystery"}"#)).is_none());
    assert!(ClientEvent::from_frame(&frame(Some("ping"), "{}")).is_none());
    assert!(ClientEvent::from_frame(&frame(Some("resource"), "{}")).is_none());
}

// ─── timeline ────────────────────────────────────────────────────────────────

#[test]
fn timeline_accumulates_until_terminal() {
    let mut timeline = ExecutionTimeline::new();
    timeline.apply(ClientEvent::Update(AgentProgressUpdate::narration_at(1, "start")));
    assert!(!timeline.is_finished());

    timeline.apply(ClientEvent::Update(AgentProgressUpdate::succeeded(2, "done")));
    timeline.apply(ClientEvent::Update(AgentProgressUpdate::narration_at(3, "late")));

    assert_eq!(timeline.updates().len(), 2);
    assert!(timeline.succeeded());
    assert_eq!(timeline.terminal().map(|t| t.content.as_str()), Some("done"));
}

#[test]
fn resource_events_after_terminal_are_recorded() {
    let mut timeline = ExecutionTimeline::new();
    timeline.apply(ClientEvent::Update(AgentProgressUpdate::succeeded(1, "done")));
    timeline.apply(ClientEvent::ResourceSaved {
        resource_id: "r-9".into(),
    });
    assert_eq!(timeline.resource_id(), Some("r-9"));
    assert_eq!(timeline.resource_error(), None);
}

#[test]
fn text_deltas_concatenate() {
    let mut timeline = ExecutionTimeline::new();
    timeline.apply(ClientEvent::TextDelta("Hel".into()));
    timeline.apply(ClientEvent::TextDelta("lo".into()));
    assert_eq!(timeline.text(), "Hello");
}

#[test]
fn close_without_terminal_synthesizes_cancellation() {
    let mut timeline = ExecutionTimeline::new();
    timeline.apply(ClientEvent::Update(AgentProgressUpdate::narration_at(1, "working")));
    timeline.close();

    let terminal = timeline.terminal().expect("terminal");
    assert_eq!(terminal.content, STREAM_CANCELLED_TEXT);
    assert_eq!(terminal.success, Some(false));
    assert_eq!(terminal.recovery.as_deref(), Some(CANCELLED_ADVICE));
}

#[test]
fn close_after_terminal_is_a_no_op() {
    let mut timeline = ExecutionTimeline::new();
    timeline.apply(ClientEvent::Update(AgentProgressUpdate::succeeded(1, "done")));
    timeline.close();
    assert_eq!(timeline.updates().len(), 1);
    assert!(timeline.succeeded());
}
