// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn sample_event(kind: EventKind) -> ExecutionEvent {
    ExecutionEvent::new(ExecutionId::new(), TaskId::new(), 1_000, kind)
}

#[test]
fn execution_event_serializes_with_flattened_kind() {
    let event = sample_event(EventKind::StatusChanged {
        old_state: None,
        new_state: ExecutionState::Initializing,
    });
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["kind"], "status_changed");
    assert_eq!(json["new_state"], "initializing");
    assert!(json.get("old_state").is_none());
}

#[test]
fn agent_event_nests_with_its_own_tag() {
    let event = sample_event(EventKind::AgentEvent {
        event: AgentEvent::FileChange {
            path: "src/main.rs".into(),
            action: FileAction::Modified,
            diff: Some("-a\n+b".into()),
        },
    });
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["kind"], "agent_event");
    assert_eq!(json["event"]["type"], "file_change");
    assert_eq!(json["event"]["action"], "modified");
}

#[parameterized(
    thinking = { AgentEvent::Thinking { content: "hm".into() }, "thinking" },
    command = { AgentEvent::Command { command: "ls".into(), output: "a".into(), exit_code: Some(0) }, "command" },
    tool_call = { AgentEvent::ToolCall { tool: "grep".into(), args: serde_json::Value::Null, result: None }, "tool_call" },
    message = { AgentEvent::Message { content: "hi".into() }, "message" },
    error = { AgentEvent::Error { message: "bad".into(), recoverable: true }, "error" },
    completed = { AgentEvent::Completed { success: true, summary: None }, "completed" },
    raw = { AgentEvent::RawOutput { stream: OutputStream::Stdout, content: "x".into() }, "raw_output" },
)]
fn agent_event_kind_names(event: AgentEvent, expected: &str) {
    assert_eq!(event.kind_name(), expected);
}

#[test]
fn unknown_agent_event_tag_deserializes_to_catch_all() {
    let json = serde_json::json!({ "type": "telemetry_blob", "payload": 42 });
    let event: AgentEvent = serde_json::from_value(json).unwrap();
    assert_eq!(event, AgentEvent::Unknown);
    // Treated as raw output downstream.
    assert_eq!(event.kind_name(), "raw_output");
}

#[test]
fn unknown_event_kind_tag_deserializes_to_catch_all() {
    let json = serde_json::json!({ "kind": "metrics_snapshot", "value": 1 });
    let kind: EventKind = serde_json::from_value(json).unwrap();
    assert_eq!(kind, EventKind::Unknown);
}

#[parameterized(
    completed_ok = { AgentEvent::Completed { success: true, summary: None }, true },
    completed_bad = { AgentEvent::Completed { success: false, summary: None }, true },
    fatal_error = { AgentEvent::Error { message: "x".into(), recoverable: false }, true },
    recoverable_error = { AgentEvent::Error { message: "x".into(), recoverable: true }, false },
    message = { AgentEvent::Message { content: "x".into() }, false },
)]
fn resolves_run(event: AgentEvent, expected: bool) {
    assert_eq!(event.resolves_run(), expected);
}

#[test]
fn session_ended_round_trip() {
    let event = sample_event(EventKind::SessionEnded {
        final_state: ExecutionState::Completed,
        duration_ms: 1234,
    });
    assert!(event.is_session_ended());
    let json = serde_json::to_string(&event).unwrap();
    let back: ExecutionEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(event, back);
}

#[test]
fn progress_percentage_is_optional() {
    let with = sample_event(EventKind::Progress {
        message: "creating worktree".into(),
        percentage: Some(0.1),
    });
    let without = sample_event(EventKind::Progress { message: "starting".into(), percentage: None });
    let json = serde_json::to_value(&without).unwrap();
    assert!(json.get("percentage").is_none());
    let json = serde_json::to_value(&with).unwrap();
    assert!((json["percentage"].as_f64().unwrap() - 0.1).abs() < 1e-6);
}
