// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use vk_core::{AgentEvent, EventKind, ExecutionState};

#[test]
fn client_execute_frame_uses_wire_names() {
    let json = serde_json::json!({
        "type": "task:execute",
        "taskId": "tsk-abc",
        "agentType": "claude-code",
        "baseBranch": "main"
    });
    let frame: ClientFrame = serde_json::from_value(json).unwrap();
    match frame {
        ClientFrame::TaskExecute { task_id, agent_type, base_branch, model } => {
            assert_eq!(task_id, "tsk-abc");
            assert_eq!(agent_type, Some(AgentType::ClaudeCode));
            assert_eq!(base_branch.as_deref(), Some("main"));
            assert!(model.is_none());
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn history_frame_defaults_since_seq() {
    let json = serde_json::json!({ "type": "task:history", "taskId": "tsk-x" });
    let frame: ClientFrame = serde_json::from_value(json).unwrap();
    assert_eq!(frame, ClientFrame::TaskHistory { task_id: "tsk-x".into(), since_seq: None });
}

#[test]
fn server_execution_event_frame_round_trips() {
    let event = ExecutionEvent::new(
        ExecutionId::new(),
        TaskId::new(),
        1_000,
        EventKind::SessionEnded { final_state: ExecutionState::Completed, duration_ms: 5 },
    );
    let frame = ServerFrame::ExecutionEvent { event };
    let json = serde_json::to_value(&frame).unwrap();
    assert_eq!(json["type"], "task:execution_event");
    assert_eq!(json["event"]["kind"], "session_ended");

    let back: ServerFrame = serde_json::from_value(json).unwrap();
    assert_eq!(back, frame);
}

#[test]
fn host_register_frame_round_trips() {
    let frame = HostFrame::Register {
        name: "builder-1".into(),
        capabilities: HostCapabilitiesDto {
            supported_agents: vec![AgentType::Opencode],
            max_concurrent: 4,
            cwd: PathBuf::from("/srv/repo"),
            labels: HashMap::new(),
        },
    };
    let json = serde_json::to_value(&frame).unwrap();
    assert_eq!(json["type"], "register");
    let back: HostFrame = serde_json::from_value(json).unwrap();
    assert_eq!(back, frame);
}

#[test]
fn agent_event_relay_carries_the_adapter_event() {
    let frame = HostFrame::AgentEvent {
        execution_id: ExecutionId::new(),
        event: AdapterEvent::Agent(AgentEvent::Message { content: "hi".into() }),
    };
    let json = serde_json::to_value(&frame).unwrap();
    assert_eq!(json["event"]["channel"], "agent");
    assert_eq!(json["event"]["type"], "message");
    let back: HostFrame = serde_json::from_value(json).unwrap();
    assert_eq!(back, frame);
}

#[test]
fn gateway_start_agent_frame_round_trips() {
    let frame = GatewayFrame::StartAgent {
        request_id: request_id(),
        execution_id: ExecutionId::new(),
        agent_type: AgentType::Codex,
        working_dir: PathBuf::from("/data/worktrees/exc-1"),
        prompt: "Fix the bug".into(),
        model: Some("openai/o4".into()),
    };
    let json = serde_json::to_value(&frame).unwrap();
    assert_eq!(json["type"], "start_agent");
    let back: GatewayFrame = serde_json::from_value(json).unwrap();
    assert_eq!(back, frame);
}

#[test]
fn request_ids_are_unique() {
    assert_ne!(request_id(), request_id());
}
