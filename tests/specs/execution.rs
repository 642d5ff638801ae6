// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution lifecycle specs: the end-to-end scenarios of the gateway.

use crate::prelude::*;
use vk_adapters::{AdapterEvent, FakeAdapter};
use vk_core::{
    AgentEvent, AgentType, ErrorKind, EventKind, ExecutionEvent, ExecutionState, KanbanStatus,
    TaskConfig,
};
use vk_engine::ExecuteRequest;

fn kinds(events: &[ExecutionEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind.kind_name()).collect()
}

/// Scenario: happy path with the opencode agent.
#[tokio::test]
async fn happy_path_opencode() {
    let world = world(completing_adapter());
    let task = world.create_task("Add README", "Write a README file.");

    let events = world.run_to_end(&task.task_id).await;

    assert_eq!(
        kinds(&events),
        vec![
            "status_changed",   // → initializing
            "status_changed",   // → creating_worktree
            "session_started",  // worktree + branch
            "status_changed",   // → running
            "agent_event",      // message
            "agent_event",      // completed{success=true}
            "session_ended",    // finalState=completed
        ]
    );

    // seq contiguous from 1, last event session_ended (invariant 1).
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.seq, i as u64 + 1);
    }
    assert!(events.last().unwrap().is_session_ended());

    match &events[2].kind {
        EventKind::SessionStarted { branch_name, worktree_path } => {
            assert!(branch_name.starts_with("vk/exec/"));
            assert!(!worktree_path.is_empty());
        }
        other => panic!("unexpected: {other:?}"),
    }
    match &events[6].kind {
        EventKind::SessionEnded { final_state, duration_ms } => {
            assert_eq!(*final_state, ExecutionState::Completed);
            assert!(*duration_ms < u64::MAX);
        }
        other => panic!("unexpected: {other:?}"),
    }

    world.wait_until(|w| w.task(&task.task_id).kanban_status == KanbanStatus::Done).await;

    let runs = world.engine.list_runs(&task.task_id).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].final_state, ExecutionState::Completed);
    assert_eq!(runs[0].event_count, events.len() as u64);
    assert!(runs[0].duration_ms.unwrap() < u64::MAX);
}

/// Scenario: hosts list is empty.
#[tokio::test]
async fn no_host_available() {
    let world = world_with(completing_adapter(), None);
    let task = world.create_task("T2", "anything");

    let err =
        world.engine.start_execution(&task.task_id, ExecuteRequest::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);
    assert!(err.message.contains("no host available"));

    // No execution persisted; task remains todo.
    assert!(world.engine.list_runs(&task.task_id).unwrap().is_empty());
    assert_eq!(world.task(&task.task_id).kanban_status, KanbanStatus::Todo);
}

/// Scenario: explicit host does not support the requested agent.
#[tokio::test]
async fn explicit_host_mismatch() {
    let world = world(completing_adapter());
    let task = world
        .engine
        .create_task(TaskConfig::builder("T3").agent_type(AgentType::Codex).build())
        .unwrap();

    let request = ExecuteRequest {
        host: Some(world.local_host.as_ref().unwrap().host_id),
        ..Default::default()
    };
    let err = world.engine.start_execution(&task.task_id, request).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);
    assert!(err.message.contains("does not support codex"));
}

/// Scenario: cancel during run after three events.
#[tokio::test]
async fn cancel_during_run() {
    let adapter = FakeAdapter::scripted(vec![
        AdapterEvent::Agent(AgentEvent::Message { content: "1".into() }),
        AdapterEvent::Agent(AgentEvent::Message { content: "2".into() }),
        AdapterEvent::Agent(AgentEvent::Message { content: "3".into() }),
    ])
    .pause_after(3);
    let world = world(adapter);
    let task = world.create_task("T4", "long running work");

    world.engine.start_execution(&task.task_id, ExecuteRequest::default()).unwrap();
    let mut rx = world.engine.subscribe(&task.task_id, 0).unwrap();

    let mut events: Vec<ExecutionEvent> = Vec::new();
    while events.iter().filter(|e| e.kind.kind_name() == "agent_event").count() < 3 {
        events.push(rx.recv().await.unwrap());
    }
    world.engine.abort_execution(&task.task_id).unwrap();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    // Final events include status_changed{running→cancelled} and
    // session_ended{finalState=cancelled}.
    let cancelled_status = events.iter().any(|e| {
        matches!(
            &e.kind,
            EventKind::StatusChanged {
                old_state: Some(ExecutionState::Running),
                new_state: ExecutionState::Cancelled,
            }
        )
    });
    assert!(cancelled_status, "missing running→cancelled status event");
    match &events.last().unwrap().kind {
        EventKind::SessionEnded { final_state, .. } => {
            assert_eq!(*final_state, ExecutionState::Cancelled);
        }
        other => panic!("unexpected: {other:?}"),
    }

    // adapter.abort was invoked exactly once.
    world.wait_until(|w| w.adapter.recorder.abort_count() == 1).await;
    world.wait_until(|w| w.task(&task.task_id).kanban_status == KanbanStatus::Todo).await;
}

/// Boundary: a completed event followed by stream termination completes.
#[tokio::test]
async fn completed_then_stream_end_is_completed() {
    let adapter = FakeAdapter::scripted(vec![AdapterEvent::Agent(AgentEvent::Completed {
        success: true,
        summary: None,
    })]);
    let world = world(adapter);
    let task = world.create_task("T", "p");

    let events = world.run_to_end(&task.task_id).await;
    match &events.last().unwrap().kind {
        EventKind::SessionEnded { final_state, .. } => {
            assert_eq!(*final_state, ExecutionState::Completed);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

/// Boundary: stream termination without a completed event fails.
#[tokio::test]
async fn stream_end_without_completion_fails() {
    let adapter = FakeAdapter::scripted(vec![AdapterEvent::Agent(AgentEvent::Message {
        content: "partial work".into(),
    })]);
    let world = world(adapter);
    let task = world.create_task("T", "p");

    world.run_to_end(&task.task_id).await;
    world
        .wait_until(|w| {
            w.engine
                .list_runs(&task.task_id)
                .unwrap()
                .first()
                .and_then(|r| r.error.clone())
                .is_some_and(|e| e.contains("agent ended without completion"))
        })
        .await;
}

/// Invariant: at most one non-terminal execution per task.
#[tokio::test]
async fn at_most_one_live_execution_per_task() {
    let world = world(completing_adapter().pause_after(1));
    let task = world.create_task("T", "p");

    world.engine.start_execution(&task.task_id, ExecuteRequest::default()).unwrap();
    let err =
        world.engine.start_execution(&task.task_id, ExecuteRequest::default()).unwrap_err();
    assert!(err.message.contains("already executing"));

    world.engine.abort_execution(&task.task_id).unwrap();
    world.wait_until(|w| w.task(&task.task_id).kanban_status == KanbanStatus::Todo).await;
}

/// Invariant: a host's active set never exceeds its concurrency cap.
#[tokio::test]
async fn host_capacity_is_respected() {
    let world = world_with(completing_adapter().pause_after(1), Some(1));
    let host_id = world.local_host.as_ref().unwrap().host_id;
    let task_a = world.create_task("A", "p");
    let task_b = world.create_task("B", "p");

    world.engine.start_execution(&task_a.task_id, ExecuteRequest::default()).unwrap();
    let err =
        world.engine.start_execution(&task_b.task_id, ExecuteRequest::default()).unwrap_err();
    assert!(err.message.contains("no host available"));

    let host = world.hosts.get(&host_id).unwrap();
    assert!(host.active_task_ids.len() <= host.capabilities.max_concurrent);

    world.engine.abort_execution(&task_a.task_id).unwrap();
    world.wait_until(|w| w.hosts.get(&host_id).unwrap().active_task_ids.is_empty()).await;
}

/// Invariant: worktree directories on disk match live bookkeeping, and
/// cleanup removes them.
#[tokio::test]
async fn worktrees_match_store_and_cleanup_removes_them() {
    let world = world(completing_adapter());
    let task = world.create_task("T", "p");

    world.run_to_end(&task.task_id).await;
    world.wait_until(|w| w.task(&task.task_id).kanban_status == KanbanStatus::Done).await;

    let status = world.engine.execution_status(&task.task_id).unwrap().unwrap();
    let path = status.worktree_path.clone().unwrap();
    assert!(path.is_dir());

    assert!(world.engine.cleanup_worktree(&task.task_id).await.unwrap());
    assert!(!path.exists());

    // Idempotent: already cleaned is a no-op returning true.
    assert!(world.engine.cleanup_worktree(&task.task_id).await.unwrap());

    let status = world.engine.execution_status(&task.task_id).unwrap().unwrap();
    assert_eq!(status.state, ExecutionState::CleaningUp);
}
