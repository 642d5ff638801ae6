// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-recovery specs: a gateway restart fails whatever was in flight.

use crate::prelude::*;
use std::sync::Arc;
use vk_core::{
    AgentType, Clock, EventKind, ExecutionEvent, ExecutionState, FakeClock, KanbanStatus,
};
use vk_engine::{ExecuteRequest, TaskStore};
use vk_storage::{DataLayout, EventLog, RunStore, TaskSnapshot};

/// Scenario: restart while T6 is running with seq=10 appended. After
/// recovery: synthetic status_changed at seq 11 and session_ended at seq
/// 12, execution failed, kanban back to todo.
#[tokio::test]
async fn restart_fails_mid_flight_execution() {
    // Phase 1: a "gateway" that stops mid-run.
    let world = world(completing_adapter().pause_after(1));
    let task = world.create_task("T6", "long job");
    world.engine.start_execution(&task.task_id, ExecuteRequest::default()).unwrap();

    // Wait for the run to reach `running` and the first agent event, then
    // pad the timeline to exactly seq=10 like a long-lived run would.
    let mut rx = world.engine.subscribe(&task.task_id, 0).unwrap();
    let mut last = 0;
    while last < 5 {
        last = rx.recv().await.unwrap().seq;
    }
    drop(rx);

    let execution_id = world.task(&task.task_id).current_execution_id.unwrap();
    let layout = DataLayout::new(world.dir.path());
    let log = EventLog::new(layout.clone());
    for i in 0..5u64 {
        let mut event = ExecutionEvent::new(
            execution_id,
            task.task_id,
            2_000 + i,
            vk_core::test_support::message(format!("padding-{i}")),
        );
        log.append(&mut event).unwrap();
    }
    assert_eq!(log.last_seq(&task.task_id, &execution_id).unwrap(), 10);

    // Phase 2: "restart" — fresh stores over the same data directory.
    // (The old engine is simply dropped, like a killed process.)
    let clock = FakeClock::new();
    clock.set_epoch_ms(9_000_000);
    let log = EventLog::new(layout.clone());
    let runs = RunStore::new(layout.clone());
    let report = vk_storage::recover(&log, &runs, clock.epoch_ms()).unwrap();
    assert_eq!(report.failed_executions, vec![execution_id]);

    let tasks = TaskStore::load(TaskSnapshot::new(layout.clone()), clock.clone()).unwrap();
    let reset = tasks.recover_dangling().unwrap();
    assert!(reset.contains(&task.task_id));

    // The timeline got the synthetic seq 11 and 12 events.
    let events = log.read_all(&task.task_id, &execution_id).unwrap();
    assert_eq!(events.len(), 12);
    match &events[10].kind {
        EventKind::StatusChanged { new_state, .. } => {
            assert_eq!(*new_state, ExecutionState::Failed);
        }
        other => panic!("expected status_changed at seq 11: {other:?}"),
    }
    assert_eq!(events[10].seq, 11);
    match &events[11].kind {
        EventKind::SessionEnded { final_state, .. } => {
            assert_eq!(*final_state, ExecutionState::Failed);
        }
        other => panic!("expected session_ended at seq 12: {other:?}"),
    }
    assert_eq!(events[11].seq, 12);
    log.verify_contiguous(&task.task_id, &execution_id).unwrap();

    // The current execution is failed; the kanban projection is todo.
    let record = runs.load(&task.task_id, &execution_id).unwrap().unwrap();
    assert_eq!(record.execution.outcome(), ExecutionState::Failed);
    let task = tasks.get(&task.task_id).unwrap();
    assert_eq!(task.kanban_status, KanbanStatus::Todo);
    assert!(task.current_execution_id.is_none());

    // Run history survives the restart and lists the failed run.
    let summaries = runs.list_runs(&task.task_id).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].final_state, ExecutionState::Failed);
    assert_eq!(summaries[0].event_count, 12);
    assert_eq!(summaries[0].agent_type, AgentType::Opencode);
}

/// Completed runs are untouched by recovery, and the history remains
/// reconstructible from disk alone.
#[tokio::test]
async fn restart_preserves_terminated_history() {
    let world = world(completing_adapter());
    let task = world.create_task("T", "p");
    let events = world.run_to_end(&task.task_id).await;
    world.wait_until(|w| w.task(&task.task_id).kanban_status == KanbanStatus::Done).await;

    let layout = DataLayout::new(world.dir.path());
    let log = EventLog::new(layout.clone());
    let runs = RunStore::new(layout.clone());
    let report = vk_storage::recover(&log, &runs, 9_000_000).unwrap();
    assert!(report.failed_executions.is_empty());

    let summaries = runs.list_runs(&task.task_id).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].final_state, ExecutionState::Completed);

    let execution_id = summaries[0].execution_id;
    let replayed = log.read_all(&task.task_id, &execution_id).unwrap();
    assert_eq!(replayed, events);

    // Tasks reload from the snapshot with their kanban state intact.
    let tasks: Arc<TaskStore<FakeClock>> =
        TaskStore::load(TaskSnapshot::new(layout), FakeClock::new()).unwrap();
    assert_eq!(tasks.get(&task.task_id).unwrap().kanban_status, KanbanStatus::Done);
}
