// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use vk_core::{ErrorKind, FakeClock, TaskConfig};
use vk_storage::DataLayout;

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<TaskStore<FakeClock>>,
    clock: FakeClock,
    layout: DataLayout,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    let clock = FakeClock::new();
    let store = TaskStore::load(TaskSnapshot::new(layout.clone()), clock.clone()).unwrap();
    Fixture { _dir: dir, store, clock, layout }
}

fn config(title: &str) -> TaskConfig {
    TaskConfig::builder(title).description("desc").build()
}

#[test]
fn create_requires_a_title() {
    let fx = fixture();
    let err = fx.store.create_task(config("  ")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[test]
fn create_get_list_round_trip() {
    let fx = fixture();
    let a = fx.store.create_task(config("a")).unwrap();
    fx.clock.advance(std::time::Duration::from_secs(1));
    let b = fx.store.create_task(config("b")).unwrap();

    assert_eq!(fx.store.get(&a.task_id), Some(a.clone()));
    let titles: Vec<String> =
        fx.store.list(&TaskFilter::default()).into_iter().map(|t| t.title).collect();
    assert_eq!(titles, vec!["b", "a"]);
    assert_eq!(fx.store.board().todo.len(), 2);
    drop(b);
}

#[test]
fn store_reloads_from_snapshot() {
    let fx = fixture();
    let task = fx.store.create_task(config("persisted")).unwrap();

    let reloaded =
        TaskStore::load(TaskSnapshot::new(fx.layout.clone()), fx.clock.clone()).unwrap();
    assert_eq!(reloaded.get(&task.task_id), Some(task));
}

#[test]
fn update_meta_patches_fields_and_bumps_updated_at() {
    let fx = fixture();
    let task = fx.store.create_task(config("before")).unwrap();
    fx.clock.advance(std::time::Duration::from_secs(5));

    let patch = TaskPatch {
        title: Some("after".into()),
        model: Some(Some("anthropic/claude".into())),
        ..Default::default()
    };
    let updated = fx.store.update_task_meta(&task.task_id, patch).unwrap();
    assert_eq!(updated.title, "after");
    assert_eq!(updated.model.as_deref(), Some("anthropic/claude"));
    assert!(updated.updated_at_ms > task.updated_at_ms);
}

#[test]
fn delete_is_rejected_while_executing() {
    let fx = fixture();
    let task = fx.store.create_task(config("busy")).unwrap();
    fx.store.begin_execution(&task.task_id, ExecutionId::new()).unwrap();

    let err = fx.store.delete_task(&task.task_id).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);

    // Settling the execution unblocks deletion.
    let exec = fx.store.get(&task.task_id).unwrap().current_execution_id.unwrap();
    fx.store.settle_execution(&task.task_id, &exec, ExecutionState::Cancelled).unwrap();
    fx.store.delete_task(&task.task_id).unwrap();
    assert!(fx.store.get(&task.task_id).is_none());
}

#[test]
fn kanban_projection_follows_execution_lifecycle() {
    let fx = fixture();
    let task = fx.store.create_task(config("t")).unwrap();
    let exec = ExecutionId::new();

    let doing = fx.store.begin_execution(&task.task_id, exec).unwrap();
    assert_eq!(doing.kanban_status, KanbanStatus::Doing);
    assert!(doing.is_executing());

    let done = fx.store.settle_execution(&task.task_id, &exec, ExecutionState::Completed).unwrap();
    assert_eq!(done.kanban_status, KanbanStatus::Done);
    assert!(done.current_execution_id.is_none());
}

#[yare::parameterized(
    failed = { ExecutionState::Failed },
    cancelled = { ExecutionState::Cancelled },
)]
fn non_completed_outcomes_return_to_todo(outcome: ExecutionState) {
    let fx = fixture();
    let task = fx.store.create_task(config("t")).unwrap();
    let exec = ExecutionId::new();
    fx.store.begin_execution(&task.task_id, exec).unwrap();

    let settled = fx.store.settle_execution(&task.task_id, &exec, outcome).unwrap();
    assert_eq!(settled.kanban_status, KanbanStatus::Todo);
}

#[test]
fn settle_ignores_stale_execution_ids() {
    let fx = fixture();
    let task = fx.store.create_task(config("t")).unwrap();
    let current = ExecutionId::new();
    fx.store.begin_execution(&task.task_id, current).unwrap();

    let stale = ExecutionId::new();
    let after = fx.store.settle_execution(&task.task_id, &stale, ExecutionState::Failed).unwrap();
    assert_eq!(after.kanban_status, KanbanStatus::Doing);
    assert_eq!(after.current_execution_id, Some(current));
}

#[test]
fn changes_stream_sees_before_and_after() {
    let fx = fixture();
    let mut changes = fx.store.changes();

    let task = fx.store.create_task(config("watched")).unwrap();
    let change = changes.try_recv().unwrap();
    assert!(change.before.is_none());
    assert_eq!(change.after.as_ref().map(|t| t.task_id), Some(task.task_id));

    fx.store.begin_execution(&task.task_id, ExecutionId::new()).unwrap();
    let change = changes.try_recv().unwrap();
    assert_eq!(change.before.unwrap().kanban_status, KanbanStatus::Todo);
    assert_eq!(change.after.unwrap().kanban_status, KanbanStatus::Doing);
}
