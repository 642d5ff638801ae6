// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use vk_core::{KanbanStatus, Task};

#[test]
fn empty_store_loads_no_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = TaskSnapshot::new(DataLayout::new(dir.path()));
    assert!(snapshot.load().unwrap().is_empty());
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = TaskSnapshot::new(DataLayout::new(dir.path()));

    let tasks = vec![
        Task::builder().title("one").build(),
        Task::builder().title("two").kanban_status(KanbanStatus::Done).build(),
    ];
    snapshot.save(&tasks).unwrap();

    let loaded = snapshot.load().unwrap();
    assert_eq!(loaded, tasks);
}

#[test]
fn save_replaces_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = TaskSnapshot::new(DataLayout::new(dir.path()));

    snapshot.save(&[Task::builder().title("old").build()]).unwrap();
    let replacement = vec![Task::builder().title("new").build()];
    snapshot.save(&replacement).unwrap();

    assert_eq!(snapshot.load().unwrap(), replacement);
}

#[test]
fn newer_snapshot_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    std::fs::write(
        layout.tasks_file(),
        serde_json::json!({ "version": 99, "tasks": [] }).to_string(),
    )
    .unwrap();

    let snapshot = TaskSnapshot::new(layout);
    assert!(matches!(snapshot.load(), Err(StorageError::Corrupt(_))));
}
