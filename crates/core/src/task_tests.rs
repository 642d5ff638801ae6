// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;
use yare::parameterized;

#[parameterized(
    opencode = { "opencode", AgentType::Opencode },
    claude = { "claude-code", AgentType::ClaudeCode },
    codex = { "codex", AgentType::Codex },
    gemini = { "gemini-cli", AgentType::GeminiCli },
    custom = { "custom", AgentType::Custom },
)]
fn agent_type_parse_round_trips(name: &str, expected: AgentType) {
    assert_eq!(AgentType::parse(name), Some(expected));
    assert_eq!(expected.to_string(), name);
}

#[test]
fn agent_type_parse_rejects_unknown() {
    assert_eq!(AgentType::parse("cursor"), None);
}

#[test]
fn agent_type_serde_uses_kebab_case() {
    let json = serde_json::to_string(&AgentType::ClaudeCode).unwrap();
    assert_eq!(json, "\"claude-code\"");
}

#[test]
fn new_task_starts_in_todo() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(5_000);
    let task = Task::new(
        TaskConfig::builder("Add README")
            .description("Write a README file.")
            .agent_type(AgentType::Opencode)
            .build(),
        &clock,
    );

    assert_eq!(task.kanban_status, KanbanStatus::Todo);
    assert_eq!(task.base_branch, "main");
    assert_eq!(task.created_at_ms, 5_000);
    assert!(task.current_execution_id.is_none());
    assert!(!task.is_executing());
}

#[test]
fn prompt_prefers_description() {
    let task = Task::builder().title("Title").description("The real prompt").build();
    assert_eq!(task.prompt(), "The real prompt");

    let task = Task::builder().title("Only title").build();
    assert_eq!(task.prompt(), "Only title");
}

#[test]
fn prompt_preview_truncates() {
    let task = Task::builder().description("x".repeat(500)).build();
    assert_eq!(task.prompt_preview().len(), 120);
}

#[test]
fn filter_matches_on_all_axes() {
    let task = Task::builder()
        .workspace_id("ws-a")
        .project_id("p-a")
        .kanban_status(KanbanStatus::Doing)
        .build();

    assert!(TaskFilter::default().matches(&task));
    assert!(TaskFilter { workspace_id: Some("ws-a".into()), ..Default::default() }.matches(&task));
    assert!(!TaskFilter { workspace_id: Some("ws-b".into()), ..Default::default() }.matches(&task));
    assert!(
        !TaskFilter { kanban_status: Some(KanbanStatus::Done), ..Default::default() }.matches(&task)
    );
}

#[test]
fn board_projection_groups_by_column_in_creation_order() {
    let first = Task::builder().title("first").created_at_ms(100).build();
    let second = Task::builder().title("second").created_at_ms(200).build();
    let doing = Task::builder()
        .title("active")
        .created_at_ms(150)
        .kanban_status(KanbanStatus::Doing)
        .build();

    let board = KanbanBoard::project([&second, &doing, &first].into_iter());
    let todo_titles: Vec<&str> = board.todo.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(todo_titles, vec!["first", "second"]);
    assert_eq!(board.doing.len(), 1);
    assert!(board.done.is_empty());
}

#[test]
fn task_serde_round_trip() {
    let task = Task::builder().description("desc").model("anthropic/claude-sonnet").build();
    let json = serde_json::to_string(&task).unwrap();
    let back: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(task, back);
}
