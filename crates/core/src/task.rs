// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task entity and kanban projection.

use crate::clock::Clock;
use crate::id::{ExecutionId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which external agent CLI executes a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    Opencode,
    ClaudeCode,
    Codex,
    GeminiCli,
    Custom,
}

impl AgentType {
    /// Parse an agent type from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "opencode" => Some(AgentType::Opencode),
            "claude-code" => Some(AgentType::ClaudeCode),
            "codex" => Some(AgentType::Codex),
            "gemini-cli" => Some(AgentType::GeminiCli),
            "custom" => Some(AgentType::Custom),
            _ => None,
        }
    }
}

crate::simple_display! {
    AgentType {
        Opencode => "opencode",
        ClaudeCode => "claude-code",
        Codex => "codex",
        GeminiCli => "gemini-cli",
        Custom => "custom",
    }
}

/// Kanban column a task sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KanbanStatus {
    Todo,
    Doing,
    Done,
}

crate::simple_display! {
    KanbanStatus {
        Todo => "todo",
        Doing => "doing",
        Done => "done",
    }
}

/// Configuration for creating a new task
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub title: String,
    pub description: Option<String>,
    pub workspace_id: String,
    pub project_id: String,
    pub agent_type: AgentType,
    pub base_branch: String,
    pub model: Option<String>,
}

impl TaskConfig {
    pub fn builder(title: impl Into<String>) -> TaskConfigBuilder {
        TaskConfigBuilder {
            title: title.into(),
            description: None,
            workspace_id: String::new(),
            project_id: String::new(),
            agent_type: AgentType::Opencode,
            base_branch: "main".to_string(),
            model: None,
        }
    }
}

pub struct TaskConfigBuilder {
    title: String,
    description: Option<String>,
    workspace_id: String,
    project_id: String,
    agent_type: AgentType,
    base_branch: String,
    model: Option<String>,
}

impl TaskConfigBuilder {
    crate::setters! {
        into {
            workspace_id: String,
            project_id: String,
            base_branch: String,
        }
        set {
            agent_type: AgentType,
        }
        option {
            description: String,
            model: String,
        }
    }

    pub fn build(self) -> TaskConfig {
        TaskConfig {
            title: self.title,
            description: self.description,
            workspace_id: self.workspace_id,
            project_id: self.project_id,
            agent_type: self.agent_type,
            base_branch: self.base_branch,
            model: self.model,
        }
    }
}

/// A user-visible unit of coding work, projected onto the kanban board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub project_id: String,
    pub agent_type: AgentType,
    pub base_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub kanban_status: KanbanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_execution_id: Option<ExecutionId>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Task {
    /// Create a new task in the `todo` column.
    pub fn new(config: TaskConfig, clock: &impl Clock) -> Self {
        let now = clock.epoch_ms();
        Self {
            task_id: TaskId::new(),
            title: config.title,
            description: config.description,
            workspace_id: config.workspace_id,
            project_id: config.project_id,
            agent_type: config.agent_type,
            base_branch: config.base_branch,
            model: config.model,
            kanban_status: KanbanStatus::Todo,
            current_execution_id: None,
            created_at_ms: now,
            updated_at_ms: now,
        }
    }

    /// The prompt handed to the agent: the description when present,
    /// otherwise the title.
    pub fn prompt(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.title)
    }

    /// Short preview of the prompt for run summaries.
    pub fn prompt_preview(&self) -> &str {
        crate::id::short(self.prompt(), 120)
    }

    /// True while the task's current execution has not reached a terminal
    /// state (i.e. the kanban column is `doing`).
    pub fn is_executing(&self) -> bool {
        self.kanban_status == KanbanStatus::Doing && self.current_execution_id.is_some()
    }

    pub fn touch(&mut self, clock: &impl Clock) {
        self.updated_at_ms = clock.epoch_ms();
    }
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kanban_status: Option<KanbanStatus>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(ws) = &self.workspace_id {
            if &task.workspace_id != ws {
                return false;
            }
        }
        if let Some(project) = &self.project_id {
            if &task.project_id != project {
                return false;
            }
        }
        if let Some(status) = self.kanban_status {
            if task.kanban_status != status {
                return false;
            }
        }
        true
    }
}

/// Snapshot of the board, grouped by column. Sent as `kanban:sync`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KanbanBoard {
    pub todo: Vec<Task>,
    pub doing: Vec<Task>,
    pub done: Vec<Task>,
}

impl KanbanBoard {
    /// Build a board snapshot, columns ordered by creation time.
    pub fn project<'a>(tasks: impl Iterator<Item = &'a Task>) -> Self {
        let mut sorted: BTreeMap<(u64, &str), &Task> = BTreeMap::new();
        for task in tasks {
            sorted.insert((task.created_at_ms, task.task_id.as_str()), task);
        }
        let mut board = KanbanBoard::default();
        for task in sorted.into_values() {
            match task.kanban_status {
                KanbanStatus::Todo => board.todo.push(task.clone()),
                KanbanStatus::Doing => board.doing.push(task.clone()),
                KanbanStatus::Done => board.done.push(task.clone()),
            }
        }
        board
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            title: String = "test task",
            workspace_id: String = "ws-1",
            project_id: String = "proj-1",
            base_branch: String = "main",
        }
        set {
            agent_type: AgentType = AgentType::Opencode,
            kanban_status: KanbanStatus = KanbanStatus::Todo,
            created_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
        }
        option {
            description: String = None,
            model: String = None,
            current_execution_id: ExecutionId = None,
        }
        computed {
            task_id: TaskId = TaskId::new(),
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
