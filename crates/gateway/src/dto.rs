// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST DTOs: camelCase projections of the core entities.

use serde::{Deserialize, Serialize};
use vk_core::{
    AgentType, Execution, ExecutionId, ExecutionState, Host, HostId, HostStatus, KanbanStatus,
    Task, TaskId,
};
use vk_storage::RunSummary;

fn iso(epoch_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms as i64)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
    pub task_id: TaskId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub workspace_id: String,
    pub project_id: String,
    pub agent_type: AgentType,
    pub base_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub kanban_status: KanbanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_execution_id: Option<ExecutionId>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Task> for TaskDto {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.task_id,
            title: task.title,
            description: task.description,
            workspace_id: task.workspace_id,
            project_id: task.project_id,
            agent_type: task.agent_type,
            base_branch: task.base_branch,
            model: task.model,
            kanban_status: task.kanban_status,
            current_execution_id: task.current_execution_id,
            created_at: iso(task.created_at_ms),
            updated_at: iso(task.updated_at_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDto {
    pub execution_id: ExecutionId,
    pub task_id: TaskId,
    pub host_id: HostId,
    pub state: ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub event_count: u64,
}

impl From<Execution> for ExecutionDto {
    fn from(execution: Execution) -> Self {
        Self {
            execution_id: execution.execution_id,
            task_id: execution.task_id,
            host_id: execution.host_id,
            state: execution.state,
            worktree_path: execution.worktree_path.map(|p| p.display().to_string()),
            branch_name: execution.branch_name,
            created_at: iso(execution.created_at_ms),
            started_at: execution.started_at_ms.map(iso),
            ended_at: execution.ended_at_ms.map(iso),
            error: execution.error,
            event_count: execution.event_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummaryDto {
    pub execution_id: ExecutionId,
    pub task_id: TaskId,
    pub final_state: ExecutionState,
    pub agent_type: AgentType,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub event_count: u64,
    pub prompt_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<RunSummary> for RunSummaryDto {
    fn from(run: RunSummary) -> Self {
        Self {
            execution_id: run.execution_id,
            task_id: run.task_id,
            final_state: run.final_state,
            agent_type: run.agent_type,
            created_at: iso(run.created_at_ms),
            started_at: run.started_at_ms.map(iso),
            ended_at: run.ended_at_ms.map(iso),
            duration_ms: run.duration_ms,
            event_count: run.event_count,
            prompt_preview: run.prompt_preview,
            error: run.error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDto {
    pub host_id: HostId,
    pub name: String,
    pub status: HostStatus,
    pub supported_agents: Vec<AgentType>,
    pub max_concurrent: usize,
    pub active_tasks: usize,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty", default)]
    pub labels: std::collections::HashMap<String, String>,
    pub connected_at: String,
}

impl From<Host> for HostDto {
    fn from(host: Host) -> Self {
        Self {
            host_id: host.host_id,
            name: host.name,
            status: host.status,
            supported_agents: host.capabilities.supported_agents,
            max_concurrent: host.capabilities.max_concurrent,
            active_tasks: host.active_task_ids.len(),
            labels: host.capabilities.labels,
            connected_at: iso(host.connected_at_ms),
        }
    }
}

#[cfg(test)]
#[path = "dto_tests.rs"]
mod tests;
