// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task store: the authoritative task table and its kanban projection.
//!
//! Every mutation persists the snapshot before returning and publishes a
//! `(task_id, before, after)` change so projections can be rebuilt
//! incrementally. Tasks reference executions by id only.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use vk_core::{
    AgentType, Clock, ExecutionId, ExecutionState, GatewayError, KanbanBoard, KanbanStatus, Task,
    TaskConfig, TaskFilter, TaskId,
};
use vk_storage::TaskSnapshot;

/// One observed task mutation.
#[derive(Debug, Clone)]
pub struct TaskChange {
    pub task_id: TaskId,
    pub before: Option<Task>,
    pub after: Option<Task>,
}

/// Partial update for `update_task_meta`.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub agent_type: Option<AgentType>,
    pub base_branch: Option<String>,
    pub model: Option<Option<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.agent_type.is_none()
            && self.base_branch.is_none()
            && self.model.is_none()
    }
}

pub struct TaskStore<C: Clock> {
    clock: C,
    snapshot: TaskSnapshot,
    tasks: Mutex<HashMap<TaskId, Task>>,
    changes_tx: broadcast::Sender<TaskChange>,
}

impl<C: Clock> TaskStore<C> {
    /// Load the table from disk (empty when absent).
    pub fn load(snapshot: TaskSnapshot, clock: C) -> Result<Arc<Self>, GatewayError> {
        let tasks = snapshot
            .load()
            .map_err(|e| GatewayError::io(e.to_string()))?
            .into_iter()
            .map(|t| (t.task_id, t))
            .collect();
        let (changes_tx, _) = broadcast::channel(256);
        Ok(Arc::new(Self { clock, snapshot, tasks: Mutex::new(tasks), changes_tx }))
    }

    /// Stream of task mutations for projection rebuilds.
    pub fn changes(&self) -> broadcast::Receiver<TaskChange> {
        self.changes_tx.subscribe()
    }

    pub fn create_task(&self, config: TaskConfig) -> Result<Task, GatewayError> {
        if config.title.trim().is_empty() {
            return Err(GatewayError::validation("task title is required"));
        }
        let task = Task::new(config, &self.clock);
        {
            let mut tasks = self.tasks.lock();
            tasks.insert(task.task_id, task.clone());
            self.persist(&tasks)?;
        }
        self.publish(task.task_id, None, Some(task.clone()));
        Ok(task)
    }

    pub fn get(&self, task_id: &TaskId) -> Option<Task> {
        self.tasks.lock().get(task_id).cloned()
    }

    pub fn require(&self, task_id: &TaskId) -> Result<Task, GatewayError> {
        self.get(task_id)
            .ok_or_else(|| GatewayError::not_found(format!("task {task_id} not found")))
    }

    /// Tasks matching the filter, newest first.
    pub fn list(&self, filter: &TaskFilter) -> Vec<Task> {
        let mut tasks: Vec<Task> =
            self.tasks.lock().values().filter(|t| filter.matches(t)).cloned().collect();
        tasks.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| b.task_id.as_str().cmp(a.task_id.as_str()))
        });
        tasks
    }

    pub fn board(&self) -> KanbanBoard {
        let tasks = self.tasks.lock();
        KanbanBoard::project(tasks.values())
    }

    pub fn update_task_meta(
        &self,
        task_id: &TaskId,
        patch: TaskPatch,
    ) -> Result<Task, GatewayError> {
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(GatewayError::validation("task title is required"));
            }
        }
        let (before, after) = {
            let mut tasks = self.tasks.lock();
            let task = tasks
                .get_mut(task_id)
                .ok_or_else(|| GatewayError::not_found(format!("task {task_id} not found")))?;
            let before = task.clone();
            if let Some(title) = patch.title {
                task.title = title;
            }
            if let Some(description) = patch.description {
                task.description = Some(description);
            }
            if let Some(agent_type) = patch.agent_type {
                task.agent_type = agent_type;
            }
            if let Some(base_branch) = patch.base_branch {
                task.base_branch = base_branch;
            }
            if let Some(model) = patch.model {
                task.model = model;
            }
            task.touch(&self.clock);
            let after = task.clone();
            self.persist(&tasks)?;
            (before, after)
        };
        self.publish(*task_id, Some(before), Some(after.clone()));
        Ok(after)
    }

    /// Delete a task. Rejected while its current execution is live.
    pub fn delete_task(&self, task_id: &TaskId) -> Result<(), GatewayError> {
        let before = {
            let mut tasks = self.tasks.lock();
            let task = tasks
                .get(task_id)
                .ok_or_else(|| GatewayError::not_found(format!("task {task_id} not found")))?;
            if task.is_executing() {
                return Err(GatewayError::precondition(format!(
                    "task {task_id} has a live execution"
                )));
            }
            let before = tasks.remove(task_id);
            self.persist(&tasks)?;
            before
        };
        self.publish(*task_id, before, None);
        Ok(())
    }

    /// Mark the task as executing: kanban `doing`, current execution set.
    pub fn begin_execution(
        &self,
        task_id: &TaskId,
        execution_id: ExecutionId,
    ) -> Result<Task, GatewayError> {
        self.mutate(task_id, |task| {
            task.kanban_status = KanbanStatus::Doing;
            task.current_execution_id = Some(execution_id);
        })
    }

    /// Settle the kanban projection from a terminal outcome.
    ///
    /// `completed` lands in `done`, everything else back in `todo`. The
    /// `current_execution_id` is cleared in the same mutation, after the
    /// kanban field is updated, so observers see them in program order.
    pub fn settle_execution(
        &self,
        task_id: &TaskId,
        execution_id: &ExecutionId,
        outcome: ExecutionState,
    ) -> Result<Task, GatewayError> {
        self.mutate(task_id, |task| {
            if task.current_execution_id.as_ref() != Some(execution_id) {
                return;
            }
            task.kanban_status = if outcome == ExecutionState::Completed {
                KanbanStatus::Done
            } else {
                KanbanStatus::Todo
            };
            task.current_execution_id = None;
        })
    }

    /// Startup repair: nothing is running after a restart, so any task
    /// still marked executing goes back to `todo`.
    pub fn recover_dangling(&self) -> Result<Vec<TaskId>, GatewayError> {
        let dangling: Vec<TaskId> = self
            .tasks
            .lock()
            .values()
            .filter(|t| {
                t.current_execution_id.is_some() || t.kanban_status == KanbanStatus::Doing
            })
            .map(|t| t.task_id)
            .collect();
        for task_id in &dangling {
            self.mutate(task_id, |task| {
                task.kanban_status = KanbanStatus::Todo;
                task.current_execution_id = None;
            })?;
        }
        Ok(dangling)
    }

    fn mutate(
        &self,
        task_id: &TaskId,
        apply: impl FnOnce(&mut Task),
    ) -> Result<Task, GatewayError> {
        let (before, after) = {
            let mut tasks = self.tasks.lock();
            let task = tasks
                .get_mut(task_id)
                .ok_or_else(|| GatewayError::not_found(format!("task {task_id} not found")))?;
            let before = task.clone();
            apply(task);
            task.touch(&self.clock);
            let after = task.clone();
            self.persist(&tasks)?;
            (before, after)
        };
        self.publish(*task_id, Some(before), Some(after.clone()));
        Ok(after)
    }

    fn persist(&self, tasks: &HashMap<TaskId, Task>) -> Result<(), GatewayError> {
        let all: Vec<Task> = tasks.values().cloned().collect();
        self.snapshot.save(&all).map_err(|e| GatewayError::io(e.to_string()))
    }

    fn publish(&self, task_id: TaskId, before: Option<Task>, after: Option<Task>) {
        let _ = self.changes_tx.send(TaskChange { task_id, before, after });
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
