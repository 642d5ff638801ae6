// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run records: one `run.json` per execution.
//!
//! The record mirrors the in-memory [`Execution`] plus derived metadata
//! accumulated from the event stream. Together with the event segment it is
//! enough to rebuild the history view after a restart.

use crate::paths::DataLayout;
use crate::StorageError;
use serde::{Deserialize, Serialize};
use vk_core::{
    AgentEvent, AgentType, EventKind, Execution, ExecutionEvent, ExecutionId, ExecutionState,
    TaskId,
};

/// Counters derived from a run's agent events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default)]
    pub thinking_count: u64,
    #[serde(default)]
    pub commands_executed: u64,
    #[serde(default)]
    pub tools_called: u64,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl RunMetadata {
    /// Fold one agent event into the counters.
    pub fn absorb(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::Thinking { .. } => {
                self.thinking_count = self.thinking_count.saturating_add(1);
            }
            AgentEvent::Command { .. } => {
                self.commands_executed = self.commands_executed.saturating_add(1);
            }
            AgentEvent::ToolCall { .. } => {
                self.tools_called = self.tools_called.saturating_add(1);
            }
            AgentEvent::Message { .. } => {
                self.message_count = self.message_count.saturating_add(1);
            }
            AgentEvent::Error { .. } => {
                self.error_count = self.error_count.saturating_add(1);
            }
            AgentEvent::FileChange { path, .. } => {
                if !self.files_modified.contains(path) {
                    self.files_modified.push(path.clone());
                }
            }
            AgentEvent::Completed { summary, .. } => {
                if summary.is_some() {
                    self.summary = summary.clone();
                }
            }
            AgentEvent::RawOutput { .. } | AgentEvent::Unknown => {}
        }
    }
}

/// Persisted record of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub execution: Execution,
    pub agent_type: AgentType,
    pub prompt_preview: String,
    #[serde(default)]
    pub metadata: RunMetadata,
    /// Set once the worktree has been destroyed.
    #[serde(default)]
    pub worktree_cleaned: bool,
}

impl RunRecord {
    pub fn new(execution: Execution, agent_type: AgentType, prompt_preview: String) -> Self {
        Self { execution, agent_type, prompt_preview, metadata: RunMetadata::default(), worktree_cleaned: false }
    }

    /// Fold one timeline event into the record.
    pub fn absorb(&mut self, event: &ExecutionEvent) {
        self.execution.event_count = self.execution.event_count.max(event.seq);
        match &event.kind {
            EventKind::AgentEvent { event } => {
                self.metadata.absorb(event);
                if let AgentEvent::Error { message, .. } = event {
                    self.execution.error = Some(message.clone());
                }
            }
            EventKind::SessionStarted { worktree_path, branch_name } => {
                if !worktree_path.is_empty() {
                    self.execution.worktree_path = Some(worktree_path.into());
                }
                if !branch_name.is_empty() {
                    self.execution.branch_name = Some(branch_name.clone());
                }
            }
            EventKind::StatusChanged { .. }
            | EventKind::SessionEnded { .. }
            | EventKind::Progress { .. }
            | EventKind::Unknown => {}
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            execution_id: self.execution.execution_id,
            task_id: self.execution.task_id,
            final_state: self.execution.outcome(),
            agent_type: self.agent_type,
            created_at_ms: self.execution.created_at_ms,
            started_at_ms: self.execution.started_at_ms,
            ended_at_ms: self.execution.ended_at_ms,
            duration_ms: self
                .execution
                .ended_at_ms
                .map(|end| self.execution.duration_ms(end)),
            event_count: self.execution.event_count,
            prompt_preview: self.prompt_preview.clone(),
            error: self.execution.error.clone(),
        }
    }
}

/// History row for one terminated (or live) execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub execution_id: ExecutionId,
    pub task_id: TaskId,
    pub final_state: ExecutionState,
    pub agent_type: AgentType,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub event_count: u64,
    pub prompt_preview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Store of run records under the data directory.
pub struct RunStore {
    layout: DataLayout,
}

impl RunStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Persist a record with an atomic rename.
    pub fn save(&self, record: &RunRecord) -> Result<(), StorageError> {
        let path =
            self.layout.run_file(&record.execution.task_id, &record.execution.execution_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(record)?;
        std::fs::write(&tmp, body).map_err(|e| StorageError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| StorageError::io(&path, e))?;
        Ok(())
    }

    pub fn load(
        &self,
        task_id: &TaskId,
        execution_id: &ExecutionId,
    ) -> Result<Option<RunRecord>, StorageError> {
        let path = self.layout.run_file(task_id, execution_id);
        let body = match std::fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&path, e)),
        };
        Ok(Some(serde_json::from_slice(&body)?))
    }

    /// All runs for a task, newest first.
    pub fn list_runs(&self, task_id: &TaskId) -> Result<Vec<RunSummary>, StorageError> {
        let dir = self.layout.task_runs_dir(task_id);
        let mut summaries = Vec::new();
        for execution_id in list_subdirs(&dir)? {
            let execution_id = ExecutionId::from_string(execution_id);
            if let Some(record) = self.load(task_id, &execution_id)? {
                summaries.push(record.summary());
            }
        }
        summaries.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| b.execution_id.as_str().cmp(a.execution_id.as_str()))
        });
        Ok(summaries)
    }

    /// Every record in the store (recovery scan).
    pub fn list_all(&self) -> Result<Vec<RunRecord>, StorageError> {
        let runs_dir = self.layout.runs_dir();
        let mut records = Vec::new();
        for task_id in list_subdirs(&runs_dir)? {
            let task_id = TaskId::from_string(task_id);
            for execution_id in list_subdirs(&self.layout.task_runs_dir(&task_id))? {
                let execution_id = ExecutionId::from_string(execution_id);
                if let Some(record) = self.load(&task_id, &execution_id)? {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

fn list_subdirs(dir: &std::path::Path) -> Result<Vec<String>, StorageError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(dir, e)),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
#[path = "run_store_tests.rs"]
mod tests;
