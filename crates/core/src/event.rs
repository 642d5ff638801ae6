// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution timeline events.
//!
//! Serializes with `{"kind": "...", ...fields}` format; the nested agent
//! event uses `{"type": "...", ...fields}`. Unknown tags deserialize to the
//! `Unknown` catch-all so old readers tolerate new producers; consumers
//! treat `Unknown` as raw output.

use crate::execution::ExecutionState;
use crate::id::{EventId, ExecutionId, TaskId};
use serde::{Deserialize, Serialize};

/// What a file-change agent event did to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Created,
    Modified,
    Deleted,
    Renamed,
}

crate::simple_display! {
    FileAction {
        Created => "created",
        Modified => "modified",
        Deleted => "deleted",
        Renamed => "renamed",
    }
}

/// Which process stream raw output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

crate::simple_display! {
    OutputStream {
        Stdout => "stdout",
        Stderr => "stderr",
    }
}

/// Normalised event emitted by an agent adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking {
        content: String,
    },
    Command {
        command: String,
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
    FileChange {
        path: String,
        action: FileAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diff: Option<String>,
    },
    ToolCall {
        tool: String,
        #[serde(default)]
        args: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    Message {
        content: String,
    },
    Error {
        message: String,
        recoverable: bool,
    },
    Completed {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    RawOutput {
        stream: OutputStream,
        content: String,
    },

    /// Catch-all for unrecognised type tags (forward compatibility).
    #[serde(other, skip_serializing)]
    Unknown,
}

impl AgentEvent {
    /// Wire tag of this variant, used for event-log filtering.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AgentEvent::Thinking { .. } => "thinking",
            AgentEvent::Command { .. } => "command",
            AgentEvent::FileChange { .. } => "file_change",
            AgentEvent::ToolCall { .. } => "tool_call",
            AgentEvent::Message { .. } => "message",
            AgentEvent::Error { .. } => "error",
            AgentEvent::Completed { .. } => "completed",
            AgentEvent::RawOutput { .. } => "raw_output",
            AgentEvent::Unknown => "raw_output",
        }
    }

    /// A `completed` or unrecoverable `error` event resolves the run.
    pub fn resolves_run(&self) -> bool {
        matches!(
            self,
            AgentEvent::Completed { .. } | AgentEvent::Error { recoverable: false, .. }
        )
    }
}

/// Payload of one entry in an execution's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    StatusChanged {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_state: Option<ExecutionState>,
        new_state: ExecutionState,
    },
    SessionStarted {
        worktree_path: String,
        branch_name: String,
    },
    SessionEnded {
        final_state: ExecutionState,
        duration_ms: u64,
    },
    Progress {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percentage: Option<f32>,
    },
    AgentEvent {
        event: AgentEvent,
    },

    /// Catch-all for unrecognised kind tags (forward compatibility).
    #[serde(other, skip_serializing)]
    Unknown,
}

impl EventKind {
    /// Wire tag of this variant, used for event-log filtering.
    pub fn kind_name(&self) -> &'static str {
        match self {
            EventKind::StatusChanged { .. } => "status_changed",
            EventKind::SessionStarted { .. } => "session_started",
            EventKind::SessionEnded { .. } => "session_ended",
            EventKind::Progress { .. } => "progress",
            EventKind::AgentEvent { .. } => "agent_event",
            EventKind::Unknown => "raw_output",
        }
    }
}

/// One entry in the run timeline of an execution.
///
/// `seq` is contiguous within an execution, starting at 1; the first event
/// is always a `status_changed` into `initializing`, the last a
/// `session_ended`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub event_id: EventId,
    pub execution_id: ExecutionId,
    pub task_id: TaskId,
    /// Monotonic ordinal within the execution. Assigned by the event log
    /// writer; zero until appended.
    #[serde(default)]
    pub seq: u64,
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ExecutionEvent {
    pub fn new(
        execution_id: ExecutionId,
        task_id: TaskId,
        timestamp_ms: u64,
        kind: EventKind,
    ) -> Self {
        Self { event_id: EventId::new(), execution_id, task_id, seq: 0, timestamp_ms, kind }
    }

    /// True for the mandatory final event of a timeline.
    pub fn is_session_ended(&self) -> bool {
        matches!(self.kind, EventKind::SessionEnded { .. })
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
