// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for tests in this crate and downstream crates.
//!
//! Enabled with the `test-support` feature.

use crate::event::{AgentEvent, EventKind, ExecutionEvent};
use crate::execution::ExecutionState;
use crate::id::{ExecutionId, TaskId};

/// Build a timeline event with a given seq, for asserting log reads.
pub fn event_at(
    execution_id: ExecutionId,
    task_id: TaskId,
    seq: u64,
    kind: EventKind,
) -> ExecutionEvent {
    let mut event = ExecutionEvent::new(execution_id, task_id, 1_000_000 + seq, kind);
    event.seq = seq;
    event
}

/// A minimal well-formed timeline: status_changed → session_ended.
pub fn minimal_timeline(execution_id: ExecutionId, task_id: TaskId) -> Vec<ExecutionEvent> {
    vec![
        event_at(
            execution_id,
            task_id,
            1,
            EventKind::StatusChanged { old_state: None, new_state: ExecutionState::Initializing },
        ),
        event_at(
            execution_id,
            task_id,
            2,
            EventKind::SessionEnded { final_state: ExecutionState::Failed, duration_ms: 0 },
        ),
    ]
}

/// Shorthand for an agent message event payload.
pub fn message(content: impl Into<String>) -> EventKind {
    EventKind::AgentEvent { event: AgentEvent::Message { content: content.into() } }
}

/// Shorthand for a completion event payload.
pub fn completed(success: bool) -> EventKind {
    EventKind::AgentEvent { event: AgentEvent::Completed { success, summary: None } }
}
