// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution entity and its state machine.
//!
//! All state movement goes through [`Execution::transition`], which enforces
//! the transition table. Terminal states are monotonic; `cleaning_up` is the
//! only state reachable after a terminal one, and the terminal outcome is
//! preserved in `final_state` when that happens.

use crate::clock::Clock;
use crate::id::{ExecutionId, HostId, TaskId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// State of a single execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Initializing,
    CreatingWorktree,
    Starting,
    Running,
    /// Reserved; no adapter produces it today.
    Paused,
    Completed,
    Failed,
    Cancelled,
    CleaningUp,
}

crate::simple_display! {
    ExecutionState {
        Initializing => "initializing",
        CreatingWorktree => "creating_worktree",
        Starting => "starting",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        CleaningUp => "cleaning_up",
    }
}

impl ExecutionState {
    /// Terminal run outcomes. `cleaning_up` is post-terminal, not terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }

    /// True once the run can never produce further agent events.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() || *self == ExecutionState::CleaningUp
    }

    /// The transition table of §4.5. Self-transitions are not allowed.
    pub fn can_transition(from: ExecutionState, to: ExecutionState) -> bool {
        use ExecutionState::*;
        match (from, to) {
            (Initializing, CreatingWorktree) => true,
            (Initializing, Failed | Cancelled) => true,
            (CreatingWorktree, Starting) => true,
            (CreatingWorktree, Failed | Cancelled) => true,
            (Starting, Running) => true,
            (Starting, Failed | Cancelled) => true,
            (Running, Paused) => true,
            (Running, Completed | Failed | Cancelled) => true,
            (Paused, Running) => true,
            (Paused, Completed | Failed | Cancelled) => true,
            (Completed | Failed | Cancelled, CleaningUp) => true,
            _ => false,
        }
    }
}

/// Attempted transition violating the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid execution transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ExecutionState,
    pub to: ExecutionState,
}

/// One attempt by an agent to realise a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: ExecutionId,
    pub task_id: TaskId,
    pub host_id: HostId,
    pub state: ExecutionState,
    /// Terminal outcome, preserved across the move into `cleaning_up`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<ExecutionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Highest event seq appended for this execution.
    #[serde(default)]
    pub event_count: u64,
}

impl Execution {
    pub fn new(task_id: TaskId, host_id: HostId, clock: &impl Clock) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            task_id,
            host_id,
            state: ExecutionState::Initializing,
            final_state: None,
            worktree_path: None,
            branch_name: None,
            created_at_ms: clock.epoch_ms(),
            started_at_ms: None,
            ended_at_ms: None,
            error: None,
            event_count: 0,
        }
    }

    /// Move to `to`, enforcing the transition table.
    ///
    /// Entering `running` records `started_at_ms`; entering a terminal state
    /// records `ended_at_ms` and pins `final_state`.
    pub fn transition(
        &mut self,
        to: ExecutionState,
        epoch_ms: u64,
    ) -> Result<(), TransitionError> {
        if !ExecutionState::can_transition(self.state, to) {
            return Err(TransitionError { from: self.state, to });
        }
        if to == ExecutionState::Running && self.started_at_ms.is_none() {
            self.started_at_ms = Some(epoch_ms);
        }
        if to.is_terminal() {
            self.ended_at_ms = Some(epoch_ms);
            self.final_state = Some(to);
        }
        self.state = to;
        Ok(())
    }

    /// Attach the worktree created for this execution.
    pub fn set_worktree(&mut self, path: PathBuf, branch: String) {
        self.worktree_path = Some(path);
        self.branch_name = Some(branch);
    }

    /// Wall-clock duration: start (or creation) to end (or `now_ms`).
    pub fn duration_ms(&self, now_ms: u64) -> u64 {
        let start = self.started_at_ms.unwrap_or(self.created_at_ms);
        let end = self.ended_at_ms.unwrap_or(now_ms);
        end.saturating_sub(start)
    }

    /// The outcome to report: `final_state` once terminal, current state
    /// otherwise.
    pub fn outcome(&self) -> ExecutionState {
        self.final_state.unwrap_or(self.state)
    }
}

crate::builder! {
    pub struct ExecutionBuilder => Execution {
        set {
            state: ExecutionState = ExecutionState::Initializing,
            created_at_ms: u64 = 1_000_000,
            event_count: u64 = 0,
        }
        option {
            final_state: ExecutionState = None,
            worktree_path: PathBuf = None,
            branch_name: String = None,
            started_at_ms: u64 = None,
            ended_at_ms: u64 = None,
            error: String = None,
        }
        computed {
            execution_id: ExecutionId = ExecutionId::new(),
            task_id: TaskId = TaskId::new(),
            host_id: HostId = HostId::new(),
        }
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
