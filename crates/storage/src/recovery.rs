// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash recovery: close out runs that were mid-flight at shutdown.
//!
//! Any execution whose timeline does not end with `session_ended` gets
//! synthetic `status_changed{→failed}` and `session_ended{failed}` events
//! at the next seqs, and its run record is failed. The caller resets the
//! owning tasks' kanban projection to `todo`.

use crate::event_log::EventLog;
use crate::run_store::{RunRecord, RunStore};
use crate::StorageError;
use vk_core::{EventKind, ExecutionEvent, ExecutionId, ExecutionState, TaskId};

const RECOVERY_REASON: &str = "gateway restarted while execution was in flight";

/// What recovery did at startup.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecoveryReport {
    pub scanned: usize,
    pub failed_executions: Vec<ExecutionId>,
    pub tasks_reset: Vec<TaskId>,
}

/// Scan every persisted run and fail the unterminated ones.
pub fn recover(
    log: &EventLog,
    runs: &RunStore,
    now_ms: u64,
) -> Result<RecoveryReport, StorageError> {
    let mut report = RecoveryReport::default();
    for mut record in runs.list_all()? {
        report.scanned += 1;
        let task_id = record.execution.task_id;
        let execution_id = record.execution.execution_id;

        let ended = log
            .last_event(&task_id, &execution_id)?
            .map(|e| e.is_session_ended())
            .unwrap_or(false);
        if ended {
            continue;
        }

        tracing::warn!(%task_id, %execution_id, "failing execution left over from a previous run");
        fail_execution(log, &mut record, now_ms)?;
        runs.save(&record)?;
        report.failed_executions.push(execution_id);
        if !report.tasks_reset.contains(&task_id) {
            report.tasks_reset.push(task_id);
        }
    }
    Ok(report)
}

fn fail_execution(
    log: &EventLog,
    record: &mut RunRecord,
    now_ms: u64,
) -> Result<(), StorageError> {
    let execution = &mut record.execution;
    let old_state = execution.state;

    // Force-terminate regardless of the recorded state; a stale snapshot
    // must not keep the run alive.
    if execution.transition(ExecutionState::Failed, now_ms).is_err() {
        execution.state = ExecutionState::Failed;
        execution.final_state = Some(ExecutionState::Failed);
        execution.ended_at_ms = Some(now_ms);
    }
    execution.error = Some(RECOVERY_REASON.to_string());

    let mut status = ExecutionEvent::new(
        execution.execution_id,
        execution.task_id,
        now_ms,
        EventKind::StatusChanged { old_state: Some(old_state), new_state: ExecutionState::Failed },
    );
    log.append(&mut status)?;

    let duration_ms = execution.duration_ms(now_ms);
    let mut ended = ExecutionEvent::new(
        execution.execution_id,
        execution.task_id,
        now_ms,
        EventKind::SessionEnded { final_state: ExecutionState::Failed, duration_ms },
    );
    let last_seq = log.append(&mut ended)?;
    execution.event_count = last_seq;
    Ok(())
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
