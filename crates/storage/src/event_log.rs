// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-execution event log.
//!
//! One JSONL segment per execution. `append` is synchronous and durable: it
//! assigns the next contiguous seq, writes the line, and syncs before
//! returning. The writer is the execution's engine worker; readers may run
//! concurrently and never observe a seq gap.

use crate::paths::DataLayout;
use crate::StorageError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use vk_core::{EventKind, ExecutionEvent, ExecutionId, TaskId};

/// Filter for event reads. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Match on the outer kind tag (`status_changed`, `agent_event`, …).
    pub kind: Option<String>,
    /// For `agent_event` entries, match on the inner variant tag.
    pub agent_event_kind: Option<String>,
}

impl EventFilter {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.agent_event_kind.is_none()
    }

    pub fn matches(&self, event: &ExecutionEvent) -> bool {
        if let Some(kind) = &self.kind {
            if event.kind.kind_name() != kind {
                return false;
            }
        }
        if let Some(inner) = &self.agent_event_kind {
            match &event.kind {
                EventKind::AgentEvent { event } => {
                    if event.kind_name() != inner {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

/// One page of an event read.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPage {
    pub events: Vec<ExecutionEvent>,
    pub has_more: bool,
}

/// The event log over one data directory.
pub struct EventLog {
    layout: DataLayout,
    /// Last assigned seq per execution. Lazily seeded from disk so appends
    /// after a restart continue the sequence.
    last_seqs: Mutex<HashMap<ExecutionId, u64>>,
}

impl EventLog {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout, last_seqs: Mutex::new(HashMap::new()) }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Append one event, assigning `seq = previous + 1`.
    ///
    /// Returns the assigned seq. The event's `seq` field is updated in
    /// place. Fails only on storage errors; the caller must then treat the
    /// execution as lost.
    pub fn append(&self, event: &mut ExecutionEvent) -> Result<u64, StorageError> {
        let path = self.layout.events_file(&event.task_id, &event.execution_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let seq = {
            let mut seqs = self.last_seqs.lock();
            let last = match seqs.get(&event.execution_id) {
                Some(last) => *last,
                None => scan_last_seq(&path)?,
            };
            let seq = last + 1;
            seqs.insert(event.execution_id, seq);
            seq
        };
        event.seq = seq;

        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;
        file.write_all(line.as_bytes()).map_err(|e| StorageError::io(&path, e))?;
        file.sync_data().map_err(|e| StorageError::io(&path, e))?;
        Ok(seq)
    }

    /// Read a page of events in increasing seq order.
    pub fn read(
        &self,
        task_id: &TaskId,
        execution_id: &ExecutionId,
        filter: &EventFilter,
        offset: usize,
        limit: usize,
    ) -> Result<EventPage, StorageError> {
        let all = self.read_all(task_id, execution_id)?;
        let filtered: Vec<ExecutionEvent> =
            all.into_iter().filter(|e| filter.matches(e)).collect();
        let has_more = filtered.len() > offset + limit;
        let events = filtered.into_iter().skip(offset).take(limit).collect();
        Ok(EventPage { events, has_more })
    }

    /// Read the full timeline of an execution.
    pub fn read_all(
        &self,
        task_id: &TaskId,
        execution_id: &ExecutionId,
    ) -> Result<Vec<ExecutionEvent>, StorageError> {
        let path = self.layout.events_file(task_id, execution_id);
        read_segment(&path)
    }

    /// Events with `seq > since_seq`, used for replay-then-follow.
    pub fn tail_since(
        &self,
        task_id: &TaskId,
        execution_id: &ExecutionId,
        since_seq: u64,
    ) -> Result<Vec<ExecutionEvent>, StorageError> {
        let all = self.read_all(task_id, execution_id)?;
        Ok(all.into_iter().filter(|e| e.seq > since_seq).collect())
    }

    /// The last event of an execution's timeline, if any.
    pub fn last_event(
        &self,
        task_id: &TaskId,
        execution_id: &ExecutionId,
    ) -> Result<Option<ExecutionEvent>, StorageError> {
        Ok(self.read_all(task_id, execution_id)?.into_iter().last())
    }

    /// Highest appended seq for an execution (0 when empty).
    pub fn last_seq(
        &self,
        task_id: &TaskId,
        execution_id: &ExecutionId,
    ) -> Result<u64, StorageError> {
        if let Some(seq) = self.last_seqs.lock().get(execution_id) {
            return Ok(*seq);
        }
        scan_last_seq(&self.layout.events_file(task_id, execution_id))
    }

    /// Check the contiguity invariant: seqs are 1..=n with no gaps.
    pub fn verify_contiguous(
        &self,
        task_id: &TaskId,
        execution_id: &ExecutionId,
    ) -> Result<(), StorageError> {
        let events = self.read_all(task_id, execution_id)?;
        for (i, event) in events.iter().enumerate() {
            let expected = i as u64 + 1;
            if event.seq != expected {
                return Err(StorageError::Corrupt(format!(
                    "execution {execution_id}: seq {} at position {} (expected {expected})",
                    event.seq, i
                )));
            }
        }
        Ok(())
    }
}

fn read_segment(path: &Path) -> Result<Vec<ExecutionEvent>, StorageError> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    let reader = BufReader::new(file);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| StorageError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ExecutionEvent = serde_json::from_str(&line)?;
        events.push(event);
    }
    Ok(events)
}

/// Read the last line's seq without keeping state. Used to seed the seq
/// cache after a restart.
fn scan_last_seq(path: &Path) -> Result<u64, StorageError> {
    let events = read_segment(path)?;
    Ok(events.last().map(|e| e.seq).unwrap_or(0))
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
