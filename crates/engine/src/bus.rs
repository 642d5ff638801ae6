// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription bus: live fan-out merged with historical replay.
//!
//! `subscribe` registers the live channel first, then replays the log from
//! `since_seq`, then follows live deliveries, deduplicating by seq at the
//! handover. The publisher never awaits a subscriber: a full buffer drops
//! the subscriber, who is expected to reconnect with its last-seen seq.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use vk_core::limits::SUBSCRIBER_BUFFER;
use vk_core::{ExecutionEvent, ExecutionId, TaskId};
use vk_storage::EventLog;

pub struct SubscriptionBus {
    log: Arc<EventLog>,
    live: Mutex<HashMap<ExecutionId, Vec<mpsc::Sender<ExecutionEvent>>>>,
    dropped: AtomicU64,
}

impl SubscriptionBus {
    pub fn new(log: Arc<EventLog>) -> Self {
        Self { log, live: Mutex::new(HashMap::new()), dropped: AtomicU64::new(0) }
    }

    /// Push one appended event to the execution's live subscribers.
    ///
    /// Never blocks: subscribers whose buffer is full are dropped and
    /// counted.
    pub fn publish(&self, event: &ExecutionEvent) {
        let mut live = self.live.lock();
        let Some(subscribers) = live.get_mut(&event.execution_id) else {
            return;
        };
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::AcqRel);
                tracing::warn!(
                    execution_id = %event.execution_id,
                    "dropping slow subscriber"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if subscribers.is_empty() {
            live.remove(&event.execution_id);
        }
    }

    /// Tear down live fan-out for a settled execution.
    pub fn finish(&self, execution_id: &ExecutionId) {
        self.live.lock().remove(execution_id);
    }

    /// Total subscribers dropped for falling behind.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    /// Live subscriber count for an execution (diagnostics).
    pub fn subscriber_count(&self, execution_id: &ExecutionId) -> usize {
        self.live.lock().get(execution_id).map(Vec::len).unwrap_or(0)
    }

    /// Replay events with `seq > since_seq`, then follow live.
    ///
    /// The stream is finite when the execution is already terminal (it ends
    /// after `session_ended`), infinite until then. Restartable: call again
    /// with the last seen seq.
    pub fn subscribe(
        &self,
        task_id: TaskId,
        execution_id: ExecutionId,
        since_seq: u64,
    ) -> mpsc::Receiver<ExecutionEvent> {
        let (out_tx, out_rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let (live_tx, live_rx) = mpsc::channel(SUBSCRIBER_BUFFER);

        // Register for live events before reading the log so nothing can
        // fall between replay and follow; overlap is deduplicated by seq.
        self.live.lock().entry(execution_id).or_default().push(live_tx);

        let log = self.log.clone();
        tokio::spawn(pump(log, task_id, execution_id, since_seq, live_rx, out_tx));
        out_rx
    }
}

async fn pump(
    log: Arc<EventLog>,
    task_id: TaskId,
    execution_id: ExecutionId,
    since_seq: u64,
    mut live_rx: mpsc::Receiver<ExecutionEvent>,
    out_tx: mpsc::Sender<ExecutionEvent>,
) {
    let replay = match log.tail_since(&task_id, &execution_id, since_seq) {
        Ok(events) => events,
        Err(e) => {
            tracing::error!(error = %e, %execution_id, "subscription replay failed");
            return;
        }
    };

    let mut last_seen = since_seq;
    for event in replay {
        let ended = event.is_session_ended();
        last_seen = last_seen.max(event.seq);
        if out_tx.send(event).await.is_err() {
            return;
        }
        if ended {
            return;
        }
    }

    // Already terminal with nothing left to replay: the stream is finite.
    if let Ok(Some(last)) = log.last_event(&task_id, &execution_id) {
        if last.is_session_ended() && last.seq <= last_seen {
            return;
        }
    }

    // Caught up: switch to the live channel, joined on last_seen.
    while let Some(event) = live_rx.recv().await {
        if event.seq <= last_seen {
            continue;
        }
        last_seen = event.seq;
        let ended = event.is_session_ended();
        if out_tx.send(event).await.is_err() {
            return;
        }
        if ended {
            return;
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
