// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replay and subscription specs.

use crate::prelude::*;
use std::collections::HashSet;
use vk_adapters::{AdapterEvent, FakeAdapter};
use vk_core::AgentEvent;
use vk_engine::ExecuteRequest;

/// Scenario: record all events, then re-subscribe with since_seq=3 and
/// observe 4,5,…,N in order.
#[tokio::test]
async fn replay_and_tail() {
    let world = world(completing_adapter());
    let task = world.create_task("T5", "p");

    let all = world.run_to_end(&task.task_id).await;
    let total = all.len() as u64;
    assert!(total > 3);

    let tail = world.collect(&task.task_id, 3).await;
    let seqs: Vec<u64> = tail.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (4..=total).collect::<Vec<u64>>());
}

/// Round-trip law: subscribe, disconnect, resubscribe with the last-seen
/// seq; the union is the full list with no duplicates past since_seq.
#[tokio::test]
async fn disconnect_and_resume_covers_everything_once() {
    let adapter = FakeAdapter::scripted(vec![
        AdapterEvent::Agent(AgentEvent::Message { content: "a".into() }),
        AdapterEvent::Agent(AgentEvent::Message { content: "b".into() }),
        AdapterEvent::Agent(AgentEvent::Message { content: "c".into() }),
        AdapterEvent::Agent(AgentEvent::Completed { success: true, summary: None }),
    ])
    .pause_after(2);
    let world = world(adapter);
    let task = world.create_task("T", "p");

    world.engine.start_execution(&task.task_id, ExecuteRequest::default()).unwrap();
    let mut rx = world.engine.subscribe(&task.task_id, 0).unwrap();

    // Take a few events, then drop the subscription mid-run.
    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(rx.recv().await.unwrap());
    }
    drop(rx);
    let last_seen = seen.last().unwrap().seq;

    // Let the run finish, then resume from the last seen seq.
    world.adapter.release();
    let rest = world.collect(&task.task_id, last_seen).await;
    seen.extend(rest);

    let seqs: Vec<u64> = seen.iter().map(|e| e.seq).collect();
    let unique: HashSet<u64> = seqs.iter().copied().collect();
    assert_eq!(unique.len(), seqs.len(), "duplicates in {seqs:?}");
    assert_eq!(seqs, (1..=seqs.len() as u64).collect::<Vec<u64>>());
    assert!(seen.last().unwrap().is_session_ended());
}

/// Invariant: the first delivered event after since_seq=k has seq k+1 and
/// delivery is strictly increasing.
#[tokio::test]
async fn first_event_after_since_seq_is_next() {
    let world = world(completing_adapter());
    let task = world.create_task("T", "p");
    let all = world.run_to_end(&task.task_id).await;

    for k in 0..all.len() as u64 {
        let tail = world.collect(&task.task_id, k).await;
        if let Some(first) = tail.first() {
            assert_eq!(first.seq, k + 1);
        }
        let seqs: Vec<u64> = tail.iter().map(|e| e.seq).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(seqs, sorted, "not strictly increasing for k={k}");
    }
}

/// Subscribing past the end of a terminal run yields an empty, finite
/// stream.
#[tokio::test]
async fn subscription_past_the_end_is_empty() {
    let world = world(completing_adapter());
    let task = world.create_task("T", "p");
    let all = world.run_to_end(&task.task_id).await;

    let tail = world.collect(&task.task_id, all.len() as u64 + 10).await;
    assert!(tail.is_empty());
}
