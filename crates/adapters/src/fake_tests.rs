// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use vk_core::{AgentEvent, AgentType, ExecutionId};

fn config() -> AdapterConfig {
    AdapterConfig::new(
        ExecutionId::new(),
        AgentType::Opencode,
        std::path::PathBuf::from("/tmp/worktree"),
    )
}

#[tokio::test]
async fn failing_start_surfaces_reason() {
    let fake = FakeAdapter::failing_start("binary missing");
    match fake.start(config()).await {
        Err(AdapterError::StartFailed(reason)) => assert_eq!(reason, "binary missing"),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(fake.recorder.start_count(), 1);
}

#[tokio::test]
async fn pause_after_parks_until_abort() {
    let fake = FakeAdapter::scripted(vec![
        AdapterEvent::Agent(AgentEvent::Message { content: "one".into() }),
        AdapterEvent::Agent(AgentEvent::Message { content: "two".into() }),
    ])
    .pause_after(1);

    let mut handle = fake.start(config()).await.unwrap();
    let mut events = handle.take_events().unwrap();
    handle.submit_prompt("go", None).await.unwrap();

    // First event arrives, then the script parks.
    assert!(events.recv().await.is_some());
    handle.abort().await;
    // Stream closes without delivering the second event.
    assert!(events.recv().await.is_none());
    assert_eq!(fake.recorder.abort_count(), 1);
}

#[tokio::test]
async fn release_unparks_without_abort() {
    let fake = FakeAdapter::scripted(vec![
        AdapterEvent::Agent(AgentEvent::Message { content: "one".into() }),
        AdapterEvent::Agent(AgentEvent::Completed { success: true, summary: None }),
    ])
    .pause_after(1);

    let mut handle = fake.start(config()).await.unwrap();
    let mut events = handle.take_events().unwrap();
    handle.submit_prompt("go", None).await.unwrap();

    assert!(events.recv().await.is_some());
    fake.release();
    let second = events.recv().await.unwrap();
    assert!(matches!(second, AdapterEvent::Agent(AgentEvent::Completed { .. })));
    assert!(events.recv().await.is_none());
    assert_eq!(fake.recorder.abort_count(), 0);
}

#[tokio::test]
async fn input_is_recorded_and_refusable() {
    let fake = FakeAdapter::scripted(vec![]);
    let handle = fake.start(config()).await.unwrap();
    handle.submit_prompt("go", None).await.unwrap();
    assert!(handle.send_input("more context").await);
    assert_eq!(fake.recorder.input_texts(), vec!["more context"]);

    let refusing = FakeAdapter::scripted(vec![]).refuse_input();
    let handle = refusing.start(config()).await.unwrap();
    handle.submit_prompt("go", None).await.unwrap();
    assert!(!handle.send_input("ignored").await);
}

#[tokio::test]
async fn abort_before_prompt_closes_stream() {
    let fake = FakeAdapter::scripted(vec![AdapterEvent::Agent(AgentEvent::Message {
        content: "never sent".into(),
    })]);
    let mut handle = fake.start(config()).await.unwrap();
    let mut events = handle.take_events().unwrap();
    handle.abort().await;
    assert!(events.recv().await.is_none());
}
