// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use vk_core::ExecutionId;
use yare::parameterized;

#[test]
fn thinking_line() {
    let event = parse_line("⏳ Thinking...");
    assert_eq!(
        event,
        AdapterEvent::Agent(AgentEvent::Thinking { content: "Thinking...".into() })
    );
}

#[test]
fn tool_line() {
    let event = parse_line("🔧 Running tool: grep");
    match event {
        AdapterEvent::Agent(AgentEvent::ToolCall { tool, result, .. }) => {
            assert_eq!(tool, "grep");
            assert!(result.is_none());
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[parameterized(
    bare = { "✅ Task completed", None },
    with_summary = { "✅ Task completed: wrote README", Some("wrote README") },
)]
fn completed_line(line: &str, summary: Option<&str>) {
    match parse_line(line) {
        AdapterEvent::Agent(AgentEvent::Completed { success, summary: got }) => {
            assert!(success);
            assert_eq!(got.as_deref(), summary);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn error_line_is_fatal() {
    match parse_line("❌ Error: model overloaded") {
        AdapterEvent::Agent(AgentEvent::Error { message, recoverable }) => {
            assert_eq!(message, "Error: model overloaded");
            assert!(!recoverable);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn task_creation_line_becomes_message() {
    match parse_line("[TASK] Creating: Add README") {
        AdapterEvent::Agent(AgentEvent::Message { content }) => {
            assert_eq!(content, "Creating: Add README");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[parameterized(
    start = { "progress: 10%", 0.1 },
    done = { "progress: 100%", 1.0 },
)]
fn progress_line(line: &str, expected: f32) {
    match parse_line(line) {
        AdapterEvent::Progress { percentage: Some(pct), .. } => {
            assert!((pct - expected).abs() < 1e-6);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn progress_line_with_garbage_percent_is_raw() {
    match parse_line("progress: lots%") {
        AdapterEvent::Agent(AgentEvent::RawOutput { .. }) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn unrecognised_line_is_raw_stdout() {
    match parse_line("compiling vk-core v0.2.0") {
        AdapterEvent::Agent(AgentEvent::RawOutput { stream, content }) => {
            assert_eq!(stream, OutputStream::Stdout);
            assert_eq!(content, "compiling vk-core v0.2.0");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn custom_agent_without_binary_fails_start_config() {
    let config = AdapterConfig::new(
        ExecutionId::new(),
        AgentType::Custom,
        std::path::PathBuf::from("/tmp"),
    );
    assert!(binary_for(&config).is_err());

    let config = config.binary("/usr/local/bin/my-agent");
    assert_eq!(binary_for(&config).unwrap(), "/usr/local/bin/my-agent");
}

#[parameterized(
    claude = { AgentType::ClaudeCode, "claude" },
    codex = { AgentType::Codex, "codex" },
    gemini = { AgentType::GeminiCli, "gemini" },
)]
fn default_binaries(agent: AgentType, binary: &str) {
    let config = AdapterConfig::new(ExecutionId::new(), agent, std::path::PathBuf::from("/tmp"));
    assert_eq!(binary_for(&config).unwrap(), binary);
}

#[tokio::test]
async fn missing_binary_fails_start() {
    let adapter = CliAdapter::new();
    let dir = tempfile::tempdir().unwrap();
    let config = AdapterConfig::new(
        ExecutionId::new(),
        AgentType::Custom,
        dir.path().to_path_buf(),
    )
    .binary("definitely-not-a-real-agent-vk");

    let err = adapter.start(config).await.unwrap_err();
    match err {
        AdapterError::StartFailed(reason) => assert!(reason.contains("not found"), "{reason}"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn scripted_shell_agent_round_trip() {
    // Drive a stand-in "agent": cat reads the prompt line and echoes it back,
    // which exercises spawn, prompt submission over stdin, stdout streaming,
    // and clean stream termination on EOF.
    let adapter = CliAdapter::new();
    let dir = tempfile::tempdir().unwrap();
    let config = AdapterConfig::new(
        ExecutionId::new(),
        AgentType::Custom,
        dir.path().to_path_buf(),
    )
    .binary("cat");

    let mut handle = adapter.start(config).await.unwrap();
    let mut events = handle.take_events().unwrap();
    handle.submit_prompt("✅ Task completed", None).await.unwrap();

    // cat echoes the marker line back; closing stdin ends the stream.
    let event = events.recv().await.unwrap();
    assert!(matches!(
        event,
        AdapterEvent::Agent(AgentEvent::Completed { success: true, .. })
    ));

    handle.abort().await;
    // Stream terminates after abort.
    while events.recv().await.is_some() {}
}
