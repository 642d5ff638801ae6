// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-oriented CLI agent driver (Claude Code, Codex, Gemini CLI).
//!
//! The agent is a plain subprocess: the prompt goes in on stdin, stdout and
//! stderr are streamed line by line, and recognised marker lines become
//! structured events. Everything else is raw output.

use super::{
    spawn_idle_watchdog, AdapterConfig, AdapterControl, AdapterError, AdapterEvent, AdapterHandle,
    AgentAdapter,
};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use vk_core::{AgentEvent, AgentType, OutputStream};

/// Driver for agents that speak the line protocol over stdio.
#[derive(Default, Clone)]
pub struct CliAdapter;

impl CliAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Resolve the executable for an agent type.
fn binary_for(config: &AdapterConfig) -> Result<String, AdapterError> {
    if let Some(binary) = &config.binary {
        return Ok(binary.clone());
    }
    match config.agent_type {
        AgentType::ClaudeCode => Ok("claude".to_string()),
        AgentType::Codex => Ok("codex".to_string()),
        AgentType::GeminiCli => Ok("gemini".to_string()),
        AgentType::Custom => {
            Err(AdapterError::StartFailed("custom agent requires a binary path".to_string()))
        }
        AgentType::Opencode => {
            Err(AdapterError::StartFailed("opencode uses the http adapter".to_string()))
        }
    }
}

/// Map one stdout line to an event.
pub(crate) fn parse_line(line: &str) -> AdapterEvent {
    let trimmed = line.trim_end();
    if let Some(content) = trimmed.strip_prefix("⏳ ") {
        return AgentEvent::Thinking { content: content.to_string() }.into();
    }
    if let Some(tool) = trimmed.strip_prefix("🔧 Running tool: ") {
        return AgentEvent::ToolCall {
            tool: tool.to_string(),
            args: serde_json::Value::Null,
            result: None,
        }
        .into();
    }
    if let Some(rest) = trimmed.strip_prefix("✅ Task completed") {
        let summary = rest.trim_start_matches(':').trim();
        return AgentEvent::Completed {
            success: true,
            summary: (!summary.is_empty()).then(|| summary.to_string()),
        }
        .into();
    }
    if let Some(message) = trimmed.strip_prefix("❌ ") {
        return AgentEvent::Error { message: message.to_string(), recoverable: false }.into();
    }
    if let Some(title) = trimmed.strip_prefix("[TASK] Creating: ") {
        return AgentEvent::Message { content: format!("Creating: {title}") }.into();
    }
    if let Some(pct) = trimmed.strip_prefix("progress: ").and_then(|r| r.strip_suffix('%')) {
        if let Ok(n) = pct.trim().parse::<f32>() {
            return AdapterEvent::Progress {
                message: trimmed.to_string(),
                percentage: Some(n / 100.0),
            };
        }
    }
    AgentEvent::RawOutput { stream: OutputStream::Stdout, content: trimmed.to_string() }.into()
}

struct CliControl {
    stdin: Mutex<Option<ChildStdin>>,
    cancel: CancellationToken,
    aborted: AtomicBool,
}

#[async_trait]
impl AdapterControl for CliControl {
    async fn submit_prompt(&self, prompt: &str, _model: Option<&str>) -> Result<(), AdapterError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(AdapterError::NotReady)?;
        stdin.write_all(prompt.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn send_input(&self, text: &str) -> bool {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return false;
        };
        let write = async {
            stdin.write_all(text.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        match write.await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to forward input to agent stdin");
                false
            }
        }
    }

    async fn abort(&self) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
    }
}

#[async_trait]
impl AgentAdapter for CliAdapter {
    async fn start(&self, config: AdapterConfig) -> Result<AdapterHandle, AdapterError> {
        let binary = binary_for(&config)?;
        let start = std::time::Instant::now();

        let mut cmd = tokio::process::Command::new(&binary);
        cmd.current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(model) = &config.model {
            cmd.args(["--model", model]);
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AdapterError::StartFailed(format!("agent binary not found: {binary}"))
            } else {
                AdapterError::StartFailed(format!("failed to spawn {binary}: {e}"))
            }
        })?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AdapterError::StartFailed("no stdout pipe".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AdapterError::StartFailed("no stderr pipe".to_string()))?;

        let cancel = CancellationToken::new();
        let control = Arc::new(CliControl {
            stdin: Mutex::new(stdin),
            cancel: cancel.clone(),
            aborted: AtomicBool::new(false),
        });

        let (raw_tx, raw_rx) = mpsc::channel::<AdapterEvent>(256);
        let (out_tx, out_rx) = mpsc::channel::<AdapterEvent>(256);
        spawn_idle_watchdog(raw_rx, out_tx, config.idle_timeout, control.clone());

        let completed = Arc::new(AtomicBool::new(false));
        tokio::spawn(pump_stdout(child, stdout, raw_tx.clone(), cancel, completed.clone()));
        tokio::spawn(pump_stderr(stderr, raw_tx));

        tracing::info!(
            agent = %config.agent_type,
            execution_id = %config.execution_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "agent spawned"
        );
        // CLI agents are prompt-ready as soon as the process is up.
        let ready = Arc::new(AtomicBool::new(true));
        Ok(AdapterHandle::new(&config, out_rx, control, ready))
    }
}

/// Stream stdout lines as events; on process exit without a completion
/// marker, synthesise the fatal error. Owns the child so it can reap it.
async fn pump_stdout(
    mut child: Child,
    stdout: tokio::process::ChildStdout,
    raw_tx: mpsc::Sender<AdapterEvent>,
    cancel: CancellationToken,
    completed: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let event = parse_line(&line);
                    if matches!(
                        event,
                        AdapterEvent::Agent(AgentEvent::Completed { .. })
                    ) {
                        completed.store(true, Ordering::Release);
                    }
                    if raw_tx.send(event).await.is_err() {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "agent stdout read failed");
                    break;
                }
            }
        }
    }

    // stdout closed: reap and report a crash if the run never completed.
    match child.wait().await {
        Ok(status) if !status.success() && !completed.load(Ordering::Acquire) => {
            let code = status.code().map_or("signal".to_string(), |c| c.to_string());
            let _ = raw_tx
                .send(
                    AgentEvent::Error {
                        message: format!("agent process exited with code {code}"),
                        recoverable: false,
                    }
                    .into(),
                )
                .await;
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "failed to reap agent process"),
    }
}

async fn pump_stderr(stderr: tokio::process::ChildStderr, raw_tx: mpsc::Sender<AdapterEvent>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let event =
            AgentEvent::RawOutput { stream: OutputStream::Stderr, content: line };
        if raw_tx.send(event.into()).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
