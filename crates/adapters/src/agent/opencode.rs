// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenCode driver: the agent runs as a local HTTP server.
//!
//! Start sequence: spawn `opencode serve` on a random loopback port with a
//! generated bearer password, poll the health endpoint until it reports
//! healthy, create a session. The prompt is posted to the session and events
//! are consumed from the server-sent event stream.
//!
//! Text parts arrive as cumulative snapshots; [`TextDeltas`] keeps the last
//! snapshot per part id and emits the incremental suffix. When the new text
//! is not an extension of the old, the whole snapshot is emitted again — an
//! observer may see a duplicated message, which is accepted behaviour.

use super::{
    spawn_idle_watchdog, AdapterConfig, AdapterControl, AdapterError, AdapterEvent, AdapterHandle,
    AgentAdapter,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vk_core::limits::ADAPTER_WARMUP_TIMEOUT;
use vk_core::{AgentEvent, OutputStream};

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Driver for the OpenCode HTTP server protocol.
#[derive(Clone)]
pub struct OpencodeAdapter {
    binary: String,
}

impl Default for OpencodeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl OpencodeAdapter {
    pub fn new() -> Self {
        Self { binary: "opencode".to_string() }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

/// Per-part cumulative text snapshots → incremental deltas.
#[derive(Default)]
pub(crate) struct TextDeltas {
    parts: HashMap<String, String>,
}

impl TextDeltas {
    /// Record the new snapshot for `part_id` and return the text to emit.
    pub(crate) fn apply(&mut self, part_id: &str, text: &str) -> Option<String> {
        let old = self.parts.get(part_id).map(String::as_str).unwrap_or("");
        if text == old {
            return None;
        }
        let delta = if text.starts_with(old) {
            text[old.len()..].to_string()
        } else {
            // Not a prefix extension: emit the whole snapshot.
            text.to_string()
        };
        self.parts.insert(part_id.to_string(), text.to_string());
        (!delta.is_empty()).then_some(delta)
    }
}

/// Splits an SSE byte stream into `data:` payload lines.
#[derive(Default)]
pub(crate) struct SseLineBuffer {
    pending: String,
}

impl SseLineBuffer {
    /// Feed a chunk; returns the complete `data:` payloads it finished.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));
        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            let line = line.trim_end();
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }
}

/// Map one decoded SSE event to adapter events.
pub(crate) fn map_sse_event(value: &serde_json::Value, deltas: &mut TextDeltas) -> Vec<AdapterEvent> {
    let kind = value.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let props = value.get("properties").cloned().unwrap_or(serde_json::Value::Null);
    match kind {
        "message.part.updated" => {
            let part = &props["part"];
            if part.get("type").and_then(|v| v.as_str()) != Some("text") {
                return Vec::new();
            }
            let id = part.get("id").and_then(|v| v.as_str()).unwrap_or("");
            let text = part.get("text").and_then(|v| v.as_str()).unwrap_or("");
            match deltas.apply(id, text) {
                Some(delta) => vec![AgentEvent::Message { content: delta }.into()],
                None => Vec::new(),
            }
        }
        "tool.start" => {
            let tool = props.get("tool").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
            let args = props.get("args").cloned().unwrap_or(serde_json::Value::Null);
            vec![AgentEvent::ToolCall { tool, args, result: None }.into()]
        }
        "tool.done" => {
            let tool = props.get("tool").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
            let result = props.get("result").and_then(|v| v.as_str()).map(str::to_string);
            vec![AgentEvent::ToolCall { tool, args: serde_json::Value::Null, result }.into()]
        }
        "session.idle" => {
            vec![AgentEvent::Completed { success: true, summary: None }.into()]
        }
        "session.error" => {
            let message = props
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("opencode session error")
                .to_string();
            vec![AgentEvent::Error { message, recoverable: false }.into()]
        }
        _ => {
            vec![
                AgentEvent::RawOutput { stream: OutputStream::Stdout, content: value.to_string() }
                    .into(),
            ]
        }
    }
}

struct OpencodeControl {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    cancel: CancellationToken,
    aborted: AtomicBool,
}

#[async_trait]
impl AdapterControl for OpencodeControl {
    async fn submit_prompt(&self, prompt: &str, model: Option<&str>) -> Result<(), AdapterError> {
        let mut body = serde_json::json!({ "text": prompt });
        if let Some(model) = model {
            body["model"] = serde_json::Value::String(model.to_string());
        }
        let url = format!("{}/session/{}/message", self.base_url, self.session_id);
        let resp =
            self.client.post(&url).json(&body).send().await.map_err(|e| AdapterError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AdapterError::Http(format!("prompt rejected: {}", resp.status())));
        }
        Ok(())
    }

    async fn send_input(&self, text: &str) -> bool {
        let url = format!("{}/session/{}/message", self.base_url, self.session_id);
        let body = serde_json::json!({ "text": text });
        match self.client.post(&url).json(&body).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to forward input to opencode");
                false
            }
        }
    }

    async fn abort(&self) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }
        let url = format!("{}/session/{}/abort", self.base_url, self.session_id);
        let _ = self.client.post(&url).send().await;
        self.cancel.cancel();
    }
}

#[async_trait]
impl AgentAdapter for OpencodeAdapter {
    async fn start(&self, config: AdapterConfig) -> Result<AdapterHandle, AdapterError> {
        let start = std::time::Instant::now();

        let port = reserve_port()?;
        let password = nanoid::nanoid!(24);
        let base_url = format!("http://127.0.0.1:{port}");

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(["serve", "--hostname", "127.0.0.1", "--port", &port.to_string()])
            .current_dir(&config.working_dir)
            .env("OPENCODE_SERVER_PASSWORD", &password)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AdapterError::StartFailed(format!("agent binary not found: {}", self.binary))
            } else {
                AdapterError::StartFailed(format!("failed to spawn {}: {e}", self.binary))
            }
        })?;

        let client = bearer_client(&password)?;

        // Warm-up: wait for the liveness endpoint, reaping on failure.
        if let Err(e) = wait_healthy(&client, &base_url).await {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(e);
        }

        let session_id = match create_session(&client, &base_url).await {
            Ok(id) => id,
            Err(e) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let control = Arc::new(OpencodeControl {
            client: client.clone(),
            base_url: base_url.clone(),
            session_id,
            cancel: cancel.clone(),
            aborted: AtomicBool::new(false),
        });

        let (raw_tx, raw_rx) = mpsc::channel::<AdapterEvent>(256);
        let (out_tx, out_rx) = mpsc::channel::<AdapterEvent>(256);
        spawn_idle_watchdog(raw_rx, out_tx, config.idle_timeout, control.clone());

        tokio::spawn(pump_events(client, base_url, raw_tx, cancel.clone()));
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = child.start_kill();
            let _ = child.wait().await;
        });

        tracing::info!(
            execution_id = %config.execution_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            port,
            "opencode ready"
        );
        let ready = Arc::new(AtomicBool::new(true));
        Ok(AdapterHandle::new(&config, out_rx, control, ready))
    }
}

/// Pick a free loopback port by binding and releasing it.
fn reserve_port() -> Result<u16, AdapterError> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

fn bearer_client(password: &str) -> Result<reqwest::Client, AdapterError> {
    let mut headers = reqwest::header::HeaderMap::new();
    let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {password}"))
        .map_err(|e| AdapterError::StartFailed(format!("invalid bearer password: {e}")))?;
    headers.insert(reqwest::header::AUTHORIZATION, value);
    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| AdapterError::StartFailed(format!("http client: {e}")))
}

async fn wait_healthy(client: &reqwest::Client, base_url: &str) -> Result<(), AdapterError> {
    let url = format!("{base_url}/health");
    let deadline = tokio::time::Instant::now() + ADAPTER_WARMUP_TIMEOUT;
    loop {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                let body: serde_json::Value = resp.json().await.unwrap_or_default();
                if body.get("status").and_then(|v| v.as_str()) == Some("healthy") {
                    return Ok(());
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(AdapterError::StartFailed(format!(
                "opencode did not become healthy within {}s",
                ADAPTER_WARMUP_TIMEOUT.as_secs()
            )));
        }
        tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn create_session(client: &reqwest::Client, base_url: &str) -> Result<String, AdapterError> {
    let resp = client
        .post(format!("{base_url}/session"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .map_err(|e| AdapterError::Http(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(AdapterError::StartFailed(format!("session create failed: {}", resp.status())));
    }
    let body: serde_json::Value =
        resp.json().await.map_err(|e| AdapterError::Http(e.to_string()))?;
    body.get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| AdapterError::StartFailed("session create returned no id".to_string()))
}

/// Consume the SSE stream until completion, error, or cancellation.
async fn pump_events(
    client: reqwest::Client,
    base_url: String,
    raw_tx: mpsc::Sender<AdapterEvent>,
    cancel: CancellationToken,
) {
    let resp = match client.get(format!("{base_url}/event")).send().await {
        Ok(resp) => resp,
        Err(e) => {
            let _ = raw_tx
                .send(
                    AgentEvent::Error {
                        message: format!("opencode event stream failed: {e}"),
                        recoverable: false,
                    }
                    .into(),
                )
                .await;
            cancel.cancel();
            return;
        }
    };

    let mut stream = resp.bytes_stream();
    let mut buffer = SseLineBuffer::default();
    let mut deltas = TextDeltas::default();
    let mut finished = false;

    'outer: loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let Ok(bytes) = chunk else { break };
        for payload in buffer.feed(&bytes) {
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&payload) else {
                continue;
            };
            for event in map_sse_event(&value, &mut deltas) {
                let done = matches!(
                    event,
                    AdapterEvent::Agent(
                        AgentEvent::Completed { .. } | AgentEvent::Error { recoverable: false, .. }
                    )
                );
                if raw_tx.send(event).await.is_err() {
                    break 'outer;
                }
                if done {
                    finished = true;
                    break 'outer;
                }
            }
        }
    }

    if !finished && !cancel.is_cancelled() {
        // Server went away mid-conversation.
        let _ = raw_tx
            .send(
                AgentEvent::Error {
                    message: "opencode server connection lost".to_string(),
                    recoverable: false,
                }
                .into(),
            )
            .await;
    }
    cancel.cancel();
}

#[cfg(test)]
#[path = "opencode_tests.rs"]
mod tests;
