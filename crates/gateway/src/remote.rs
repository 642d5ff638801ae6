// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway side of the host control channel.
//!
//! A [`HostChannel`] multiplexes requests to one connected host: frames go
//! out through the channel's sender (drained by the websocket writer task),
//! replies come back via [`HostChannel::route_frame`] keyed on the request
//! id, and relayed agent events are routed to the per-execution session
//! channels. [`RemoteRunner`] adapts this to the engine's `HostRunner`
//! seam, so remote executions drive the exact same state machine as local
//! ones.

use crate::protocol::{request_id, GatewayFrame, HostFrame};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use vk_adapters::AdapterEvent;
use vk_core::limits::{ADAPTER_WARMUP_TIMEOUT, SUBSCRIBER_BUFFER, WORKTREE_CREATE_TIMEOUT};
use vk_core::{ExecutionId, Worktree};
use vk_engine::{HostRunner, RunnerError, RunnerSession, SessionControl, StartAgent};

/// Slack added on top of the operation's own timeout for the round trip.
const RPC_SLACK: Duration = Duration::from_secs(5);

pub struct HostChannel {
    outbound: mpsc::Sender<GatewayFrame>,
    pending: Mutex<HashMap<String, oneshot::Sender<HostFrame>>>,
    sessions: Mutex<HashMap<ExecutionId, mpsc::Sender<AdapterEvent>>>,
}

impl HostChannel {
    pub fn new(outbound: mpsc::Sender<GatewayFrame>) -> Arc<Self> {
        Arc::new(Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Dispatch one frame from the host: resolve a pending request or route
    /// a relayed agent event.
    pub fn route_frame(&self, frame: HostFrame) {
        match frame {
            HostFrame::WorktreeCreated { ref request_id, .. }
            | HostFrame::WorktreeDestroyed { ref request_id, .. }
            | HostFrame::AgentStarted { ref request_id }
            | HostFrame::InputResult { ref request_id, .. }
            | HostFrame::RequestFailed { ref request_id, .. } => {
                let waiter = self.pending.lock().remove(request_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(frame);
                    }
                    None => tracing::warn!(request_id, "reply for unknown request"),
                }
            }
            HostFrame::AgentEvent { execution_id, event } => {
                let tx = self.sessions.lock().get(&execution_id).cloned();
                match tx {
                    Some(tx) => {
                        if tx.try_send(event).is_err() {
                            tracing::warn!(%execution_id, "remote event buffer overflow");
                        }
                    }
                    None => tracing::warn!(%execution_id, "event for unknown session"),
                }
            }
            HostFrame::AgentFinished { execution_id } => {
                self.sessions.lock().remove(&execution_id);
            }
            HostFrame::Register { .. } | HostFrame::Heartbeat => {
                // Handled by the connection loop before routing.
            }
        }
    }

    /// The host connection closed: fail whatever is still in flight.
    pub fn disconnected(&self) {
        self.pending.lock().clear();
        self.sessions.lock().clear();
    }

    async fn request(
        &self,
        request_id: String,
        frame: GatewayFrame,
        timeout: Duration,
    ) -> Result<HostFrame, RunnerError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        if self.outbound.send(frame).await.is_err() {
            self.pending.lock().remove(&request_id);
            return Err(RunnerError::HostUnavailable("control channel closed".to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                Err(RunnerError::HostUnavailable("control channel closed".to_string()))
            }
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(RunnerError::HostUnavailable(format!(
                    "host did not reply within {}s",
                    timeout.as_secs()
                )))
            }
        }
    }
}

/// Executes an engine run on a remote host over its control channel.
pub struct RemoteRunner {
    channel: Arc<HostChannel>,
}

impl RemoteRunner {
    pub fn new(channel: Arc<HostChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl HostRunner for RemoteRunner {
    async fn create_worktree(
        &self,
        execution_id: &ExecutionId,
        base_branch: &str,
    ) -> Result<Worktree, RunnerError> {
        let id = request_id();
        let frame = GatewayFrame::CreateWorktree {
            request_id: id.clone(),
            execution_id: *execution_id,
            base_branch: base_branch.to_string(),
        };
        match self.channel.request(id, frame, WORKTREE_CREATE_TIMEOUT + RPC_SLACK).await? {
            HostFrame::WorktreeCreated { worktree, .. } => Ok(worktree),
            HostFrame::RequestFailed { message, .. } => {
                Err(RunnerError::HostUnavailable(message))
            }
            other => Err(RunnerError::HostUnavailable(format!("unexpected reply: {other:?}"))),
        }
    }

    async fn start_agent(&self, request: StartAgent) -> Result<RunnerSession, RunnerError> {
        let (events_tx, events_rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.channel.sessions.lock().insert(request.execution_id, events_tx);

        let id = request_id();
        let frame = GatewayFrame::StartAgent {
            request_id: id.clone(),
            execution_id: request.execution_id,
            agent_type: request.agent_type,
            working_dir: request.working_dir.clone(),
            prompt: request.prompt.clone(),
            model: request.model.clone(),
        };
        let reply = self.channel.request(id, frame, ADAPTER_WARMUP_TIMEOUT + RPC_SLACK).await;
        match reply {
            Ok(HostFrame::AgentStarted { .. }) => Ok(RunnerSession {
                events: events_rx,
                control: Arc::new(RemoteControl {
                    channel: self.channel.clone(),
                    execution_id: request.execution_id,
                }),
            }),
            Ok(HostFrame::RequestFailed { message, .. }) => {
                self.channel.sessions.lock().remove(&request.execution_id);
                Err(RunnerError::HostUnavailable(message))
            }
            Ok(other) => {
                self.channel.sessions.lock().remove(&request.execution_id);
                Err(RunnerError::HostUnavailable(format!("unexpected reply: {other:?}")))
            }
            Err(e) => {
                self.channel.sessions.lock().remove(&request.execution_id);
                Err(e)
            }
        }
    }

    async fn destroy_worktree(&self, execution_id: &ExecutionId) -> Result<bool, RunnerError> {
        let id = request_id();
        let frame = GatewayFrame::DestroyWorktree {
            request_id: id.clone(),
            execution_id: *execution_id,
        };
        match self.channel.request(id, frame, WORKTREE_CREATE_TIMEOUT + RPC_SLACK).await? {
            HostFrame::WorktreeDestroyed { existed, .. } => Ok(existed),
            HostFrame::RequestFailed { message, .. } => {
                Err(RunnerError::HostUnavailable(message))
            }
            other => Err(RunnerError::HostUnavailable(format!("unexpected reply: {other:?}"))),
        }
    }
}

struct RemoteControl {
    channel: Arc<HostChannel>,
    execution_id: ExecutionId,
}

#[async_trait]
impl SessionControl for RemoteControl {
    async fn abort(&self) {
        let _ = self
            .channel
            .outbound
            .send(GatewayFrame::Abort { execution_id: self.execution_id })
            .await;
    }

    async fn send_input(&self, text: &str) -> bool {
        let id = request_id();
        let frame = GatewayFrame::SendInput {
            request_id: id.clone(),
            execution_id: self.execution_id,
            text: text.to_string(),
        };
        match self.channel.request(id, frame, RPC_SLACK).await {
            Ok(HostFrame::InputResult { delivered, .. }) => delivered,
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
