// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The host-runner seam: where an execution's worktree and agent live.
//!
//! The engine drives the same state machine for every execution; a
//! [`HostRunner`] decides whether that work happens in-process
//! ([`LocalRunner`]) or on a remote host reached over its control channel
//! (the gateway's remote runner).

use crate::worktrees::{WorktreeError, WorktreeProvider};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use vk_adapters::{AdapterConfig, AdapterError, AdapterEvent, AdapterHandle, AdapterRegistry};
use vk_core::{AgentType, ExecutionId, Worktree};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Worktree(#[from] WorktreeError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("host unavailable: {0}")]
    HostUnavailable(String),
}

/// Everything needed to launch the agent for one execution.
#[derive(Debug, Clone)]
pub struct StartAgent {
    pub execution_id: ExecutionId,
    pub agent_type: AgentType,
    pub working_dir: PathBuf,
    pub prompt: String,
    pub model: Option<String>,
    pub idle_timeout: Duration,
}

/// Control surface of a running agent session.
#[async_trait]
pub trait SessionControl: Send + Sync {
    /// Idempotent abort; the session's event stream terminates within the
    /// abort grace period.
    async fn abort(&self);

    /// Best-effort mid-run input.
    async fn send_input(&self, text: &str) -> bool;
}

/// A started agent session: its event stream plus controls.
pub struct RunnerSession {
    pub events: mpsc::Receiver<AdapterEvent>,
    pub control: Arc<dyn SessionControl>,
}

/// Where a host executes worktree and agent operations.
#[async_trait]
pub trait HostRunner: Send + Sync {
    async fn create_worktree(
        &self,
        execution_id: &ExecutionId,
        base_branch: &str,
    ) -> Result<Worktree, RunnerError>;

    /// Launch the agent and deliver the prompt; events follow on the
    /// returned session.
    async fn start_agent(&self, request: StartAgent) -> Result<RunnerSession, RunnerError>;

    /// Idempotent; returns true when a worktree was actually removed.
    async fn destroy_worktree(&self, execution_id: &ExecutionId) -> Result<bool, RunnerError>;
}

/// Runs executions in-process: the gateway's built-in host.
pub struct LocalRunner {
    worktrees: Arc<dyn WorktreeProvider>,
    adapters: AdapterRegistry,
}

impl LocalRunner {
    pub fn new(worktrees: Arc<dyn WorktreeProvider>, adapters: AdapterRegistry) -> Self {
        Self { worktrees, adapters }
    }
}

struct HandleControl {
    handle: AdapterHandle,
}

#[async_trait]
impl SessionControl for HandleControl {
    async fn abort(&self) {
        self.handle.abort().await;
    }

    async fn send_input(&self, text: &str) -> bool {
        self.handle.send_input(text).await
    }
}

#[async_trait]
impl HostRunner for LocalRunner {
    async fn create_worktree(
        &self,
        execution_id: &ExecutionId,
        base_branch: &str,
    ) -> Result<Worktree, RunnerError> {
        Ok(self.worktrees.create(execution_id, base_branch).await?)
    }

    async fn start_agent(&self, request: StartAgent) -> Result<RunnerSession, RunnerError> {
        let adapter = self.adapters.resolve(request.agent_type);
        let mut config = AdapterConfig::new(
            request.execution_id,
            request.agent_type,
            request.working_dir.clone(),
        )
        .idle_timeout(request.idle_timeout);
        if let Some(model) = &request.model {
            config = config.model(model.clone());
        }

        let mut handle = adapter.start(config).await?;
        let events = handle.take_events().ok_or_else(|| {
            RunnerError::Adapter(AdapterError::StartFailed(
                "adapter returned no event stream".to_string(),
            ))
        })?;
        handle.submit_prompt(&request.prompt, request.model.as_deref()).await?;

        Ok(RunnerSession { events, control: Arc::new(HandleControl { handle }) })
    }

    async fn destroy_worktree(&self, execution_id: &ExecutionId) -> Result<bool, RunnerError> {
        Ok(self.worktrees.destroy(execution_id).await?)
    }
}
