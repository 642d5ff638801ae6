// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `AgentAdapter` contract.
//!
//! An adapter starts one external agent process per execution and returns an
//! [`AdapterHandle`]: an ordered, finite event stream plus a control surface
//! (submit the prompt once, forward input best-effort, abort). Protocol
//! quirks stay inside the concrete adapters; the engine never sees them.

mod cli;
mod opencode;

pub use cli::CliAdapter;
pub use opencode::OpencodeAdapter;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use vk_core::{AgentEvent, AgentType, ExecutionId};

/// Errors surfaced by adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The agent binary is missing or refused to initialise in time.
    #[error("adapter start failed: {0}")]
    StartFailed(String),
    /// `submit_prompt` called before the readiness signal.
    #[error("adapter not ready for prompt")]
    NotReady,
    /// `submit_prompt` called a second time on the same handle.
    #[error("prompt already submitted")]
    AlreadySubmitted,
    #[error("agent http error: {0}")]
    Http(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything an adapter needs to launch one agent.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub execution_id: ExecutionId,
    pub agent_type: AgentType,
    /// Working directory for the agent (the execution's worktree).
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    /// Model override, format `provider/model`.
    pub model: Option<String>,
    /// Binary path override (required for `custom` agents).
    pub binary: Option<String>,
    /// Idle window after which the run is failed as stalled.
    pub idle_timeout: Duration,
}

impl AdapterConfig {
    pub fn new(execution_id: ExecutionId, agent_type: AgentType, working_dir: PathBuf) -> Self {
        Self {
            execution_id,
            agent_type,
            working_dir,
            env: Vec::new(),
            model: None,
            binary: None,
            idle_timeout: vk_core::limits::ADAPTER_IDLE_TIMEOUT,
        }
    }

    vk_core::setters! {
        set {
            env: Vec<(String, String)>,
            idle_timeout: Duration,
        }
        option {
            model: String,
            binary: String,
        }
    }
}

/// An event coming out of an adapter.
///
/// Almost everything is a normalised [`AgentEvent`]; progress markers are
/// kept separate because they become `progress` timeline entries rather
/// than `agent_event` ones. Serialisable so remote hosts can relay it over
/// their control channel.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum AdapterEvent {
    Agent(AgentEvent),
    Progress {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percentage: Option<f32>,
    },
}

impl From<AgentEvent> for AdapterEvent {
    fn from(event: AgentEvent) -> Self {
        AdapterEvent::Agent(event)
    }
}

/// Control surface of a started agent, implemented per adapter.
#[async_trait]
pub(crate) trait AdapterControl: Send + Sync {
    /// Deliver the prompt. Called at most once per handle; the handle
    /// enforces that.
    async fn submit_prompt(&self, prompt: &str, model: Option<&str>) -> Result<(), AdapterError>;

    /// Best-effort mid-run input. Returns false when the adapter cannot
    /// deliver it.
    async fn send_input(&self, text: &str) -> bool;

    /// Idempotent abort; the event stream terminates within the abort grace
    /// period and the child process is reaped.
    async fn abort(&self);
}

/// Handle to one started agent: the event stream plus its controls.
pub struct AdapterHandle {
    pub execution_id: ExecutionId,
    pub agent_type: AgentType,
    pub working_dir: PathBuf,
    events: Option<mpsc::Receiver<AdapterEvent>>,
    pub(crate) control: Arc<dyn AdapterControl>,
    ready: Arc<AtomicBool>,
    submitted: AtomicBool,
}

impl std::fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("execution_id", &self.execution_id)
            .field("agent_type", &self.agent_type)
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}

impl AdapterHandle {
    pub(crate) fn new(
        config: &AdapterConfig,
        events: mpsc::Receiver<AdapterEvent>,
        control: Arc<dyn AdapterControl>,
        ready: Arc<AtomicBool>,
    ) -> Self {
        Self {
            execution_id: config.execution_id,
            agent_type: config.agent_type,
            working_dir: config.working_dir.clone(),
            events: Some(events),
            control,
            ready,
            submitted: AtomicBool::new(false),
        }
    }

    /// Take the event stream. Yields events in agent order and terminates on
    /// end-of-conversation, process exit, or abort.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<AdapterEvent>> {
        self.events.take()
    }

    /// Deliver the prompt to the warm agent. At-most-once.
    pub async fn submit_prompt(
        &self,
        prompt: &str,
        model: Option<&str>,
    ) -> Result<(), AdapterError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(AdapterError::NotReady);
        }
        if self.submitted.swap(true, Ordering::AcqRel) {
            return Err(AdapterError::AlreadySubmitted);
        }
        self.control.submit_prompt(prompt, model).await
    }

    /// Forward runtime input to the agent. Best-effort.
    pub async fn send_input(&self, text: &str) -> bool {
        if !self.submitted.load(Ordering::Acquire) {
            tracing::warn!(execution_id = %self.execution_id, "input before prompt submission");
        }
        self.control.send_input(text).await
    }

    /// Request termination. Idempotent.
    pub async fn abort(&self) {
        self.control.abort().await;
    }
}

/// Uniform interface over the concrete agent drivers.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Launch the agent in `config.working_dir` and return a handle once it
    /// is ready for a prompt. Bounded by the warm-up timeout.
    async fn start(&self, config: AdapterConfig) -> Result<AdapterHandle, AdapterError>;
}

/// Maps agent types to their drivers. The engine resolves adapters here.
#[derive(Clone)]
pub struct AdapterRegistry {
    opencode: Arc<dyn AgentAdapter>,
    cli: Arc<dyn AgentAdapter>,
}

impl AdapterRegistry {
    /// Registry with the production drivers.
    pub fn standard() -> Self {
        Self { opencode: Arc::new(OpencodeAdapter::new()), cli: Arc::new(CliAdapter::new()) }
    }

    /// Registry routing every agent type to one driver (tests).
    pub fn uniform(adapter: Arc<dyn AgentAdapter>) -> Self {
        Self { opencode: adapter.clone(), cli: adapter }
    }

    pub fn resolve(&self, agent_type: AgentType) -> Arc<dyn AgentAdapter> {
        match agent_type {
            AgentType::Opencode => self.opencode.clone(),
            AgentType::ClaudeCode | AgentType::Codex | AgentType::GeminiCli | AgentType::Custom => {
                self.cli.clone()
            }
        }
    }
}

/// Pump raw events to the handle's channel, enforcing the idle window.
///
/// On stall: emits a fatal error event, invokes `control.abort`, and closes
/// the stream.
pub(crate) fn spawn_idle_watchdog(
    mut raw_rx: mpsc::Receiver<AdapterEvent>,
    out_tx: mpsc::Sender<AdapterEvent>,
    idle: Duration,
    control: Arc<dyn AdapterControl>,
) {
    tokio::spawn(async move {
        loop {
            match tokio::time::timeout(idle, raw_rx.recv()).await {
                Ok(Some(event)) => {
                    if out_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("agent stalled: no events within {:?}", idle);
                    let _ = out_tx
                        .send(AdapterEvent::Agent(AgentEvent::Error {
                            message: "agent stalled".to_string(),
                            recoverable: false,
                        }))
                        .await;
                    control.abort().await;
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
