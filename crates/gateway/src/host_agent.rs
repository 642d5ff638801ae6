// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-agent mode (`vkd host`): offer this machine's capacity to a
//! gateway.
//!
//! Connects to the gateway's host control channel, registers capabilities,
//! heartbeats, and serves worktree/agent frames with the same local runner
//! the gateway uses for its built-in host. Exact inverse of the gateway's
//! `RemoteRunner`.

use crate::lifecycle::LifecycleError;
use crate::protocol::{GatewayFrame, HostCapabilitiesDto, HostFrame};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use vk_adapters::AdapterRegistry;
use vk_core::{AgentType, ExecutionId};
use vk_engine::{GitWorktreeManager, HostRunner, LocalRunner, SessionControl, StartAgent};

/// Configuration of the host-agent mode.
#[derive(Debug, Clone)]
pub struct HostAgentConfig {
    pub gateway_url: String,
    pub name: String,
    pub repo_root: PathBuf,
    pub worktrees_dir: PathBuf,
    pub supported_agents: Vec<AgentType>,
    pub max_concurrent: usize,
}

impl HostAgentConfig {
    pub fn from_env(gateway_url: String) -> Result<Self, LifecycleError> {
        let data_dir = crate::env::data_dir()
            .ok_or_else(|| LifecycleError::Config("cannot resolve a data directory".into()))?;
        let supported_agents =
            crate::env::supported_agents().map_err(LifecycleError::Config)?;
        Ok(Self {
            gateway_url,
            name: crate::env::host_name(),
            repo_root: crate::env::repo_root(),
            worktrees_dir: vk_storage::DataLayout::new(data_dir).worktrees_dir(),
            supported_agents,
            max_concurrent: crate::env::max_concurrent(),
        })
    }
}

type Sessions = Arc<Mutex<HashMap<ExecutionId, Arc<dyn SessionControl>>>>;

/// Connect, register, and serve frames until the connection closes.
pub async fn run(config: HostAgentConfig) -> Result<(), LifecycleError> {
    std::fs::create_dir_all(&config.worktrees_dir)?;
    let runner: Arc<dyn HostRunner> = Arc::new(LocalRunner::new(
        Arc::new(GitWorktreeManager::new(&config.repo_root, &config.worktrees_dir)),
        AdapterRegistry::standard(),
    ));

    let url = format!("{}/ws/host", config.gateway_url.trim_end_matches('/'));
    info!(%url, "connecting to gateway");
    let (socket, _) = connect_async(&url)
        .await
        .map_err(|e| LifecycleError::Config(format!("cannot reach gateway at {url}: {e}")))?;
    let (mut sink, mut stream) = socket.split();

    let (out_tx, mut out_rx) = mpsc::channel::<HostFrame>(256);
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let Ok(body) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(body.into())).await.is_err() {
                break;
            }
        }
    });

    let register = HostFrame::Register {
        name: config.name.clone(),
        capabilities: HostCapabilitiesDto {
            supported_agents: config.supported_agents.clone(),
            max_concurrent: config.max_concurrent,
            cwd: config.repo_root.clone(),
            labels: HashMap::new(),
        },
    };
    out_tx
        .send(register)
        .await
        .map_err(|_| LifecycleError::Config("gateway closed during registration".into()))?;

    // Heartbeat forever; the gateway marks us offline if we stop.
    let heartbeat_tx = out_tx.clone();
    let heartbeat = tokio::spawn(async move {
        let mut interval = tokio::time::interval(crate::env::heartbeat_interval());
        loop {
            interval.tick().await;
            if heartbeat_tx.send(HostFrame::Heartbeat).await.is_err() {
                break;
            }
        }
    });

    let sessions: Sessions = Arc::new(Mutex::new(HashMap::new()));
    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(body) = message else {
            continue;
        };
        match serde_json::from_str::<GatewayFrame>(&body) {
            Ok(frame) => {
                handle_frame(frame, runner.clone(), sessions.clone(), out_tx.clone()).await;
            }
            Err(e) => warn!(error = %e, "bad gateway frame"),
        }
    }

    info!("gateway connection closed");
    heartbeat.abort();
    writer.abort();
    Ok(())
}

async fn handle_frame(
    frame: GatewayFrame,
    runner: Arc<dyn HostRunner>,
    sessions: Sessions,
    out: mpsc::Sender<HostFrame>,
) {
    match frame {
        GatewayFrame::Registered { host_id } => {
            info!(%host_id, "registered with gateway");
        }
        GatewayFrame::CreateWorktree { request_id, execution_id, base_branch } => {
            tokio::spawn(async move {
                let reply = match runner.create_worktree(&execution_id, &base_branch).await {
                    Ok(worktree) => HostFrame::WorktreeCreated { request_id, worktree },
                    Err(e) => {
                        HostFrame::RequestFailed { request_id, message: e.to_string() }
                    }
                };
                let _ = out.send(reply).await;
            });
        }
        GatewayFrame::StartAgent {
            request_id,
            execution_id,
            agent_type,
            working_dir,
            prompt,
            model,
        } => {
            tokio::spawn(async move {
                let request = StartAgent {
                    execution_id,
                    agent_type,
                    working_dir,
                    prompt,
                    model,
                    idle_timeout: crate::env::idle_timeout(),
                };
                match runner.start_agent(request).await {
                    Ok(mut session) => {
                        sessions.lock().insert(execution_id, session.control.clone());
                        let _ = out.send(HostFrame::AgentStarted { request_id }).await;
                        while let Some(event) = session.events.recv().await {
                            let frame = HostFrame::AgentEvent { execution_id, event };
                            if out.send(frame).await.is_err() {
                                break;
                            }
                        }
                        sessions.lock().remove(&execution_id);
                        let _ = out.send(HostFrame::AgentFinished { execution_id }).await;
                    }
                    Err(e) => {
                        let _ = out
                            .send(HostFrame::RequestFailed {
                                request_id,
                                message: e.to_string(),
                            })
                            .await;
                    }
                }
            });
        }
        GatewayFrame::Abort { execution_id } => {
            let control = sessions.lock().get(&execution_id).cloned();
            if let Some(control) = control {
                tokio::spawn(async move { control.abort().await });
            }
        }
        GatewayFrame::SendInput { request_id, execution_id, text } => {
            let control = sessions.lock().get(&execution_id).cloned();
            tokio::spawn(async move {
                let delivered = match control {
                    Some(control) => control.send_input(&text).await,
                    None => false,
                };
                let _ = out.send(HostFrame::InputResult { request_id, delivered }).await;
            });
        }
        GatewayFrame::DestroyWorktree { request_id, execution_id } => {
            tokio::spawn(async move {
                let reply = match runner.destroy_worktree(&execution_id).await {
                    Ok(existed) => HostFrame::WorktreeDestroyed { request_id, existed },
                    Err(e) => {
                        HostFrame::RequestFailed { request_id, message: e.to_string() }
                    }
                };
                let _ = out.send(reply).await;
            });
        }
    }
}
