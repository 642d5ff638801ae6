// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway startup and shutdown.
//!
//! Order matters: acquire the lock file first (single-writer gateway),
//! recover persisted state next, and bind the listener last, once
//! everything that can fail has passed.

use crate::state::AppState;
use fs2::FileExt;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use vk_adapters::AdapterRegistry;
use vk_core::{AgentType, HostCapabilities, SystemClock};
use vk_engine::{
    EngineConfig, EngineDeps, ExecutionEngine, GitWorktreeManager, HostRegistry, LocalRunner,
    SubscriptionBus, TaskStore,
};
use vk_storage::{DataLayout, EventLog, RunStore, TaskSnapshot};

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Exit code 2.
    #[error("configuration error: {0}")]
    Config(String),
    /// Another gateway owns the data directory. Exit code 1.
    #[error("failed to acquire lock: {0}")]
    LockFailed(std::io::Error),
    /// Exit code 1.
    #[error("failed to bind {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),
    /// Exit code 1.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Exit code 1.
    #[error("storage error: {0}")]
    Storage(#[from] vk_storage::StorageError),
}

impl LifecycleError {
    /// CLI exit code: 0 normal, 1 fatal init failure, 2 configuration error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LifecycleError::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub listen_addr: SocketAddr,
    pub worker_url: String,
    pub repo_root: PathBuf,
    pub host_name: String,
    pub supported_agents: Vec<AgentType>,
    pub max_concurrent: usize,
    pub memory_enhanced: bool,
    pub auto_cleanup: bool,
}

impl Config {
    /// Read everything from the environment; bad values are configuration
    /// errors (exit code 2).
    pub fn from_env() -> Result<Self, LifecycleError> {
        let data_dir = crate::env::data_dir()
            .ok_or_else(|| LifecycleError::Config("cannot resolve a data directory".into()))?;
        let listen_addr = crate::env::listen_addr().map_err(LifecycleError::Config)?;
        let supported_agents =
            crate::env::supported_agents().map_err(LifecycleError::Config)?;
        if supported_agents.is_empty() {
            return Err(LifecycleError::Config("VK_SUPPORTED_AGENTS is empty".into()));
        }
        Ok(Self {
            data_dir,
            listen_addr,
            worker_url: crate::env::worker_url(),
            repo_root: crate::env::repo_root(),
            host_name: crate::env::host_name(),
            supported_agents,
            max_concurrent: crate::env::max_concurrent(),
            memory_enhanced: crate::env::memory_enhanced(),
            auto_cleanup: crate::env::auto_cleanup(),
        })
    }
}

/// A started gateway, ready to serve.
pub struct Gateway {
    pub state: AppState,
    pub listener: tokio::net::TcpListener,
    pub local_host_id: vk_core::HostId,
    _lock_file: std::fs::File,
}

/// Bring the gateway up: lock, recover, register the local host, bind.
pub async fn startup(config: Config) -> Result<Gateway, LifecycleError> {
    let layout = DataLayout::new(&config.data_dir);
    std::fs::create_dir_all(layout.root())?;
    std::fs::create_dir_all(layout.logs_dir())?;
    std::fs::create_dir_all(layout.worktrees_dir())?;

    // Lock first; the data directory has exactly one writer.
    // Avoid truncating before the lock is held, that would wipe the
    // running gateway's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(layout.lock_file())?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    std::fs::write(layout.version_file(), crate::env::VERSION)?;

    let clock = SystemClock;
    let log = Arc::new(EventLog::new(layout.clone()));
    let runs = Arc::new(RunStore::new(layout.clone()));
    let bus = Arc::new(SubscriptionBus::new(log.clone()));
    let tasks = TaskStore::load(TaskSnapshot::new(layout.clone()), clock.clone())
        .map_err(|e| LifecycleError::Config(e.to_string()))?;
    let hosts = Arc::new(HostRegistry::new(clock.clone()));

    // Close out runs that were mid-flight at the previous shutdown.
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let report = vk_storage::recover(&log, &runs, now_ms)?;
    if !report.failed_executions.is_empty() {
        info!(
            failed = report.failed_executions.len(),
            "recovery failed unterminated executions"
        );
    }
    let dangling = tasks
        .recover_dangling()
        .map_err(|e| LifecycleError::Config(e.to_string()))?;
    if !dangling.is_empty() {
        info!(reset = dangling.len(), "reset kanban projection of interrupted tasks");
    }

    let engine = ExecutionEngine::with_config(
        EngineDeps { tasks, hosts: hosts.clone(), log, runs, bus },
        EngineConfig { auto_cleanup: config.auto_cleanup, idle_timeout: crate::env::idle_timeout() },
        clock,
    );

    // The gateway always offers one built-in local host.
    let local = hosts.register(
        config.host_name.clone(),
        HostCapabilities {
            supported_agents: config.supported_agents.clone(),
            max_concurrent: config.max_concurrent,
            cwd: config.repo_root.clone(),
            labels: Default::default(),
        },
    );
    let worktrees =
        Arc::new(GitWorktreeManager::new(&config.repo_root, layout.worktrees_dir()));
    engine.register_runner(
        local.host_id,
        Arc::new(LocalRunner::new(worktrees, AdapterRegistry::standard())),
    );

    // Bind last, after everything that can fail has passed.
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.listen_addr, e))?;
    info!(addr = %config.listen_addr, data_dir = %config.data_dir.display(), "gateway listening");

    let state = AppState::new(engine, Arc::new(config));
    spawn_host_sweeper(state.clone());
    spawn_local_heartbeat(state.clone(), local.host_id);

    Ok(Gateway { state, listener, local_host_id: local.host_id, _lock_file: lock_file })
}

/// Serve until ctrl-c, then drain.
pub async fn serve(gateway: Gateway) -> Result<(), LifecycleError> {
    let app = crate::routes::router(gateway.state.clone());
    let state = gateway.state.clone();
    axum::serve(gateway.listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested, draining executions");
            shutdown(&state).await;
        })
        .await?;
    Ok(())
}

/// Cancel in-flight executions and wait out the drain window.
pub async fn shutdown(state: &AppState) {
    state.engine.abort_all();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while state.engine.active_count() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if state.engine.active_count() > 0 {
        warn!(remaining = state.engine.active_count(), "drain window elapsed");
    }
}

/// Periodically flip hosts with stale heartbeats offline.
fn spawn_host_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(crate::env::heartbeat_interval());
        loop {
            interval.tick().await;
            if !state.engine.hosts().sweep().is_empty() {
                state.publish_hosts();
            }
        }
    });
}

/// The built-in host heartbeats itself; it is alive as long as we are.
fn spawn_local_heartbeat(state: AppState, host_id: vk_core::HostId) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(crate::env::heartbeat_interval());
        loop {
            interval.tick().await;
            state.engine.hosts().heartbeat(&host_id);
        }
    });
}
