// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host entity: a connected worker machine offering agent capacity.

use crate::id::{HostId, TaskId};
use crate::limits::HOST_LIVENESS_WINDOW;
use crate::task::AgentType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Connection status of a host as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Online,
    Busy,
    Offline,
}

crate::simple_display! {
    HostStatus {
        Online => "online",
        Busy => "busy",
        Offline => "offline",
    }
}

/// What a host can run, declared in its `register` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostCapabilities {
    pub supported_agents: Vec<AgentType>,
    pub max_concurrent: usize,
    /// Default working directory on the host (its repo root).
    pub cwd: PathBuf,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl HostCapabilities {
    pub fn supports(&self, agent_type: AgentType) -> bool {
        self.supported_agents.contains(&agent_type)
    }
}

/// A worker machine tracked by the host registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub host_id: HostId,
    pub name: String,
    pub status: HostStatus,
    pub capabilities: HostCapabilities,
    #[serde(default)]
    pub active_task_ids: Vec<TaskId>,
    pub last_heartbeat_ms: u64,
    pub connected_at_ms: u64,
}

impl Host {
    pub fn new(name: impl Into<String>, capabilities: HostCapabilities, now_ms: u64) -> Self {
        Self {
            host_id: HostId::new(),
            name: name.into(),
            status: HostStatus::Online,
            capabilities,
            active_task_ids: Vec::new(),
            last_heartbeat_ms: now_ms,
            connected_at_ms: now_ms,
        }
    }

    pub fn at_capacity(&self) -> bool {
        self.active_task_ids.len() >= self.capabilities.max_concurrent
    }

    /// Load ratio used for auto-selection; at-capacity and zero-capacity
    /// hosts rank as fully loaded.
    pub fn load_ratio(&self) -> f64 {
        if self.capabilities.max_concurrent == 0 {
            return 1.0;
        }
        self.active_task_ids.len() as f64 / self.capabilities.max_concurrent as f64
    }

    /// True when the last heartbeat is within the liveness window.
    pub fn is_live(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) <= HOST_LIVENESS_WINDOW.as_millis() as u64
    }

    /// Recompute `status` from capacity. Does not resurrect offline hosts;
    /// that happens on heartbeat.
    pub fn refresh_status(&mut self) {
        if self.status == HostStatus::Offline {
            return;
        }
        self.status = if self.at_capacity() { HostStatus::Busy } else { HostStatus::Online };
    }

    /// An online (or busy-but-live) host eligible to run `agent_type`.
    pub fn eligible_for(&self, agent_type: AgentType) -> bool {
        self.status != HostStatus::Offline
            && self.capabilities.supports(agent_type)
            && !self.at_capacity()
    }
}

crate::builder! {
    pub struct HostBuilder => Host {
        into {
            name: String = "test-host",
        }
        set {
            status: HostStatus = HostStatus::Online,
            capabilities: HostCapabilities = HostCapabilities {
                supported_agents: vec![
                    crate::task::AgentType::Opencode,
                    crate::task::AgentType::ClaudeCode,
                ],
                max_concurrent: 2,
                cwd: std::path::PathBuf::from("/tmp/repo"),
                labels: std::collections::HashMap::new(),
            },
            active_task_ids: Vec<TaskId> = Vec::new(),
            last_heartbeat_ms: u64 = 1_000_000,
            connected_at_ms: u64 = 1_000_000,
        }
        computed {
            host_id: HostId = HostId::new(),
        }
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
