// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Websocket frame types.
//!
//! Two channels share the JSON `{"type": "...", ...}` framing: the client
//! subscription channel (`/ws/client`) and the host control channel
//! (`/ws/host`). Host-channel requests carry a correlation id echoed in
//! the reply.

use crate::dto::HostDto;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use vk_adapters::AdapterEvent;
use vk_core::{
    AgentType, ExecutionEvent, ExecutionId, GatewayError, KanbanBoard, KanbanStatus, TaskId,
    Worktree,
};

// --- client subscription channel ---

/// Client → gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    #[serde(rename = "task:execute")]
    TaskExecute {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        #[serde(default, rename = "agentType", skip_serializing_if = "Option::is_none")]
        agent_type: Option<AgentType>,
        #[serde(default, rename = "baseBranch", skip_serializing_if = "Option::is_none")]
        base_branch: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    #[serde(rename = "task:stop")]
    TaskStop {
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },
    #[serde(rename = "task:input")]
    TaskInput {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        content: String,
    },
    #[serde(rename = "task:history")]
    TaskHistory {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        #[serde(default, rename = "sinceSeq")]
        since_seq: Option<u64>,
    },
    #[serde(rename = "kanban:request-sync")]
    KanbanRequestSync,
}

/// Gateway → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "task:execution_event")]
    ExecutionEvent { event: ExecutionEvent },
    #[serde(rename = "task:status")]
    TaskStatus {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        status: KanbanStatus,
    },
    #[serde(rename = "kanban:sync")]
    KanbanSync { board: KanbanBoard },
    #[serde(rename = "host:update")]
    HostUpdate { hosts: Vec<HostDto> },
    #[serde(rename = "error")]
    Error { error: GatewayError },
}

// --- host control channel ---

/// Host → gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostFrame {
    /// First frame on the channel.
    Register {
        name: String,
        capabilities: HostCapabilitiesDto,
    },
    Heartbeat,
    WorktreeCreated {
        request_id: String,
        worktree: Worktree,
    },
    WorktreeDestroyed {
        request_id: String,
        existed: bool,
    },
    AgentStarted {
        request_id: String,
    },
    InputResult {
        request_id: String,
        delivered: bool,
    },
    /// Any request that could not be served.
    RequestFailed {
        request_id: String,
        message: String,
    },
    /// Live relay of one adapter event.
    AgentEvent {
        execution_id: ExecutionId,
        event: AdapterEvent,
    },
    /// The remote adapter stream terminated.
    AgentFinished {
        execution_id: ExecutionId,
    },
}

/// Gateway → host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayFrame {
    /// Ack of `register`.
    Registered { host_id: vk_core::HostId },
    CreateWorktree {
        request_id: String,
        execution_id: ExecutionId,
        base_branch: String,
    },
    StartAgent {
        request_id: String,
        execution_id: ExecutionId,
        agent_type: AgentType,
        working_dir: PathBuf,
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    Abort {
        execution_id: ExecutionId,
    },
    SendInput {
        request_id: String,
        execution_id: ExecutionId,
        text: String,
    },
    DestroyWorktree {
        request_id: String,
        execution_id: ExecutionId,
    },
}

/// Capabilities as declared on the wire (host-chosen agents and limits).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostCapabilitiesDto {
    pub supported_agents: Vec<AgentType>,
    pub max_concurrent: usize,
    pub cwd: PathBuf,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl From<HostCapabilitiesDto> for vk_core::HostCapabilities {
    fn from(dto: HostCapabilitiesDto) -> Self {
        Self {
            supported_agents: dto.supported_agents,
            max_concurrent: dto.max_concurrent,
            cwd: dto.cwd,
            labels: dto.labels,
        }
    }
}

impl From<vk_core::HostCapabilities> for HostCapabilitiesDto {
    fn from(caps: vk_core::HostCapabilities) -> Self {
        Self {
            supported_agents: caps.supported_agents,
            max_concurrent: caps.max_concurrent,
            cwd: caps.cwd,
            labels: caps.labels,
        }
    }
}

/// Fresh correlation id for a host-channel request.
pub fn request_id() -> String {
    nanoid::nanoid!(12)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
