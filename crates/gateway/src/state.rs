// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared state handed to every route and websocket handler.

use crate::dto::HostDto;
use crate::lifecycle::Config;
use std::sync::Arc;
use tokio::sync::broadcast;
use vk_core::SystemClock;
use vk_engine::ExecutionEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ExecutionEngine<SystemClock>>,
    pub config: Arc<Config>,
    pub started_at_ms: u64,
    /// Fan-out of host snapshots for `host:update` frames.
    pub host_updates: broadcast::Sender<Vec<HostDto>>,
}

impl AppState {
    pub fn new(engine: Arc<ExecutionEngine<SystemClock>>, config: Arc<Config>) -> Self {
        let (host_updates, _) = broadcast::channel(64);
        let started_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self { engine, config, started_at_ms, host_updates }
    }

    /// Broadcast the current host list to subscribed clients.
    pub fn publish_hosts(&self) {
        let hosts: Vec<HostDto> =
            self.engine.hosts().list().into_iter().map(HostDto::from).collect();
        let _ = self.host_updates.send(hosts);
    }
}
