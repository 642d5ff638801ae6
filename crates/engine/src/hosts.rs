// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host registry: connected workers, their capacity, and selection.
//!
//! All mutations run under one lock; selection reads a consistent snapshot
//! and reservation is atomic with the capacity check.

use parking_lot::Mutex;
use std::collections::HashMap;
use vk_core::{
    AgentType, Clock, GatewayError, Host, HostCapabilities, HostId, HostStatus, TaskId,
};

pub struct HostRegistry<C: Clock> {
    clock: C,
    hosts: Mutex<HashMap<HostId, Host>>,
}

impl<C: Clock> HostRegistry<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, hosts: Mutex::new(HashMap::new()) }
    }

    /// Register a host from its `register{capabilities}` frame.
    pub fn register(&self, name: impl Into<String>, capabilities: HostCapabilities) -> Host {
        let host = Host::new(name, capabilities, self.clock.epoch_ms());
        let snapshot = host.clone();
        self.hosts.lock().insert(host.host_id, host);
        tracing::info!(host_id = %snapshot.host_id, name = %snapshot.name, "host registered");
        snapshot
    }

    /// Record a heartbeat; revives offline hosts.
    pub fn heartbeat(&self, host_id: &HostId) -> bool {
        let mut hosts = self.hosts.lock();
        let Some(host) = hosts.get_mut(host_id) else {
            return false;
        };
        host.last_heartbeat_ms = self.clock.epoch_ms();
        if host.status == HostStatus::Offline {
            tracing::info!(host_id = %host_id, "host back online");
            host.status = HostStatus::Online;
        }
        host.refresh_status();
        true
    }

    /// Mark hosts with stale heartbeats offline; returns the ones flipped.
    pub fn sweep(&self) -> Vec<HostId> {
        let now = self.clock.epoch_ms();
        let mut flipped = Vec::new();
        let mut hosts = self.hosts.lock();
        for host in hosts.values_mut() {
            if host.status != HostStatus::Offline && !host.is_live(now) {
                host.status = HostStatus::Offline;
                flipped.push(host.host_id);
                tracing::warn!(host_id = %host.host_id, name = %host.name, "host missed heartbeat");
            }
        }
        flipped
    }

    /// Explicitly mark a host offline (control channel closed).
    pub fn disconnect(&self, host_id: &HostId) {
        let mut hosts = self.hosts.lock();
        if let Some(host) = hosts.get_mut(host_id) {
            host.status = HostStatus::Offline;
        }
    }

    /// Pick a host for `agent_type`.
    ///
    /// With `explicit`, that host must be present, online, supporting the
    /// agent, and under capacity. Otherwise: least load ratio first, ties
    /// broken by earliest `connected_at_ms`.
    pub fn select(
        &self,
        agent_type: AgentType,
        explicit: Option<HostId>,
    ) -> Result<HostId, GatewayError> {
        let hosts = self.hosts.lock();

        if let Some(host_id) = explicit {
            let host = hosts
                .get(&host_id)
                .ok_or_else(|| GatewayError::not_found(format!("host {host_id} not found")))?;
            if host.status == HostStatus::Offline {
                return Err(GatewayError::precondition(format!("host {} is offline", host.name)));
            }
            if !host.capabilities.supports(agent_type) {
                return Err(GatewayError::precondition(format!(
                    "host {} does not support {agent_type}",
                    host.name
                )));
            }
            if host.at_capacity() {
                return Err(GatewayError::precondition(format!(
                    "host {} is at capacity",
                    host.name
                )));
            }
            return Ok(host_id);
        }

        hosts
            .values()
            .filter(|h| h.eligible_for(agent_type))
            .min_by(|a, b| {
                a.load_ratio()
                    .partial_cmp(&b.load_ratio())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.connected_at_ms.cmp(&b.connected_at_ms))
            })
            .map(|h| h.host_id)
            .ok_or_else(|| GatewayError::no_host_available(agent_type))
    }

    /// Reserve capacity for a task. Atomic with the capacity check.
    pub fn reserve(&self, host_id: &HostId, task_id: &TaskId) -> Result<(), GatewayError> {
        let mut hosts = self.hosts.lock();
        let host = hosts
            .get_mut(host_id)
            .ok_or_else(|| GatewayError::not_found(format!("host {host_id} not found")))?;
        if host.status == HostStatus::Offline {
            return Err(GatewayError::precondition(format!("host {} is offline", host.name)));
        }
        if host.at_capacity() {
            return Err(GatewayError::precondition(format!("host {} is at capacity", host.name)));
        }
        if !host.active_task_ids.contains(task_id) {
            host.active_task_ids.push(*task_id);
        }
        host.refresh_status();
        Ok(())
    }

    /// Release a reservation. Idempotent.
    pub fn release(&self, host_id: &HostId, task_id: &TaskId) {
        let mut hosts = self.hosts.lock();
        if let Some(host) = hosts.get_mut(host_id) {
            host.active_task_ids.retain(|t| t != task_id);
            host.refresh_status();
        }
    }

    pub fn get(&self, host_id: &HostId) -> Option<Host> {
        self.hosts.lock().get(host_id).cloned()
    }

    /// Snapshot of all hosts, stable order by connection time.
    pub fn list(&self) -> Vec<Host> {
        let mut hosts: Vec<Host> = self.hosts.lock().values().cloned().collect();
        hosts.sort_by(|a, b| {
            a.connected_at_ms
                .cmp(&b.connected_at_ms)
                .then_with(|| a.host_id.as_str().cmp(b.host_id.as_str()))
        });
        hosts
    }
}

#[cfg(test)]
#[path = "hosts_tests.rs"]
mod tests;
