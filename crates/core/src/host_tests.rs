// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::task::AgentType;

fn host_with_capacity(max: usize) -> Host {
    let mut host = Host::builder().build();
    host.capabilities.max_concurrent = max;
    host
}

#[test]
fn new_host_is_online_and_idle() {
    let host = Host::builder().build();
    assert_eq!(host.status, HostStatus::Online);
    assert!(host.active_task_ids.is_empty());
    assert!(!host.at_capacity());
    assert_eq!(host.load_ratio(), 0.0);
}

#[test]
fn capacity_and_load_ratio() {
    let mut host = host_with_capacity(2);
    host.active_task_ids.push(TaskId::new());
    assert_eq!(host.load_ratio(), 0.5);
    assert!(!host.at_capacity());

    host.active_task_ids.push(TaskId::new());
    assert!(host.at_capacity());
    assert_eq!(host.load_ratio(), 1.0);
}

#[test]
fn zero_capacity_host_ranks_fully_loaded() {
    let host = host_with_capacity(0);
    assert!(host.at_capacity());
    assert_eq!(host.load_ratio(), 1.0);
}

#[test]
fn refresh_status_tracks_capacity_but_not_offline() {
    let mut host = host_with_capacity(1);
    host.active_task_ids.push(TaskId::new());
    host.refresh_status();
    assert_eq!(host.status, HostStatus::Busy);

    host.active_task_ids.clear();
    host.refresh_status();
    assert_eq!(host.status, HostStatus::Online);

    host.status = HostStatus::Offline;
    host.refresh_status();
    assert_eq!(host.status, HostStatus::Offline);
}

#[test]
fn liveness_window() {
    let host = Host::builder().last_heartbeat_ms(1_000_000).build();
    assert!(host.is_live(1_000_000));
    assert!(host.is_live(1_000_000 + 60_000));
    assert!(!host.is_live(1_000_000 + 60_001));
}

#[test]
fn eligibility_requires_support_capacity_and_presence() {
    let mut host = Host::builder().build();
    assert!(host.eligible_for(AgentType::Opencode));
    assert!(!host.eligible_for(AgentType::Codex));

    host.status = HostStatus::Offline;
    assert!(!host.eligible_for(AgentType::Opencode));

    host.status = HostStatus::Online;
    host.active_task_ids = vec![TaskId::new(), TaskId::new()];
    assert!(!host.eligible_for(AgentType::Opencode));
}
