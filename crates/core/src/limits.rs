// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared timeout and buffer constants.

use std::time::Duration;

/// How long an adapter may take to become ready after start.
pub const ADAPTER_WARMUP_TIMEOUT: Duration = Duration::from_secs(60);

/// No agent events within this window fails the run as stalled.
pub const ADAPTER_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// After abort, the event stream must terminate within this window.
pub const ABORT_GRACE: Duration = Duration::from_secs(5);

/// Bound on a single `git worktree add`.
pub const WORKTREE_CREATE_TIMEOUT: Duration = Duration::from_secs(30);

/// A host with no heartbeat inside this window is marked offline.
pub const HOST_LIVENESS_WINDOW: Duration = Duration::from_secs(60);

/// Expected host heartbeat interval.
pub const HOST_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Per-subscriber event buffer; subscribers that fall behind are dropped.
pub const SUBSCRIBER_BUFFER: usize = 1024;
