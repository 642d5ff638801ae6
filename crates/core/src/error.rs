// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller-facing error taxonomy.
//!
//! Every synchronous operation surfaces a `GatewayError` with a stable
//! `kind` tag; in-flight failures of a started execution surface only
//! through the event stream.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error kind tags reported to callers as `{kind, message}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input; no state change.
    Validation,
    /// Operation not allowed in the current state.
    PreconditionFailed,
    /// Requested entity does not exist.
    NotFound,
    /// Agent adapter failure.
    Adapter,
    /// Worktree or event-log I/O failure.
    Io,
    /// User-initiated cancellation; never counted as an error.
    Cancelled,
    /// The gateway is refusing work (event log unavailable).
    Unavailable,
}

crate::simple_display! {
    ErrorKind {
        Validation => "validation",
        PreconditionFailed => "precondition_failed",
        NotFound => "not_found",
        Adapter => "adapter",
        Io => "io",
        Cancelled => "cancelled",
        Unavailable => "unavailable",
    }
}

/// Structured error returned by caller-facing gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PreconditionFailed, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn adapter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Adapter, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// Rejection used when a task already has a live execution.
    pub fn already_executing(task_id: &crate::id::TaskId) -> Self {
        Self::precondition(format!("task {task_id} is already executing"))
    }

    /// Rejection used when no host can serve the requested agent.
    pub fn no_host_available(agent: crate::task::AgentType) -> Self {
        Self::precondition(format!("no host available for agent {agent}"))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
