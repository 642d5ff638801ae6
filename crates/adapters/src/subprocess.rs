// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded subprocess execution for one-shot commands (git operations).

use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Bound on a single `git worktree` operation.
pub const GIT_WORKTREE_TIMEOUT: Duration = vk_core::limits::WORKTREE_CREATE_TIMEOUT;

/// Bound on short git queries (rev-parse and friends).
pub const GIT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("{label} timed out after {timeout_secs}s")]
    Timeout { label: String, timeout_secs: u64 },
    #[error("{label} failed to spawn: {source}")]
    Spawn { label: String, source: std::io::Error },
}

/// Run a command to completion with a hard timeout, killing it on expiry.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
) -> Result<Output, SubprocessError> {
    cmd.kill_on_drop(true);
    let fut = cmd.output();
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(SubprocessError::Spawn { label: label.to_string(), source }),
        Err(_) => Err(SubprocessError::Timeout {
            label: label.to_string(),
            timeout_secs: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
