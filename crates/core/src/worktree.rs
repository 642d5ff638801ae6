// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree record: an isolated git checkout owned by one execution.

use crate::id::ExecutionId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix of every execution branch.
pub const BRANCH_PREFIX: &str = "vk/exec/";

/// Derive the deterministic branch name for an execution.
///
/// Example: `vk/exec/a1b2c3d4`.
pub fn branch_for_execution(execution_id: &ExecutionId) -> String {
    format!("{}{}", BRANCH_PREFIX, execution_id.short(8))
}

/// An isolated git checkout used as the working directory of one execution.
///
/// A worktree has exactly one owning execution for its entire lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worktree {
    pub path: PathBuf,
    pub branch_name: String,
    pub base_branch: String,
    pub owner_execution_id: ExecutionId,
}

impl Worktree {
    pub fn new(
        path: PathBuf,
        base_branch: impl Into<String>,
        owner_execution_id: ExecutionId,
    ) -> Self {
        Self {
            path,
            branch_name: branch_for_execution(&owner_execution_id),
            base_branch: base_branch.into(),
            owner_execution_id,
        }
    }
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
