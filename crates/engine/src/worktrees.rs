// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree lifecycle: one isolated git checkout per execution.
//!
//! Creation is create-then-verify: a failed `git worktree add` leaves no
//! partial state behind. Destruction is idempotent and also deletes the
//! derived branch (never commits merged elsewhere).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use vk_adapters::subprocess::{run_with_timeout, GIT_QUERY_TIMEOUT, GIT_WORKTREE_TIMEOUT};
use vk_core::{branch_for_execution, ExecutionId, Worktree};

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("base branch missing: {0}")]
    BaseBranchMissing(String),
    #[error("worktree already exists for branch {0}")]
    WorktreeAlreadyExists(String),
    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),
    #[error("disk io: {0}")]
    DiskIo(String),
    #[error("git: {0}")]
    Git(String),
}

/// The worktree seam the engine drives. `GitWorktreeManager` is the real
/// implementation; tests substitute `FakeWorktrees`.
#[async_trait]
pub trait WorktreeProvider: Send + Sync {
    /// Create the execution's worktree off `base_branch`. Never reuses a
    /// path or branch.
    async fn create(
        &self,
        execution_id: &ExecutionId,
        base_branch: &str,
    ) -> Result<Worktree, WorktreeError>;

    /// Remove the worktree and its derived branch. Idempotent; returns
    /// true when something was actually removed.
    async fn destroy(&self, execution_id: &ExecutionId) -> Result<bool, WorktreeError>;

    /// The worktree currently tracked for an execution, if any.
    fn lookup(&self, execution_id: &ExecutionId) -> Option<Worktree>;
}

/// Real worktrees under `<data_dir>/worktrees/<execution>/`, created from
/// a configured repository root.
pub struct GitWorktreeManager {
    repo_root: PathBuf,
    worktrees_root: PathBuf,
    tracked: Mutex<HashMap<ExecutionId, Worktree>>,
}

impl GitWorktreeManager {
    pub fn new(repo_root: impl Into<PathBuf>, worktrees_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            worktrees_root: worktrees_root.into(),
            tracked: Mutex::new(HashMap::new()),
        }
    }

    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.repo_root)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");
        cmd
    }

    async fn ref_exists(&self, git_ref: &str) -> Result<bool, WorktreeError> {
        let mut cmd = self.git();
        cmd.args(["rev-parse", "--verify", "--quiet", git_ref]);
        let output = run_with_timeout(cmd, GIT_QUERY_TIMEOUT, "git rev-parse")
            .await
            .map_err(|e| WorktreeError::Git(e.to_string()))?;
        Ok(output.status.success())
    }

    async fn is_repository(&self) -> bool {
        let mut cmd = self.git();
        cmd.args(["rev-parse", "--git-dir"]);
        matches!(
            run_with_timeout(cmd, GIT_QUERY_TIMEOUT, "git rev-parse").await,
            Ok(output) if output.status.success()
        )
    }

    /// Best-effort removal of whatever `git worktree add` left behind.
    async fn remove_partial(&self, path: &Path, branch: &str) {
        let mut cmd = self.git();
        cmd.args(["worktree", "remove", "--force"]).arg(path);
        let _ = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git worktree remove").await;

        let mut cmd = self.git();
        cmd.args(["branch", "-D", branch]);
        let _ = run_with_timeout(cmd, GIT_QUERY_TIMEOUT, "git branch -D").await;

        if path.exists() {
            let _ = tokio::fs::remove_dir_all(path).await;
        }

        let mut cmd = self.git();
        cmd.args(["worktree", "prune"]);
        let _ = run_with_timeout(cmd, GIT_QUERY_TIMEOUT, "git worktree prune").await;
    }
}

#[async_trait]
impl WorktreeProvider for GitWorktreeManager {
    async fn create(
        &self,
        execution_id: &ExecutionId,
        base_branch: &str,
    ) -> Result<Worktree, WorktreeError> {
        if !self.is_repository().await {
            return Err(WorktreeError::NotARepository(self.repo_root.clone()));
        }
        if !self.ref_exists(&format!("refs/heads/{base_branch}")).await?
            && !self.ref_exists(base_branch).await?
        {
            return Err(WorktreeError::BaseBranchMissing(base_branch.to_string()));
        }

        let branch = branch_for_execution(execution_id);
        if self.ref_exists(&format!("refs/heads/{branch}")).await? {
            return Err(WorktreeError::WorktreeAlreadyExists(branch));
        }

        let path = self.worktrees_root.join(execution_id.as_str());
        if path.exists() {
            return Err(WorktreeError::WorktreeAlreadyExists(branch));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WorktreeError::DiskIo(e.to_string()))?;
        }

        let mut cmd = self.git();
        cmd.args(["worktree", "add", "-b", &branch])
            .arg(&path)
            .arg(base_branch);
        let output = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git worktree add")
            .await
            .map_err(|e| WorktreeError::Git(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            self.remove_partial(&path, &branch).await;
            return Err(WorktreeError::Git(format!(
                "git worktree add failed: {}",
                stderr.trim()
            )));
        }

        // Verify the checkout actually exists before handing it out.
        if !path.is_dir() {
            self.remove_partial(&path, &branch).await;
            return Err(WorktreeError::DiskIo(format!(
                "worktree path missing after create: {}",
                path.display()
            )));
        }

        let worktree = Worktree::new(path, base_branch, *execution_id);
        self.tracked.lock().insert(*execution_id, worktree.clone());
        tracing::info!(
            execution_id = %execution_id,
            path = %worktree.path.display(),
            branch = %worktree.branch_name,
            "worktree created"
        );
        Ok(worktree)
    }

    async fn destroy(&self, execution_id: &ExecutionId) -> Result<bool, WorktreeError> {
        let worktree = self.tracked.lock().remove(execution_id);
        let (path, branch) = match worktree {
            Some(wt) => (wt.path, wt.branch_name),
            None => {
                // Untracked (e.g. after restart): derive the locations.
                let path = self.worktrees_root.join(execution_id.as_str());
                (path, branch_for_execution(execution_id))
            }
        };

        let existed = path.exists();
        self.remove_partial(&path, &branch).await;
        if path.exists() {
            return Err(WorktreeError::DiskIo(format!(
                "worktree still present after removal: {}",
                path.display()
            )));
        }
        if existed {
            tracing::info!(execution_id = %execution_id, "worktree destroyed");
        }
        Ok(existed)
    }

    fn lookup(&self, execution_id: &ExecutionId) -> Option<Worktree> {
        self.tracked.lock().get(execution_id).cloned()
    }
}

/// In-memory worktrees backed by plain directories, for tests.
///
/// Directories are really created and removed so on-disk invariants can be
/// asserted; `hold_create` parks creation to exercise abort-during-create.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeWorktrees {
    root: PathBuf,
    tracked: Mutex<HashMap<ExecutionId, Worktree>>,
    fail_create: Mutex<Option<String>>,
    /// Level-triggered hold flag; `create` parks while true.
    hold: tokio::sync::watch::Sender<bool>,
    pub created: std::sync::atomic::AtomicUsize,
    pub destroyed: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeWorktrees {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (hold, _) = tokio::sync::watch::channel(false);
        Self {
            root: root.into(),
            tracked: Mutex::new(HashMap::new()),
            fail_create: Mutex::new(None),
            hold,
            created: std::sync::atomic::AtomicUsize::new(0),
            destroyed: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Make the next create fail with `BaseBranchMissing(reason)`.
    pub fn fail_next_create(&self, reason: impl Into<String>) {
        *self.fail_create.lock() = Some(reason.into());
    }

    /// Park `create` calls until [`FakeWorktrees::release`].
    pub fn hold_create(&self) {
        let _ = self.hold.send(true);
    }

    pub fn release(&self) {
        let _ = self.hold.send(false);
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.lock().len()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl WorktreeProvider for FakeWorktrees {
    async fn create(
        &self,
        execution_id: &ExecutionId,
        base_branch: &str,
    ) -> Result<Worktree, WorktreeError> {
        let mut hold = self.hold.subscribe();
        while *hold.borrow_and_update() {
            if hold.changed().await.is_err() {
                break;
            }
        }
        if let Some(reason) = self.fail_create.lock().take() {
            return Err(WorktreeError::BaseBranchMissing(reason));
        }
        let path = self.root.join(execution_id.as_str());
        if path.exists() {
            return Err(WorktreeError::WorktreeAlreadyExists(branch_for_execution(execution_id)));
        }
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| WorktreeError::DiskIo(e.to_string()))?;
        let worktree = Worktree::new(path, base_branch, *execution_id);
        self.tracked.lock().insert(*execution_id, worktree.clone());
        self.created.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        Ok(worktree)
    }

    async fn destroy(&self, execution_id: &ExecutionId) -> Result<bool, WorktreeError> {
        let removed = self.tracked.lock().remove(execution_id);
        let path = self.root.join(execution_id.as_str());
        let existed = path.exists();
        if existed {
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(|e| WorktreeError::DiskIo(e.to_string()))?;
        }
        if removed.is_some() || existed {
            self.destroyed.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        }
        Ok(existed)
    }

    fn lookup(&self, execution_id: &ExecutionId) -> Option<Worktree> {
        self.tracked.lock().get(execution_id).cloned()
    }
}

#[cfg(test)]
#[path = "worktrees_tests.rs"]
mod tests;
