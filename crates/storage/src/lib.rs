// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vk-storage: persistence for the gateway.
//!
//! The data directory is the source of truth. Each execution owns an
//! append-only JSONL event segment plus a `run.json` record under
//! `runs/<task>/<execution>/`; tasks live in a single snapshot file.
//! After a restart the full run history and every timeline can be
//! reconstructed from disk alone.

mod event_log;
mod paths;
mod recovery;
mod run_store;
mod task_snapshot;

pub use event_log::{EventFilter, EventLog, EventPage};
pub use paths::DataLayout;
pub use recovery::{recover, RecoveryReport};
pub use run_store::{RunMetadata, RunRecord, RunStore, RunSummary};
pub use task_snapshot::TaskSnapshot;

use thiserror::Error;

/// Storage layer failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io { path: path.into(), source }
    }
}
