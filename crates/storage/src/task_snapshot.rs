// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task table snapshot: the whole table in one JSON file, replaced
//! atomically on every mutation.

use crate::paths::DataLayout;
use crate::StorageError;
use serde::{Deserialize, Serialize};
use vk_core::Task;

pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    tasks: Vec<Task>,
}

/// Persistence for the task table.
pub struct TaskSnapshot {
    layout: DataLayout,
}

impl TaskSnapshot {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Load all tasks; an absent file is an empty table.
    pub fn load(&self) -> Result<Vec<Task>, StorageError> {
        let path = self.layout.tasks_file();
        let body = match std::fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&path, e)),
        };
        let file: SnapshotFile = serde_json::from_slice(&body)?;
        if file.version > CURRENT_SNAPSHOT_VERSION {
            return Err(StorageError::Corrupt(format!(
                "tasks snapshot version {} is newer than supported {}",
                file.version, CURRENT_SNAPSHOT_VERSION
            )));
        }
        Ok(file.tasks)
    }

    /// Write the table via temp-file-and-rename.
    pub fn save(&self, tasks: &[Task]) -> Result<(), StorageError> {
        let path = self.layout.tasks_file();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        let file =
            SnapshotFile { version: CURRENT_SNAPSHOT_VERSION, tasks: tasks.to_vec() };
        let body = serde_json::to_vec_pretty(&file)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| StorageError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| StorageError::io(&path, e))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "task_snapshot_tests.rs"]
mod tests;
