// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-file pipeline state

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::dispatcher::Category;

/// Lifecycle of a file moving through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Discovered,
    Stabilizing,
    Ready,
    Dispatched,
    Described,
    Renamed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Renamed | TaskState::Failed)
    }
}

/// A file tracked from its first watcher signal until it is renamed or failed
#[derive(Debug, Clone)]
pub struct FileTask {
    pub id: Uuid,
    pub path: PathBuf,
    /// Lowercase extension without the dot, empty if there is none
    pub extension: String,
    pub category: Option<Category>,
    pub first_seen: DateTime<Local>,
    /// Most recent size samples, oldest first
    pub size_history: VecDeque<u64>,
    pub state: TaskState,
}

impl FileTask {
    pub fn discovered(path: PathBuf) -> Self {
        let extension = extension_of(&path);
        Self {
            id: Uuid::new_v4(),
            path,
            extension,
            category: None,
            first_seen: Local::now(),
            size_history: VecDeque::new(),
            state: TaskState::Discovered,
        }
    }

    pub fn advance(&mut self, state: TaskState) {
        tracing::trace!(task = %self.id, from = ?self.state, to = ?state, "State change");
        self.state = state;
    }

    /// File name as displayed in logs
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}
