// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Detects when a file has stopped being written

use std::io::ErrorKind;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::StabilityConfig;
use crate::task::{FileTask, TaskState};
use crate::{Result, SmartParseError};

/// Polls file sizes until they stop changing
#[derive(Debug, Clone)]
pub struct StabilityDetector {
    poll_interval: Duration,
    required_matches: usize,
    max_wait: Duration,
}

impl StabilityDetector {
    pub fn new(poll_interval: Duration, required_matches: usize, max_wait: Duration) -> Self {
        Self {
            poll_interval,
            required_matches: required_matches.max(1),
            max_wait,
        }
    }

    pub fn from_config(config: &StabilityConfig) -> Self {
        Self::new(config.poll_interval(), config.required_matches, config.max_wait())
    }

    /// Record one size sample; returns true once the last
    /// `required_matches` samples are identical.
    ///
    /// Any change, growth or truncation, restarts the run of matches.
    pub fn record(&self, task: &mut FileTask, size: u64) -> bool {
        if task.size_history.back().is_some_and(|last| *last != size) {
            task.size_history.clear();
        }
        task.size_history.push_back(size);
        while task.size_history.len() > self.required_matches {
            task.size_history.pop_front();
        }
        task.size_history.len() >= self.required_matches
    }

    /// Sample the task's file until it is stable, then mark it Ready.
    ///
    /// Fails with `StabilityTimeout` once `max_wait` is spent and with
    /// `Vanished` if the file is removed in the meantime.
    pub async fn wait_until_ready(&self, task: &mut FileTask) -> Result<()> {
        let start = Instant::now();
        task.advance(TaskState::Stabilizing);
        task.size_history.clear();

        loop {
            match std::fs::metadata(&task.path) {
                Ok(meta) => {
                    if self.record(task, meta.len()) {
                        task.advance(TaskState::Ready);
                        debug!("File {:?} stable at {} bytes", task.path, meta.len());
                        return Ok(());
                    }
                    debug!(
                        "File {:?} size {} ({} of {} matching samples)",
                        task.path,
                        meta.len(),
                        task.size_history.len(),
                        self.required_matches
                    );
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(SmartParseError::Vanished(task.path.clone()));
                }
                Err(e) => {
                    // Unreadable for now; counts as a non-matching sample
                    warn!("Cannot stat {:?}: {}", task.path, e);
                    task.size_history.clear();
                }
            }

            if start.elapsed() >= self.max_wait {
                warn!("File stability check timed out for {:?}", task.path);
                return Err(SmartParseError::StabilityTimeout { waited: start.elapsed() });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
