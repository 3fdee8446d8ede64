// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! The per-run pipeline context and per-file processing

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::describer::ContentDescriber;
use crate::dispatcher::{Category, Dispatcher};
use crate::failure::FailureHandler;
use crate::handlers;
use crate::mover::{Mover, MAX_COLLISIONS};
use crate::naming::{NameBuilder, RenamePlan};
use crate::oplog::{LogEntry, OperationLog};
use crate::task::{FileTask, TaskState};
use crate::watcher::{scan_directory, FileFilter};
use crate::{Result, SmartParseError};

/// In-memory record of which paths are in flight or finished
#[derive(Debug, Default)]
pub struct TaskTracker {
    active: HashMap<PathBuf, TaskState>,
    terminal: HashSet<PathBuf>,
}

impl TaskTracker {
    const PRUNE_THRESHOLD: usize = 1024;

    /// Start tracking `path`; false if it is already active or finished
    pub fn claim(&mut self, path: &Path) -> bool {
        if self.active.contains_key(path) || self.terminal.contains(path) {
            return false;
        }
        self.active.insert(path.to_path_buf(), TaskState::Discovered);
        true
    }

    pub fn update(&mut self, path: &Path, state: TaskState) {
        if let Some(current) = self.active.get_mut(path) {
            *current = state;
        }
    }

    pub fn state(&self, path: &Path) -> Option<TaskState> {
        self.active.get(path).copied()
    }

    /// Stop tracking a finished task, remembering `left_at` so rescans skip
    /// it. Only files still sitting where a scan would find them need this.
    pub fn finish(&mut self, source: &Path, left_at: Option<PathBuf>) {
        self.active.remove(source);
        if let Some(path) = left_at {
            self.terminal.insert(path);
        }
        if self.terminal.len() > Self::PRUNE_THRESHOLD {
            self.terminal.retain(|p| p.exists());
        }
    }

    /// Forget finished files for which `keep` is false
    pub fn retain_terminal(&mut self, keep: impl FnMut(&PathBuf) -> bool) {
        self.terminal.retain(keep);
    }

    /// Forget a task that never reached a terminal state (e.g. it vanished)
    pub fn release(&mut self, path: &Path) {
        self.active.remove(path);
    }

    pub fn is_terminal(&self, path: &Path) -> bool {
        self.terminal.contains(path)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn terminal_count(&self) -> usize {
        self.terminal.len()
    }
}

/// Everything one run needs, owned by the run and shared by reference
pub struct Pipeline {
    config: AppConfig,
    watch_root: PathBuf,
    output_root: PathBuf,
    filter: FileFilter,
    dispatcher: Dispatcher,
    names: NameBuilder,
    mover: Mover,
    failures: FailureHandler,
    describer: Arc<dyn ContentDescriber>,
    log: OperationLog,
    tracker: Mutex<TaskTracker>,
    dry_run: bool,
    /// Destinations already reported by this dry run
    dry_run_names: Mutex<HashSet<PathBuf>>,
}

impl Pipeline {
    /// Build the context; fails if the watch directory cannot be resolved
    /// or the log cannot be opened.
    pub fn new(config: AppConfig, describer: Arc<dyn ContentDescriber>) -> Result<Self> {
        config.validate()?;

        let watch_root = config.watch_root();
        let watch_root = watch_root
            .canonicalize()
            .map_err(|source| SmartParseError::WatchRootUnreadable { path: watch_root, source })?;

        let output_root = match &config.output_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                PathBuf::from(root).canonicalize()?
            }
            None => watch_root.clone(),
        };

        let log = OperationLog::open(Path::new(&config.log_path))?;
        let log_path = log.path().canonicalize()?;

        let mut filter = FileFilter::new(&config.ignore_patterns, &config.naming.failure_marker)?
            .exclude_file(log_path);
        for category in Category::ALL {
            filter = filter.exclude_dir(output_root.join(category.folder()));
        }

        Ok(Self {
            dispatcher: Dispatcher::new(&config),
            names: NameBuilder::new(&config.naming),
            mover: Mover::from_config(&config.mover),
            failures: FailureHandler::new(&config.naming.failure_marker),
            config,
            watch_root,
            output_root,
            filter,
            describer,
            log,
            tracker: Mutex::new(TaskTracker::default()),
            dry_run: false,
            dry_run_names: Mutex::new(HashSet::new()),
        })
    }

    /// Describe files and log outcomes without touching them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn watch_root(&self) -> &Path {
        &self.watch_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn filter(&self) -> &FileFilter {
        &self.filter
    }

    pub fn tracker(&self) -> MutexGuard<'_, TaskTracker> {
        self.tracker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Files in the watch tree that have not reached a terminal state,
    /// including ones already queued or in flight
    pub fn scan_pending(&self) -> Result<Vec<PathBuf>> {
        let files = scan_directory(&self.watch_root, &self.filter)?;
        let mut tracker = self.tracker();
        // files are sorted; drop finished entries that left the tree
        tracker.retain_terminal(|p| files.binary_search(p).is_ok());
        Ok(files.into_iter().filter(|p| !tracker.is_terminal(p)).collect())
    }

    /// Turn a path into a tracked task unless it is already known
    pub fn track(&self, path: PathBuf) -> Option<FileTask> {
        self.tracker()
            .claim(&path)
            .then(|| FileTask::discovered(path))
    }

    /// Track a task produced elsewhere (the watcher)
    pub fn track_task(&self, task: FileTask) -> Option<FileTask> {
        self.tracker().claim(&task.path).then_some(task)
    }

    pub fn set_state(&self, path: &Path, state: TaskState) {
        self.tracker().update(path, state);
    }

    pub fn release(&self, path: &Path) {
        self.tracker().release(path);
    }

    /// Resolve the task's category without advancing it
    pub fn classify(&self, task: &mut FileTask) -> Result<Category> {
        self.dispatcher.classify(task)
    }

    /// Run a Ready task to a terminal state
    pub async fn process(&self, mut task: FileTask) -> TaskState {
        info!("Processing: {:?}", task.path);

        match self.complete(&mut task).await {
            Ok(entry) => {
                if let Err(e) = self.log.record(&entry) {
                    error!("Failed to write log entry for {:?}: {}", task.path, e);
                }
                let relocated = if self.dry_run { None } else { entry.destination.as_deref() };
                self.finish(&task.path, relocated);
                TaskState::Renamed
            }
            Err(e) => self.fail(task, e),
        }
    }

    async fn complete(&self, task: &mut FileTask) -> Result<LogEntry> {
        let category = self.dispatcher.dispatch(task)?;
        self.set_state(&task.path, TaskState::Dispatched);

        let payload = handlers::extract(category, &task.path, self.config.ai_engine.excerpt_chars)?;
        let request = self.dispatcher.request(task, category, payload);
        let raw = self.describer.describe(&request).await?;
        task.advance(TaskState::Described);
        self.set_state(&task.path, TaskState::Described);

        let stem = task
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let plan = self.names.plan(&raw, &stem, category, task.first_seen, &task.extension);
        let keyword = self.names.keyword_for(&plan.description, category);
        let dir = self.output_root.join(category.folder());
        let file_hash = handlers::content_hash(&task.path).ok();

        let destination = if self.dry_run {
            let destination = self.reserve_dry_run_name(&dir, &plan);
            info!("DRY RUN: Would rename {:?} to {:?}", task.path, destination);
            destination
        } else {
            self.mover.relocate(&task.path, &dir, &plan).await?
        };
        task.advance(TaskState::Renamed);

        let mut entry = LogEntry::success(task.path.clone(), destination);
        entry.category = Some(category);
        entry.keyword = Some(keyword);
        entry.description = Some(plan.description);
        entry.file_hash = file_hash;
        Ok(entry)
    }

    /// Move a task to Failed: mark the file, log the reason, stop tracking.
    ///
    /// Never fails itself; problems marking or logging are reported and the
    /// task is still terminal.
    pub fn fail(&self, mut task: FileTask, err: SmartParseError) -> TaskState {
        let reason = err.to_string();
        error!("Failed to process {:?}: {}", task.path, reason);

        let destination = if self.dry_run {
            None
        } else {
            match self.failures.mark(&task.path) {
                Ok(marked) => Some(marked),
                Err(e) => {
                    warn!("Could not mark {:?} as failed: {}", task.path, e);
                    None
                }
            }
        };
        task.advance(TaskState::Failed);

        let mut entry = LogEntry::failure(task.path.clone(), destination.clone(), reason);
        entry.category = task.category;
        if let Err(e) = self.log.record(&entry) {
            error!("Failed to write log entry for {:?}: {}", task.path, e);
        }

        self.finish(&task.path, destination.as_deref());
        TaskState::Failed
    }

    /// End tracking; the final location is remembered only while scans
    /// would still pick it up (dry runs, files that could not be marked)
    fn finish(&self, source: &Path, relocated_to: Option<&Path>) {
        let left_at = relocated_to.unwrap_or(source);
        let remember = self.filter.accepts(left_at).then(|| left_at.to_path_buf());
        self.tracker().finish(source, remember);
    }

    /// First name of `plan` that is neither on disk nor already reported
    fn reserve_dry_run_name(&self, dir: &Path, plan: &RenamePlan) -> PathBuf {
        let mut reserved = self.dry_run_names.lock().unwrap_or_else(|e| e.into_inner());
        let free = (0..MAX_COLLISIONS)
            .map(|n| dir.join(plan.file_name(n)))
            .find(|candidate| !candidate.exists() && !reserved.contains(candidate));
        let destination = free.unwrap_or_else(|| dir.join(plan.file_name(0)));
        reserved.insert(destination.clone());
        destination
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Fast-polling configuration rooted at `root`, logging into `log_dir`
    pub fn test_config(root: &Path, log_dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.watch_path = root.to_string_lossy().into_owned();
        config.log_path = log_dir.join("ops.jsonl").to_string_lossy().into_owned();
        config.stability.poll_interval_ms = 5;
        config.stability.required_matches = 2;
        config.stability.max_wait_secs = 5;
        config.mover.backoff_ms = 1;
        config
    }
}
