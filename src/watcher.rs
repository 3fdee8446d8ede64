// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system watcher and directory scanning

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::task::FileTask;
use crate::{Result, SmartParseError};

/// Decides which paths are ever turned into tasks
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    ignore: Vec<glob::Pattern>,
    excluded_dirs: Vec<PathBuf>,
    excluded_files: Vec<PathBuf>,
    failure_marker: String,
}

impl FileFilter {
    pub fn new(ignore_patterns: &[String], failure_marker: &str) -> Result<Self> {
        let ignore = ignore_patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| {
                    SmartParseError::Config(format!("invalid ignore pattern {:?}: {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            ignore,
            excluded_dirs: Vec::new(),
            excluded_files: Vec::new(),
            failure_marker: failure_marker.to_string(),
        })
    }

    /// Never descend into or report anything below `dir`
    pub fn exclude_dir(mut self, dir: PathBuf) -> Self {
        self.excluded_dirs.push(dir);
        self
    }

    pub fn exclude_file(mut self, file: PathBuf) -> Self {
        self.excluded_files.push(file);
        self
    }

    pub fn is_excluded_dir(&self, dir: &Path) -> bool {
        self.excluded_dirs.iter().any(|d| dir.starts_with(d))
    }

    /// Check if a file should become a task
    pub fn accepts(&self, path: &Path) -> bool {
        if !should_process(path) {
            return false;
        }

        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return false,
        };

        if !self.failure_marker.is_empty() && filename.starts_with(&self.failure_marker) {
            return false;
        }
        if self.ignore.iter().any(|p| p.matches(filename)) {
            return false;
        }
        if self.excluded_files.iter().any(|f| f == path) {
            return false;
        }
        !path.parent().is_some_and(|dir| self.is_excluded_dir(dir))
    }
}

/// Check if a file name looks like something a user finished dropping off
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip hidden files
    if filename.starts_with('.') {
        return false;
    }

    // Skip temporary files
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    for ext in &temp_extensions {
        if filename.ends_with(ext) {
            return false;
        }
    }

    // Skip system files
    let skip_names = ["desktop.ini", "thumbs.db", ".ds_store"];
    if skip_names.iter().any(|n| filename.eq_ignore_ascii_case(n)) {
        return false;
    }

    true
}

/// Regular file that is not a symlink; the rule shared by scans and signals
pub fn is_regular_file(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_file())
}

/// Collapses bursts of events for the same path
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    seen: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    const PRUNE_THRESHOLD: usize = 1024;

    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// True if `path` has not been admitted within the window
    pub fn admit(&mut self, path: &Path) -> bool {
        self.admit_at(path, Instant::now())
    }

    fn admit_at(&mut self, path: &Path, now: Instant) -> bool {
        if self.seen.len() > Self::PRUNE_THRESHOLD {
            let window = self.window;
            self.seen.retain(|_, at| now.duration_since(*at) < window);
        }

        match self.seen.get(path) {
            Some(at) if now.duration_since(*at) < self.window => false,
            _ => {
                self.seen.insert(path.to_path_buf(), now);
                true
            }
        }
    }
}

/// Recursive watcher feeding Discovered tasks into a channel
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    ///
    /// Events are filtered and debounced on notify's thread and sent as
    /// Discovered tasks; a full channel applies backpressure to that thread.
    pub fn start(
        root: &Path,
        filter: FileFilter,
        debounce: Duration,
        tx: mpsc::Sender<FileTask>,
    ) -> Result<Self> {
        std::fs::read_dir(root).map_err(|source| SmartParseError::WatchRootUnreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let mut debouncer = Debouncer::new(debounce);
        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in signal_paths(event) {
                    if !is_regular_file(&path) || !filter.accepts(&path) || !debouncer.admit(&path) {
                        continue;
                    }
                    debug!("Watcher signal: {:?}", path);
                    if tx.blocking_send(FileTask::discovered(path)).is_err() {
                        debug!("Task channel closed, dropping signal");
                    }
                }
            }
            Err(e) => warn!("Watch error: {}", e),
        };

        let config = Config::default().with_poll_interval(Duration::from_secs(2));
        let mut watcher = RecommendedWatcher::new(handler, config)?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        info!("Watching: {:?}", root);

        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Paths named by a create or modify event
fn signal_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => event.paths,
        _ => Vec::new(),
    }
}

/// List every acceptable file below `root`, sorted by path.
///
/// An unreadable root is fatal; unreadable subdirectories are skipped.
pub fn scan_directory(root: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(root).map_err(|source| SmartParseError::WatchRootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    let mut pending_dirs = Vec::new();
    collect_entries(entries, filter, &mut files, &mut pending_dirs);

    while let Some(dir) = pending_dirs.pop() {
        match std::fs::read_dir(&dir) {
            Ok(entries) => collect_entries(entries, filter, &mut files, &mut pending_dirs),
            Err(e) => warn!("Skipping unreadable directory {:?}: {}", dir, e),
        }
    }

    files.sort();
    Ok(files)
}

fn collect_entries(
    entries: std::fs::ReadDir,
    filter: &FileFilter,
    files: &mut Vec<PathBuf>,
    dirs: &mut Vec<PathBuf>,
) {
    for entry in entries.flatten() {
        let path = entry.path();
        // file_type does not follow symlinks, so linked directories are never walked
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => {
                if !filter.is_excluded_dir(&path) && should_process(&path) {
                    dirs.push(path);
                }
            }
            Ok(ft) if ft.is_file() => {
                if filter.accepts(&path) {
                    files.push(path);
                }
            }
            _ => {}
        }
    }
}
