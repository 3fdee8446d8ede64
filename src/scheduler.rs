// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Bounded ready queue and the batch drain-and-refill loop

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::pipeline::Pipeline;
use crate::stability::StabilityDetector;
use crate::task::{FileTask, TaskState};
use crate::watcher::is_regular_file;
use crate::{Result, SmartParseError};

/// Returned by [`BatchQueue::enqueue`] at capacity; hands the task back
#[derive(Debug, Error)]
#[error("queue is full ({capacity} tasks)")]
pub struct QueueFull {
    pub task: FileTask,
    pub capacity: usize,
}

/// Thread-safe FIFO of Ready tasks that never exceeds its capacity
#[derive(Debug)]
pub struct BatchQueue {
    inner: Mutex<VecDeque<FileTask>>,
    capacity: usize,
}

impl BatchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<FileTask>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn enqueue(&self, task: FileTask) -> std::result::Result<(), QueueFull> {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            return Err(QueueFull { task, capacity: self.capacity });
        }
        queue.push_back(task);
        Ok(())
    }

    /// Remove up to `max` tasks in the order they became ready
    pub fn drain_batch(&self, max: usize) -> Vec<FileTask> {
        let mut queue = self.lock();
        let take = max.min(queue.len());
        queue.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }
}

/// One drain of the queue, processed start to finish before the next
#[derive(Debug)]
pub struct Batch {
    pub sequence: usize,
    pub tasks: Vec<FileTask>,
}

/// What a run did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Pending file count seen by each directory scan
    pub scans: Vec<usize>,
    /// Size of each processed batch
    pub batches: Vec<usize>,
    pub renamed: usize,
    pub failed: usize,
    pub cancelled: bool,
}

type Stabilized = (FileTask, Result<()>);

/// Drives ready files through the pipeline one batch at a time
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    queue: Arc<BatchQueue>,
    detector: StabilityDetector,
    batch_size: usize,
    /// How long a partial batch waits for the next file to settle
    settle_window: Duration,
    /// Failures reached by background stabilization in watch mode
    background_failures: Arc<AtomicUsize>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let config = pipeline.config();
        let samples = u32::try_from(config.stability.required_matches).unwrap_or(u32::MAX);
        Self {
            queue: Arc::new(BatchQueue::new(config.scheduler.queue_capacity)),
            detector: StabilityDetector::from_config(&config.stability),
            batch_size: config.scheduler.batch_size,
            settle_window: config.stability.poll_interval().saturating_mul(samples.saturating_add(1)),
            background_failures: Arc::new(AtomicUsize::new(0)),
            pipeline,
        }
    }

    pub fn queue(&self) -> &Arc<BatchQueue> {
        &self.queue
    }

    /// Process everything currently eligible in the watch tree, then return.
    ///
    /// Scans, starts stability checks for what fits in the queue, processes
    /// a batch as soon as files settle, rescans; stops once a scan finds
    /// nothing pending and nothing is queued or stabilizing. A file that is
    /// still growing never holds back files that are already stable.
    /// Cancellation is honoured before each batch is drawn.
    pub async fn run_once(&self, shutdown: &watch::Receiver<bool>) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut stabilizing = JoinSet::new();

        loop {
            let pending = self.pipeline.scan_pending()?;
            summary.scans.push(pending.len());
            info!(
                "Scan found {} pending file(s), {} queued, {} stabilizing",
                pending.len(),
                self.queue.len(),
                stabilizing.len()
            );

            if pending.is_empty() && self.queue.is_empty() && stabilizing.is_empty() {
                break;
            }

            let failed_before = summary.failed;
            self.admit(pending, &mut stabilizing, &mut summary);
            let enqueued = self.collect(&mut stabilizing, &mut summary).await;

            if *shutdown.borrow() {
                info!("Run cancelled before batch {}", summary.batches.len() + 1);
                summary.cancelled = true;
                break;
            }

            let batch = self.next_batch(&summary);
            if batch.tasks.is_empty() {
                if stabilizing.is_empty() && enqueued == 0 && summary.failed == failed_before {
                    warn!("Pending files could not be admitted, stopping run");
                    break;
                }
                continue;
            }
            self.process_batch(batch, &mut summary).await;
        }

        info!(
            "Run finished: {} renamed, {} failed in {} batch(es)",
            summary.renamed,
            summary.failed,
            summary.batches.len()
        );
        Ok(summary)
    }

    /// Single run, then keep consuming watcher signals until shutdown or
    /// until the signal channel closes.
    pub async fn watch(
        &self,
        mut signals: mpsc::Receiver<FileTask>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary> {
        let mut summary = self.run_once(&shutdown).await?;
        if summary.cancelled {
            return Ok(summary);
        }

        let ready = Arc::new(Notify::new());
        info!("Waiting for files...");

        loop {
            while !*shutdown.borrow() {
                let batch = self.next_batch(&summary);
                if batch.tasks.is_empty() {
                    break;
                }
                self.process_batch(batch, &mut summary).await;
            }

            if *shutdown.borrow() {
                summary.cancelled = true;
                break;
            }

            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(task) => self.intake(task, &ready, &mut summary),
                    None => {
                        warn!("Watcher stopped");
                        break;
                    }
                },
                _ = ready.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        summary.failed += self.background_failures.swap(0, Ordering::SeqCst);
        Ok(summary)
    }

    /// Classify pending files and start stability checks for as many as
    /// the queue can still take; the rest wait for a later scan.
    fn admit(&self, pending: Vec<PathBuf>, stabilizing: &mut JoinSet<Stabilized>, summary: &mut RunSummary) {
        let mut free = self.queue.free_capacity().saturating_sub(stabilizing.len());

        for path in pending {
            // queued or in flight already
            let Some(mut task) = self.pipeline.track(path) else {
                continue;
            };

            // unsupported types fail before any polling
            if let Err(e) = self.pipeline.classify(&mut task) {
                self.pipeline.fail(task, e);
                summary.failed += 1;
                continue;
            }

            if free == 0 {
                self.pipeline.release(&task.path);
                continue;
            }
            free -= 1;

            self.pipeline.set_state(&task.path, TaskState::Stabilizing);
            let detector = self.detector.clone();
            stabilizing.spawn(async move {
                let result = detector.wait_until_ready(&mut task).await;
                (task, result)
            });
        }
    }

    /// Enqueue files as their stability checks finish. Returns once a full
    /// batch is queued, nothing is left stabilizing, or a partial batch has
    /// waited a settle window without another file becoming ready.
    async fn collect(&self, stabilizing: &mut JoinSet<Stabilized>, summary: &mut RunSummary) -> usize {
        let mut enqueued = 0;

        while !stabilizing.is_empty() && self.queue.len() < self.batch_size {
            let joined = if self.queue.is_empty() {
                stabilizing.join_next().await
            } else {
                match tokio::time::timeout(self.settle_window, stabilizing.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        debug!("{} file(s) still stabilizing, releasing partial batch", stabilizing.len());
                        break;
                    }
                }
            };
            let Some(joined) = joined else {
                break;
            };
            if self.settle(joined, summary) {
                enqueued += 1;
            }
        }

        enqueued
    }

    fn settle(&self, joined: std::result::Result<Stabilized, JoinError>, summary: &mut RunSummary) -> bool {
        match joined {
            Ok((task, Ok(()))) => self.enqueue_ready(task),
            Ok((task, Err(SmartParseError::Vanished(path)))) => {
                debug!("File disappeared during stability check: {:?}", path);
                self.pipeline.release(&task.path);
                false
            }
            Ok((task, Err(e))) => {
                self.pipeline.fail(task, e);
                summary.failed += 1;
                false
            }
            Err(e) => {
                error!("Stability check aborted: {}", e);
                false
            }
        }
    }

    fn enqueue_ready(&self, task: FileTask) -> bool {
        let path = task.path.clone();
        match self.queue.enqueue(task) {
            Ok(()) => {
                self.pipeline.set_state(&path, TaskState::Ready);
                true
            }
            Err(full) => {
                warn!("{}; {:?} left for a later scan", full, full.task.path);
                self.pipeline.release(&full.task.path);
                false
            }
        }
    }

    /// Handle one watcher signal: fail unsupported files at once, otherwise
    /// stabilize in the background and enqueue when ready.
    fn intake(&self, task: FileTask, ready: &Arc<Notify>, summary: &mut RunSummary) {
        let path = task.path.clone();
        // signals can trail the file: renamed, failed or deleted since
        if !is_regular_file(&path) {
            debug!("Ignoring signal for {:?}, no longer a regular file", path);
            return;
        }
        let Some(mut task) = self.pipeline.track_task(task) else {
            debug!("Already tracked: {:?}", path);
            return;
        };

        if let Err(e) = self.pipeline.classify(&mut task) {
            self.pipeline.fail(task, e);
            summary.failed += 1;
            return;
        }

        self.pipeline.set_state(&task.path, TaskState::Stabilizing);
        let pipeline = self.pipeline.clone();
        let queue = self.queue.clone();
        let detector = self.detector.clone();
        let ready = ready.clone();
        let failures = self.background_failures.clone();
        let retry_delay = pipeline.config().stability.poll_interval();

        tokio::spawn(async move {
            match detector.wait_until_ready(&mut task).await {
                Ok(()) => loop {
                    let path = task.path.clone();
                    match queue.enqueue(task) {
                        Ok(()) => {
                            pipeline.set_state(&path, TaskState::Ready);
                            ready.notify_one();
                            break;
                        }
                        Err(full) => {
                            debug!("{}; retrying {:?}", full, path);
                            task = full.task;
                            tokio::time::sleep(retry_delay).await;
                        }
                    }
                },
                Err(SmartParseError::Vanished(path)) => {
                    debug!("File disappeared during stability check: {:?}", path);
                    pipeline.release(&path);
                }
                Err(e) => {
                    failures.fetch_add(1, Ordering::SeqCst);
                    pipeline.fail(task, e);
                }
            }
        });
    }

    fn next_batch(&self, summary: &RunSummary) -> Batch {
        Batch {
            sequence: summary.batches.len() + 1,
            tasks: self.queue.drain_batch(self.batch_size),
        }
    }

    /// Process a batch sequentially; every task ends Renamed or Failed
    async fn process_batch(&self, batch: Batch, summary: &mut RunSummary) {
        info!("Processing batch {} ({} file(s))", batch.sequence, batch.tasks.len());
        summary.batches.push(batch.tasks.len());

        for task in batch.tasks {
            match self.pipeline.process(task).await {
                TaskState::Renamed => summary.renamed += 1,
                _ => summary.failed += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describer::testing::FakeDescriber;
    use crate::oplog::{OperationLog, Outcome};
    use crate::pipeline::testing::test_config;
    use crate::AppConfig;
    use std::io::Write;
    use std::path::Path;
    use std::sync::atomic::AtomicBool;
    use std::time::{Duration, Instant};

    fn scheduler(config: AppConfig, fake: &FakeDescriber) -> Scheduler {
        let pipeline = Pipeline::new(config, Arc::new(fake.clone())).unwrap();
        Scheduler::new(Arc::new(pipeline))
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_queue_never_exceeds_capacity() {
        let queue = Arc::new(BatchQueue::new(8));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|i| {
                            let task = FileTask::discovered(PathBuf::from(format!("/in/{}-{}.txt", t, i)));
                            queue.enqueue(task).is_ok()
                        })
                        .count()
                })
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(accepted, 8);
        assert_eq!(queue.len(), 8);
        assert_eq!(queue.free_capacity(), 0);

        let rejected = queue.enqueue(FileTask::discovered(PathBuf::from("/in/late.txt"))).unwrap_err();
        assert_eq!(rejected.task.path, PathBuf::from("/in/late.txt"));
        assert_eq!(rejected.capacity, 8);
    }

    #[test]
    fn test_drain_batch_is_fifo() {
        let queue = BatchQueue::new(10);
        for name in ["a", "b", "c"] {
            queue.enqueue(FileTask::discovered(PathBuf::from(name))).unwrap();
        }

        let batch: Vec<_> = queue.drain_batch(2).into_iter().map(|t| t.path).collect();
        assert_eq!(batch, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(queue.drain_batch(5).len(), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_in_batches_and_rescans() {
        let watch = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let root = watch.path().canonicalize().unwrap();
        for i in 0..25 {
            std::fs::write(root.join(format!("note{:02}.txt", i)), format!("note number {}", i)).unwrap();
        }

        let mut config = test_config(&root, logs.path());
        config.scheduler.batch_size = 20;
        config.scheduler.queue_capacity = 30;
        let fake = FakeDescriber::always("meeting notes");
        let (_tx, rx) = watch::channel(false);

        let summary = scheduler(config, &fake).run_once(&rx).await.unwrap();

        assert_eq!(summary.batches, vec![20, 5]);
        assert_eq!(summary.scans, vec![25, 5, 0]);
        assert_eq!(summary.renamed, 25);
        assert_eq!(summary.failed, 0);
        assert_eq!(fake.calls(), 25);
        assert_eq!(files_in(&root.join("text")), 25);
        assert_eq!(OperationLog::read_all(&logs.path().join("ops.jsonl")).unwrap().len(), 25);
    }

    #[tokio::test]
    async fn test_queue_capacity_limits_admission() {
        let watch = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let root = watch.path().canonicalize().unwrap();
        for i in 0..5 {
            std::fs::write(root.join(format!("n{}.md", i)), "text").unwrap();
        }

        let mut config = test_config(&root, logs.path());
        config.scheduler.batch_size = 10;
        config.scheduler.queue_capacity = 2;
        let fake = FakeDescriber::always("short note");
        let (_tx, rx) = watch::channel(false);

        let summary = scheduler(config, &fake).run_once(&rx).await.unwrap();

        assert_eq!(summary.batches, vec![2, 2, 1]);
        assert_eq!(summary.renamed, 5);
        assert_eq!(files_in(&root.join("text")), 5);
    }

    #[tokio::test]
    async fn test_growing_file_does_not_hold_back_stable_ones() {
        let watch = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let root = watch.path().canonicalize().unwrap();
        std::fs::write(root.join("a.txt"), "finished upload").unwrap();
        let growing = root.join("b.txt");
        std::fs::write(&growing, "x").unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let stop = stop.clone();
            let growing = growing.clone();
            std::thread::spawn(move || {
                let mut file = std::fs::OpenOptions::new().append(true).open(&growing).unwrap();
                while !stop.load(Ordering::SeqCst) {
                    file.write_all(b"x").unwrap();
                    std::thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let mut config = test_config(&root, logs.path());
        config.stability.poll_interval_ms = 40;
        config.stability.required_matches = 3;
        config.stability.max_wait_secs = 3;
        let fake = FakeDescriber::always("upload");
        let scheduler = Arc::new(scheduler(config, &fake));
        let (_tx, rx) = watch::channel(false);

        let running = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run_once(&rx).await })
        };

        let started = Instant::now();
        while files_in(&root.join("text")) == 0 && started.elapsed() < Duration::from_millis(1500) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // the stable file went through while the other was still written
        assert_eq!(files_in(&root.join("text")), 1);
        assert_eq!(fake.calls(), 1);
        assert!(growing.exists());

        stop.store(true, Ordering::SeqCst);
        writer.join().unwrap();
        let summary = running.await.unwrap().unwrap();

        assert_eq!(summary.renamed, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(files_in(&root.join("text")), 2);
    }

    #[tokio::test]
    async fn test_unsupported_file_fails_without_polling() {
        let watch = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let root = watch.path().canonicalize().unwrap();
        std::fs::write(root.join("report.doc"), b"legacy word").unwrap();

        let mut config = test_config(&root, logs.path());
        config.stability.poll_interval_ms = 1000;
        config.stability.required_matches = 3;
        let fake = FakeDescriber::always("unused");
        let (_tx, rx) = watch::channel(false);

        let started = Instant::now();
        let summary = scheduler(config, &fake).run_once(&rx).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(summary.failed, 1);
        assert!(summary.batches.is_empty());
        assert_eq!(fake.calls(), 0);
        assert!(root.join("failed_report.doc").exists());

        let entries = OperationLog::read_all(&logs.path().join("ops.jsonl")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, Outcome::Failure);
        assert!(entries[0].reason.as_deref().unwrap().contains("unsupported type"));
    }

    #[tokio::test]
    async fn test_cancelled_run_draws_no_batch() {
        let watch = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let root = watch.path().canonicalize().unwrap();
        std::fs::write(root.join("a.txt"), "alpha").unwrap();

        let fake = FakeDescriber::always("alpha");
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let summary = scheduler(test_config(&root, logs.path()), &fake).run_once(&rx).await.unwrap();

        assert!(summary.cancelled);
        assert!(summary.batches.is_empty());
        assert_eq!(fake.calls(), 0);
        assert!(root.join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_log_inside_watch_root_is_not_processed() {
        let watch = tempfile::tempdir().unwrap();
        let root = watch.path().canonicalize().unwrap();
        std::fs::write(root.join("a.txt"), "alpha").unwrap();

        // log lives in the watched directory itself
        let config = test_config(&root, &root);
        let fake = FakeDescriber::always("alpha");
        let (_tx, rx) = watch::channel(false);

        let summary = scheduler(config, &fake).run_once(&rx).await.unwrap();

        assert_eq!(summary.renamed, 1);
        assert_eq!(fake.calls(), 1);
        assert!(root.join("ops.jsonl").exists());
    }

    #[tokio::test]
    async fn test_watch_processes_signalled_files_until_shutdown() {
        let watch_dir = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let root = watch_dir.path().canonicalize().unwrap();
        let fake = FakeDescriber::always("signal test");
        let scheduler = Arc::new(scheduler(test_config(&root, logs.path()), &fake));

        let (signal_tx, signal_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let source = root.join("dropped.txt");
        std::fs::write(&source, "dropped in while watching").unwrap();

        let running = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.watch(signal_rx, shutdown_rx).await })
        };
        signal_tx.send(FileTask::discovered(source.clone())).await.unwrap();

        for _ in 0..500 {
            if files_in(&root.join("text")) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();

        let summary = running.await.unwrap().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.renamed, 1);
        assert_eq!(fake.calls(), 1);
        assert!(!source.exists());
        assert_eq!(files_in(&root.join("text")), 1);
    }

    #[tokio::test]
    async fn test_trailing_signals_for_failed_file_are_ignored() {
        let watch_dir = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let root = watch_dir.path().canonicalize().unwrap();
        let source = root.join("report.doc");
        std::fs::write(&source, b"legacy word").unwrap();

        let fake = FakeDescriber::always("unused");
        let scheduler = Arc::new(scheduler(test_config(&root, logs.path()), &fake));
        let (signal_tx, signal_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let running = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.watch(signal_rx, shutdown_rx).await })
        };
        // create and modify events for the file the initial run just failed
        for _ in 0..2 {
            signal_tx.send(FileTask::discovered(source.clone())).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();

        let summary = running.await.unwrap().unwrap();
        assert_eq!(summary.failed, 1);
        assert!(root.join("failed_report.doc").exists());
        assert!(!root.join("failed_failed_report.doc").exists());
        assert_eq!(OperationLog::read_all(&logs.path().join("ops.jsonl")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_watch_counts_stability_timeouts() {
        let watch_dir = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let root = watch_dir.path().canonicalize().unwrap();

        let mut config = test_config(&root, logs.path());
        config.stability.max_wait_secs = 0;
        let fake = FakeDescriber::always("unused");
        let scheduler = Arc::new(scheduler(config, &fake));
        let (signal_tx, signal_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let running = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.watch(signal_rx, shutdown_rx).await })
        };
        // let the initial run finish on the empty tree first
        tokio::time::sleep(Duration::from_millis(50)).await;
        let source = root.join("late.txt");
        std::fs::write(&source, "arrived while watching").unwrap();
        signal_tx.send(FileTask::discovered(source)).await.unwrap();

        let marked = root.join("failed_late.txt");
        for _ in 0..500 {
            if marked.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();

        let summary = running.await.unwrap().unwrap();
        assert!(marked.exists());
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.renamed, 0);
        assert_eq!(fake.calls(), 0);

        let entries = OperationLog::read_all(&logs.path().join("ops.jsonl")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, Outcome::Failure);
    }
}
