//! Two-lane execution of an approved synchronization.
//!
//! The copy lane first removes every backup entry that would collide with
//! a copy of a different kind, then copies. The delete lane removes stale
//! backup entries. Lanes run on their own threads and share nothing but
//! their monotonic progress counters.

use crate::file_operations::{FileOperation, FileOperations};
use chrono::Local;
use foldersync_common::{ActionLists, FolderSyncError};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default progress sampling interval
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Everything a run needs
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub lists: ActionLists,
    pub source_root: PathBuf,
    pub backup_root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneKind {
    Copy,
    Delete,
}

impl LaneKind {
    fn name(&self) -> &'static str {
        match self {
            LaneKind::Copy => "copy",
            LaneKind::Delete => "delete",
        }
    }
}

/// Sampled state of one lane
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneProgress {
    pub processed: usize,
    pub total: usize,
    pub running: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub copy: LaneProgress,
    pub delete: LaneProgress,
}

impl ProgressSnapshot {
    pub fn is_running(&self) -> bool {
        self.copy.running || self.delete.running
    }
}

/// Final accounting of one lane
#[derive(Debug, Clone, Serialize)]
pub struct LaneReport {
    pub lane: LaneKind,
    pub processed: usize,
    pub total: usize,
    pub had_errors: bool,
    pub errors: Vec<String>,
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub copy: LaneReport,
    pub delete: LaneReport,
}

impl SyncOutcome {
    pub fn has_errors(&self) -> bool {
        self.copy.had_errors || self.delete.had_errors
    }

    /// One consolidated message pointing at the log of every failing lane
    pub fn error_summary(&self) -> Option<String> {
        let failing: Vec<&LaneReport> = [&self.copy, &self.delete]
            .into_iter()
            .filter(|report| report.had_errors)
            .collect();
        if failing.is_empty() {
            return None;
        }

        let mut summary = String::from("Some errors occurred during synchronization:");
        for report in failing {
            summary.push_str(&format!(
                "\n  {} lane: {} error(s), see {}",
                report.lane.name(),
                report.errors.len(),
                report.log_path.display()
            ));
        }
        Some(summary)
    }
}

struct LaneShared {
    processed: AtomicUsize,
    running: AtomicBool,
    total: usize,
}

impl LaneShared {
    fn new(total: usize) -> Arc<Self> {
        Arc::new(Self {
            processed: AtomicUsize::new(0),
            running: AtomicBool::new(true),
            total,
        })
    }

    fn progress(&self) -> LaneProgress {
        LaneProgress {
            processed: self.processed.load(Ordering::SeqCst),
            total: self.total,
            running: self.running.load(Ordering::SeqCst),
        }
    }
}

enum Step {
    Remove(PathBuf),
    Copy(PathBuf),
}

impl Step {
    fn operation(&self) -> FileOperation {
        match self {
            Step::Remove(_) => FileOperation::Remove,
            Step::Copy(_) => FileOperation::Copy,
        }
    }

    fn path(&self) -> &Path {
        match self {
            Step::Remove(path) | Step::Copy(path) => path,
        }
    }
}

/// Per-lane text log: one line per processed entry, rewritten on every run
struct LaneLog {
    writer: Option<LineWriter<File>>,
}

impl LaneLog {
    fn open(path: &Path) -> Self {
        let writer = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map(LineWriter::new);
        match writer {
            Ok(writer) => Self {
                writer: Some(writer),
            },
            Err(e) => {
                warn!("Cannot open lane log {}: {}", path.display(), e);
                Self { writer: None }
            }
        }
    }

    fn line(&mut self, level: &str, message: &str) {
        if let Some(writer) = self.writer.as_mut() {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            if let Err(e) = writeln!(writer, "{} {} {}", stamp, level, message) {
                warn!("Lane log write failed: {}", e);
                self.writer = None;
            }
        }
    }
}

/// Runs approved action lists on two independent lanes
#[derive(Debug, Clone, Default)]
pub struct SyncExecutor {
    ops: FileOperations,
}

impl SyncExecutor {
    pub fn new(ops: FileOperations) -> Self {
        Self { ops }
    }

    /// Start both lanes and return immediately
    pub fn spawn(&self, request: SyncRequest, copy_log: PathBuf, delete_log: PathBuf) -> RunningSync {
        let SyncRequest {
            lists,
            source_root,
            backup_root,
        } = request;

        let copy_steps: Vec<Step> = lists
            .to_delete_before_copy
            .into_iter()
            .map(Step::Remove)
            .chain(lists.to_copy.into_iter().map(Step::Copy))
            .collect();
        let delete_steps: Vec<Step> = lists.to_delete.into_iter().map(Step::Remove).collect();

        info!(
            "Starting synchronization: {} copy lane entries, {} delete lane entries",
            copy_steps.len(),
            delete_steps.len()
        );

        let copy_shared = LaneShared::new(copy_steps.len());
        let delete_shared = LaneShared::new(delete_steps.len());
        let roots = Arc::new((source_root, backup_root));

        let copy_handle = {
            let lane = Lane {
                kind: LaneKind::Copy,
                ops: self.ops.clone(),
                roots: Arc::clone(&roots),
                shared: Arc::clone(&copy_shared),
                log_path: copy_log,
            };
            std::thread::spawn(move || lane.run(copy_steps))
        };
        let delete_handle = {
            let lane = Lane {
                kind: LaneKind::Delete,
                ops: self.ops.clone(),
                roots,
                shared: Arc::clone(&delete_shared),
                log_path: delete_log,
            };
            std::thread::spawn(move || lane.run(delete_steps))
        };

        RunningSync {
            copy: copy_shared,
            delete: delete_shared,
            copy_handle,
            delete_handle,
        }
    }

    /// Spawn, report progress every `interval`, and wait for both lanes
    pub fn run<F>(
        &self,
        request: SyncRequest,
        copy_log: PathBuf,
        delete_log: PathBuf,
        interval: Duration,
        on_progress: F,
    ) -> SyncOutcome
    where
        F: FnMut(&ProgressSnapshot),
    {
        let running = self.spawn(request, copy_log, delete_log);
        running.wait_with_progress(interval, on_progress);
        running.join()
    }
}

struct Lane {
    kind: LaneKind,
    ops: FileOperations,
    roots: Arc<(PathBuf, PathBuf)>,
    shared: Arc<LaneShared>,
    log_path: PathBuf,
}

impl Lane {
    fn run(self, steps: Vec<Step>) -> LaneReport {
        let mut log = LaneLog::open(&self.log_path);
        log.line(
            "INFO",
            &format!("started {} lane with {} entries", self.kind.name(), steps.len()),
        );

        let (source_root, backup_root) = &*self.roots;
        let mut errors = Vec::new();

        for step in &steps {
            let operation = step.operation();
            let path = step.path();
            let result = match step {
                Step::Remove(path) => self.ops.remove_entry(path),
                Step::Copy(path) => self.ops.copy_entry(source_root, backup_root, path),
            };

            match result {
                Ok(_) => {
                    log.line("INFO", &format!("{} {}", operation.label(), path.display()));
                }
                Err(e) => {
                    warn!("{} lane: {} {} failed: {}", self.kind.name(), operation.label(), path.display(), e);
                    log.line(
                        "ERROR",
                        &format!("{} {}: {}", operation.label(), path.display(), e),
                    );
                    errors.push(FolderSyncError::execution(operation.label(), path, e).to_string());
                }
            }
            self.shared.processed.fetch_add(1, Ordering::SeqCst);
        }

        debug!("{} lane finished with {} errors", self.kind.name(), errors.len());
        self.shared.running.store(false, Ordering::SeqCst);

        LaneReport {
            lane: self.kind,
            processed: self.shared.processed.load(Ordering::SeqCst),
            total: self.shared.total,
            had_errors: !errors.is_empty(),
            errors,
            log_path: self.log_path,
        }
    }
}

/// Handle on a run in progress
pub struct RunningSync {
    copy: Arc<LaneShared>,
    delete: Arc<LaneShared>,
    copy_handle: JoinHandle<LaneReport>,
    delete_handle: JoinHandle<LaneReport>,
}

impl RunningSync {
    /// Sample both lanes without blocking
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            copy: self.copy.progress(),
            delete: self.delete.progress(),
        }
    }

    /// True while either lane still has work; guards quitting mid-run
    pub fn is_running(&self) -> bool {
        self.snapshot().is_running()
    }

    /// Poll both lanes on a fixed tick until they finish, then report
    /// both at their maxima.
    pub fn wait_with_progress<F>(&self, interval: Duration, mut on_progress: F)
    where
        F: FnMut(&ProgressSnapshot),
    {
        let ticker = crossbeam::channel::tick(interval);
        loop {
            let snapshot = self.snapshot();
            if !snapshot.is_running() {
                break;
            }
            on_progress(&snapshot);
            if ticker.recv().is_err() {
                break;
            }
        }

        let mut last = self.snapshot();
        last.copy.processed = last.copy.total;
        last.delete.processed = last.delete.total;
        on_progress(&last);
    }

    /// Wait for both lanes and collect their reports
    pub fn join(self) -> SyncOutcome {
        let copy = join_lane(self.copy_handle, LaneKind::Copy, &self.copy);
        let delete = join_lane(self.delete_handle, LaneKind::Delete, &self.delete);
        let outcome = SyncOutcome { copy, delete };
        info!(
            "Synchronization finished: {}/{} copied, {}/{} deleted",
            outcome.copy.processed, outcome.copy.total, outcome.delete.processed, outcome.delete.total
        );
        outcome
    }
}

fn join_lane(handle: JoinHandle<LaneReport>, kind: LaneKind, shared: &LaneShared) -> LaneReport {
    handle.join().unwrap_or_else(|_| {
        shared.running.store(false, Ordering::SeqCst);
        LaneReport {
            lane: kind,
            processed: shared.processed.load(Ordering::SeqCst),
            total: shared.total,
            had_errors: true,
            errors: vec![format!("{} lane panicked", kind.name())],
            log_path: PathBuf::new(),
        }
    })
}
