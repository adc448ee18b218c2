//! Per-run bookkeeping shared by every directory task.

use crate::error::{FailedItem, FailureKind};
use crate::fsops::Filesystem;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// One in-flight directory task. Completes when the task's body has
/// returned, which is after every child task it spawned was registered.
pub struct WorkHandle {
    dir: PathBuf,
    done: Receiver<()>,
}

impl WorkHandle {
    pub fn new(dir: PathBuf, done: Receiver<()>) -> Self {
        Self { dir, done }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Blocks until the task finishes. Returns `false` if the task went away
    /// without signalling, i.e. it panicked.
    pub fn wait(&self) -> bool {
        self.done.recv().is_ok()
    }
}

#[derive(Default)]
struct WorkRegistry {
    pending: VecDeque<WorkHandle>,
    registered: usize,
}

pub struct DeletionContext {
    success: AtomicBool,
    failures: Mutex<Vec<FailedItem>>,
    registry: Mutex<WorkRegistry>,
    files_removed: AtomicUsize,
    dirs_removed: AtomicUsize,
    filesystem: Arc<dyn Filesystem>,
}

impl DeletionContext {
    pub fn new(filesystem: Arc<dyn Filesystem>) -> Self {
        Self {
            success: AtomicBool::new(true),
            failures: Mutex::new(Vec::new()),
            registry: Mutex::new(WorkRegistry::default()),
            files_removed: AtomicUsize::new(0),
            dirs_removed: AtomicUsize::new(0),
            filesystem,
        }
    }

    pub fn filesystem(&self) -> &dyn Filesystem {
        self.filesystem.as_ref()
    }

    /// Downgrades the run result. The flag never goes back to `true`.
    pub fn record_failure(&self, item: FailedItem) {
        if item.kind == FailureKind::InvariantViolation {
            error!("{}", item);
        } else {
            debug!("{}", item);
        }
        self.success.store(false, Ordering::Release);
        self.failures.lock().push(item);
    }

    pub fn succeeded(&self) -> bool {
        self.success.load(Ordering::Acquire)
    }

    pub fn failures(&self) -> Vec<FailedItem> {
        self.failures.lock().clone()
    }

    pub fn note_file_removed(&self) {
        self.files_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_dir_removed(&self) {
        self.dirs_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn files_removed(&self) -> usize {
        self.files_removed.load(Ordering::Relaxed)
    }

    pub fn dirs_removed(&self) -> usize {
        self.dirs_removed.load(Ordering::Relaxed)
    }

    /// Number of directory tasks registered so far.
    pub fn tasks_registered(&self) -> usize {
        self.registry.lock().registered
    }

    pub fn register(&self, handle: WorkHandle) {
        let mut registry = self.registry.lock();
        registry.pending.push_back(handle);
        registry.registered += 1;
    }

    /// Appends a batch under a single lock acquisition.
    pub fn register_all(&self, handles: Vec<WorkHandle>) {
        let mut registry = self.registry.lock();
        registry.registered += handles.len();
        registry.pending.extend(handles);
    }

    /// Waits for every registered task, including tasks registered while
    /// draining. The lock is never held across a wait.
    ///
    /// Terminates once the queue is observed empty: every task registers its
    /// children before it signals completion, so an empty queue after the
    /// last wait means nothing is left to discover.
    pub fn drain(&self) {
        loop {
            let next = self.registry.lock().pending.pop_front();
            let Some(handle) = next else {
                break;
            };
            if !handle.wait() {
                self.record_failure(FailedItem::new(
                    handle.dir().to_path_buf(),
                    FailureKind::TaskLost,
                    "task ended without reporting completion",
                ));
            }
        }
    }
}
