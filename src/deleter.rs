//! Entry points for deleting a directory tree.

use crate::context::DeletionContext;
use crate::error::{Error, FailedItem, FailureKind, Result};
use crate::fsops::{Filesystem, OsFilesystem};
use crate::task;
use rayon::ThreadPoolBuilder;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Clone)]
pub struct DeleterConfig {
    /// Worker threads; `None` uses the available parallelism.
    pub threads: Option<usize>,
    pub filesystem: Arc<dyn Filesystem>,
}

impl Default for DeleterConfig {
    fn default() -> Self {
        Self {
            threads: None,
            filesystem: Arc::new(OsFilesystem),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeletionReport {
    pub success: bool,
    pub files_removed: usize,
    pub dirs_removed: usize,
    /// Directory tasks spawned, the root included.
    pub dirs_visited: usize,
    pub failures: Vec<FailedItem>,
    pub elapsed: Duration,
}

impl DeletionReport {
    pub fn total_removed(&self) -> usize {
        self.files_removed + self.dirs_removed
    }
}

#[derive(Clone, Default)]
pub struct Deleter {
    config: DeleterConfig,
}

impl Deleter {
    pub fn new(config: DeleterConfig) -> Self {
        Self { config }
    }

    fn worker_count(&self) -> usize {
        self.config.threads.filter(|&n| n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Deletes `root` and everything below it.
    ///
    /// Failures inside the tree never abort the run; they are collected in
    /// the report and clear its `success` flag. `Err` is returned only when
    /// the run could not start at all.
    pub fn run(&self, root: &Path) -> Result<DeletionReport> {
        let start = Instant::now();
        let fs = Arc::clone(&self.config.filesystem);

        if !fs.exists(root) {
            info!("'{}' does not exist, nothing to delete", root.display());
            return Ok(DeletionReport {
                success: true,
                elapsed: start.elapsed(),
                ..Default::default()
            });
        }

        let ctx = Arc::new(DeletionContext::new(fs));

        if ctx.filesystem().is_symlink(root) {
            ctx.record_failure(FailedItem::new(
                root.to_path_buf(),
                FailureKind::InvariantViolation,
                "root is a symlink, refusing to traverse it",
            ));
            return Ok(report(&ctx, start.elapsed()));
        }

        let workers = self.worker_count();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("deltree-worker-{}", i))
            .panic_handler(|_| error!("directory task panicked"))
            .build()
            .map_err(|e| {
                let source = io::Error::new(io::ErrorKind::Other, e.to_string());
                Error::io_with_path(root.to_path_buf(), source)
            })?;

        info!("deleting '{}' with {} workers", root.display(), workers);

        pool.install(|| task::spawn_root(&ctx, root.to_path_buf()));
        ctx.drain();

        let report = report(&ctx, start.elapsed());
        info!(
            "'{}': {} files, {} directories removed in {:.2?} ({})",
            root.display(),
            report.files_removed,
            report.dirs_removed,
            report.elapsed,
            if report.success { "ok" } else { "incomplete" }
        );
        Ok(report)
    }
}

fn report(ctx: &DeletionContext, elapsed: Duration) -> DeletionReport {
    DeletionReport {
        success: ctx.succeeded(),
        files_removed: ctx.files_removed(),
        dirs_removed: ctx.dirs_removed(),
        dirs_visited: ctx.tasks_registered(),
        failures: ctx.failures(),
        elapsed,
    }
}

/// Deletes `root` recursively with the default configuration.
///
/// Returns `true` only if everything under and including `root` is gone. A
/// root that does not exist counts as already deleted.
pub fn delete_directory_recursive(root: impl AsRef<Path>) -> bool {
    match Deleter::default().run(root.as_ref()) {
        Ok(report) => report.success,
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}
