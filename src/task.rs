use crate::context::{DeletionContext, WorkHandle};
use crate::error::{FailedItem, FailureKind};
use crate::fsops::is_not_found_error;
use crate::token::CompletionToken;
use crossbeam_channel::bounded;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Launches the task for the root directory and registers it. Must be called
/// from inside the worker pool so that child tasks land on the same pool.
pub fn spawn_root(ctx: &Arc<DeletionContext>, root: PathBuf) {
    let handle = launch(ctx, root, None);
    ctx.register(handle);
}

fn launch(
    ctx: &Arc<DeletionContext>,
    dir: PathBuf,
    parent: Option<CompletionToken>,
) -> WorkHandle {
    let (done_tx, done_rx) = bounded(1);
    let task_ctx = Arc::clone(ctx);
    let task_dir = dir.clone();

    rayon::spawn(move || {
        process_directory(&task_ctx, task_dir, parent);
        // A panic above drops the sender unsent, which the drain reports.
        done_tx.send(()).ok();
    });

    WorkHandle::new(dir, done_rx)
}

fn process_directory(ctx: &Arc<DeletionContext>, dir: PathBuf, parent: Option<CompletionToken>) {
    let token = CompletionToken::new(dir, Arc::clone(ctx), parent);
    let fs = ctx.filesystem();

    let mut subdirs = Vec::new();
    let mut files = Vec::new();
    let listed = fs.enumerate(token.dir(), &mut |entry| {
        if entry.is_dir() {
            subdirs.push(entry.path);
        } else {
            files.push(entry.path);
        }
        Ok(())
    });

    if let Err(e) = listed {
        token.poison();
        ctx.record_failure(FailedItem::new(
            token.dir().to_path_buf(),
            FailureKind::Enumeration,
            e,
        ));
        return;
    }

    debug!(
        "'{}': {} files, {} subdirectories",
        token.dir().display(),
        files.len(),
        subdirs.len()
    );

    // Children are registered before this body returns, so the drain sees
    // them before it can observe this task as complete.
    if !subdirs.is_empty() {
        let handles = subdirs
            .into_iter()
            .filter(|sub| !is_pseudo_entry(sub))
            .map(|sub| launch(ctx, sub, Some(token.clone())))
            .collect();
        ctx.register_all(handles);
    }

    for file in files {
        match fs.remove_file(&file) {
            Ok(()) => ctx.note_file_removed(),
            Err(e) if is_not_found_error(&e) => {}
            Err(e) => {
                token.poison();
                ctx.record_failure(FailedItem::new(file, FailureKind::FileRemoval, e));
            }
        }
    }
}

fn is_pseudo_entry(path: &Path) -> bool {
    match path.file_name() {
        Some(name) => name == "." || name == "..",
        None => true,
    }
}
