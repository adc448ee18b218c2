//! Reference-counted deferred directory removal.
//!
//! Every directory visited gets one [`CompletionToken`]. The task processing
//! the directory holds one reference and each child directory's token holds
//! another, so the last release happens only after every descendant subtree
//! has been removed. That release removes the directory.

use crate::context::DeletionContext;
use crate::error::{FailedItem, FailureKind};
use crate::fsops::is_not_found_error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct CompletionToken(Arc<DeferredRemover>);

impl CompletionToken {
    pub fn new(dir: PathBuf, ctx: Arc<DeletionContext>, parent: Option<CompletionToken>) -> Self {
        Self(Arc::new(DeferredRemover {
            dir,
            ctx,
            parent,
            poisoned: AtomicBool::new(false),
            fired: false,
        }))
    }

    pub fn dir(&self) -> &Path {
        &self.0.dir
    }

    /// Marks the directory as expected to keep some contents because a
    /// failure was already recorded beneath it.
    pub fn poison(&self) {
        self.0.poisoned.store(true, Ordering::Release);
    }

    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

struct DeferredRemover {
    dir: PathBuf,
    ctx: Arc<DeletionContext>,
    parent: Option<CompletionToken>,
    poisoned: AtomicBool,
    fired: bool,
}

impl DeferredRemover {
    /// Runs the removal once and hands back the parent reference.
    fn fire(&mut self) -> Option<CompletionToken> {
        if !self.fired {
            self.fired = true;
            let poisoned = self.poisoned.load(Ordering::Acquire);
            if !remove_emptied_dir(&self.ctx, &self.dir, poisoned) {
                if let Some(parent) = &self.parent {
                    parent.poison();
                }
            }
        }
        self.parent.take()
    }
}

impl Drop for DeferredRemover {
    fn drop(&mut self) {
        // Walk up iteratively instead of letting each parent's drop nest in
        // this one; deep trees would otherwise recurse once per level.
        let mut next = self.fire();
        while let Some(token) = next {
            next = Arc::into_inner(token.0).and_then(|mut remover| remover.fire());
        }
    }
}

/// Returns whether the directory is gone afterwards.
fn remove_emptied_dir(ctx: &DeletionContext, dir: &Path, poisoned: bool) -> bool {
    let fs = ctx.filesystem();

    if !fs.exists(dir) {
        debug!("'{}' already gone", dir.display());
        return true;
    }

    if !fs.is_directory(dir) {
        ctx.record_failure(FailedItem::new(
            dir.to_path_buf(),
            FailureKind::InvariantViolation,
            "entry is no longer a directory",
        ));
        return false;
    }

    match fs.is_empty(dir) {
        Ok(true) => {}
        Ok(false) if poisoned => {
            debug!(
                "leaving '{}' in place, some of its contents could not be removed",
                dir.display()
            );
            return false;
        }
        Ok(false) => {
            ctx.record_failure(FailedItem::new(
                dir.to_path_buf(),
                FailureKind::InvariantViolation,
                "directory not empty after all of its contents were removed",
            ));
            return false;
        }
        Err(e) if is_not_found_error(&e) => return true,
        Err(e) if poisoned => {
            debug!("leaving '{}' in place: {}", dir.display(), e);
            return false;
        }
        Err(e) => {
            ctx.record_failure(FailedItem::new(
                dir.to_path_buf(),
                FailureKind::DirectoryRemoval,
                e,
            ));
            return false;
        }
    }

    match fs.remove_dir(dir) {
        Ok(()) => {
            debug!("removed directory '{}'", dir.display());
            ctx.note_dir_removed();
            true
        }
        Err(e) if is_not_found_error(&e) => true,
        Err(e) => {
            ctx.record_failure(FailedItem::new(
                dir.to_path_buf(),
                FailureKind::DirectoryRemoval,
                e,
            ));
            false
        }
    }
}
