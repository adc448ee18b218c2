//! Single-entry filesystem primitives used by the deletion engine.
//!
//! The engine never touches `std::fs` directly; everything goes through the
//! [`Filesystem`] trait so that runs can be instrumented (removal order,
//! injected failures) without a real disk misbehaving.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const MAX_RETRIES: u32 = 5;
const RETRY_DELAYS_MS: [u64; 5] = [0, 50, 100, 200, 500];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    /// FIFOs, sockets, device nodes.
    Other,
}

/// File entry information returned during enumeration
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl FileEntry {
    /// Only real directories are descended into; a symlink to a directory is
    /// a leaf.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// The capability set the deletion engine needs from the host.
pub trait Filesystem: Send + Sync {
    /// Calls `callback` once per immediate child of `dir`. The pseudo-entries
    /// `.` and `..` are never reported.
    fn enumerate(
        &self,
        dir: &Path,
        callback: &mut dyn FnMut(FileEntry) -> io::Result<()>,
    ) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    /// Does not follow symlinks.
    fn exists(&self, path: &Path) -> bool;

    /// Does not follow symlinks.
    fn is_directory(&self, path: &Path) -> bool;

    fn is_empty(&self, dir: &Path) -> io::Result<bool>;

    fn is_symlink(&self, path: &Path) -> bool;
}

/// The host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn enumerate(
        &self,
        dir: &Path,
        callback: &mut dyn FnMut(FileEntry) -> io::Result<()>,
    ) -> io::Result<()> {
        enumerate_files(dir, callback)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        delete_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        remove_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path_exists(path)
    }

    fn is_directory(&self, path: &Path) -> bool {
        is_directory(path)
    }

    fn is_empty(&self, dir: &Path) -> io::Result<bool> {
        Ok(fs::read_dir(dir)?.next().is_none())
    }

    fn is_symlink(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }
}

pub fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

pub fn is_directory(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_dir())
        .unwrap_or(false)
}

pub fn enumerate_files(
    dir: &Path,
    callback: &mut dyn FnMut(FileEntry) -> io::Result<()>,
) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        callback(FileEntry {
            path: entry.path(),
            kind,
        })?;
    }
    Ok(())
}

pub fn delete_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied && clear_readonly(path) => {
            with_retries(|| fs::remove_file(path))
        }
        Err(e) if is_retryable_error(&e) => with_retries(|| fs::remove_file(path)),
        Err(e) => Err(e),
    }
}

pub fn remove_dir(path: &Path) -> io::Result<()> {
    with_retries(|| fs::remove_dir(path))
}

fn with_retries<F>(mut op: F) -> io::Result<()>
where
    F: FnMut() -> io::Result<()>,
{
    let mut last_error = None;

    for (i, &delay_ms) in RETRY_DELAYS_MS
        .iter()
        .enumerate()
        .take(MAX_RETRIES as usize)
    {
        match op() {
            Ok(()) => return Ok(()),
            Err(e) => {
                if !is_retryable_error(&e) {
                    return Err(e);
                }
                last_error = Some(e);
                if i < MAX_RETRIES as usize - 1 && delay_ms > 0 {
                    thread::sleep(Duration::from_millis(delay_ms));
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "max retries exceeded")))
}

/// Sharing and lock violations are usually transient on Windows (antivirus,
/// indexer). ERROR_ACCESS_DENIED is included because a file with a pending
/// delete reports it too.
#[cfg(windows)]
fn is_retryable_error(error: &io::Error) -> bool {
    const ERROR_ACCESS_DENIED: i32 = 5;
    const ERROR_SHARING_VIOLATION: i32 = 32;
    const ERROR_LOCK_VIOLATION: i32 = 33;

    matches!(
        error.raw_os_error(),
        Some(ERROR_ACCESS_DENIED) | Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
    )
}

#[cfg(not(windows))]
fn is_retryable_error(_error: &io::Error) -> bool {
    false
}

/// Windows refuses to unlink a file with the read-only attribute set.
/// Returns whether the attribute was cleared.
#[cfg(windows)]
fn clear_readonly(path: &Path) -> bool {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return false;
    };
    let mut permissions = metadata.permissions();
    if !permissions.readonly() {
        return false;
    }
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions).is_ok()
}

/// The read-only bit does not block unlinking here.
#[cfg(not(windows))]
fn clear_readonly(_path: &Path) -> bool {
    false
}

/// Check if an error indicates the file/directory no longer exists
pub fn is_not_found_error(error: &io::Error) -> bool {
    const ERROR_FILE_NOT_FOUND: i32 = 2;
    const ERROR_PATH_NOT_FOUND: i32 = 3;

    if cfg!(windows) {
        if let Some(code) = error.raw_os_error() {
            if matches!(code, ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND) {
                return true;
            }
        }
    }

    error.kind() == io::ErrorKind::NotFound
}
