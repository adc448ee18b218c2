use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io {
        path: Option<PathBuf>,
        source: io::Error,
    },
    InvalidPath {
        path: PathBuf,
        reason: String,
    },
    PartialFailure {
        path: PathBuf,
        failed: usize,
        errors: Vec<FailedItem>,
    },
}

/// What went wrong while removing one entry of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Listing a directory's contents failed.
    Enumeration,
    /// Unlinking a file, symlink or other leaf entry failed.
    FileRemoval,
    /// Removing a directory that should have been empty failed.
    DirectoryRemoval,
    /// The tree was not in the state the engine relies on, e.g. a directory
    /// still had contents when its last holder released it.
    InvariantViolation,
    /// A worker task ended without reporting completion.
    TaskLost,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Enumeration => "cannot read directory",
            FailureKind::FileRemoval => "cannot remove file",
            FailureKind::DirectoryRemoval => "cannot remove directory",
            FailureKind::InvariantViolation => "invariant violated",
            FailureKind::TaskLost => "worker task lost",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct FailedItem {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub error: String,
}

impl FailedItem {
    pub fn new(path: PathBuf, kind: FailureKind, error: impl fmt::Display) -> Self {
        Self {
            path,
            kind,
            error: error.to_string(),
        }
    }

    pub fn is_dir(&self) -> bool {
        !matches!(self.kind, FailureKind::FileRemoval)
    }
}

impl fmt::Display for FailedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {}", self.kind, self.path.display(), self.error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io { path, source } => {
                if let Some(p) = path {
                    write!(f, "I/O error for '{}': {}", p.display(), source)
                } else {
                    write!(f, "I/O error: {}", source)
                }
            }
            Error::InvalidPath { path, reason } => {
                write!(f, "Invalid path '{}': {}", path.display(), reason)
            }
            Error::PartialFailure { path, failed, .. } => {
                write!(
                    f,
                    "Partial deletion failure under '{}': {} items failed",
                    path.display(),
                    failed
                )
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io {
            path: None,
            source: err,
        }
    }
}

impl Error {
    pub fn io_with_path(path: PathBuf, source: io::Error) -> Self {
        Error::Io {
            path: Some(path),
            source,
        }
    }

    /// Entries left behind by a partial failure; empty for other errors.
    pub fn failed_items(&self) -> &[FailedItem] {
        match self {
            Error::PartialFailure { errors, .. } => errors,
            _ => &[],
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Io { .. } => 2,
            Error::InvalidPath { .. } => 1,
            Error::PartialFailure { .. } => 1,
        }
    }
}
