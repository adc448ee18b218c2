//! Refuses roots whose deletion would wreck the machine or the caller.

use std::env;
use std::path::{Path, PathBuf};

#[cfg(unix)]
const PROTECTED: &[&str] = &[
    "/", "/bin", "/boot", "/dev", "/etc", "/home", "/lib", "/lib64", "/opt", "/proc", "/root",
    "/sbin", "/sys", "/usr", "/var",
];

#[cfg(windows)]
const PROTECTED: &[&str] = &[
    "C:\\Windows",
    "C:\\Windows\\System32",
    "C:\\Program Files",
    "C:\\Program Files (x86)",
    "C:\\ProgramData",
    "C:\\Users",
];

#[cfg(not(any(unix, windows)))]
const PROTECTED: &[&str] = &[];

#[derive(Debug, PartialEq, Eq)]
pub enum SafetyCheck {
    Safe,
    Dangerous { reason: String, can_override: bool },
}

fn same_path(a: &str, b: &str) -> bool {
    if cfg!(windows) {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

fn home_dir() -> Option<PathBuf> {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    env::var_os(var).map(PathBuf::from)
}

pub fn is_system_directory(path: &Path) -> bool {
    // A filesystem root has no parent, whatever the platform.
    let canonical = path.canonicalize().ok();
    if canonical.as_deref().map_or(false, |p| p.parent().is_none()) {
        return true;
    }

    let given = path.to_string_lossy();
    let resolved = canonical.as_ref().map(|p| p.to_string_lossy());
    let protected = PROTECTED.iter().any(|p| {
        same_path(&given, p) || resolved.as_deref().map_or(false, |r| same_path(r, p))
    });
    if protected {
        return true;
    }

    match (canonical, home_dir().and_then(|h| h.canonicalize().ok())) {
        (Some(p), Some(home)) => p == home,
        _ => false,
    }
}

/// True if `path` is the working directory or one of its ancestors.
pub fn contains_current_directory(path: &Path) -> bool {
    match (path.canonicalize(), env::current_dir().and_then(|d| d.canonicalize())) {
        (Ok(target), Ok(cwd)) => cwd.starts_with(&target),
        _ => false,
    }
}

pub fn check_path_safety(path: &Path) -> SafetyCheck {
    if is_system_directory(path) {
        return SafetyCheck::Dangerous {
            reason: format!(
                "'{}' is a system directory - deleting it could break your system",
                path.display()
            ),
            can_override: false,
        };
    }

    if contains_current_directory(path) {
        return SafetyCheck::Dangerous {
            reason: format!(
                "'{}' contains or is your current working directory",
                path.display()
            ),
            can_override: true,
        };
    }

    SafetyCheck::Safe
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_directory_is_safe() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("build-output");
        std::fs::create_dir(&dir).unwrap();
        assert_eq!(check_path_safety(&dir), SafetyCheck::Safe);
    }

    #[cfg(unix)]
    #[test]
    fn test_filesystem_root_is_protected() {
        assert!(is_system_directory(Path::new("/")));
        assert!(matches!(
            check_path_safety(Path::new("/usr")),
            SafetyCheck::Dangerous {
                can_override: false,
                ..
            }
        ));
    }

    #[test]
    fn test_current_directory_ancestor_is_flagged() {
        let cwd = env::current_dir().unwrap();
        assert!(contains_current_directory(&cwd));
        if let Some(parent) = cwd.parent() {
            assert!(contains_current_directory(parent));
        }
    }
}
