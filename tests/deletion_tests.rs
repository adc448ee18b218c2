use fast_deltree::error::FailureKind;
use fast_deltree::fsops::{FileEntry, Filesystem, OsFilesystem};
use fast_deltree::{delete_directory_recursive, Deleter, DeleterConfig, DeletionReport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Host filesystem that records every successful removal in order and can be
/// told to fail or panic on chosen paths.
#[derive(Default)]
struct RecordingFs {
    removed: Mutex<Vec<PathBuf>>,
    fail_remove: Vec<PathBuf>,
    fail_enumerate: Vec<PathBuf>,
    panic_enumerate: Vec<PathBuf>,
}

impl RecordingFs {
    fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().clone()
    }
}

fn injected() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "injected failure")
}

impl Filesystem for RecordingFs {
    fn enumerate(
        &self,
        dir: &Path,
        callback: &mut dyn FnMut(FileEntry) -> io::Result<()>,
    ) -> io::Result<()> {
        if self.panic_enumerate.iter().any(|p| p == dir) {
            panic!("injected panic for {}", dir.display());
        }
        if self.fail_enumerate.iter().any(|p| p == dir) {
            return Err(injected());
        }
        OsFilesystem.enumerate(dir, callback)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        if self.fail_remove.iter().any(|p| p == path) {
            return Err(injected());
        }
        OsFilesystem.remove_file(path)?;
        self.removed.lock().push(path.to_path_buf());
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        if self.fail_remove.iter().any(|p| p == path) {
            return Err(injected());
        }
        OsFilesystem.remove_dir(path)?;
        self.removed.lock().push(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        OsFilesystem.exists(path)
    }

    fn is_directory(&self, path: &Path) -> bool {
        OsFilesystem.is_directory(path)
    }

    fn is_empty(&self, dir: &Path) -> io::Result<bool> {
        OsFilesystem.is_empty(dir)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        OsFilesystem.is_symlink(path)
    }
}

fn run_with(fs: Arc<RecordingFs>, root: &Path, threads: Option<usize>) -> DeletionReport {
    Deleter::new(DeleterConfig {
        threads,
        filesystem: fs,
    })
    .run(root)
    .unwrap()
}

/// Builds `fanout` subdirectories per level down to `depth`, each holding
/// `files` files. Returns (files, dirs) created below `root`, `root` excluded.
fn build_tree(root: &Path, depth: usize, fanout: usize, files: usize) -> (usize, usize) {
    let mut counts = (0, 0);
    for f in 0..files {
        fs::write(root.join(format!("file{}.txt", f)), "content").unwrap();
        counts.0 += 1;
    }
    if depth == 0 {
        return counts;
    }
    for d in 0..fanout {
        let sub = root.join(format!("dir{}", d));
        fs::create_dir(&sub).unwrap();
        counts.1 += 1;
        let (f, s) = build_tree(&sub, depth - 1, fanout, files);
        counts.0 += f;
        counts.1 += s;
    }
    counts
}

fn scratch_root(temp: &TempDir) -> PathBuf {
    let root = temp.path().join("root");
    fs::create_dir(&root).unwrap();
    root
}

#[test]
fn test_removes_whole_tree_and_counts_entries() {
    let temp = TempDir::new().unwrap();
    let root = scratch_root(&temp);
    let (files, dirs) = build_tree(&root, 3, 3, 4);

    let report = Deleter::default().run(&root).unwrap();

    assert!(report.success, "failures: {:?}", report.failures);
    assert!(!root.exists());
    assert_eq!(report.files_removed, files);
    assert_eq!(report.dirs_removed, dirs + 1);
    assert_eq!(report.dirs_visited, dirs + 1);
    assert_eq!(report.total_removed(), files + dirs + 1);
}

#[test]
fn test_every_directory_is_removed_after_its_contents() {
    let temp = TempDir::new().unwrap();
    let root = scratch_root(&temp);
    build_tree(&root, 4, 3, 3);

    let fs = Arc::new(RecordingFs::default());
    let report = run_with(Arc::clone(&fs), &root, Some(4));
    assert!(report.success);

    let removed = fs.removed();
    let position: HashMap<&Path, usize> = removed
        .iter()
        .enumerate()
        .map(|(i, p)| (p.as_path(), i))
        .collect();

    for (i, path) in removed.iter().enumerate() {
        let mut ancestor = path.parent();
        while let Some(dir) = ancestor {
            if let Some(&dir_pos) = position.get(dir) {
                assert!(
                    i < dir_pos,
                    "'{}' removed after its ancestor '{}'",
                    path.display(),
                    dir.display()
                );
            }
            ancestor = dir.parent();
        }
    }

    assert_eq!(removed.last().map(PathBuf::as_path), Some(root.as_path()));
}

#[test]
fn test_failed_file_leaves_siblings_fully_removed() {
    let temp = TempDir::new().unwrap();
    let root = scratch_root(&temp);
    for name in ["a", "b", "c"] {
        let dir = root.join(name);
        fs::create_dir(&dir).unwrap();
        build_tree(&dir, 2, 2, 5);
    }
    let locked = root.join("a").join("dir1").join("file3.txt");

    let fs = Arc::new(RecordingFs {
        fail_remove: vec![locked.clone()],
        ..Default::default()
    });
    let report = run_with(fs, &root, None);

    assert!(!report.success);
    assert!(!root.join("b").exists());
    assert!(!root.join("c").exists());
    assert!(!root.join("a").join("dir0").exists());
    assert!(locked.exists());
    assert!(root.exists());

    // One genuine failure; ancestors left in place are not reported again.
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::FileRemoval);
    assert_eq!(report.failures[0].path, locked);
}

#[test]
fn test_enumeration_failure_is_recorded_and_siblings_continue() {
    let temp = TempDir::new().unwrap();
    let root = scratch_root(&temp);
    let (unreadable, other) = (root.join("unreadable"), root.join("other"));
    fs::create_dir(&unreadable).unwrap();
    fs::create_dir(&other).unwrap();
    build_tree(&unreadable, 1, 2, 2);
    build_tree(&other, 1, 2, 2);

    let fs = Arc::new(RecordingFs {
        fail_enumerate: vec![unreadable.clone()],
        ..Default::default()
    });
    let report = run_with(fs, &root, Some(2));

    assert!(!report.success);
    assert!(unreadable.exists());
    assert!(!other.exists());
    assert!(report
        .failures
        .iter()
        .all(|f| f.kind == FailureKind::Enumeration && f.path == unreadable));
}

#[test]
fn test_directory_removal_failure_is_reported() {
    let temp = TempDir::new().unwrap();
    let root = scratch_root(&temp);
    let stuck = root.join("stuck");
    fs::create_dir(&stuck).unwrap();
    fs::write(stuck.join("f"), "x").unwrap();

    let fs = Arc::new(RecordingFs {
        fail_remove: vec![stuck.clone()],
        ..Default::default()
    });
    let report = run_with(fs, &root, None);

    assert!(!report.success);
    assert!(stuck.exists());
    assert!(!stuck.join("f").exists());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::DirectoryRemoval);
}

#[test]
fn test_panicking_task_is_reported_as_lost() {
    let temp = TempDir::new().unwrap();
    let root = scratch_root(&temp);
    let bad = root.join("bad");
    fs::create_dir(&bad).unwrap();
    fs::write(bad.join("f"), "x").unwrap();
    fs::create_dir(root.join("good")).unwrap();

    let fs = Arc::new(RecordingFs {
        panic_enumerate: vec![bad.clone()],
        ..Default::default()
    });
    let report = run_with(fs, &root, Some(2));

    assert!(!report.success);
    assert!(!root.join("good").exists());
    assert!(report
        .failures
        .iter()
        .any(|f| f.kind == FailureKind::TaskLost && f.path == bad));
}

#[test]
fn test_empty_root_is_removed() {
    let temp = TempDir::new().unwrap();
    let root = scratch_root(&temp);

    assert!(delete_directory_recursive(&root));
    assert!(!root.exists());
}

#[test]
fn test_missing_root_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    let root = scratch_root(&temp);
    build_tree(&root, 1, 2, 1);

    assert!(delete_directory_recursive(&root));
    assert!(delete_directory_recursive(&root));

    let report = Deleter::default().run(&root).unwrap();
    assert!(report.success);
    assert_eq!(report.total_removed(), 0);
}

#[test]
fn test_two_large_siblings_are_both_removed() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");

    for threads in [Some(1), Some(2), None] {
        for name in ["A", "B"] {
            let dir = root.join(name);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..1000 {
                fs::write(dir.join(format!("f{}", i)), "").unwrap();
            }
        }

        let report = Deleter::new(DeleterConfig {
            threads,
            ..Default::default()
        })
        .run(&root)
        .unwrap();

        assert!(report.success, "threads {:?}: {:?}", threads, report.failures);
        assert_eq!(report.files_removed, 2000);
        assert_eq!(report.dirs_removed, 3);
        assert!(!root.exists());
    }
}

#[test]
fn test_wide_and_deep_trees() {
    let temp = TempDir::new().unwrap();

    let wide = temp.path().join("wide");
    fs::create_dir(&wide).unwrap();
    for i in 0..300 {
        let d = wide.join(format!("d{}", i));
        fs::create_dir(&d).unwrap();
        fs::write(d.join("x"), "x").unwrap();
    }

    let deep = temp.path().join("deep");
    let mut current = deep.clone();
    for i in 0..60 {
        current = current.join(format!("level{}", i));
    }
    fs::create_dir_all(&current).unwrap();
    fs::write(current.join("bottom.txt"), "x").unwrap();

    assert!(delete_directory_recursive(&wide));
    assert!(delete_directory_recursive(&deep));
    assert!(!wide.exists());
    assert!(!deep.exists());
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_removed_not_followed() {
    use std::os::unix::fs::symlink;

    let temp = TempDir::new().unwrap();
    let outside = temp.path().join("outside");
    fs::create_dir(&outside).unwrap();
    fs::write(outside.join("keep.txt"), "precious").unwrap();
    fs::create_dir(outside.join("nested")).unwrap();

    let root = scratch_root(&temp);
    symlink(&outside, root.join("dir_link")).unwrap();
    symlink(outside.join("keep.txt"), root.join("file_link")).unwrap();
    symlink(temp.path().join("nowhere"), root.join("dangling")).unwrap();

    let report = Deleter::default().run(&root).unwrap();

    assert!(report.success, "failures: {:?}", report.failures);
    assert!(!root.exists());
    assert!(outside.join("keep.txt").exists());
    assert!(outside.join("nested").exists());
    assert_eq!(report.files_removed, 3);
}

#[cfg(unix)]
#[test]
fn test_symlink_root_is_refused() {
    use std::os::unix::fs::symlink;

    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    fs::create_dir(&target).unwrap();
    fs::write(target.join("keep.txt"), "x").unwrap();
    let link = temp.path().join("link");
    symlink(&target, &link).unwrap();

    let report = Deleter::default().run(&link).unwrap();

    assert!(!report.success);
    assert_eq!(report.failures[0].kind, FailureKind::InvariantViolation);
    assert!(target.join("keep.txt").exists());
}
