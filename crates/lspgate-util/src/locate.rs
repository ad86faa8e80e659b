//! Bounded-depth file location under a root directory.
//!
//! Language server distributions bury their launcher artifacts at
//! unpredictable depths (the Eclipse JDT launcher JAR being the canonical
//! offender). Rather than scattering ad hoc recursive searches through
//! launch code, callers describe what they want as a filename predicate
//! and get back the first match within a depth bound.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find the first file under `root` (up to `max_depth` levels deep) whose
/// file name satisfies `predicate`.
///
/// Traversal order is not specified beyond being deterministic per
/// filesystem state. Unreadable directories are skipped, not errors.
pub fn locate_file<P>(root: &Path, max_depth: usize, predicate: P) -> Option<PathBuf>
where
    P: Fn(&str) -> bool,
{
    WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| {
            entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .map(|name| predicate(name))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_locate_finds_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("plugins").join("deep");
        fs::create_dir_all(&nested).unwrap();
        let target = nested.join("org.eclipse.equinox.launcher_1.6.400.jar");
        fs::write(&target, b"jar").unwrap();

        let found = locate_file(dir.path(), 4, |name| {
            name.starts_with("org.eclipse.equinox.launcher_") && name.ends_with(".jar")
        });
        assert_eq!(found, Some(target));
    }

    #[test]
    fn test_locate_respects_depth_bound() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("needle.txt"), b"x").unwrap();

        assert!(locate_file(dir.path(), 2, |name| name == "needle.txt").is_none());
        assert!(locate_file(dir.path(), 4, |name| name == "needle.txt").is_some());
    }

    #[test]
    fn test_locate_ignores_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("needle.txt")).unwrap();

        assert!(locate_file(dir.path(), 2, |name| name == "needle.txt").is_none());
    }

    #[test]
    fn test_locate_missing_root() {
        let found = locate_file(Path::new("/nonexistent/lspgate/root"), 3, |_| true);
        assert!(found.is_none());
    }
}
