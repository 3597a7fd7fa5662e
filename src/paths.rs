//! Canonical-path computation and no-follow stat helpers.
//!
//! A canonical path is the normalized absolute path with symlinks resolved
//! in its directory components and the trailing component left as-is.
//! `std::fs::canonicalize` follows the leaf, which would collapse distinct
//! symlinks pointing at the same target into one record, so the containing
//! directory is resolved separately and the basename rejoined.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Canonicalize `path` without following its final component.
///
/// The parent directory is fully resolved (symlinks, `.`, `..`); the leaf
/// name is appended unchanged. A path with no parent (such as `/`) is
/// canonicalized directly.
///
/// Fails when the containing directory does not exist or cannot be read.
pub fn canonical_path(path: &Path) -> io::Result<PathBuf> {
    let name = match path.file_name() {
        Some(name) => name,
        None => return fs::canonicalize(path),
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(fs::canonicalize(parent)?.join(name))
}

/// Stat a path without following symlinks.
///
/// A missing entry is a signal, not an error: it maps to `Ok(None)`. All
/// other stat failures propagate.
pub fn stat_nofollow(path: &Path) -> io::Result<Option<fs::Metadata>> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_canonical_path_resolves_parent_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = fs::canonicalize(temp_dir.path()).unwrap();

        let target = root.join("target.txt");
        fs::write(&target, b"data").unwrap();

        let link = root.join("link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        // The leaf symlink must not be resolved away.
        let canonical = canonical_path(&link).unwrap();
        assert_eq!(canonical, link);
        assert_ne!(canonical, target);
    }

    #[test]
    fn test_canonical_path_resolves_dir_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let root = fs::canonicalize(temp_dir.path()).unwrap();

        let real_dir = root.join("real");
        fs::create_dir(&real_dir).unwrap();
        fs::write(real_dir.join("f.txt"), b"x").unwrap();

        let dir_link = root.join("alias");
        std::os::unix::fs::symlink(&real_dir, &dir_link).unwrap();

        let canonical = canonical_path(&dir_link.join("f.txt")).unwrap();
        assert_eq!(canonical, real_dir.join("f.txt"));
    }

    #[test]
    fn test_canonical_path_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("no/such/dir/file.txt");
        assert!(canonical_path(&missing).is_err());
    }

    #[test]
    fn test_stat_nofollow_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("gone.txt");
        assert!(stat_nofollow(&missing).unwrap().is_none());
    }

    #[test]
    fn test_stat_nofollow_does_not_follow() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        let link = root.join("dangling");
        std::os::unix::fs::symlink(root.join("nowhere"), &link).unwrap();

        // A dangling symlink still stats as a symlink.
        let meta = stat_nofollow(&link).unwrap().unwrap();
        assert!(meta.file_type().is_symlink());
    }
}
