//! Exclusion filter.
//!
//! A pure predicate over `(canonical path, basename)`, built once from the
//! configuration and consulted both while walking (to prune subtrees) and
//! when deciding whether to act on a change event. Swap files are sampled
//! once at startup from the host's swap administration tool.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::config::Config;

/// Compiled exclusion rules.
pub struct ExclusionFilter {
    exclude_paths: HashSet<PathBuf>,
    exclude_directories: HashSet<String>,
    patterns: Vec<Regex>,
    swapfiles: HashSet<PathBuf>,
}

impl ExclusionFilter {
    /// Build the filter from configuration, compiling regexes and sampling
    /// the host swap-file list.
    ///
    /// A malformed pattern is a startup failure; an unavailable swap tool
    /// is not (the swap list is simply empty).
    pub fn from_config(config: &Config) -> Result<Self> {
        let patterns = config
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("invalid exclude pattern {:?}", pattern))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            exclude_paths: config.exclude_paths.iter().cloned().collect(),
            exclude_directories: config.exclude_directories.iter().cloned().collect(),
            patterns,
            swapfiles: find_swapfiles(),
        })
    }

    /// Whether a directory should be pruned: exact path, basename, or
    /// pattern match.
    pub fn skip_dir(&self, path: &Path, name: &str) -> bool {
        if self.exclude_paths.contains(path) {
            return true;
        }
        if self.exclude_directories.contains(name) {
            return true;
        }
        self.matches_pattern(path)
    }

    /// Whether a file or symlink should be ignored: exact path, active
    /// swap file, or pattern match.
    pub fn skip_file(&self, path: &Path) -> bool {
        if self.exclude_paths.contains(path) {
            return true;
        }
        if self.swapfiles.contains(path) {
            return true;
        }
        self.matches_pattern(path)
    }

    fn matches_pattern(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        self.patterns.iter().any(|pattern| pattern.is_match(&text))
    }
}

/// Enumerate active swap files by running the host swap tool.
///
/// Failure is non-fatal: on platforms without `swapon` the exclusion
/// simply does nothing.
fn find_swapfiles() -> HashSet<PathBuf> {
    let output = match Command::new("/sbin/swapon")
        .args(["--show=NAME", "--noheadings"])
        .output()
    {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            debug!(status = %output.status, "swapon failed, no swap files excluded");
            return HashSet::new();
        }
        Err(e) => {
            debug!(error = %e, "swapon unavailable, no swap files excluded");
            return HashSet::new();
        }
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_with(
        paths: &[&str],
        directories: &[&str],
        patterns: &[&str],
        swapfiles: &[&str],
    ) -> ExclusionFilter {
        ExclusionFilter {
            exclude_paths: paths.iter().map(PathBuf::from).collect(),
            exclude_directories: directories.iter().map(|s| s.to_string()).collect(),
            patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
            swapfiles: swapfiles.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn test_skip_dir_by_basename() {
        let filter = filter_with(&[], &["node_modules"], &[], &[]);
        assert!(filter.skip_dir(Path::new("/a/node_modules"), "node_modules"));
        assert!(!filter.skip_dir(Path::new("/a/src"), "src"));
    }

    #[test]
    fn test_skip_dir_by_exact_path() {
        let filter = filter_with(&["/home/me/scratch"], &[], &[], &[]);
        assert!(filter.skip_dir(Path::new("/home/me/scratch"), "scratch"));
        assert!(!filter.skip_dir(Path::new("/home/me/scratch2"), "scratch2"));
    }

    #[test]
    fn test_skip_by_pattern() {
        let filter = filter_with(&[], &[], &[r"\.cache/"], &[]);
        assert!(filter.skip_dir(Path::new("/home/me/.cache/x"), "x"));
        assert!(filter.skip_file(Path::new("/home/me/.cache/x/data")));
        assert!(!filter.skip_file(Path::new("/home/me/data")));
    }

    #[test]
    fn test_skip_file_swap() {
        let filter = filter_with(&[], &[], &[], &["/swapfile"]);
        assert!(filter.skip_file(Path::new("/swapfile")));
        assert!(!filter.skip_file(Path::new("/swapfile.bak")));
    }

    #[test]
    fn test_directory_basenames_do_not_exclude_files() {
        let filter = filter_with(&[], &["node_modules"], &[], &[]);
        // A file named like an excluded directory basename is still visited.
        assert!(!filter.skip_file(Path::new("/a/node_modules")));
    }

    #[test]
    fn test_from_config_rejects_bad_pattern() {
        let config = Config {
            exclude_patterns: vec!["(unclosed".to_string()],
            ..Config::default()
        };
        assert!(ExclusionFilter::from_config(&config).is_err());
    }
}
