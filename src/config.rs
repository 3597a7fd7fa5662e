//! Configuration loading.
//!
//! Configuration is a single JSON file; the first existing file in the
//! search order wins. Unknown keys warn on standard error but never fail
//! startup, so old configs keep working across versions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default settle window in seconds.
const DEFAULT_SETTLE_TIME: f64 = 30.0;

/// Default catalog directory (tilde-expanded at load).
const DEFAULT_DB_DIR: &str = "~/.filer";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration file found: checked {0}")]
    NotFound(String),

    #[error("cannot read config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Effective configuration, immutable after load.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Root directories to walk and watch.
    pub roots: Vec<PathBuf>,
    /// Exact canonical paths to exclude.
    pub exclude_paths: Vec<PathBuf>,
    /// Directory basenames to exclude wherever they appear.
    pub exclude_directories: Vec<String>,
    /// Regexes matched against canonical paths.
    pub exclude_patterns: Vec<String>,
    /// Directory holding the catalog database.
    pub db_dir: PathBuf,
    /// Settle window in seconds; clamped to >= 0, may be fractional.
    pub settle_time: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from("/")],
            exclude_paths: Vec::new(),
            exclude_directories: Vec::new(),
            exclude_patterns: Vec::new(),
            db_dir: expand_tilde(DEFAULT_DB_DIR),
            settle_time: DEFAULT_SETTLE_TIME,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    roots: Option<Vec<String>>,
    exclude: Option<RawExclude>,
    db: Option<RawDb>,
    times: Option<RawTimes>,
    #[serde(flatten)]
    unknown: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawExclude {
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    directories: Vec<String>,
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(flatten)]
    unknown: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDb {
    dir: Option<String>,
    #[serde(flatten)]
    unknown: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTimes {
    settle: Option<f64>,
    #[serde(flatten)]
    unknown: BTreeMap<String, serde_json::Value>,
}

/// The ordered list of locations the loader consults.
///
/// The last entry is a bundled default beside the executable, so a fresh
/// install runs without any user configuration.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("./local_filer_config.json"),
        expand_tilde("~/.filer_config.json"),
        expand_tilde("~/.config/filer/config.json"),
        PathBuf::from("/etc/filer/config.json"),
    ];
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            paths.push(dir.join("config.json"));
        }
    }
    paths
}

/// Load the configuration from the first existing file in the search order.
pub fn load_config() -> Result<Config, ConfigError> {
    let paths = config_paths();
    for path in &paths {
        if path.is_file() {
            return load_config_from_path(path);
        }
    }
    let checked = paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(", ");
    Err(ConfigError::NotFound(checked))
}

/// Load and validate a specific configuration file.
pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let data = fs::read(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawConfig =
        serde_json::from_slice(&data).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    warn_unknown("config", &raw.unknown);

    let exclude = raw.exclude.unwrap_or_default();
    warn_unknown("exclude", &exclude.unknown);

    let db = raw.db.unwrap_or_default();
    warn_unknown("db", &db.unknown);

    let times = raw.times.unwrap_or_default();
    warn_unknown("times", &times.unknown);

    let defaults = Config::default();
    Ok(Config {
        roots: raw
            .roots
            .map(|roots| roots.into_iter().map(PathBuf::from).collect())
            .unwrap_or(defaults.roots),
        exclude_paths: exclude.paths.into_iter().map(PathBuf::from).collect(),
        exclude_directories: exclude.directories,
        exclude_patterns: exclude.patterns,
        db_dir: db
            .dir
            .map(|dir| expand_tilde(&dir))
            .unwrap_or(defaults.db_dir),
        settle_time: times
            .settle
            .unwrap_or(DEFAULT_SETTLE_TIME)
            .max(0.0),
    })
}

fn warn_unknown(section: &str, unknown: &BTreeMap<String, serde_json::Value>) {
    if !unknown.is_empty() {
        let keys: Vec<&str> = unknown.keys().map(String::as_str).collect();
        eprintln!("Warning: unknown {} items: {:?}", section, keys);
    }
}

/// Expand a leading `~` against `$HOME`. Paths without one pass through.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home);
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "{}");

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.roots, vec![PathBuf::from("/")]);
        assert!(config.exclude_paths.is_empty());
        assert!(config.exclude_directories.is_empty());
        assert!(config.exclude_patterns.is_empty());
        assert_eq!(config.settle_time, DEFAULT_SETTLE_TIME);
    }

    #[test]
    fn test_full_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"{
                "roots": ["/home/me", "/srv/data"],
                "exclude": {
                    "paths": ["/home/me/scratch"],
                    "directories": ["node_modules", ".git"],
                    "patterns": ["\\.tmp$"]
                },
                "db": {"dir": "/var/lib/filer"},
                "times": {"settle": 2.5}
            }"#,
        );

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.roots.len(), 2);
        assert_eq!(config.exclude_paths, vec![PathBuf::from("/home/me/scratch")]);
        assert_eq!(config.exclude_directories, vec!["node_modules", ".git"]);
        assert_eq!(config.exclude_patterns, vec!["\\.tmp$"]);
        assert_eq!(config.db_dir, PathBuf::from("/var/lib/filer"));
        assert_eq!(config.settle_time, 2.5);
    }

    #[test]
    fn test_negative_settle_clamps_to_zero() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"{"times": {"settle": -5}}"#);

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.settle_time, 0.0);
    }

    #[test]
    fn test_unknown_keys_do_not_fail() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"{"datadir": "/old", "exclude": {"globs": ["*"]}, "roots": ["/tmp"]}"#,
        );

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.roots, vec![PathBuf::from("/tmp")]);
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "{not json");

        match load_config_from_path(&path) {
            Err(ConfigError::Malformed { .. }) => {}
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");

        match load_config_from_path(&path) {
            Err(ConfigError::Unreadable { .. }) => {}
            other => panic!("expected Unreadable, got {:?}", other),
        }
    }

    #[test]
    fn test_config_paths_are_ordered() {
        let paths = config_paths();
        assert!(paths.len() >= 4);
        assert_eq!(paths[0], PathBuf::from("./local_filer_config.json"));
        assert_eq!(paths[3], PathBuf::from("/etc/filer/config.json"));
    }
}
