//! filer: a durable catalog of filesystem contents.
//!
//! filer walks a configured set of roots, watches them for kernel change
//! notifications, and maintains a SQLite catalog recording each file's
//! content digest, size, modification time and observational history.
//! Files still being written are deferred through a settle protocol and
//! revisited from a durable queue instead of being recorded mid-change.

pub mod batcher;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod filter;
pub mod hasher;
pub mod logging;
pub mod notifier;
pub mod paths;
pub mod pipeline;
pub mod scheduler;
pub mod walker;
pub mod worker;

pub use batcher::{BatchKind, ChangeBatch, BATCH_SIZE, BATCH_TIMEOUT};
pub use catalog::{Catalog, CatalogError, CurrentObservation, DB_FILENAME};
pub use config::{config_paths, load_config, load_config_from_path, Config, ConfigError};
pub use filter::ExclusionFilter;
pub use hasher::{hash_file, HashOutcome};
pub use paths::{canonical_path, stat_nofollow};
pub use pipeline::Pipeline;
