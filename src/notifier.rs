//! Change notifier: kernel filesystem events into the pipeline.
//!
//! One non-recursive watch per known directory, registered by the bulk
//! walker as it descends. The notify backend delivers events on its own
//! thread; they cross into the cooperative scheduler over an unbounded
//! channel. Each event path is stat'd without following symlinks and fed
//! to `process_change`; a missing stat result is a deletion candidate.

use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::paths::stat_nofollow;
use crate::pipeline::Pipeline;

/// Handle through which directories are subscribed to change events.
///
/// Registration failures are logged, not fatal: a directory we cannot
/// watch is still revisited by the next bulk walk.
pub struct WatchRegistry {
    watcher: RefCell<Option<RecommendedWatcher>>,
}

impl WatchRegistry {
    /// Subscribe one directory (non-recursive). Returns whether the watch
    /// was registered.
    pub fn watch_dir(&self, dir: &Path) -> bool {
        let mut watcher = self.watcher.borrow_mut();
        let Some(watcher) = watcher.as_mut() else {
            return false;
        };
        match watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => true,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to register watch");
                false
            }
        }
    }

    /// Drop the underlying watcher, stopping event delivery. Called first
    /// during shutdown so no new work arrives while in-flight batches
    /// commit.
    pub fn shutdown(&self) {
        self.watcher.borrow_mut().take();
    }
}

/// Create the watch registry and the channel its events arrive on.
pub fn create() -> Result<(WatchRegistry, async_channel::Receiver<notify::Result<Event>>)> {
    let (tx, rx) = async_channel::unbounded();
    let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        // Runs on the notify thread; the channel is the only bridge into
        // the single-threaded scheduler.
        let _ = tx.send_blocking(result);
    })?;
    Ok((
        WatchRegistry {
            watcher: RefCell::new(Some(watcher)),
        },
        rx,
    ))
}

/// Consume change events until the watcher is dropped.
pub async fn run(
    pipeline: Rc<Pipeline>,
    events: async_channel::Receiver<notify::Result<Event>>,
) {
    while let Ok(result) = events.recv().await {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "change notification error");
                continue;
            }
        };
        // Reads and opens carry no catalog-relevant information.
        if matches!(event.kind, EventKind::Access(_)) {
            continue;
        }
        for path in event.paths {
            if path.starts_with(&pipeline.config().db_dir) {
                // Writing the catalog must not feed the catalog.
                continue;
            }
            if pipeline.filter().skip_file(&path) {
                debug!(path = %path.display(), "ignoring event for excluded path");
                continue;
            }
            let stat = match stat_nofollow(&path) {
                Ok(stat) => stat,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "stat failed for event");
                    continue;
                }
            };
            pipeline.process_change(path, stat).await;
        }
    }
    debug!("change notifier stopped");
}
