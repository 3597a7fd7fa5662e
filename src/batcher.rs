//! Per-kind debounced change batches.
//!
//! Three parallel batches (regular files, symlinks, deletions), each a
//! pending map from path to mtime plus an earliest-flush deadline and a
//! condition variable. The newest observation for a path wins; a batch is
//! flushed when it reaches `BATCH_SIZE` or its deadline passes, whichever
//! happens first. The maps are transient by design: losing them on restart
//! is acceptable because the next bulk walk rediscovers the paths and the
//! revisit queue is durable.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Notify;

/// Flush when a batch reaches this many pending entries.
pub const BATCH_SIZE: usize = 1000;

/// Flush a non-empty batch at most this many seconds after its first entry.
pub const BATCH_TIMEOUT: f64 = 5.0;

/// Which of the three parallel batches a `ChangeBatch` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Files,
    Symlinks,
    Deletions,
}

impl BatchKind {
    pub fn label(self) -> &'static str {
        match self {
            BatchKind::Files => "files",
            BatchKind::Symlinks => "symlinks",
            BatchKind::Deletions => "deletions",
        }
    }
}

/// One debounced batch: pending map, deadline, condition variable.
///
/// Interior mutability only; the batch lives inside the single-threaded
/// pipeline and no borrow is held across a suspension point.
pub struct ChangeBatch {
    kind: BatchKind,
    pending: RefCell<HashMap<PathBuf, Option<i64>>>,
    deadline: Cell<Option<f64>>,
    arrival: Notify,
}

impl ChangeBatch {
    pub fn new(kind: BatchKind) -> Self {
        Self {
            kind,
            pending: RefCell::new(HashMap::new()),
            deadline: Cell::new(None),
            arrival: Notify::new(),
        }
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    /// Ingest one observation, overwriting any prior pending entry for the
    /// same path. Arms the deadline when the batch was empty and wakes the
    /// polling task. Returns true when the size trigger has been reached
    /// and the caller should flush now.
    pub fn insert(&self, path: PathBuf, mtime: Option<i64>, now: f64) -> bool {
        let full = {
            let mut pending = self.pending.borrow_mut();
            pending.insert(path, mtime);
            if self.deadline.get().is_none() {
                self.deadline.set(Some(now + BATCH_TIMEOUT));
            }
            pending.len() >= BATCH_SIZE
        };
        self.arrival.notify_one();
        full
    }

    /// The armed flush deadline, if any.
    pub fn deadline(&self) -> Option<f64> {
        self.deadline.get()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Swap the pending map for an empty one, reset the deadline, and
    /// return the drained entries sorted for the worker: `(mtime, path)`
    /// for files and symlinks so chronologically related changes cluster,
    /// plain path order for deletions.
    pub fn take(&self) -> Vec<(PathBuf, Option<i64>)> {
        let drained = self.pending.replace(HashMap::new());
        self.deadline.set(None);

        let mut items: Vec<(PathBuf, Option<i64>)> = drained.into_iter().collect();
        match self.kind {
            BatchKind::Files | BatchKind::Symlinks => {
                items.sort_by(|a, b| (a.1, a.0.as_path()).cmp(&(b.1, b.0.as_path())));
            }
            BatchKind::Deletions => {
                items.sort_by(|a, b| a.0.cmp(&b.0));
            }
        }
        items
    }

    /// Park until the next arrival. Used by the polling task when the
    /// batch is idle, so an empty pipeline waits instead of spinning.
    pub async fn wait_for_arrival(&self) {
        self.arrival.notified().await;
    }
}
