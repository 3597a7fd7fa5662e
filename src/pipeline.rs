//! Pipeline wiring: change ingestion, batch polling, task lifecycle.
//!
//! Everything long-running shares one cooperative scheduler and this one
//! `Rc<Pipeline>`. Observations enter through `process_change` from three
//! producers (bulk walker, change notifier, revisit scheduler), land in
//! the per-kind batches, and leave through the visit worker. Catalog
//! writes for a given path are totally ordered because each path's
//! observation is processed within exactly one batch and batches commit
//! serially.

use anyhow::Result;
use notify::Event;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use tokio::sync::Notify;
use tokio::task::spawn_local;
use tracing::{debug, info, warn};

use crate::batcher::{BatchKind, ChangeBatch};
use crate::catalog::Catalog;
use crate::clock::{mtime_secs, unix_now};
use crate::config::Config;
use crate::filter::ExclusionFilter;
use crate::notifier::{self, WatchRegistry};
use crate::scheduler;
use crate::walker;
use crate::worker;

/// Shared state of the running system.
pub struct Pipeline {
    config: Config,
    catalog: Catalog,
    filter: ExclusionFilter,
    watches: WatchRegistry,
    files: ChangeBatch,
    symlinks: ChangeBatch,
    deletions: ChangeBatch,
    revisit_ready: Notify,
}

impl Pipeline {
    /// Build the pipeline: open the catalog, compile the exclusion filter,
    /// create the change-notification source. Returns the pipeline and the
    /// channel its change events arrive on.
    pub fn new(
        config: Config,
    ) -> Result<(Rc<Self>, async_channel::Receiver<notify::Result<Event>>)> {
        let catalog = Catalog::open(&config.db_dir)?;
        let filter = ExclusionFilter::from_config(&config)?;
        let (watches, events) = notifier::create()?;

        Ok((
            Rc::new(Self {
                config,
                catalog,
                filter,
                watches,
                files: ChangeBatch::new(BatchKind::Files),
                symlinks: ChangeBatch::new(BatchKind::Symlinks),
                deletions: ChangeBatch::new(BatchKind::Deletions),
                revisit_ready: Notify::new(),
            }),
            events,
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn filter(&self) -> &ExclusionFilter {
        &self.filter
    }

    pub fn watches(&self) -> &WatchRegistry {
        &self.watches
    }

    /// Condition variable signalled whenever a batch queues revisits.
    pub fn revisit_ready(&self) -> &Notify {
        &self.revisit_ready
    }

    /// Route one observation into the batch for its kind. A missing stat
    /// is a deletion candidate; anything that is neither a regular file
    /// nor a symlink is ignored. Flushes inline when a batch reaches the
    /// size trigger.
    pub async fn process_change(&self, path: PathBuf, stat: Option<fs::Metadata>) {
        match stat {
            None => {
                if self.deletions.insert(path, None, unix_now()) {
                    self.flush(BatchKind::Deletions).await;
                }
            }
            Some(meta) => {
                let mtime = mtime_secs(&meta);
                let file_type = meta.file_type();
                if file_type.is_file() {
                    if self.files.insert(path, Some(mtime), unix_now()) {
                        self.flush(BatchKind::Files).await;
                    }
                } else if file_type.is_symlink() {
                    if self.symlinks.insert(path, Some(mtime), unix_now()) {
                        self.flush(BatchKind::Symlinks).await;
                    }
                } else {
                    debug!(path = %path.display(), "ignoring change to non-file path");
                }
            }
        }
    }

    fn batch(&self, kind: BatchKind) -> &ChangeBatch {
        match kind {
            BatchKind::Files => &self.files,
            BatchKind::Symlinks => &self.symlinks,
            BatchKind::Deletions => &self.deletions,
        }
    }

    /// Drain and process one batch. Deletion batches run through the same
    /// visit path as file batches: their entries carry no mtime and fall
    /// straight into the deletion flow.
    pub async fn flush(&self, kind: BatchKind) {
        let batch = self.batch(kind).take();
        if batch.is_empty() {
            return;
        }
        info!(kind = kind.label(), size = batch.len(), "processing batch");

        match kind {
            BatchKind::Files | BatchKind::Deletions => {
                match worker::visit_files(&self.catalog, self.config.settle_time, &batch) {
                    Ok(true) => {
                        self.revisit_ready.notify_one();
                    }
                    Ok(false) => {}
                    Err(e) => warn!(kind = kind.label(), error = %e, "batch failed"),
                }
            }
            BatchKind::Symlinks => worker::visit_symlinks(&batch),
        }
    }

    /// Polling task for one batch kind: flush when the deadline passes,
    /// park on the batch's condition variable while it is empty.
    pub async fn poll_batches(self: Rc<Self>, kind: BatchKind) {
        loop {
            while let Some(deadline) = self.batch(kind).deadline() {
                let wait = deadline - unix_now();
                if wait <= 0.0 {
                    self.flush(kind).await;
                } else {
                    debug!(kind = kind.label(), wait, "next batch flush");
                    tokio::time::sleep(std::time::Duration::from_secs_f64(wait)).await;
                }
            }
            self.batch(kind).wait_for_arrival().await;
        }
    }

    /// Run the system until interrupted: spawn the steady-state tasks and
    /// the one-shot bulk walk, then wait for SIGINT/SIGTERM.
    ///
    /// Shutdown ordering: stop the notification source first, then cancel
    /// the tasks. Batch processing has no suspension point between its
    /// first catalog write and the commit, so an in-flight batch either
    /// commits wholly or rolls back; pending in-memory batches are
    /// discarded and rediscovered by the next walk.
    pub async fn run(
        self: Rc<Self>,
        events: async_channel::Receiver<notify::Result<Event>>,
    ) -> Result<()> {
        info!(
            roots = ?self.config.roots,
            db_dir = %self.config.db_dir.display(),
            settle_time = self.config.settle_time,
            "filer starting"
        );

        let mut tasks = Vec::new();
        tasks.push(spawn_local(notifier::run(self.clone(), events)));
        for kind in [BatchKind::Files, BatchKind::Symlinks, BatchKind::Deletions] {
            tasks.push(spawn_local(self.clone().poll_batches(kind)));
        }
        tasks.push(spawn_local(scheduler::run(self.clone())));

        let walk_pipeline = self.clone();
        tasks.push(spawn_local(async move {
            if let Err(e) = walker::walk_roots(&walk_pipeline).await {
                warn!(error = %e, "bulk walk failed");
            }
        }));

        shutdown_signal().await?;
        info!("shutting down");

        self.watches.shutdown();
        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

/// Resolve when SIGINT or SIGTERM arrives.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut term =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
