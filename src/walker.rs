//! Bulk walker: one-shot traversal of each configured root.
//!
//! Seeds the pipeline with `(canonical path, stat)` observations and
//! registers a change-notification watch on every surviving directory.
//! Symlinks are never followed; excluded subtrees are not descended. The
//! visits table is cleared first, so entries absent after a completed walk
//! are paths that no longer exist under the roots.

use anyhow::Result;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::paths::canonical_path;
use crate::pipeline::Pipeline;

/// Walk all configured roots. A root that cannot be opened is logged and
/// skipped; the others proceed.
pub async fn walk_roots(pipeline: &Rc<Pipeline>) -> Result<()> {
    pipeline.catalog().clear_visits()?;
    let roots = pipeline.config().roots.clone();
    for root in roots {
        walk_root(pipeline, &root).await;
    }
    Ok(())
}

async fn walk_root(pipeline: &Rc<Pipeline>, root: &Path) {
    info!(root = %root.display(), "checking files under root");

    let canonical_root = match fs::canonicalize(root) {
        Ok(path) => path,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "cannot open root, skipping");
            return;
        }
    };

    let root_name = canonical_root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if pipeline.filter().skip_dir(&canonical_root, &root_name) {
        info!(root = %canonical_root.display(), "root is excluded, skipping");
        return;
    }

    let mut observed: u64 = 0;
    let mut watched: u64 = 0;
    if pipeline.watches().watch_dir(&canonical_root) {
        watched += 1;
    }

    let mut it = WalkDir::new(&canonical_root).follow_links(false).into_iter();
    loop {
        let entry = match it.next() {
            None => break,
            Some(Ok(entry)) => entry,
            Some(Err(e)) => {
                warn!(error = %e, "walk error");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        if entry.file_type().is_dir() {
            let canonical = match canonical_path(entry.path()) {
                Ok(path) => path,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "cannot canonicalize, skipping subtree");
                    it.skip_current_dir();
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy();
            if pipeline.filter().skip_dir(&canonical, &name) {
                debug!(path = %canonical.display(), "skipping excluded directory");
                it.skip_current_dir();
                continue;
            }
            if pipeline.watches().watch_dir(&canonical) {
                watched += 1;
            }
        } else {
            let canonical = match canonical_path(entry.path()) {
                Ok(path) => path,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "cannot canonicalize, skipping");
                    continue;
                }
            };
            if pipeline.filter().skip_file(&canonical) {
                debug!(path = %canonical.display(), "skipping excluded file");
                continue;
            }

            match entry.metadata() {
                Ok(meta) => {
                    pipeline.process_change(canonical, Some(meta)).await;
                    observed += 1;
                }
                Err(e) if e.io_error().map(|io| io.kind())
                    == Some(std::io::ErrorKind::NotFound) =>
                {
                    // Vanished between readdir and stat; the pipeline
                    // resolves it as a deletion candidate.
                    pipeline.process_change(canonical, None).await;
                }
                Err(e) => {
                    warn!(path = %canonical.display(), error = %e, "stat failed, skipping");
                }
            }
        }

        // Let timers and the other tasks run between entries; the walk is
        // the one long-running producer.
        tokio::task::yield_now().await;
    }

    info!(
        root = %canonical_root.display(),
        observed,
        watched,
        "root walk complete"
    );
}
