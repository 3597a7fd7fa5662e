//! Visit worker: the settle protocol.
//!
//! Consumes a drained batch, decides per path whether it is quiet enough
//! to hash, and updates the catalog inside a single transaction. An
//! in-flight modification is a reason to reschedule, never to record a
//! transient state: mtimes are checked before hashing (cheap rejection of
//! a file being written right now) and again after (the file changed under
//! the read). Deletion candidates are resolved last with one final stat,
//! because a path that reappeared must be rescheduled instead of buried.

use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::clock::{mtime_secs, unix_now, unix_now_secs};
use crate::hasher::{hash_file, HashOutcome};
use crate::paths::stat_nofollow;

/// Process one batch of file observations. Entries with no mtime are
/// deletion candidates; the rest run the settle decision table.
///
/// Returns whether any revisits were queued, so the caller can wake the
/// revisit scheduler. The whole batch commits atomically; an error rolls
/// all of it back.
pub fn visit_files(
    catalog: &Catalog,
    settle_time: f64,
    batch: &[(PathBuf, Option<i64>)],
) -> Result<bool> {
    let tx = catalog.transaction()?;
    let mut revisits_queued = false;

    let keys: Vec<String> = batch
        .iter()
        .map(|(path, _)| path.to_string_lossy().into_owned())
        .collect();
    let stored: HashMap<String, (String, i64)> = catalog
        .current_observations(&keys)?
        .into_iter()
        .map(|obs| (obs.path, (obs.hash, obs.mtime)))
        .collect();

    let mut deletes: BTreeSet<PathBuf> = BTreeSet::new();

    for (path, mtime) in batch {
        let Some(mtime) = *mtime else {
            deletes.insert(path.clone());
            continue;
        };
        let key = path.to_string_lossy();
        let now = unix_now();

        if let Some((_, stored_mtime)) = stored.get(key.as_ref()) {
            if *stored_mtime == mtime {
                // No change since last visit.
                catalog.record_visit(&key, None)?;
                continue;
            }
            debug!(
                path = %path.display(),
                stored_mtime,
                mtime,
                "stored timestamp differs from new timestamp"
            );
        }

        let settled_time = mtime as f64 + settle_time;
        if now < settled_time {
            // Changed more recently than the settle window allows.
            debug!(
                path = %path.display(),
                wait = settled_time - now,
                "changed recently, will revisit"
            );
            catalog.record_visit(&key, Some(settled_time))?;
            revisits_queued = true;
            continue;
        }

        // Check the mtime again before spending time on the hash.
        let new_mtime = match stat_nofollow(path) {
            Ok(Some(meta)) => mtime_secs(&meta),
            Ok(None) => {
                deletes.insert(path.clone());
                continue;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "stat failed, skipping for this batch");
                continue;
            }
        };
        if new_mtime != mtime {
            debug!(
                path = %path.display(),
                "changed since observed, will revisit"
            );
            catalog.record_visit(&key, Some(new_mtime as f64 + settle_time))?;
            revisits_queued = true;
            continue;
        }

        let (digest, size) = match hash_file(path) {
            Ok(HashOutcome::Hashed { digest, size }) => (digest, size),
            Ok(HashOutcome::Denied) => {
                // Can't read it, can't maintain a digest for it.
                debug!(path = %path.display(), "permission denied hashing, dropping");
                deletes.insert(path.clone());
                continue;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "read failed, skipping for this batch");
                continue;
            }
        };

        // Check the mtime one more time: the file may have changed while
        // we were reading it.
        let new_mtime = match stat_nofollow(path) {
            Ok(Some(meta)) => mtime_secs(&meta),
            Ok(None) => {
                deletes.insert(path.clone());
                continue;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "stat failed, skipping for this batch");
                continue;
            }
        };
        if new_mtime != mtime {
            catalog.record_visit(&key, Some(new_mtime as f64 + settle_time))?;
            revisits_queued = true;
            continue;
        }

        catalog.record_observation(&digest, size, &key, mtime, unix_now_secs())?;
        catalog.record_visit(&key, None)?;
    }

    for path in &deletes {
        let key = path.to_string_lossy();
        // One final stat: the path may have been recreated between the
        // sighting and this write. If so, reschedule; a change
        // notification for the recreation is also guaranteed to be
        // processed after this batch commits, so there is no race.
        match stat_nofollow(path) {
            Ok(Some(meta)) => {
                catalog.record_visit(&key, Some(mtime_secs(&meta) as f64 + settle_time))?;
                revisits_queued = true;
            }
            Ok(None) => {
                catalog.mark_deleted(&key, unix_now_secs())?;
                catalog.forget_visit(&key)?;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "stat failed, leaving for revisit");
            }
        }
    }

    tx.commit()?;
    Ok(revisits_queued)
}

/// Symlink observations are logged and carried no further. They ride the
/// same batching machinery so a later symlink-target recorder can drop in
/// without pipeline changes.
pub fn visit_symlinks(batch: &[(PathBuf, Option<i64>)]) {
    for (path, mtime) in batch {
        debug!(path = %path.display(), mtime = ?mtime, "symlink observed");
    }
}
