//! Revisit scheduler: the pipeline's liveness loop.
//!
//! Consumes the catalog's revisit queue in time order, re-stats each due
//! path and feeds it back through `process_change`. Any path that was not
//! settled at first observation becomes settled in at most
//! `settle_time + 1s + batch timeout` after its last modification.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::clock::unix_now;
use crate::paths::stat_nofollow;
use crate::pipeline::Pipeline;

/// Run the revisit loop forever. With an empty queue the task parks on
/// the revisit condition variable instead of spinning; with only future
/// entries it polls once a second.
pub async fn run(pipeline: Rc<Pipeline>) {
    loop {
        let now = unix_now();
        let (next_time, due) = match pipeline.catalog().due_for_revisit(now) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "revisit query failed");
                sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        debug!(due = due.len(), next = ?next_time, "revisit poll");

        if due.is_empty() {
            match next_time {
                Some(_) => sleep(Duration::from_secs(1)).await,
                None => pipeline.revisit_ready().notified().await,
            }
            continue;
        }

        for path in due {
            let path = PathBuf::from(path);
            let stat = match stat_nofollow(&path) {
                Ok(stat) => stat,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "stat failed for revisit");
                    continue;
                }
            };
            pipeline.process_change(path, stat).await;
        }

        // The fed observations only update the queue when their batch
        // commits; pace the next poll so the loop does not spin on rows
        // that are still in flight.
        sleep(Duration::from_secs(1)).await;
    }
}
