//! Durable catalog of file observations.
//!
//! Single SQLite database, write-ahead logging, one writer. Observations
//! are append-mostly: a content change replaces the current row in place
//! (preserving `first_observed`), a deletion is soft (`deleted_before` is
//! set, history stays), a reappearance inserts a fresh current row. The
//! visits table doubles as the durable revisit queue.

use anyhow::Result;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Database file name under the configured catalog directory.
pub const DB_FILENAME: &str = "db.sqlite";

/// How many revisit-queue rows a single `due_for_revisit` call samples.
const REVISIT_SAMPLE_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog directory cannot be created or written.
    #[error("catalog directory {dir} unavailable: {source}")]
    StoreUnavailable {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The database file cannot be opened or initialized for writing.
    #[error("cannot open catalog at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}

/// A current (non-deleted) observation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentObservation {
    pub hash: String,
    pub path: String,
    pub mtime: i64,
}

/// The catalog store. The only component that performs persistent writes.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open (creating if necessary) the catalog under `dir`.
    ///
    /// Creates the directory and schema if absent and enables write-ahead
    /// logging so readers can share the file during writes. Idempotent.
    pub fn open(dir: &Path) -> Result<Self, CatalogError> {
        fs::create_dir_all(dir).map_err(|source| CatalogError::StoreUnavailable {
            dir: dir.to_path_buf(),
            source,
        })?;

        let db_path = dir.join(DB_FILENAME);
        let conn = Connection::open(&db_path).map_err(|source| CatalogError::OpenFailed {
            path: db_path.clone(),
            source,
        })?;
        init_schema(&conn).map_err(|source| CatalogError::OpenFailed {
            path: db_path,
            source,
        })?;

        Ok(Self { conn })
    }

    /// Begin an explicit transaction; the visit worker wraps each batch in
    /// one so the whole batch commits or none of it does.
    pub fn transaction(&self) -> rusqlite::Result<Transaction<'_>> {
        self.conn.unchecked_transaction()
    }

    /// The current row for each listed path that has one.
    pub fn current_observations(&self, paths: &[String]) -> Result<Vec<CurrentObservation>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; paths.len()].join(", ");
        let sql = format!(
            "select hash, path, mtime from files \
             where path in ({placeholders}) and deleted_before is null"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(paths.iter()), |row| {
            Ok(CurrentObservation {
                hash: row.get(0)?,
                path: row.get(1)?,
                mtime: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Record a settled observation.
    ///
    /// No-op when the current row already carries the same hash and mtime.
    /// Otherwise the current row is replaced in place, keeping its rowid
    /// and `first_observed`; with no current row a fresh one is inserted
    /// with `first_observed = now`.
    pub fn record_observation(
        &self,
        hash: &str,
        size: u64,
        path: &str,
        mtime: i64,
        now: i64,
    ) -> Result<()> {
        let existing: Option<(i64, String, i64, i64)> = self
            .conn
            .query_row(
                "select rowid, hash, mtime, first_observed from files \
                 where path = ?1 and deleted_before is null",
                params![path],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        match existing {
            Some((_, ref old_hash, old_mtime, _)) if old_hash == hash && old_mtime == mtime => {
                Ok(())
            }
            Some((rowid, _, _, first_observed)) => {
                self.conn.execute(
                    "replace into files (rowid, hash, filesize, path, mtime, first_observed) \
                     values (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![rowid, hash, size as i64, path, mtime, first_observed],
                )?;
                Ok(())
            }
            None => {
                self.conn.execute(
                    "insert into files (hash, filesize, path, mtime, first_observed) \
                     values (?1, ?2, ?3, ?4, ?5)",
                    params![hash, size as i64, path, mtime, now],
                )?;
                Ok(())
            }
        }
    }

    /// Soft-delete the current row for `path`, if any. Non-current rows
    /// are untouched.
    pub fn mark_deleted(&self, path: &str, now: i64) -> Result<()> {
        self.conn.execute(
            "update files set deleted_before = ?1 \
             where path = ?2 and deleted_before is null",
            params![now, path],
        )?;
        Ok(())
    }

    /// Upsert a visit record. A non-null `revisit_time` is a future
    /// obligation to look at the path again.
    pub fn record_visit(&self, path: &str, revisit_time: Option<f64>) -> Result<()> {
        self.conn.execute(
            "insert or replace into visits (path, revisit_time) values (?1, ?2)",
            params![path, revisit_time],
        )?;
        Ok(())
    }

    /// Remove the visit record entirely; records that a path is
    /// known-deleted.
    pub fn forget_visit(&self, path: &str) -> Result<()> {
        self.conn
            .execute("delete from visits where path = ?1", params![path])?;
        Ok(())
    }

    /// Empty the visits table. Done before starting a new bulk walk, so
    /// entries absent after a completed walk are paths that no longer
    /// exist under the roots.
    pub fn clear_visits(&self) -> Result<()> {
        self.conn.execute("delete from visits", [])?;
        Ok(())
    }

    /// Paths due a revisit, and the next time more become due.
    ///
    /// Samples up to 1000 queued rows in `revisit_time` order. Returns the
    /// due paths plus the earliest sampled time still in the future. With
    /// nothing due but something queued, returns `(that_time, empty)`;
    /// with an empty queue, `(None, empty)`.
    pub fn due_for_revisit(&self, now: f64) -> Result<(Option<f64>, Vec<String>)> {
        let mut stmt = self.conn.prepare(
            "select path, revisit_time from visits \
             where revisit_time is not null \
             order by revisit_time asc limit ?1",
        )?;
        let rows = stmt.query_map(params![REVISIT_SAMPLE_LIMIT as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        if items.is_empty() {
            return Ok((None, Vec::new()));
        }

        let due: Vec<String> = items
            .iter()
            .filter(|(_, time)| *time <= now)
            .map(|(path, _)| path.clone())
            .collect();
        let next_time = items
            .iter()
            .map(|(_, time)| *time)
            .filter(|time| *time > now)
            .fold(None, |acc: Option<f64>, time| {
                Some(acc.map_or(time, |prev| prev.min(time)))
            });

        if due.is_empty() {
            // Everything sampled is in the future; the first row is the
            // earliest.
            return Ok((Some(items[0].1), Vec::new()));
        }
        Ok((next_time, due))
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.execute_batch(
        "create table if not exists files (
           hash text,
           path text,
           mtime integer,
           filesize integer,
           first_observed integer,
           deleted_before integer
         );
         create table if not exists visits (
           path text primary key,
           revisit_time integer
         ) without rowid;
         create index if not exists idx_current_file_hashes on files (
           hash, path, mtime, filesize
         ) where deleted_before is null;
         create index if not exists idx_file_hashes on files (hash);
         create index if not exists idx_revisits on visits (
           path, revisit_time
         ) where revisit_time is not null;",
    )
}
