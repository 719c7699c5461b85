//! Schema versioning for the SQLite backend.
//!
//! The schema version lives in `PRAGMA user_version`. Each step runs inside
//! its own transaction together with the version bump, so a failed step
//! leaves the database exactly at the previous version.

use rusqlite::Connection;
use tracing::info;

use crate::error::{Error, Result};

/// A named schema step. Step `n` (1-based) brings the schema to version `n`.
type Step = (&'static str, &'static str);

const STEPS: &[Step] = &[("v001_initial", include_str!("v001_initial.sql"))];

pub struct Migrator<'a> {
    conn: &'a Connection,
}

impl<'a> Migrator<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Schema version the database is at.
    pub fn version(&self) -> Result<u32> {
        Ok(self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?)
    }

    /// Version a fully migrated database reports.
    pub fn latest() -> u32 {
        STEPS.len() as u32
    }

    /// Bring the schema up to [`Migrator::latest`].
    pub fn migrate(&self) -> Result<()> {
        if self.version()? >= Self::latest() {
            return Ok(());
        }
        self.apply(STEPS)
    }

    fn apply(&self, steps: &[Step]) -> Result<()> {
        let current = self.version()?;

        for (version, (name, sql)) in (1u32..).zip(steps) {
            if version <= current {
                continue;
            }

            info!(version, name, "Applying schema step");
            // Runs on a fresh connection before it is shared.
            let tx = self.conn.unchecked_transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::Migration(format!("{}: {}", name, e)))?;
            tx.pragma_update(None, "user_version", version)?;
            tx.commit()?;
        }

        Ok(())
    }
}
