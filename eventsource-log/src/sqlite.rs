//! SQLite backends for the allocator and the store.
//!
//! Both sit on a [`SqliteDatabase`], which may be shared or opened separately
//! by several processes against the same file. The sequence counter is a
//! single upsert statement, so SQLite's write lock is what serializes
//! allocation across processes.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::migrations::Migrator;
use crate::traits::{EventId, EventStore, SequenceAllocator, Sequenced};

/// How long a writer waits for another process to release the database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to a migrated SQLite database.
///
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    /// Open or create a database file, creating parent directories as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        info!(path = %path.display(), "Opened event database");
        Self::init(conn)
    }

    /// Open a private in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        Migrator::new(&conn).migrate()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| Error::Task("connection lock poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))?
    }
}

/// Sequence counter stored as a named row.
pub struct SqliteSequenceAllocator {
    db: SqliteDatabase,
    key: String,
}

impl SqliteSequenceAllocator {
    pub fn new(db: SqliteDatabase, key: impl Into<String>) -> Self {
        Self {
            db,
            key: key.into(),
        }
    }

    /// The most recently allocated id (0 if none).
    pub async fn current(&self) -> Result<EventId> {
        let key = self.key.clone();
        self.db
            .run(move |conn| {
                let value: Option<i64> = conn
                    .query_row(
                        "SELECT value FROM sequences WHERE name = ?1",
                        [&key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value.unwrap_or(0) as EventId)
            })
            .await
    }
}

#[async_trait]
impl SequenceAllocator for SqliteSequenceAllocator {
    async fn next_id(&self) -> Result<EventId> {
        let key = self.key.clone();
        let id = self
            .db
            .run(move |conn| {
                let value: i64 = conn.query_row(
                    "INSERT INTO sequences (name, value) VALUES (?1, 1)
                     ON CONFLICT(name) DO UPDATE SET value = value + 1
                     RETURNING value",
                    [&key],
                    |row| row.get(0),
                )?;
                Ok(value as EventId)
            })
            .await?;
        debug!(key = %self.key, id, "Allocated event id");
        Ok(id)
    }
}

/// Event store keeping one row per event, keyed by id.
pub struct SqliteEventStore<E> {
    db: SqliteDatabase,
    _event: PhantomData<fn() -> E>,
}

impl<E> SqliteEventStore<E> {
    pub fn new(db: SqliteDatabase) -> Self {
        Self {
            db,
            _event: PhantomData,
        }
    }

    /// Open a store on its own database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(SqliteDatabase::open(path)?))
    }

    /// Number of stored events.
    pub async fn count(&self) -> Result<u64> {
        self.db
            .run(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
    }
}

#[async_trait]
impl<E> EventStore<E> for SqliteEventStore<E>
where
    E: Sequenced + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn append(&self, event: &E) -> Result<()> {
        let id = event.sequence();
        let kind = event.kind().map(str::to_owned);
        let body = serde_json::to_string(event)?;

        self.db
            .run(move |conn| {
                match conn.execute(
                    "INSERT INTO events (id, type, body) VALUES (?1, ?2, ?3)",
                    params![id as i64, kind, body],
                ) {
                    Ok(_) => Ok(()),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        Err(Error::DuplicateId(id))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    async fn query_from(&self, after: EventId, limit: usize) -> Result<Vec<E>> {
        let bodies = self
            .db
            .run(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT body FROM events WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![after as i64, limit as i64], |row| {
                    row.get::<_, String>(0)
                })?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(Error::from)
            })
            .await?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(Error::from))
            .collect()
    }

    async fn last_id(&self) -> Result<EventId> {
        self.db
            .run(|conn| {
                let id: i64 =
                    conn.query_row("SELECT COALESCE(MAX(id), 0) FROM events", [], |row| {
                        row.get(0)
                    })?;
                Ok(id as EventId)
            })
            .await
    }
}
