//! SQLite-backed session table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use tracing::{debug, info};

use super::SessionTable;
use crate::codec::SessionRecord;
use crate::config::{ConnectOptions, validate_table_name};
use crate::error::{Result, StoreError};

/// SQL text for one table, built once the name has been validated.
#[derive(Debug)]
struct Statements {
    get: String,
    upsert: String,
    delete: String,
    delete_expired: String,
}

impl Statements {
    fn new(table: &str) -> Self {
        Self {
            get: format!("SELECT id, expires, session FROM {table} WHERE id = ?1"),
            upsert: format!(
                "INSERT INTO {table} (id, expires, session) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET expires = excluded.expires, session = excluded.session
                 RETURNING id, expires, session"
            ),
            delete: format!("DELETE FROM {table} WHERE id = ?1"),
            delete_expired: format!("DELETE FROM {table} WHERE expires < ?1"),
        }
    }
}

struct Inner {
    name: String,
    conn: Mutex<Option<Connection>>,
    sql: Statements,
}

/// Session table stored in SQLite.
///
/// Rows have the columns `id` (primary key), `expires` (epoch millis) and
/// `session` (JSON text). Queries run on tokio's blocking pool against a
/// single connection.
#[derive(Clone)]
pub struct SqliteSessionTable {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SqliteSessionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionTable")
            .field("name", &self.inner.name)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl SqliteSessionTable {
    /// Open the database described by `options` and create `table` if it
    /// doesn't exist.
    pub fn open(options: &ConnectOptions, table: &str) -> Result<Self> {
        validate_table_name(table)?;

        let conn = match &options.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                            path: parent.display().to_string(),
                            source,
                        })?;
                    }
                }

                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
                )
                .map_err(StoreError::from)?;
                if options.wal {
                    conn.pragma_update(None, "journal_mode", "WAL")
                        .map_err(StoreError::from)?;
                }
                info!(path = %path.display(), table = %table, "Session database opened");
                conn
            }
            None => {
                let conn = Connection::open_in_memory().map_err(StoreError::from)?;
                info!(table = %table, "In-memory session database created");
                conn
            }
        };

        conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))
            .map_err(StoreError::from)?;
        Self::create_schema(&conn, table).map_err(StoreError::from)?;

        Ok(Self {
            inner: Arc::new(Inner {
                name: table.to_string(),
                conn: Mutex::new(Some(conn)),
                sql: Statements::new(table),
            }),
        })
    }

    /// Open a private in-memory database (useful for testing).
    pub fn open_in_memory(table: &str) -> Result<Self> {
        Self::open(&ConnectOptions::in_memory(), table)
    }

    /// Whether the connection has been released.
    pub fn is_closed(&self) -> bool {
        self.inner.conn.lock().is_none()
    }

    fn create_schema(conn: &Connection, table: &str) -> rusqlite::Result<()> {
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY NOT NULL,
                expires INTEGER NOT NULL,
                session TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_expires ON {table} (expires);
            "#
        ))?;
        debug!(table = %table, "Session schema ready");
        Ok(())
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
        Ok(SessionRecord {
            id: row.get(0)?,
            expires: row.get(1)?,
            session: row.get(2)?,
        })
    }

    /// Run a query on the blocking pool.
    async fn run<R, F>(&self, f: F) -> std::result::Result<R, StoreError>
    where
        F: FnOnce(&Connection, &Statements) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let guard = inner.conn.lock();
            let conn = guard.as_ref().ok_or(StoreError::Closed)?;
            f(conn, &inner.sql).map_err(StoreError::from)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl SessionTable for SqliteSessionTable {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<Option<SessionRecord>, StoreError> {
        let id = id.to_string();
        self.run(move |conn, sql| {
            conn.prepare_cached(&sql.get)?
                .query_row(params![id], Self::row_to_record)
                .optional()
        })
        .await
    }

    async fn upsert(
        &self,
        record: &SessionRecord,
    ) -> std::result::Result<SessionRecord, StoreError> {
        let record = record.clone();
        self.run(move |conn, sql| {
            conn.prepare_cached(&sql.upsert)?.query_row(
                params![record.id, record.expires, record.session],
                Self::row_to_record,
            )
        })
        .await
    }

    async fn delete_by_id(&self, id: &str) -> std::result::Result<(), StoreError> {
        let id = id.to_string();
        self.run(move |conn, sql| {
            conn.prepare_cached(&sql.delete)?.execute(params![id])?;
            Ok(())
        })
        .await
    }

    async fn delete_expired(&self, now_millis: i64) -> std::result::Result<u64, StoreError> {
        self.run(move |conn, sql| {
            let removed = conn
                .prepare_cached(&sql.delete_expired)?
                .execute(params![now_millis])?;
            Ok(removed as u64)
        })
        .await
    }

    async fn close(&self) -> std::result::Result<(), StoreError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut slot = inner.conn.lock();
            let Some(conn) = slot.take() else {
                return Ok(());
            };
            match conn.close() {
                Ok(()) => {
                    info!(table = %inner.name, "Session database closed");
                    Ok(())
                }
                Err((conn, e)) => {
                    *slot = Some(conn);
                    Err(StoreError::Database(e))
                }
            }
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
