//! In-process session table.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::SessionTable;
use crate::codec::SessionRecord;
use crate::error::StoreError;

/// A session table kept in a `HashMap`.
///
/// Behaves like the SQLite table, including failing with
/// [`StoreError::Closed`] after [`close`](SessionTable::close). Contents are
/// lost when the table is dropped.
#[derive(Debug)]
pub struct MemorySessionTable {
    name: String,
    rows: Mutex<Option<HashMap<String, SessionRecord>>>,
}

impl MemorySessionTable {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Number of stored rows, or `None` once closed.
    pub fn row_count(&self) -> Option<usize> {
        self.rows.lock().as_ref().map(HashMap::len)
    }

    /// Whether [`close`](SessionTable::close) has run.
    pub fn is_closed(&self) -> bool {
        self.rows.lock().is_none()
    }

    fn with_rows<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, SessionRecord>) -> R,
    ) -> Result<R, StoreError> {
        let mut rows = self.rows.lock();
        rows.as_mut().map(f).ok_or(StoreError::Closed)
    }
}

impl Default for MemorySessionTable {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_TABLE)
    }
}

#[async_trait]
impl SessionTable for MemorySessionTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        self.with_rows(|rows| rows.get(id).cloned())
    }

    async fn upsert(&self, record: &SessionRecord) -> Result<SessionRecord, StoreError> {
        self.with_rows(|rows| {
            rows.insert(record.id.clone(), record.clone());
            record.clone()
        })
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        self.with_rows(|rows| {
            rows.remove(id);
        })
    }

    async fn delete_expired(&self, now_millis: i64) -> Result<u64, StoreError> {
        self.with_rows(|rows| {
            let before = rows.len();
            rows.retain(|_, record| !record.is_expired_at(now_millis));
            (before - rows.len()) as u64
        })
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.rows.lock().take();
        Ok(())
    }
}
