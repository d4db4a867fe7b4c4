//! Backing table abstraction.
//!
//! ```text
//! SessionTable (trait)        - Point reads, upserts, deletes, expiry sweeps
//!     └── SqliteSessionTable  - SQLite table via rusqlite
//!     └── MemorySessionTable  - In-process table for tests and embedding
//! ```

mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::codec::SessionRecord;
use crate::error::StoreError;

pub use memory::MemorySessionTable;
pub use sqlite::SqliteSessionTable;

/// Operations the session store needs from its backing table.
///
/// Every operation reports connectivity or query failures as
/// [`StoreError`]. Once [`close`](Self::close) has run, all other
/// operations fail with [`StoreError::Closed`].
#[async_trait]
pub trait SessionTable: Send + Sync + 'static {
    /// Table name, for log fields.
    fn name(&self) -> &str;

    /// Point lookup. A missing row is `Ok(None)`.
    async fn get_by_id(&self, id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Insert or replace the row keyed by `record.id`, returning the row as
    /// committed.
    async fn upsert(&self, record: &SessionRecord) -> Result<SessionRecord, StoreError>;

    /// Delete a row. Deleting a missing id succeeds.
    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError>;

    /// Delete every row with `expires < now_millis`, returning how many went.
    async fn delete_expired(&self, now_millis: i64) -> Result<u64, StoreError>;

    /// Release connection resources. Closing twice succeeds.
    async fn close(&self) -> Result<(), StoreError>;
}
