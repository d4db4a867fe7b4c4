//! Session persistence with a short-lived cache and expiry sweeps.
//!
//! This crate stores session records in a table and provides:
//! - A write-through cache that absorbs repeated reads of hot sessions
//! - Upserts that cache the row as committed, never the caller's copy
//! - A background sweeper that deletes rows whose expiry has passed
//!
//! # Example
//!
//! ```rust,ignore
//! use sessile::{Session, SessionStore, StoreConfig, ConnectOptions};
//!
//! let config = StoreConfig::default()
//!     .with_connect_options(ConnectOptions::file("sessions.db"))
//!     .with_flush_interval(Duration::from_secs(60));
//!
//! let store: SessionStore<_> = SessionStore::open(config)?;
//! store.set("u1", &Session::new().with("user", "ada")).await?;
//! let session = store.get("u1").await?;
//! ```

mod cache;
mod codec;
mod config;
mod error;
mod store;
mod sweeper;
mod table;

pub use cache::{CacheEntry, CacheStats, ExpiringCache};
pub use codec::{Cookie, CookieMaxAge, RecordCodec, Session, SessionRecord, now_millis};
pub use config::{
    ConnectOptions, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_SESSION_TIMEOUT, DEFAULT_TABLE, StoreConfig, validate_table_name,
};
pub use error::{CodecError, ConfigError, Error, Result, StoreError, SweepError};
pub use store::{CACHE_KEY_PREFIX, SessionBackend, SessionStore};
pub use sweeper::{MAX_SWEEP_PERIOD, Sweeper};
pub use table::{MemorySessionTable, SessionTable, SqliteSessionTable};
