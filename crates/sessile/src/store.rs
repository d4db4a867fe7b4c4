//! The session store facade: cache in front of a table, plus a sweeper.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, trace};

use crate::cache::{CacheStats, ExpiringCache};
use crate::codec::{CookieMaxAge, RecordCodec, Session, SessionRecord};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::sweeper::Sweeper;
use crate::table::{SessionTable, SqliteSessionTable};

/// Prefix that turns a session id into its cache key.
pub const CACHE_KEY_PREFIX: &str = "sess-";

fn cache_key(id: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{id}")
}

/// The capability set session middleware needs from a store.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Session object type handed to and from the middleware.
    type Session: Send + Sync;

    /// Load a session. A missing session is `Ok(None)`.
    async fn get(&self, id: &str) -> Result<Option<Self::Session>>;

    /// Create or replace a session.
    async fn set(&self, id: &str, session: &Self::Session) -> Result<()>;

    /// Delete a session. Deleting a missing session succeeds.
    async fn destroy(&self, id: &str) -> Result<()>;

    /// Delete every cached session (or the given ids) and tear the store
    /// down.
    async fn destroy_all(&self, ids: Option<Vec<String>>) -> Result<()>;
}

/// Session store with a short-lived read/write cache and a background
/// sweep of expired rows.
///
/// Reads check the cache first and fall back to the table; a table hit is
/// cached. Writes go to the table and only the committed row is cached, so
/// a failed write never reaches the cache. Destroys evict the cache entry
/// before deleting the row.
///
/// The cache can disagree with the table for up to one cache TTL (default
/// 30s) in two known windows:
///
/// - The sweep deletes expired rows from the table but leaves the cache
///   alone, so a record can still be served from cache after its `expires`
///   has passed.
/// - A `get` that misses the cache reads the row and then caches it. If a
///   `destroy` of the same id evicts and deletes in between, the `get`
///   puts the destroyed record back into the cache.
///
/// Keep `cache_ttl` well below real session lifetimes.
///
/// Construction starts the sweeper, so it must happen inside a tokio
/// runtime.
pub struct SessionStore<T: SessionTable, S = Session> {
    table: Arc<T>,
    cache: ExpiringCache<SessionRecord>,
    codec: RecordCodec,
    sweeper: Sweeper<T>,
    config: StoreConfig,
    closed: AtomicBool,
    _session: PhantomData<fn() -> S>,
}

impl<S> SessionStore<SqliteSessionTable, S>
where
    S: Serialize + DeserializeOwned + CookieMaxAge + Send + Sync + 'static,
{
    /// Open the SQLite table named by `config` and build a store on it.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let table = SqliteSessionTable::open(&config.connect_options, &config.table)?;
        Ok(Self::new(Arc::new(table), config))
    }
}

impl<T, S> SessionStore<T, S>
where
    T: SessionTable,
    S: Serialize + DeserializeOwned + CookieMaxAge + Send + Sync + 'static,
{
    /// Build a store on `table` and start its sweeper.
    pub fn new(table: Arc<T>, config: StoreConfig) -> Self {
        let sweeper = Sweeper::new(Arc::clone(&table), config.flush_interval);
        sweeper.start();

        info!(
            table = %table.name(),
            cache_ttl_ms = config.cache_ttl.as_millis() as u64,
            "Session store connected"
        );

        Self {
            cache: ExpiringCache::new(config.cache_capacity),
            codec: RecordCodec::new(config.session_timeout),
            table,
            sweeper,
            config,
            closed: AtomicBool::new(false),
            _session: PhantomData,
        }
    }

    /// Get the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The backing table.
    pub fn table(&self) -> &Arc<T> {
        &self.table
    }

    /// The background sweeper.
    pub fn sweeper(&self) -> &Sweeper<T> {
        &self.sweeper
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Whether [`destroy_all`](Self::destroy_all) has torn the store down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::Closed.into());
        }
        Ok(())
    }

    /// Load a session, from cache if possible.
    pub async fn get(&self, id: &str) -> Result<Option<S>> {
        self.ensure_open()?;
        let key = cache_key(id);

        if let Some(record) = self.cache.get(&key) {
            trace!(session_id = %id, "Session cache hit");
            if self.config.debug {
                debug!(session_id = %id, session = %record.session, "SESSION: (get)");
            }
            return Ok(Some(self.codec.decode(&record)?));
        }

        trace!(session_id = %id, "Session cache miss, loading from table");
        let Some(record) = self.table.get_by_id(id).await? else {
            return Ok(None);
        };

        let session = self.codec.decode(&record)?;
        if self.config.debug {
            debug!(session_id = %id, session = %record.session, "SESSION: (get)");
        }
        self.cache.put(key, record, self.config.cache_ttl);
        Ok(Some(session))
    }

    /// Write a session and cache the committed record.
    pub async fn set(&self, id: &str, session: &S) -> Result<()> {
        self.ensure_open()?;
        let record = self.codec.encode(id, session)?;
        let committed = self.table.upsert(&record).await?;

        if self.config.debug {
            debug!(session_id = %committed.id, expires = committed.expires, "SESSION: (set)");
        }
        self.cache
            .put(cache_key(&committed.id), committed, self.config.cache_ttl);
        Ok(())
    }

    /// Evict a session from cache, then delete it from the table.
    pub async fn destroy(&self, id: &str) -> Result<()> {
        self.ensure_open()?;
        if self.config.debug {
            debug!(session_id = %id, "SESSION: (destroy)");
        }

        self.cache.del(&cache_key(id));
        self.table.delete_by_id(id).await?;
        Ok(())
    }

    /// Tear the store down.
    ///
    /// Stops the sweeper, waiting for an in-flight sweep, then destroys the
    /// given ids (or every session currently cached) one at a time. The first
    /// failure is returned immediately: sessions after it are left in place,
    /// the sweeper is restarted and the store stays open, so it keeps
    /// serving traffic and the call can be retried. When every destroy
    /// succeeds the table is closed, after which this method is a no-op and
    /// all other operations fail with [`StoreError::Closed`].
    pub async fn destroy_all(&self, ids: Option<Vec<String>>) -> Result<()> {
        if self.is_closed() {
            debug!(table = %self.table.name(), "Session store already torn down");
            return Ok(());
        }
        if self.config.debug {
            debug!("SESSION: (destroyall)");
        }

        self.sweeper.shutdown().await;

        let ids = ids.unwrap_or_else(|| {
            self.cache
                .keys()
                .into_iter()
                .filter_map(|key| key.strip_prefix(CACHE_KEY_PREFIX).map(str::to_string))
                .collect()
        });

        for id in &ids {
            if let Err(e) = self.destroy(id).await {
                self.sweeper.start();
                return Err(e);
            }
        }

        self.table.close().await?;
        self.cache.clear();
        self.closed.store(true, Ordering::Release);

        info!(
            table = %self.table.name(),
            destroyed = ids.len(),
            "Session store torn down"
        );
        Ok(())
    }
}

#[async_trait]
impl<T, S> SessionBackend for SessionStore<T, S>
where
    T: SessionTable,
    S: Serialize + DeserializeOwned + CookieMaxAge + Send + Sync + 'static,
{
    type Session = S;

    async fn get(&self, id: &str) -> Result<Option<S>> {
        self.get(id).await
    }

    async fn set(&self, id: &str, session: &S) -> Result<()> {
        self.set(id, session).await
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        self.destroy(id).await
    }

    async fn destroy_all(&self, ids: Option<Vec<String>>) -> Result<()> {
        self.destroy_all(ids).await
    }
}

impl<T: SessionTable, S> std::fmt::Debug for SessionStore<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("table", &self.table.name())
            .field("cache", &self.cache)
            .field("sweeper", &self.sweeper)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
