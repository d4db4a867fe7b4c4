//! Configuration for the session store.
//!
//! Durations are expressed in milliseconds when read from TOML:
//!
//! ```toml
//! table = "session"
//! session_timeout = 86400000
//! flush_interval = 60000
//! debug = false
//!
//! [connect_options]
//! path = "/var/lib/app/sessions.db"
//! ```
//!
//! The camelCase spellings (`sessionTimeout`, `flushInterval`,
//! `connectOptions`, ...) are accepted as aliases.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default expiry window for sessions without a cookie max-age (one day).
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(86_400_000);

/// Default table name.
pub const DEFAULT_TABLE: &str = "session";

/// Default period between expired-row sweeps.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(60_000);

/// Default lifetime of a cache entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(30_000);

/// Default maximum number of cached records before LRU eviction.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Default SQLite busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Connection parameters for the backing SQLite table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,

    /// How long a statement waits on a locked database before failing.
    #[serde(alias = "busyTimeout")]
    pub busy_timeout_ms: u64,

    /// Use WAL journaling (ignored for in-memory databases).
    pub wal: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            wal: true,
        }
    }
}

impl ConnectOptions {
    /// Options for an in-memory database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Options for a database file at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// Configuration for [`SessionStore`](crate::SessionStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Passed through to the backing table.
    #[serde(alias = "connectOptions")]
    pub connect_options: ConnectOptions,

    /// Expiry window used when a session carries no cookie max-age.
    #[serde(alias = "sessionTimeout", with = "millis")]
    pub session_timeout: Duration,

    /// Backing table name.
    pub table: String,

    /// Log per-operation detail, including session payloads on read.
    pub debug: bool,

    /// Period of the background sweep that deletes expired rows.
    #[serde(alias = "flushInterval", with = "millis")]
    pub flush_interval: Duration,

    /// Lifetime of a cache entry. Keep this well below typical session
    /// lifetimes: the sweep never prunes the cache.
    #[serde(alias = "cacheTtl", with = "millis")]
    pub cache_ttl: Duration,

    /// Maximum number of cached records.
    #[serde(alias = "cacheCapacity")]
    pub cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connect_options: ConnectOptions::default(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            table: DEFAULT_TABLE.to_string(),
            debug: false,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check values that cannot be expressed in the type system.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_table_name(&self.table)
    }

    /// Set the backing-store connection parameters.
    pub fn with_connect_options(mut self, options: ConnectOptions) -> Self {
        self.connect_options = options;
        self
    }

    /// Set the default session expiry window.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Enable or disable verbose operation logging.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the sweep period.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the cache entry lifetime.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the cache capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

/// Table names end up inside SQL text, so only plain identifiers pass.
pub fn validate_table_name(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidTable(name.to_string()))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.session_timeout, Duration::from_millis(86_400_000));
        assert_eq!(config.table, "session");
        assert!(!config.debug);
        assert_eq!(config.flush_interval, Duration::from_millis(60_000));
        assert_eq!(config.cache_ttl, Duration::from_millis(30_000));
        assert_eq!(config.connect_options.path, None);
    }

    #[test]
    fn test_parse_snake_case() {
        let config = StoreConfig::from_toml_str(
            r#"
            table = "web_sessions"
            session_timeout = 3600000
            flush_interval = 1000
            debug = true

            [connect_options]
            path = "/tmp/sessions.db"
            busy_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.table, "web_sessions");
        assert_eq!(config.session_timeout, Duration::from_secs(3600));
        assert_eq!(config.flush_interval, Duration::from_secs(1));
        assert!(config.debug);
        assert_eq!(
            config.connect_options.path,
            Some(PathBuf::from("/tmp/sessions.db"))
        );
        assert_eq!(config.connect_options.busy_timeout_ms, 250);
        assert!(config.connect_options.wal);
    }

    #[test]
    fn test_parse_camel_case_aliases() {
        let config = StoreConfig::from_toml_str(
            r#"
            sessionTimeout = 5000
            flushInterval = 2000
            cacheTtl = 100

            [connectOptions]
            busyTimeout = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.session_timeout, Duration::from_millis(5000));
        assert_eq!(config.flush_interval, Duration::from_millis(2000));
        assert_eq!(config.cache_ttl, Duration::from_millis(100));
        assert_eq!(config.connect_options.busy_timeout_ms, 10);
        assert_eq!(config.table, DEFAULT_TABLE);
    }

    #[test]
    fn test_rejects_bad_table_name() {
        let result = StoreConfig::from_toml_str(r#"table = "session; DROP TABLE x""#);
        assert!(matches!(result, Err(ConfigError::InvalidTable(_))));

        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1sessions").is_err());
        assert!(validate_table_name("_sessions_2").is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let result = StoreConfig::load("/nonexistent/sessile.toml");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessile.toml");
        std::fs::write(&path, "table = \"sess\"\ncache_capacity = 16\n").unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.table, "sess");
        assert_eq!(config.cache_capacity, 16);
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new()
            .with_table("t")
            .with_debug(true)
            .with_cache_ttl(Duration::from_millis(5))
            .with_connect_options(ConnectOptions::file("/tmp/x.db"));

        assert_eq!(config.table, "t");
        assert!(config.debug);
        assert_eq!(config.cache_ttl, Duration::from_millis(5));
        assert_eq!(
            config.connect_options.path,
            Some(PathBuf::from("/tmp/x.db"))
        );
    }
}
