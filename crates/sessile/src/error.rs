//! Error types for session store operations.

/// Failure talking to the backing session table.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite query or connection failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database file's directory could not be created.
    #[error("failed to create directory '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The table's connection resources have been released.
    #[error("Session table is closed")]
    Closed,

    /// A blocking worker running a query panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Task(String),

    /// Failure reported by a non-SQLite table implementation.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A stored payload could not be serialized or parsed.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A background sweep failed. Only ever logged, never returned to a caller.
#[derive(Debug, thiserror::Error)]
#[error("Sweep of table '{table}' failed: {source}")]
pub struct SweepError {
    pub table: String,
    #[source]
    pub source: StoreError,
}

/// Errors raised while building a store configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Table names are interpolated into SQL and must be plain identifiers.
    #[error("invalid table name '{0}': expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidTable(String),
}

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_error_names_table() {
        let err = SweepError {
            table: "session".to_string(),
            source: StoreError::Closed,
        };
        assert_eq!(
            err.to_string(),
            "Sweep of table 'session' failed: Session table is closed"
        );
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: Error = StoreError::Backend("connection refused".to_string()).into();
        assert_eq!(err.to_string(), "Backend error: connection refused");
    }
}
