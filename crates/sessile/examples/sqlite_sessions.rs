//! Walks a session through its lifecycle on a SQLite file.
//!
//! ```sh
//! RUST_LOG=sessile=debug cargo run -p sessile --example sqlite_sessions
//! ```

use std::time::Duration;

use anyhow::Result;
use sessile::{ConnectOptions, Session, SessionStore, SessionTable, SqliteSessionTable, StoreConfig};

#[tokio::main]
async fn main() -> Result<()> {
    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sessile=debug,info")),
                ),
        )
        .init();

    let dir = tempfile::tempdir()?;
    let config = StoreConfig::default()
        .with_connect_options(ConnectOptions::file(dir.path().join("sessions.db")))
        .with_flush_interval(Duration::from_millis(500))
        .with_debug(true);

    let store: SessionStore<SqliteSessionTable> = SessionStore::open(config)?;

    let session = Session::new()
        .with_max_age(Duration::from_millis(200))
        .with("user", "ada");
    store.set("u1", &session).await?;
    println!("read back: {:?}", store.get("u1").await?);

    tokio::time::sleep(Duration::from_millis(800)).await;
    println!(
        "row after sweep: {:?}",
        store.table().get_by_id("u1").await?
    );
    println!("still cached:    {:?}", store.get("u1").await?);

    store.destroy_all(None).await?;
    Ok(())
}
