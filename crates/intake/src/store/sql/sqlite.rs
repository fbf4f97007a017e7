//! SQLite storage.

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::debug;

use super::{POOL_SIZE, SCHEMA};
use crate::reaper::ExpiryPolicy;
use crate::store::error::{StorageError, StorageResult};

const BACKEND: &str = "sqlite";

/// Storage in a local SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    session_expiry: ExpiryPolicy,
    event_window: ExpiryPolicy,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url`, e.g.
    /// `sqlite://./data/intake.db`, and ensure the schema exists.
    pub async fn connect(
        url: &str,
        session_expiry: ExpiryPolicy,
        event_window: ExpiryPolicy,
    ) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::configuration(BACKEND, e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::unavailable(BACKEND, e.to_string()))?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        debug!(url = %url, "Opened sqlite store");

        Ok(Self {
            pool,
            session_expiry,
            event_window,
        })
    }
}

impl_sql_store!(SqliteStore, BACKEND);
