//! Relational backends.
//!
//! SQLite and Postgres share one schema and one set of statements; only pool
//! setup differs. Statements use numbered `$n` placeholders, which both
//! drivers bind positionally. Tables are created on connect.

/// Implements the storage traits for a store holding `pool`,
/// `session_expiry` and `event_window`.
macro_rules! impl_sql_store {
    ($store:ty, $backend:expr) => {
        impl $store {
            /// Drop this user's record if it has outlived the TTL.
            async fn expire_session(&self, user_id: &str) -> $crate::store::StorageResult<()> {
                if let Some(cutoff) = self.session_expiry.cutoff($crate::reaper::unix_now()) {
                    sqlx::query($crate::store::sql::queries::EXPIRE_SESSION)
                        .bind(user_id)
                        .bind(cutoff)
                        .execute(&self.pool)
                        .await?;
                }
                Ok(())
            }
        }

        #[async_trait::async_trait]
        impl $crate::store::SessionStore for $store {
            fn backend(&self) -> &'static str {
                $backend
            }

            async fn load(
                &self,
                user_id: &str,
            ) -> $crate::store::StorageResult<$crate::store::LoadedSession> {
                self.expire_session(user_id).await?;

                let row: Option<(String, i64)> =
                    sqlx::query_as($crate::store::sql::queries::LOAD_SESSION)
                        .bind(user_id)
                        .fetch_optional(&self.pool)
                        .await?;

                Ok(match row {
                    Some((raw, revision)) => $crate::store::LoadedSession::decode(
                        $backend,
                        user_id,
                        &raw,
                        $crate::store::sql::revision_from_db(revision),
                    ),
                    None => $crate::store::LoadedSession::new_user(),
                })
            }

            async fn save(
                &self,
                user_id: &str,
                record: &$crate::session::SessionRecord,
                expected_revision: u64,
            ) -> $crate::store::StorageResult<u64> {
                self.expire_session(user_id).await?;

                let raw = record.to_json()?;
                let next = expected_revision + 1;
                let result = sqlx::query($crate::store::sql::queries::SAVE_SESSION)
                    .bind(user_id)
                    .bind(raw)
                    .bind($crate::store::sql::revision_to_db(next)?)
                    .bind($crate::reaper::unix_now())
                    .bind($crate::store::sql::revision_to_db(expected_revision)?)
                    .execute(&self.pool)
                    .await?;

                if result.rows_affected() == 0 {
                    return Err($crate::store::StorageError::conflict(
                        user_id,
                        expected_revision,
                    ));
                }
                Ok(next)
            }

            async fn sweep_expired(&self) -> $crate::store::StorageResult<u64> {
                let now = $crate::reaper::unix_now();

                if let Some(cutoff) = self.event_window.cutoff(now) {
                    sqlx::query($crate::store::sql::queries::SWEEP_EVENTS)
                        .bind(cutoff)
                        .execute(&self.pool)
                        .await?;
                }

                let Some(cutoff) = self.session_expiry.cutoff(now) else {
                    return Ok(0);
                };
                let result = sqlx::query($crate::store::sql::queries::SWEEP_SESSIONS)
                    .bind(cutoff)
                    .execute(&self.pool)
                    .await?;
                Ok(result.rows_affected())
            }
        }

        #[async_trait::async_trait]
        impl $crate::store::IdempotencyStore for $store {
            async fn mark_if_new(&self, event_key: &str) -> $crate::store::StorageResult<bool> {
                let now = $crate::reaper::unix_now();

                if let Some(cutoff) = self.event_window.cutoff(now) {
                    sqlx::query($crate::store::sql::queries::EXPIRE_EVENT)
                        .bind(event_key)
                        .bind(cutoff)
                        .execute(&self.pool)
                        .await?;
                }

                let result = sqlx::query($crate::store::sql::queries::MARK_EVENT)
                    .bind(event_key)
                    .bind(now)
                    .execute(&self.pool)
                    .await?;

                Ok(result.rows_affected() == 1)
            }

            async fn release(&self, event_key: &str) -> $crate::store::StorageResult<()> {
                sqlx::query($crate::store::sql::queries::RELEASE_EVENT)
                    .bind(event_key)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
        }

        #[async_trait::async_trait]
        impl $crate::store::RegistrationStore for $store {
            async fn upsert(
                &self,
                registration: &$crate::store::Registration,
            ) -> $crate::store::StorageResult<()> {
                sqlx::query($crate::store::sql::queries::UPSERT_REGISTRATION)
                    .bind(&registration.user_id)
                    .bind(&registration.name)
                    .bind(&registration.address)
                    .bind(&registration.phone)
                    .bind(registration.updated_at.to_rfc3339())
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }

            async fn get(
                &self,
                user_id: &str,
            ) -> $crate::store::StorageResult<Option<$crate::store::Registration>> {
                let row: Option<$crate::store::sql::RegistrationRow> =
                    sqlx::query_as($crate::store::sql::queries::GET_REGISTRATION)
                        .bind(user_id)
                        .fetch_optional(&self.pool)
                        .await?;

                row.map($crate::store::sql::registration_from_row).transpose()
            }
        }
    };
}

mod postgres;
mod sqlite;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use super::error::{StorageError, StorageResult};
use super::registration::Registration;

const POOL_SIZE: u32 = 5;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sessions (
        user_id    TEXT PRIMARY KEY,
        record     TEXT NOT NULL,
        revision   BIGINT NOT NULL,
        updated_at BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS sessions_updated_at ON sessions (updated_at)",
    "CREATE TABLE IF NOT EXISTS processed_events (
        event_key    TEXT PRIMARY KEY,
        processed_at BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS processed_events_processed_at
        ON processed_events (processed_at)",
    "CREATE TABLE IF NOT EXISTS registrations (
        user_id    TEXT PRIMARY KEY,
        name       TEXT NOT NULL,
        address    TEXT NOT NULL,
        phone      TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

mod queries {
    pub const EXPIRE_SESSION: &str = "DELETE FROM sessions WHERE user_id = $1 AND updated_at < $2";

    pub const LOAD_SESSION: &str = "SELECT record, revision FROM sessions WHERE user_id = $1";

    /// Compare-and-set upsert. Zero rows affected means the stored revision
    /// moved.
    pub const SAVE_SESSION: &str = "INSERT INTO sessions (user_id, record, revision, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT(user_id) DO UPDATE SET
            record = excluded.record,
            revision = excluded.revision,
            updated_at = excluded.updated_at
        WHERE sessions.revision = $5";

    pub const SWEEP_SESSIONS: &str = "DELETE FROM sessions WHERE updated_at < $1";

    pub const SWEEP_EVENTS: &str = "DELETE FROM processed_events WHERE processed_at < $1";

    pub const EXPIRE_EVENT: &str =
        "DELETE FROM processed_events WHERE event_key = $1 AND processed_at < $2";

    pub const MARK_EVENT: &str = "INSERT INTO processed_events (event_key, processed_at)
        VALUES ($1, $2)
        ON CONFLICT(event_key) DO NOTHING";

    pub const RELEASE_EVENT: &str = "DELETE FROM processed_events WHERE event_key = $1";

    pub const UPSERT_REGISTRATION: &str =
        "INSERT INTO registrations (user_id, name, address, phone, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT(user_id) DO UPDATE SET
            name = excluded.name,
            address = excluded.address,
            phone = excluded.phone,
            updated_at = excluded.updated_at";

    pub const GET_REGISTRATION: &str = "SELECT user_id, name, address, phone, updated_at
        FROM registrations WHERE user_id = $1";
}

/// Row shape of the `registrations` table.
type RegistrationRow = (String, String, String, String, String);

fn revision_to_db(revision: u64) -> StorageResult<i64> {
    i64::try_from(revision)
        .map_err(|_| StorageError::serialization(format!("revision {revision} out of range")))
}

fn revision_from_db(revision: i64) -> u64 {
    u64::try_from(revision).unwrap_or(0)
}

fn registration_from_row(
    (user_id, name, address, phone, updated_at): RegistrationRow,
) -> StorageResult<Registration> {
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| StorageError::serialization(e.to_string()))?
        .with_timezone(&Utc);
    Ok(Registration {
        user_id,
        name,
        address,
        phone,
        updated_at,
    })
}
