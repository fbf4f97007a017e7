//! Redis-backed storage.
//!
//! Layout:
//! ```text
//! intake:session:<user_id>       hash { record, revision }   EXPIRE ttl
//! intake:event:<event_key>       "1"                         SET NX EX window
//! intake:registration:<user_id>  hash { name, address, phone, updated_at }
//! ```
//!
//! Session expiry is delegated to Redis key TTLs, so sweeps are a no-op.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use tracing::debug;

use super::error::{StorageError, StorageResult};
use super::registration::{Registration, RegistrationStore};
use super::session::{IdempotencyStore, LoadedSession, SessionStore};
use crate::reaper::ExpiryPolicy;
use crate::session::SessionRecord;

const BACKEND: &str = "redis";
const KEY_PREFIX: &str = "intake";

/// Compare-and-set on the revision field, then refresh the TTL.
///
/// KEYS[1] session key; ARGV: record, expected revision, ttl seconds (0 = none).
/// Returns the new revision, or -1 when the stored revision moved.
const SAVE_SCRIPT: &str = r"
local current = redis.call('HGET', KEYS[1], 'revision')
local expected = tonumber(ARGV[2])
if current and tonumber(current) ~= expected then
  return -1
end
local next = expected + 1
redis.call('HSET', KEYS[1], 'record', ARGV[1], 'revision', next)
if tonumber(ARGV[3]) > 0 then
  redis.call('EXPIRE', KEYS[1], ARGV[3])
else
  redis.call('PERSIST', KEYS[1])
end
return next
";

/// Storage backed by a shared Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    save_script: redis::Script,
    session_expiry: ExpiryPolicy,
    event_window: ExpiryPolicy,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("session_expiry", &self.session_expiry)
            .field("event_window", &self.event_window)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(
        url: &str,
        session_expiry: ExpiryPolicy,
        event_window: ExpiryPolicy,
    ) -> StorageResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| StorageError::configuration(BACKEND, e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StorageError::unavailable(BACKEND, e.to_string()))?;

        debug!(url = %url, "Connected to redis");

        Ok(Self {
            conn,
            save_script: redis::Script::new(SAVE_SCRIPT),
            session_expiry,
            event_window,
        })
    }

    fn session_key(user_id: &str) -> String {
        format!("{KEY_PREFIX}:session:{user_id}")
    }

    fn event_key(event_key: &str) -> String {
        format!("{KEY_PREFIX}:event:{event_key}")
    }

    fn registration_key(user_id: &str) -> String {
        format!("{KEY_PREFIX}:registration:{user_id}")
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn load(&self, user_id: &str) -> StorageResult<LoadedSession> {
        let mut conn = self.conn.clone();
        let (raw, revision): (Option<String>, Option<u64>) = redis::cmd("HMGET")
            .arg(Self::session_key(user_id))
            .arg("record")
            .arg("revision")
            .query_async(&mut conn)
            .await?;

        Ok(match raw {
            Some(raw) => LoadedSession::decode(BACKEND, user_id, &raw, revision.unwrap_or(0)),
            None => LoadedSession::new_user(),
        })
    }

    async fn save(
        &self,
        user_id: &str,
        record: &SessionRecord,
        expected_revision: u64,
    ) -> StorageResult<u64> {
        let raw = record.to_json()?;
        let mut conn = self.conn.clone();
        let result: i64 = self
            .save_script
            .key(Self::session_key(user_id))
            .arg(raw)
            .arg(expected_revision)
            .arg(self.session_expiry.ttl_seconds())
            .invoke_async(&mut conn)
            .await?;

        u64::try_from(result).map_err(|_| StorageError::conflict(user_id, expected_revision))
    }
}

#[async_trait]
impl IdempotencyStore for RedisStore {
    async fn mark_if_new(&self, event_key: &str) -> StorageResult<bool> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(Self::event_key(event_key)).arg("1").arg("NX");
        let window = self.event_window.ttl_seconds();
        if window > 0 {
            cmd.arg("EX").arg(window);
        }

        // SET NX replies OK when the key was written and nil otherwise.
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn release(&self, event_key: &str) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(Self::event_key(event_key))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for RedisStore {
    async fn upsert(&self, registration: &Registration) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("HSET")
            .arg(Self::registration_key(&registration.user_id))
            .arg("name")
            .arg(&registration.name)
            .arg("address")
            .arg(&registration.address)
            .arg("phone")
            .arg(&registration.phone)
            .arg("updated_at")
            .arg(registration.updated_at.to_rfc3339())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, user_id: &str) -> StorageResult<Option<Registration>> {
        let mut conn = self.conn.clone();
        let mut fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(Self::registration_key(user_id))
            .query_async(&mut conn)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }

        let updated_at = fields
            .get("updated_at")
            .map(|raw| DateTime::parse_from_rfc3339(raw))
            .transpose()
            .map_err(|e| StorageError::serialization(e.to_string()))?
            .map_or_else(Utc::now, |ts| ts.with_timezone(&Utc));

        let mut take = |name: &str| fields.remove(name).unwrap_or_default();
        Ok(Some(Registration {
            user_id: user_id.to_string(),
            name: take("name"),
            address: take("address"),
            phone: take("phone"),
            updated_at,
        }))
    }
}
