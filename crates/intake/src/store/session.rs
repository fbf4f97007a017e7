//! Session and idempotency storage traits.
//!
//! Defines the contract every backend implements: per-user progress records
//! with optimistic revisions, and a global event-key marker set.

use async_trait::async_trait;
use tracing::warn;

use crate::session::SessionRecord;

use super::error::StorageResult;

/// Where a loaded record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    /// Nothing stored (new user, or the record expired).
    New,
    /// Decoded from storage.
    Stored,
    /// Storage held an undecodable record; a default was substituted.
    Recovered,
}

/// A record together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSession {
    pub record: SessionRecord,
    /// Revision to pass back to [`SessionStore::save`]. 0 = never stored.
    pub revision: u64,
    pub origin: LoadOrigin,
}

impl LoadedSession {
    /// A fresh default record for a user with nothing stored.
    pub fn new_user() -> Self {
        Self {
            record: SessionRecord::default(),
            revision: 0,
            origin: LoadOrigin::New,
        }
    }

    /// Decode a stored record, substituting the default if it is corrupt.
    ///
    /// The stored revision is kept so the next save replaces the corrupt row.
    pub fn decode(backend: &'static str, user_id: &str, raw: &str, revision: u64) -> Self {
        match SessionRecord::from_json(raw) {
            Ok(record) => Self {
                record,
                revision,
                origin: LoadOrigin::Stored,
            },
            Err(e) => {
                warn!(
                    backend,
                    user_id = %user_id,
                    error = %e,
                    "Discarding undecodable session record"
                );
                Self {
                    record: SessionRecord::default(),
                    revision,
                    origin: LoadOrigin::Recovered,
                }
            }
        }
    }
}

/// Storage interface for per-user session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Load the record for a user.
    ///
    /// Returns a default record (revision 0) when nothing is stored. Every
    /// call returns an independently owned record.
    async fn load(&self, user_id: &str) -> StorageResult<LoadedSession>;

    /// Replace the stored record in one atomic step.
    ///
    /// Succeeds only while the stored revision still equals
    /// `expected_revision` (0 = nothing stored); otherwise fails with
    /// [`StorageError::Conflict`](super::StorageError::Conflict). Returns the
    /// new revision.
    async fn save(
        &self,
        user_id: &str,
        record: &SessionRecord,
        expected_revision: u64,
    ) -> StorageResult<u64>;

    /// Delete expired records. Returns how many were removed.
    ///
    /// Backends with native key expiry have nothing to do.
    async fn sweep_expired(&self) -> StorageResult<u64> {
        Ok(0)
    }
}

/// Storage interface for processed-event markers.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically record `event_key` as processed.
    ///
    /// Returns `true` the first time a key is seen within the window,
    /// `false` for a redelivery.
    async fn mark_if_new(&self, event_key: &str) -> StorageResult<bool>;

    /// Forget a marker so the event may be processed again.
    async fn release(&self, event_key: &str) -> StorageResult<()>;
}
