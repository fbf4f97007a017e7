//! In-process storage.
//!
//! Single-instance fallback: everything lives in concurrent maps and is lost
//! on restart. Expiry is applied lazily on access and by sweeps.

use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::error::{StorageError, StorageResult};
use super::registration::{Registration, RegistrationStore};
use super::session::{IdempotencyStore, LoadOrigin, LoadedSession, SessionStore};
use crate::reaper::ExpiryPolicy;
use crate::session::SessionRecord;

const BACKEND: &str = "memory";

#[derive(Debug, Clone)]
struct StoredSession {
    record: SessionRecord,
    revision: u64,
    touched: Instant,
}

/// In-memory implementation of all storage traits.
#[derive(Debug)]
pub struct MemoryStore {
    sessions: DashMap<String, StoredSession>,
    events: DashMap<String, Instant>,
    registrations: DashMap<String, Registration>,
    session_expiry: ExpiryPolicy,
    event_window: ExpiryPolicy,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(ExpiryPolicy::Never, ExpiryPolicy::Never)
    }
}

impl MemoryStore {
    pub fn new(session_expiry: ExpiryPolicy, event_window: ExpiryPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            events: DashMap::new(),
            registrations: DashMap::new(),
            session_expiry,
            event_window,
        }
    }

    fn is_live(&self, stored: &StoredSession) -> bool {
        !self.session_expiry.is_expired(stored.touched.elapsed())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn load(&self, user_id: &str) -> StorageResult<LoadedSession> {
        // Clone out before any removal: holding a map ref across remove deadlocks.
        let Some(stored) = self.sessions.get(user_id).map(|e| e.value().clone()) else {
            return Ok(LoadedSession::new_user());
        };

        if !self.is_live(&stored) {
            self.sessions
                .remove_if(user_id, |_, current| !self.is_live(current));
            return Ok(LoadedSession::new_user());
        }

        Ok(LoadedSession {
            record: stored.record,
            revision: stored.revision,
            origin: LoadOrigin::Stored,
        })
    }

    async fn save(
        &self,
        user_id: &str,
        record: &SessionRecord,
        expected_revision: u64,
    ) -> StorageResult<u64> {
        match self.sessions.entry(user_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let live = self.is_live(occupied.get());
                if live && occupied.get().revision != expected_revision {
                    return Err(StorageError::conflict(user_id, expected_revision));
                }
                let revision = expected_revision + 1;
                occupied.insert(StoredSession {
                    record: record.clone(),
                    revision,
                    touched: Instant::now(),
                });
                Ok(revision)
            }
            Entry::Vacant(vacant) => {
                let revision = expected_revision + 1;
                vacant.insert(StoredSession {
                    record: record.clone(),
                    revision,
                    touched: Instant::now(),
                });
                Ok(revision)
            }
        }
    }

    async fn sweep_expired(&self) -> StorageResult<u64> {
        let before = self.sessions.len();
        self.sessions.retain(|_, stored| self.is_live(stored));
        let removed = before.saturating_sub(self.sessions.len());

        let window = self.event_window;
        self.events
            .retain(|_, seen| !window.is_expired(seen.elapsed()));

        Ok(removed as u64)
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn mark_if_new(&self, event_key: &str) -> StorageResult<bool> {
        match self.events.entry(event_key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if self.event_window.is_expired(occupied.get().elapsed()) {
                    occupied.insert(Instant::now());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Instant::now());
                Ok(true)
            }
        }
    }

    async fn release(&self, event_key: &str) -> StorageResult<()> {
        self.events.remove(event_key);
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn upsert(&self, registration: &Registration) -> StorageResult<()> {
        self.registrations
            .insert(registration.user_id.clone(), registration.clone());
        Ok(())
    }

    async fn get(&self, user_id: &str) -> StorageResult<Option<Registration>> {
        Ok(self.registrations.get(user_id).map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::flow::Field;
    use crate::session::{ConfirmationToken, PendingConfirmation};

    fn sample_record() -> SessionRecord {
        let mut record = SessionRecord {
            step_index: 1,
            prompted: true,
            ..Default::default()
        };
        record
            .confirmed_values
            .insert(Field::Name, "山田 太郎".to_string());
        record.pending = Some(PendingConfirmation {
            token: ConfirmationToken::from("T2"),
            buffer: "大阪府".to_string(),
        });
        record
    }

    #[tokio::test]
    async fn load_unknown_user_returns_default() {
        let store = MemoryStore::default();
        let loaded = store.load("nobody").await.unwrap();
        assert_eq!(loaded, LoadedSession::new_user());
        assert!(loaded.record.is_initial());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = MemoryStore::default();
        let record = sample_record();

        let revision = store.save("U1", &record, 0).await.unwrap();
        assert_eq!(revision, 1);

        let loaded = store.load("U1").await.unwrap();
        assert_eq!(loaded.record, record);
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.origin, LoadOrigin::Stored);
    }

    #[tokio::test]
    async fn loaded_records_are_independent() {
        let store = MemoryStore::default();
        store.save("U1", &sample_record(), 0).await.unwrap();

        let mut first = store.load("U1").await.unwrap();
        first.record.confirmed_values.clear();
        first.record.step_index = 0;

        let second = store.load("U1").await.unwrap();
        assert_eq!(second.record, sample_record());
    }

    #[tokio::test]
    async fn stale_revision_conflicts() {
        let store = MemoryStore::default();
        store.save("U1", &sample_record(), 0).await.unwrap();
        store.save("U1", &SessionRecord::default(), 1).await.unwrap();

        let err = store
            .save("U1", &sample_record(), 1)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // A stale "new user" write cannot clobber an existing record either.
        let err = store.save("U1", &sample_record(), 0).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn expired_session_loads_as_default() {
        let store = MemoryStore::new(
            ExpiryPolicy::After(Duration::from_millis(20)),
            ExpiryPolicy::Never,
        );
        store.save("U1", &sample_record(), 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let loaded = store.load("U1").await.unwrap();
        assert_eq!(loaded, LoadedSession::new_user());
        assert!(store.sessions.is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let store = MemoryStore::new(
            ExpiryPolicy::After(Duration::from_millis(20)),
            ExpiryPolicy::Never,
        );
        store.save("old", &sample_record(), 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        store.save("fresh", &sample_record(), 0).await.unwrap();

        assert_eq!(store.sweep_expired().await.unwrap(), 1);
        assert!(store.sessions.contains_key("fresh"));
        assert!(!store.sessions.contains_key("old"));
    }

    #[tokio::test]
    async fn mark_if_new_once_per_key() {
        let store = MemoryStore::default();
        assert!(store.mark_if_new("evt-1").await.unwrap());
        assert!(!store.mark_if_new("evt-1").await.unwrap());
        assert!(store.mark_if_new("evt-2").await.unwrap());

        store.release("evt-1").await.unwrap();
        assert!(store.mark_if_new("evt-1").await.unwrap());
    }

    #[tokio::test]
    async fn mark_if_new_is_atomic_under_contention() {
        let store = Arc::new(MemoryStore::default());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            tasks.push(tokio::spawn(
                async move { store.mark_if_new("same").await.unwrap() },
            ));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn event_marker_expires_after_window() {
        let store = MemoryStore::new(
            ExpiryPolicy::Never,
            ExpiryPolicy::After(Duration::from_millis(20)),
        );
        assert!(store.mark_if_new("evt").await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.mark_if_new("evt").await.unwrap());
    }

    #[tokio::test]
    async fn registration_upsert_overwrites() {
        let store = MemoryStore::default();
        let mut reg = Registration {
            user_id: "U1".to_string(),
            name: "Taro".to_string(),
            address: "Tokyo".to_string(),
            phone: "090".to_string(),
            updated_at: chrono::Utc::now(),
        };
        store.upsert(&reg).await.unwrap();

        reg.name = "Jiro".to_string();
        store.upsert(&reg).await.unwrap();

        assert_eq!(store.registrations.len(), 1);
        assert_eq!(store.get("U1").await.unwrap().unwrap().name, "Jiro");
        assert!(store.get("U2").await.unwrap().is_none());
    }
}
