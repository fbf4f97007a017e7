//! End-to-end registration conversations over HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use tempfile::TempDir;
use tokio::sync::Notify;

mod common;

use common::{
    app_with, app_with_timeout, button_data, callback_event, contents, post_event, text_event,
};
use intake::flow::messages;
use intake::reaper::ExpiryPolicy;
use intake::session::SessionRecord;
use intake::store::{
    LoadedSession, MemoryStore, RegistrationStore, SessionStore, SqliteStore, StorageError,
    StorageResult, Stores,
};

async fn sqlite_stores(dir: &TempDir) -> (Stores, Arc<SqliteStore>) {
    let url = format!("sqlite://{}", dir.path().join("intake.db").display());
    let store = Arc::new(
        SqliteStore::connect(
            &url,
            ExpiryPolicy::from_seconds(1800),
            ExpiryPolicy::from_seconds(1800),
        )
        .await
        .unwrap(),
    );
    (Stores::from_backend(store.clone()), store)
}

#[tokio::test]
async fn test_full_registration_survives_restart() {
    let dir = TempDir::new().unwrap();
    let (stores, _) = sqlite_stores(&dir).await;
    let app = app_with(stores);

    post_event(&app, text_event("m1", "U1", "hello")).await;

    let (_, body) = post_event(&app, text_event("m2", "U1", "  山田 太郎  ")).await;
    assert_eq!(
        contents(&body),
        vec!["Is this name correct?\n\n\"山田 太郎\""]
    );
    let yes = button_data(&body, "Yes");

    let (_, body) = post_event(&app, callback_event("c1", "U1", &yes)).await;
    assert_eq!(contents(&body), vec!["Please enter your address."]);

    // A fresh process over the same database picks up where the user left off.
    drop(app);
    let (stores, store) = sqlite_stores(&dir).await;
    let app = app_with(stores);

    let (_, body) = post_event(&app, text_event("m3", "U1", "東京都千代田区")).await;
    let no = button_data(&body, "No");
    let (_, body) = post_event(&app, callback_event("c2", "U1", &no)).await;
    assert_eq!(
        contents(&body),
        vec![messages::RETRY, "Please enter your address."]
    );

    let (_, body) = post_event(&app, text_event("m4", "U1", "大阪府大阪市")).await;
    let yes = button_data(&body, "Yes");
    post_event(&app, callback_event("c3", "U1", &yes)).await;

    let (_, body) = post_event(&app, text_event("m5", "U1", "090-1234-5678")).await;
    let yes = button_data(&body, "Yes");
    let (status, body) = post_event(&app, callback_event("c4", "U1", &yes)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed"], true);
    assert_eq!(
        contents(&body),
        vec!["Registration complete:\nName: 山田 太郎\nAddress: 大阪府大阪市\nPhone: 090-1234-5678"]
    );

    let reg = store.get("U1").await.unwrap().unwrap();
    assert_eq!(reg.name, "山田 太郎");
    assert_eq!(reg.address, "大阪府大阪市");
    assert_eq!(reg.phone, "090-1234-5678");
    assert!(store.load("U1").await.unwrap().record.is_initial());
}

#[tokio::test]
async fn test_stale_button_after_commit_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (stores, store) = sqlite_stores(&dir).await;
    let app = app_with(stores);

    post_event(&app, text_event("m1", "U1", "hello")).await;
    let (_, body) = post_event(&app, text_event("m2", "U1", "Taro")).await;
    let yes = button_data(&body, "Yes");
    post_event(&app, callback_event("c1", "U1", &yes)).await;
    let committed = store.load("U1").await.unwrap();

    let (status, body) = post_event(&app, callback_event("c1-replay", "U1", &yes)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(contents(&body), vec![messages::INVALID_OPERATION]);
    let after = store.load("U1").await.unwrap();
    assert_eq!(after.record, committed.record);
}

#[tokio::test]
async fn test_users_do_not_share_state() {
    let app = app_with(Stores::in_memory());

    post_event(&app, text_event("a1", "alice", "hi")).await;
    let (_, body) = post_event(&app, text_event("a2", "alice", "Alice")).await;
    let alice_yes = button_data(&body, "Yes");

    post_event(&app, text_event("b1", "bob", "hi")).await;

    // Bob presses a button minted for Alice.
    let (_, body) = post_event(&app, callback_event("b2", "bob", &alice_yes)).await;
    assert_eq!(contents(&body), vec![messages::INVALID_OPERATION]);

    let (_, body) = post_event(&app, callback_event("a3", "alice", &alice_yes)).await;
    assert_eq!(contents(&body), vec!["Please enter your address."]);
}

/// Session store whose writes always fail.
struct ReadOnlySessions(MemoryStore);

#[async_trait]
impl SessionStore for ReadOnlySessions {
    fn backend(&self) -> &'static str {
        "read-only"
    }

    async fn load(&self, user_id: &str) -> StorageResult<LoadedSession> {
        self.0.load(user_id).await
    }

    async fn save(&self, _: &str, _: &SessionRecord, _: u64) -> StorageResult<u64> {
        Err(StorageError::unavailable("read-only", "writes disabled"))
    }
}

#[tokio::test]
async fn test_storage_failure_returns_apology_and_allows_redelivery() {
    let memory = Arc::new(MemoryStore::default());
    let stores = Stores {
        sessions: Arc::new(ReadOnlySessions(MemoryStore::default())),
        idempotency: memory.clone(),
        registrations: memory,
    };
    let app = app_with(stores);

    let (status, body) = post_event(&app, text_event("m1", "U1", "hello")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "failed");
    assert_eq!(contents(&body), vec![messages::APOLOGY]);

    // Not marked as processed: the redelivery is attempted again, not dropped.
    let (status, body) = post_event(&app, text_event("m1", "U1", "hello")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "failed");
}

/// Session store whose saves block until the test lets them through.
struct GatedSessions {
    inner: MemoryStore,
    gate: Arc<Notify>,
}

#[async_trait]
impl SessionStore for GatedSessions {
    fn backend(&self) -> &'static str {
        "gated"
    }

    async fn load(&self, user_id: &str) -> StorageResult<LoadedSession> {
        self.inner.load(user_id).await
    }

    async fn save(
        &self,
        user_id: &str,
        record: &SessionRecord,
        expected: u64,
    ) -> StorageResult<u64> {
        self.gate.notified().await;
        self.inner.save(user_id, record, expected).await
    }
}

#[tokio::test]
async fn test_timed_out_request_still_applies_event() {
    let gate = Arc::new(Notify::new());
    let sessions = Arc::new(GatedSessions {
        inner: MemoryStore::default(),
        gate: gate.clone(),
    });
    let memory = Arc::new(MemoryStore::default());
    let stores = Stores {
        sessions: sessions.clone(),
        idempotency: memory.clone(),
        registrations: memory,
    };
    let app = app_with_timeout(stores, 1);

    let (status, _) = post_event(&app, text_event("m1", "U1", "hello")).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);

    // The handler keeps running after the response was abandoned.
    gate.notify_one();
    let mut applied = None;
    for _ in 0..100 {
        let loaded = sessions.inner.load("U1").await.unwrap();
        if loaded.revision > 0 {
            applied = Some(loaded);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let applied = applied.expect("event was never applied");
    assert_eq!(applied.revision, 1);
    assert!(applied.record.prompted);

    // The redelivery is a true duplicate: the event already took effect.
    let (status, body) = post_event(&app, text_event("m1", "U1", "hello")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "duplicate");
}
