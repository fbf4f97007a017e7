//! Storage layer.
//!
//! Three contracts (sessions, processed-event markers, registrations) and
//! four interchangeable backends implementing all of them.

mod error;
mod memory;
mod redis;
mod registration;
mod session;
mod sql;

use std::sync::Arc;

use tracing::{info, warn};

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use self::redis::RedisStore;
pub use registration::{Registration, RegistrationStore};
pub use session::{IdempotencyStore, LoadOrigin, LoadedSession, SessionStore};
pub use sql::{PostgresStore, SqliteStore};

use crate::config::{StoreBackend, StoreConfig};

/// The storage handles a request needs, built once at startup.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub registrations: Arc<dyn RegistrationStore>,
}

impl Stores {
    /// Use one backend value for every contract.
    pub fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: SessionStore + IdempotencyStore + RegistrationStore + 'static,
    {
        Self {
            sessions: store.clone(),
            idempotency: store.clone(),
            registrations: store,
        }
    }

    /// In-process stores with no expiry.
    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::default()))
    }

    pub fn backend(&self) -> &'static str {
        self.sessions.backend()
    }
}

/// Open the backend selected by `config`.
pub async fn connect(config: &StoreConfig) -> StorageResult<Stores> {
    let session_expiry = config.session_expiry();
    let event_window = config.event_window();
    let url = || {
        config.url().ok_or_else(|| {
            StorageError::configuration(config.backend.as_str(), "store.url is not set")
        })
    };

    let stores = match config.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory store; sessions are lost on restart and not shared");
            Stores::from_backend(Arc::new(MemoryStore::new(session_expiry, event_window)))
        }
        StoreBackend::Redis => Stores::from_backend(Arc::new(
            RedisStore::connect(url()?, session_expiry, event_window).await?,
        )),
        StoreBackend::Sqlite => Stores::from_backend(Arc::new(
            SqliteStore::connect(url()?, session_expiry, event_window).await?,
        )),
        StoreBackend::Postgres => Stores::from_backend(Arc::new(
            PostgresStore::connect(url()?, session_expiry, event_window).await?,
        )),
    };

    info!(
        backend = stores.backend(),
        ttl_seconds = config.ttl_seconds,
        idempotency_window_seconds = config.idempotency_window_seconds,
        "Session store ready"
    );
    Ok(stores)
}
