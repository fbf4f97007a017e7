//! Session expiry.
//!
//! Abandoned conversations return to their initial state once their TTL
//! passes. Redis expires keys itself; the relational and in-process backends
//! delete expired records on every access and, optionally, from a periodic
//! background sweep spawned here.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::store::SessionStore;

/// How long an untouched record (or event marker) stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    Never,
    After(Duration),
}

impl ExpiryPolicy {
    /// `0` means never expire.
    pub fn from_seconds(seconds: u64) -> Self {
        if seconds == 0 {
            Self::Never
        } else {
            Self::After(Duration::from_secs(seconds))
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::After(ttl) => Some(*ttl),
        }
    }

    /// Whole seconds, for backends that take an integer expiry.
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl().map_or(0, |ttl| ttl.as_secs().max(1))
    }

    /// Unix-seconds timestamp before which rows count as expired.
    pub fn cutoff(&self, now: i64) -> Option<i64> {
        self.ttl()
            .map(|ttl| now.saturating_sub(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)))
    }

    /// Whether something last touched `age` ago has expired.
    pub fn is_expired(&self, age: Duration) -> bool {
        self.ttl().is_some_and(|ttl| age >= ttl)
    }
}

/// Current time as unix seconds.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Run one sweep, logging the outcome.
pub async fn sweep_once(store: &dyn SessionStore) -> u64 {
    match store.sweep_expired().await {
        Ok(removed) => {
            if removed > 0 {
                debug!(
                    backend = store.backend(),
                    removed = removed,
                    "Swept expired sessions"
                );
            }
            removed
        }
        Err(e) => {
            warn!(backend = store.backend(), error = %e, "Session sweep failed");
            0
        }
    }
}

/// Spawn a background task that sweeps expired sessions every `interval`.
///
/// The task runs until the runtime shuts down.
pub fn spawn_reaper(store: Arc<dyn SessionStore>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // skip immediate tick
        loop {
            ticker.tick().await;
            sweep_once(store.as_ref()).await;
        }
    });
}
