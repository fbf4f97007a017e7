//! Confirmation tokens and the pending-confirmation guard.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::SessionRecord;

/// Single-use value binding a yes/no reply to the prompt that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationToken(String);

impl ConfirmationToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConfirmationToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConfirmationToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConfirmationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of fresh confirmation tokens.
pub trait TokenMint: Send + Sync {
    fn mint(&self) -> ConfirmationToken;
}

/// Mints random UUIDv4 tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidTokenMint;

impl TokenMint for UuidTokenMint {
    fn mint(&self) -> ConfirmationToken {
        ConfirmationToken(Uuid::new_v4().to_string())
    }
}

/// Mints `{prefix}1`, `{prefix}2`, ... for deterministic tests and replays.
#[derive(Debug)]
pub struct SequentialTokenMint {
    prefix: String,
    next: AtomicU64,
}

impl SequentialTokenMint {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl TokenMint for SequentialTokenMint {
    fn mint(&self) -> ConfirmationToken {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        ConfirmationToken(format!("{}{}", self.prefix, n))
    }
}

/// Check a presented token against the record's outstanding confirmation.
///
/// Fails when nothing is pending, so a button from an already-resolved prompt
/// can never apply.
pub fn is_valid(record: &SessionRecord, presented: &str) -> bool {
    record
        .pending_token()
        .is_some_and(|pending| pending.as_str() == presented)
}
