//! Unified error types for storage operations.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend unreachable or failed mid-operation. Retryable; never means
    /// "no such session".
    #[error("{backend} store unavailable: {message}")]
    Unavailable {
        backend: &'static str,
        message: String,
    },

    /// The stored revision moved since the record was loaded.
    #[error("session '{user_id}' changed concurrently (expected revision {expected})")]
    Conflict { user_id: String, expected: u64 },

    /// Error serializing data.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend rejected its configuration (bad URL, missing setting, ...).
    #[error("invalid {backend} store configuration: {message}")]
    Configuration {
        backend: &'static str,
        message: String,
    },
}

impl StorageError {
    /// Create an unavailable error for a backend.
    pub fn unavailable(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            backend,
            message: message.into(),
        }
    }

    /// Create a revision conflict error.
    pub fn conflict(user_id: impl Into<String>, expected: u64) -> Self {
        Self::Conflict {
            user_id: user_id.into(),
            expected,
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a configuration error for a backend.
    pub fn configuration(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Configuration {
            backend,
            message: message.into(),
        }
    }

    /// True for failures worth retrying after a reload.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        Self::unavailable("sql", e.to_string())
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(e: redis::RedisError) -> Self {
        Self::unavailable("redis", e.to_string())
    }
}

/// Convenience type alias for storage results.
pub type StorageResult<T> = Result<T, StorageError>;
