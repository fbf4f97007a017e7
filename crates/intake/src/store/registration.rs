//! Final registration records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::Field;
use crate::session::ConfirmedValues;

use super::error::StorageResult;

/// The confirmed details of one completed pass, one row per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub user_id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn from_values(user_id: impl Into<String>, values: &ConfirmedValues) -> Self {
        let value = |field: Field| values.get(&field).cloned().unwrap_or_default();
        Self {
            user_id: user_id.into(),
            name: value(Field::Name),
            address: value(Field::Address),
            phone: value(Field::Phone),
            updated_at: Utc::now(),
        }
    }
}

/// Durable storage for final registrations.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Insert or overwrite the registration for `registration.user_id`.
    async fn upsert(&self, registration: &Registration) -> StorageResult<()>;

    /// Fetch a user's registration, if one was completed.
    async fn get(&self, user_id: &str) -> StorageResult<Option<Registration>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_values_maps_fields() {
        let mut values = ConfirmedValues::new();
        values.insert(Field::Name, "Taro".to_string());
        values.insert(Field::Address, "Tokyo".to_string());
        values.insert(Field::Phone, "090".to_string());

        let reg = Registration::from_values("U1", &values);
        assert_eq!(reg.user_id, "U1");
        assert_eq!(reg.name, "Taro");
        assert_eq!(reg.address, "Tokyo");
        assert_eq!(reg.phone, "090");
    }
}
