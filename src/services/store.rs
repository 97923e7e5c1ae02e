use crate::models::{DeviceRegistration, NotificationPreference, SearchFilter};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by the preference and registration stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Read access to notification preferences and saved search filters
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// All preferences with `is_enabled = true`
    async fn load_enabled_preferences(&self) -> Result<Vec<NotificationPreference>, StoreError>;

    /// Saved search filters for the given users, in one round trip
    async fn load_search_filters_by_users(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<SearchFilter>, StoreError>;
}

/// Device registrations, keyed by globally unique device token
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn load_registrations_by_users(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<DeviceRegistration>, StoreError>;

    /// Delete every registration whose token is in `tokens`. Missing tokens are not an error.
    /// Returns the number of rows removed.
    async fn delete_registrations_by_tokens(&self, tokens: &[String]) -> Result<u64, StoreError>;

    /// Insert or reassign a registration by token
    async fn upsert_registration(
        &self,
        registration: &DeviceRegistration,
    ) -> Result<(), StoreError>;

    /// Remove a single token; returns whether a row existed
    async fn remove_registration(&self, token: &str) -> Result<bool, StoreError>;
}
