//! Typed client facade over the synchronization core.
//!
//! Every query goes through the fetch coordinator (and so inherits dedup
//! and staleness semantics); every edit goes through the mutation engine.
//! Payloads decode into the shared `prenota-api-types` DTOs.

mod bookings;
mod favourites;
mod reviews;
mod services;

use std::sync::Arc;

use prenota_api_types::{Role, UserProfile};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::sync::{Locale, QueryKey, SyncEngine, SyncError, SyncResult};
use crate::transport::ApiClient;

pub struct PlatformClient {
    engine: Arc<SyncEngine>,
    api: Arc<ApiClient>,
    locale: Locale,
}

impl PlatformClient {
    pub fn new(engine: Arc<SyncEngine>, api: Arc<ApiClient>, locale: Locale) -> Self {
        Self { engine, api, locale }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Authenticate and install the credential slot.
    pub async fn login(&self, email: &str, password: &str) -> SyncResult<Role> {
        self.api.login(email, password).await
    }

    /// Drop the credential and every cached entry.
    pub async fn logout(&self) {
        self.api.logout().await;
        self.engine.teardown();
    }

    pub async fn profile(&self) -> SyncResult<UserProfile> {
        let key = QueryKey::Profile;
        self.guard(&key)?;
        let api = Arc::clone(&self.api);
        let value = self
            .engine
            .coordinator()
            .fetch(key, move || async move { api.get_authed("/profile", &[]).await })
            .await?;
        decode(value)
    }

    /// Protected queries fail before the network when no credential is
    /// stored.
    pub(crate) fn guard(&self, key: &QueryKey) -> SyncResult<()> {
        if key.is_protected() && !self.api.has_credential() {
            return Err(SyncError::CredentialMissing);
        }
        Ok(())
    }

    /// Mutations always require an authenticated session.
    pub(crate) fn require_credential(&self) -> SyncResult<()> {
        if self.api.has_credential() {
            Ok(())
        } else {
            Err(SyncError::CredentialMissing)
        }
    }

    pub(crate) fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> SyncResult<T> {
    serde_json::from_value(value).map_err(|e| SyncError::decode(e.to_string()))
}
