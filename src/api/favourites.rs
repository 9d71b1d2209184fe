//! Favourites query and optimistic add/remove.

use std::sync::Arc;

use prenota_api_types::FavouriteList;
use serde_json::Value;
use uuid::Uuid;

use crate::sync::{QueryKey, SyncResult};

use super::{PlatformClient, decode};

impl PlatformClient {
    pub async fn favourites(&self) -> SyncResult<FavouriteList> {
        let key = QueryKey::Favourites;
        self.guard(&key)?;
        let api = Arc::clone(self.api());
        let value = self
            .engine()
            .coordinator()
            .fetch(key, move || async move { api.get_authed("/favourites", &[]).await })
            .await?;
        decode(value)
    }

    /// Optimistically append; the list shows the new favourite before the
    /// server confirms, and rolls back if it rejects.
    pub async fn add_favourite(&self, service_id: Uuid) -> SyncResult<()> {
        self.require_credential()?;
        let api = Arc::clone(self.api());
        self.engine()
            .mutations()
            .mutate(
                QueryKey::Favourites,
                move |current| {
                    let mut list = decode_list(current);
                    if !list.service_ids.contains(&service_id) {
                        list.service_ids.push(service_id);
                    }
                    serde_json::to_value(&list).unwrap_or(Value::Null)
                },
                move || async move {
                    api.post_authed(&format!("/favourites/{service_id}"), None).await
                },
            )
            .await
            .map(|_| ())
    }

    pub async fn remove_favourite(&self, service_id: Uuid) -> SyncResult<()> {
        self.require_credential()?;
        let api = Arc::clone(self.api());
        self.engine()
            .mutations()
            .mutate(
                QueryKey::Favourites,
                move |current| {
                    let mut list = decode_list(current);
                    list.service_ids.retain(|id| *id != service_id);
                    serde_json::to_value(&list).unwrap_or(Value::Null)
                },
                move || async move {
                    api.delete_authed(&format!("/favourites/{service_id}")).await
                },
            )
            .await
            .map(|_| ())
    }
}

fn decode_list(current: Option<&Value>) -> FavouriteList {
    current
        .and_then(|value| decode(value.clone()).ok())
        .unwrap_or_default()
}
