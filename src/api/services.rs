//! Service catalogue queries.

use std::sync::Arc;

use prenota_api_types::{Page, ServiceCategory, ServiceDetail, ServiceSummary};
use uuid::Uuid;

use crate::sync::{QueryKey, SyncResult};

use super::{PlatformClient, decode};

impl PlatformClient {
    /// Catalogue listing, optionally filtered by category.
    pub async fn services(
        &self,
        category: Option<ServiceCategory>,
        page: u32,
    ) -> SyncResult<Page<ServiceSummary>> {
        let key = QueryKey::Services { category, page, locale: self.locale };
        let api = Arc::clone(self.api());
        let value = self
            .engine()
            .coordinator()
            .fetch(key, move || async move {
                let mut query = vec![("page".to_string(), page.to_string())];
                if let Some(category) = category {
                    query.push(("category".to_string(), category.as_str().to_string()));
                }
                api.get("/services", &query).await
            })
            .await?;
        decode(value)
    }

    /// A single service record.
    pub async fn service(&self, service_id: Uuid) -> SyncResult<ServiceDetail> {
        let key = QueryKey::ServiceDetail { service_id, locale: self.locale };
        let api = Arc::clone(self.api());
        let value = self
            .engine()
            .coordinator()
            .fetch(key, move || async move {
                api.get(&format!("/services/{service_id}"), &[]).await
            })
            .await?;
        decode(value)
    }
}
