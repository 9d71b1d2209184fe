//! Review queries and optimistic review posting.

use std::sync::Arc;

use prenota_api_types::{Page, Review, ReviewInput, UserProfile};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::sync::{QueryKey, SyncError, SyncResult};

use super::{PlatformClient, decode};

impl PlatformClient {
    pub async fn reviews(&self, service_id: Uuid, page: u32) -> SyncResult<Page<Review>> {
        let key = QueryKey::Reviews { service_id, page };
        let api = Arc::clone(self.api());
        let value = self
            .engine()
            .coordinator()
            .fetch(key, move || async move {
                let query = vec![("page".to_string(), page.to_string())];
                api.get(&format!("/services/{service_id}/reviews"), &query).await
            })
            .await?;
        decode(value)
    }

    /// Post a review. The first reviews page shows the entry immediately,
    /// attributed to the cached profile name until the server echoes it.
    pub async fn post_review(&self, service_id: Uuid, input: ReviewInput) -> SyncResult<Review> {
        self.require_credential()?;
        if !input.is_valid() {
            return Err(SyncError::rejected("rating must be between 1 and 5"));
        }

        let author_name = self
            .engine()
            .cache()
            .peek(&QueryKey::Profile)
            .ok()
            .flatten()
            .and_then(|entry| entry.value)
            .and_then(|value| decode::<UserProfile>(value).ok())
            .map(|profile| profile.display_name)
            .unwrap_or_else(|| "You".to_string());

        let provisional = Review {
            id: Uuid::new_v4(),
            service_id,
            author_name,
            rating: input.rating,
            comment: input.comment.clone(),
            created_at: OffsetDateTime::now_utc(),
        };

        let key = QueryKey::Reviews { service_id, page: 1 };
        let api = Arc::clone(self.api());
        let body = serde_json::to_value(&input).unwrap_or(Value::Null);
        let value = self
            .engine()
            .mutations()
            .mutate(
                key,
                move |current| {
                    let mut listing: Page<Review> = current
                        .and_then(|value| decode(value.clone()).ok())
                        .unwrap_or(Page { items: Vec::new(), page: 1, total_pages: 1 });
                    listing.items.insert(0, provisional);
                    serde_json::to_value(&listing).unwrap_or(Value::Null)
                },
                move || async move {
                    api.post_authed(&format!("/services/{service_id}/reviews"), Some(&body))
                        .await
                },
            )
            .await?;
        decode(value)
    }
}
