//! Service catalogue, favourites, and profile payloads.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::Role;

/// Broad service categories the catalogue can be filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Medical,
    Fitness,
    Wellness,
    Housekeeping,
}

impl ServiceCategory {
    /// Stable query-parameter form used by the catalogue endpoints.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Medical => "medical",
            Self::Fitness => "fitness",
            Self::Wellness => "wellness",
            Self::Housekeeping => "housekeeping",
        }
    }
}

/// Cursor-free paginated envelope used by all list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub total_pages: u32,
}

/// Catalogue listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub id: Uuid,
    pub name: String,
    pub category: ServiceCategory,
    pub rating: Option<f32>,
    pub review_count: u32,
}

/// Full service record as served by `/services/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDetail {
    pub id: Uuid,
    pub name: String,
    pub category: ServiceCategory,
    pub description: String,
    pub address: Option<String>,
    pub rating: Option<f32>,
    pub review_count: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The authenticated user's favourite services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavouriteList {
    pub service_ids: Vec<Uuid>,
}

/// Authenticated profile record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_page_deserializes() {
        let page: Page<ServiceSummary> = serde_json::from_str(
            r#"{
                "items": [
                    {"id":"00000000-0000-0000-0000-000000000001","name":"Vita Gym","category":"fitness","rating":4.5,"review_count":12}
                ],
                "page": 1,
                "total_pages": 3
            }"#,
        )
        .unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].category, ServiceCategory::Fitness);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn favourite_list_defaults_to_empty() {
        let list = FavouriteList::default();
        assert!(list.service_ids.is_empty());
    }
}
