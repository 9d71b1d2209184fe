//! Review payloads.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A published review as served by `/services/{id}/reviews`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub service_id: Uuid,
    pub author_name: String,
    pub rating: u8,
    pub comment: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Request body for posting a review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewInput {
    pub rating: u8,
    pub comment: String,
}

impl ReviewInput {
    /// Ratings are a 1..=5 star scale.
    pub fn is_valid(&self) -> bool {
        (1..=5).contains(&self.rating)
    }
}
