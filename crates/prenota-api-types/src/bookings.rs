//! Booking payloads.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Which slice of the booking history a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingScope {
    Upcoming,
    Past,
    All,
}

impl BookingScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Past => "past",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

/// An open appointment slot offered by a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
}

/// A booking as served by `/bookings` and `/bookings/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
    pub status: BookingStatus,
    pub slot: TimeSlot,
}

/// Request body for creating a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub service_id: Uuid,
    pub slot_id: Uuid,
}
