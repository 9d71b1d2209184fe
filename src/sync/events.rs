//! Push notification channels and their wire events.
//!
//! A channel delivers invalidation hints, not data: an event names a
//! resource class that changed server-side, optionally with the entity id.
//! Delivery is at-least-once, so everything downstream of parsing must be
//! idempotent.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::keys::{QueryKey, ResourceClass};

/// The notification channels the platform exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Booking,
    Service,
    Review,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [Self::Booking, Self::Service, Self::Review];

    /// Path segment / query value identifying the channel on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booking => "booking",
            Self::Service => "service",
            Self::Review => "review",
        }
    }
}

/// One push event as delivered by a channel.
///
/// `id` is the delivery-idempotency token: redeliveries after a reconnect
/// reuse the id of the original event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: PushEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum PushEventKind {
    BookingCompleted { booking_id: Option<Uuid> },
    BookingCancelled { booking_id: Option<Uuid> },
    SlotsChanged { service_id: Option<Uuid> },
    ServiceUpserted { service_id: Option<Uuid> },
    ServiceRemoved { service_id: Option<Uuid> },
    ReviewPosted { service_id: Option<Uuid> },
}

/// What one event invalidates: a whole resource class or one exact key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidationTarget {
    Class(ResourceClass),
    Key(QueryKey),
}

impl PushEvent {
    /// The channel this event kind is delivered on.
    pub fn channel(&self) -> ChannelKind {
        match self.kind {
            PushEventKind::BookingCompleted { .. }
            | PushEventKind::BookingCancelled { .. }
            | PushEventKind::SlotsChanged { .. } => ChannelKind::Booking,
            PushEventKind::ServiceUpserted { .. } | PushEventKind::ServiceRemoved { .. } => {
                ChannelKind::Service
            }
            PushEventKind::ReviewPosted { .. } => ChannelKind::Review,
        }
    }

    /// Cache targets to mark stale when this event arrives.
    ///
    /// Keys that need parameters the event cannot carry (page, locale) fall
    /// back to class granularity.
    pub fn targets(&self) -> Vec<InvalidationTarget> {
        use InvalidationTarget::{Class, Key};
        match &self.kind {
            PushEventKind::BookingCompleted { booking_id }
            | PushEventKind::BookingCancelled { booking_id } => {
                let mut targets = vec![Class(ResourceClass::Bookings)];
                match booking_id {
                    Some(id) => targets.push(Key(QueryKey::BookingDetail { booking_id: *id })),
                    None => targets.push(Class(ResourceClass::BookingDetail)),
                }
                targets
            }
            PushEventKind::SlotsChanged { .. } => vec![Class(ResourceClass::ServiceDetail)],
            PushEventKind::ServiceUpserted { .. } => {
                vec![Class(ResourceClass::Services), Class(ResourceClass::ServiceDetail)]
            }
            PushEventKind::ServiceRemoved { .. } => vec![
                Class(ResourceClass::Services),
                Class(ResourceClass::ServiceDetail),
                Class(ResourceClass::Favourites),
            ],
            PushEventKind::ReviewPosted { .. } => vec![
                Class(ResourceClass::Reviews),
                Class(ResourceClass::Services),
                Class(ResourceClass::ServiceDetail),
            ],
        }
    }
}
