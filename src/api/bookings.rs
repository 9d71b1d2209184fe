//! Booking queries and optimistic booking mutations.

use std::sync::Arc;

use prenota_api_types::{
    Booking, BookingRequest, BookingScope, BookingStatus, Page, ServiceDetail, TimeSlot,
};
use serde_json::Value;
use uuid::Uuid;

use crate::sync::{QueryKey, ResourceClass, SyncResult};

use super::{PlatformClient, decode};

impl PlatformClient {
    pub async fn bookings(&self, scope: BookingScope, page: u32) -> SyncResult<Page<Booking>> {
        let key = QueryKey::Bookings { scope, page };
        self.guard(&key)?;
        let api = Arc::clone(self.api());
        let value = self
            .engine()
            .coordinator()
            .fetch(key, move || async move {
                let query = vec![
                    ("scope".to_string(), scope.as_str().to_string()),
                    ("page".to_string(), page.to_string()),
                ];
                api.get_authed("/bookings", &query).await
            })
            .await?;
        decode(value)
    }

    pub async fn booking(&self, booking_id: Uuid) -> SyncResult<Booking> {
        let key = QueryKey::BookingDetail { booking_id };
        self.guard(&key)?;
        let api = Arc::clone(self.api());
        let value = self
            .engine()
            .coordinator()
            .fetch(key, move || async move {
                api.get_authed(&format!("/bookings/{booking_id}"), &[]).await
            })
            .await?;
        decode(value)
    }

    /// Book a slot. The upcoming-bookings list shows a pending entry before
    /// the server confirms; the confirmed booking is returned.
    pub async fn book(&self, service: &ServiceDetail, slot: TimeSlot) -> SyncResult<Booking> {
        self.require_credential()?;
        let request = BookingRequest { service_id: service.id, slot_id: slot.id };
        let provisional = Booking {
            // placeholder identity until the server assigns one
            id: Uuid::new_v4(),
            service_id: service.id,
            service_name: service.name.clone(),
            status: BookingStatus::Pending,
            slot,
        };

        let key = QueryKey::Bookings { scope: BookingScope::Upcoming, page: 1 };
        let api = Arc::clone(self.api());
        let body = serde_json::to_value(&request).unwrap_or(Value::Null);
        let value = self
            .engine()
            .mutations()
            .mutate(
                key,
                move |current| {
                    let mut listing: Page<Booking> = current
                        .and_then(|value| decode(value.clone()).ok())
                        .unwrap_or(Page { items: Vec::new(), page: 1, total_pages: 1 });
                    listing.items.push(provisional);
                    serde_json::to_value(&listing).unwrap_or(Value::Null)
                },
                move || async move { api.post_authed("/bookings", Some(&body)).await },
            )
            .await?;
        decode(value)
    }

    /// Cancel a booking. The detail view flips to cancelled immediately and
    /// rolls back if the server refuses.
    pub async fn cancel_booking(&self, booking_id: Uuid) -> SyncResult<()> {
        self.require_credential()?;
        let key = QueryKey::BookingDetail { booking_id };
        let api = Arc::clone(self.api());
        self.engine()
            .mutations()
            .mutate(
                key,
                move |current| match current.and_then(|value| decode::<Booking>(value.clone()).ok())
                {
                    Some(mut booking) => {
                        booking.status = BookingStatus::Cancelled;
                        serde_json::to_value(&booking).unwrap_or(Value::Null)
                    }
                    None => Value::Null,
                },
                move || async move {
                    api.delete_authed(&format!("/bookings/{booking_id}")).await
                },
            )
            .await?;

        // listings reconcile on their next read
        self.engine().cache().mark_class_stale(ResourceClass::Bookings);
        Ok(())
    }
}
