//! Query key definitions.
//!
//! A `QueryKey` is the structural identity of a cacheable server-derived
//! value: resource, entity id, page, locale. Two keys that compare equal
//! name the same logical query and share one cache entry.

use prenota_api_types::{BookingScope, ServiceCategory};
use uuid::Uuid;

use super::error::SyncError;

/// Language tag attached to localized queries and outbound requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Locale {
    #[default]
    It,
    En,
    De,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::It => "it",
            Self::En => "en",
            Self::De => "de",
        }
    }
}

/// Identifies a cacheable query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// Catalogue listing, optionally filtered by category.
    Services {
        category: Option<ServiceCategory>,
        page: u32,
        locale: Locale,
    },
    /// A single service record.
    ServiceDetail { service_id: Uuid, locale: Locale },
    /// The authenticated user's favourites.
    Favourites,
    /// Booking history listing.
    Bookings { scope: BookingScope, page: u32 },
    /// A single booking record.
    BookingDetail { booking_id: Uuid },
    /// Reviews for one service.
    Reviews { service_id: Uuid, page: u32 },
    /// The authenticated profile.
    Profile,
}

/// Invalidation granularity used by push events.
///
/// A push event names a resource class; every cached key of that class is
/// marked stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Services,
    ServiceDetail,
    Favourites,
    Bookings,
    BookingDetail,
    Reviews,
    Profile,
}

impl QueryKey {
    /// Reject malformed keys before they reach the cache.
    ///
    /// Pages are 1-based and entity ids must be non-nil.
    pub fn validate(&self) -> Result<(), SyncError> {
        match self {
            Self::Services { page, .. } if *page == 0 => {
                Err(SyncError::invalid_key("services page is 1-based"))
            }
            Self::ServiceDetail { service_id, .. } if service_id.is_nil() => {
                Err(SyncError::invalid_key("service id must be non-nil"))
            }
            Self::Bookings { page, .. } if *page == 0 => {
                Err(SyncError::invalid_key("bookings page is 1-based"))
            }
            Self::BookingDetail { booking_id } if booking_id.is_nil() => {
                Err(SyncError::invalid_key("booking id must be non-nil"))
            }
            Self::Reviews { service_id, .. } if service_id.is_nil() => {
                Err(SyncError::invalid_key("review service id must be non-nil"))
            }
            Self::Reviews { page, .. } if *page == 0 => {
                Err(SyncError::invalid_key("reviews page is 1-based"))
            }
            _ => Ok(()),
        }
    }

    /// The invalidation class this key belongs to.
    pub fn class(&self) -> ResourceClass {
        match self {
            Self::Services { .. } => ResourceClass::Services,
            Self::ServiceDetail { .. } => ResourceClass::ServiceDetail,
            Self::Favourites => ResourceClass::Favourites,
            Self::Bookings { .. } => ResourceClass::Bookings,
            Self::BookingDetail { .. } => ResourceClass::BookingDetail,
            Self::Reviews { .. } => ResourceClass::Reviews,
            Self::Profile => ResourceClass::Profile,
        }
    }

    /// Whether the query requires an authenticated credential.
    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            Self::Favourites | Self::Bookings { .. } | Self::BookingDetail { .. } | Self::Profile
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_equality_is_structural() {
        let a = QueryKey::Services {
            category: Some(ServiceCategory::Fitness),
            page: 1,
            locale: Locale::It,
        };
        let b = QueryKey::Services {
            category: Some(ServiceCategory::Fitness),
            page: 1,
            locale: Locale::It,
        };
        assert_eq!(a, b);

        let c = QueryKey::Services {
            category: Some(ServiceCategory::Fitness),
            page: 2,
            locale: Locale::It,
        };
        assert_ne!(a, c);
    }

    #[test]
    fn locale_is_part_of_identity() {
        let it = QueryKey::ServiceDetail {
            service_id: Uuid::from_u128(1),
            locale: Locale::It,
        };
        let en = QueryKey::ServiceDetail {
            service_id: Uuid::from_u128(1),
            locale: Locale::En,
        };
        assert_ne!(it, en);
    }

    #[test]
    fn zero_page_is_rejected() {
        let key = QueryKey::Services {
            category: None,
            page: 0,
            locale: Locale::default(),
        };
        assert!(matches!(key.validate(), Err(SyncError::InvalidKey(_))));
    }

    #[test]
    fn nil_id_is_rejected() {
        let key = QueryKey::BookingDetail { booking_id: Uuid::nil() };
        assert!(matches!(key.validate(), Err(SyncError::InvalidKey(_))));
    }

    #[test]
    fn well_formed_keys_pass_validation() {
        let keys = [
            QueryKey::Services { category: None, page: 1, locale: Locale::En },
            QueryKey::Favourites,
            QueryKey::Bookings { scope: BookingScope::Upcoming, page: 1 },
            QueryKey::Reviews { service_id: Uuid::from_u128(7), page: 2 },
            QueryKey::Profile,
        ];
        for key in keys {
            assert!(key.validate().is_ok(), "{key:?}");
        }
    }

    #[test]
    fn protected_keys_require_credentials() {
        assert!(QueryKey::Favourites.is_protected());
        assert!(QueryKey::Profile.is_protected());
        assert!(
            !QueryKey::Services { category: None, page: 1, locale: Locale::It }.is_protected()
        );
    }
}
