//! Shared request and response types for the Prenota booking platform API.
//!
//! These types are the wire contract between the synchronization client and
//! the platform backend. They carry no behaviour beyond (de)serialization.

mod auth;
mod bookings;
mod reviews;
mod services;

pub use auth::{Credential, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, Role};
pub use bookings::{Booking, BookingRequest, BookingScope, BookingStatus, TimeSlot};
pub use reviews::{Review, ReviewInput};
pub use services::{FavouriteList, Page, ServiceCategory, ServiceDetail, ServiceSummary, UserProfile};
