//! Shared types for the marketplace booking core.

pub mod types;

pub use types::{
    BookingId, CraftId, CraftsmanId, CustomerId, OfferId, PaymentId, ServiceRequestId, UserId,
};
