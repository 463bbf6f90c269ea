//! Domain layer for the craftsman marketplace booking core.
//!
//! This crate provides:
//! - Entities persisted through the `store` unit of work (service requests,
//!   offers, bookings, payments and the catalog data they reference)
//! - State machines for each lifecycle
//! - [`OfferLedger`]: single-winner offer reservation and its reversal
//! - [`BookingManager`]: booking creation and lifecycle transitions
//! - [`PaymentRegistry`]: payment rows attached to bookings
//!
//! Every operation takes an explicit `&mut impl Transaction` so callers decide
//! where the unit of work begins and ends.

pub mod booking;
pub mod catalog;
mod entity;
pub mod error;
pub mod events;
pub mod money;
pub mod offer;
pub mod payment;
pub mod service_request;

pub use booking::{Booking, BookingManager, BookingStatus, NewBooking};
pub use catalog::{Craft, Craftsman, Customer, UserProfile};
pub use error::DomainError;
pub use events::{DomainEvent, MarketplaceEvent};
pub use money::Money;
pub use offer::{NewOffer, Offer, OfferLedger, OfferStatus};
pub use payment::{Payment, PaymentRegistry, PaymentStatus};
pub use service_request::{ServiceRequest, ServiceRequestStatus};

/// Rejection reason given to sibling offers when one offer wins.
pub const REASON_ANOTHER_OFFER_ACCEPTED: &str = "another offer accepted";

/// Rejection reason given to a reverted offer after payment fails.
pub const REASON_PAYMENT_FAILED: &str = "payment failed";
