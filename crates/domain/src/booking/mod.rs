//! Confirmed engagements between a customer and a craftsman.

mod manager;
mod state;

pub use manager::{BookingManager, DEFAULT_PAYMENT_GRACE_HOURS, NewBooking};
pub use state::BookingStatus;

use chrono::{DateTime, Utc};
use common::{BookingId, CraftId, CraftsmanId, CustomerId, OfferId, ServiceRequestId};
use serde::{Deserialize, Serialize};
use store::Version;

use crate::entity::impl_entity;
use crate::error::DomainError;
use crate::money::Money;

/// The durable record of an accepted offer.
///
/// Bookings are never deleted; failed ones stay for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub customer_id: CustomerId,
    pub craftsman_id: CraftsmanId,
    pub craft_id: CraftId,
    pub service_request_id: ServiceRequestId,
    /// Set at creation and never changed. `None` only in damaged data.
    pub accepted_offer_id: Option<OfferId>,
    pub booking_date: DateTime<Utc>,
    pub total_amount: Money,
    pub status: BookingStatus,
    pub payment_deadline: DateTime<Utc>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: Version,
}

impl_entity!(Booking, "booking");

impl Booking {
    /// Returns true if the payment window has closed at `now`.
    pub fn is_payment_overdue(&self, now: DateTime<Utc>) -> bool {
        self.payment_deadline < now
    }

    /// Confirmed → Failed. Returns false if the booking had already failed.
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<bool, DomainError> {
        if self.status == BookingStatus::Failed {
            return Ok(false);
        }
        if !self.status.can_fail() {
            return Err(self.invalid("fail"));
        }
        self.status = BookingStatus::Failed;
        self.cancellation_reason = Some(reason.into());
        self.updated_at = now;
        Ok(true)
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_start() {
            return Err(self.invalid("start"));
        }
        self.status = BookingStatus::InProgress;
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_complete() {
            return Err(self.invalid("complete"));
        }
        self.status = BookingStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_cancel() {
            return Err(self.invalid("cancel"));
        }
        self.status = BookingStatus::Cancelled;
        self.cancellation_reason = Some(reason.into());
        self.updated_at = now;
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> DomainError {
        DomainError::InvalidTransition {
            entity: "booking",
            current: self.status.to_string(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn booking() -> Booking {
        let now = Utc::now();
        Booking {
            id: BookingId::new(),
            customer_id: CustomerId::new(),
            craftsman_id: CraftsmanId::new(),
            craft_id: CraftId::new(),
            service_request_id: ServiceRequestId::new(),
            accepted_offer_id: Some(OfferId::new()),
            booking_date: now + Duration::days(1),
            total_amount: Money::from_minor_units(50_000),
            status: BookingStatus::Confirmed,
            payment_deadline: now + Duration::hours(24),
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        }
    }

    #[test]
    fn fail_is_idempotent() {
        let mut b = booking();
        assert!(b.fail("payment failed", Utc::now()).unwrap());
        let stamp = b.updated_at;
        assert!(!b.fail("again", Utc::now()).unwrap());
        assert_eq!(b.updated_at, stamp);
        assert_eq!(b.cancellation_reason.as_deref(), Some("payment failed"));
    }

    #[test]
    fn happy_path_lifecycle() {
        let mut b = booking();
        b.start(Utc::now()).unwrap();
        b.complete(Utc::now()).unwrap();
        assert_eq!(b.status, BookingStatus::Completed);
        assert!(b.cancel("late", Utc::now()).is_err());
    }

    #[test]
    fn in_progress_booking_cannot_fail() {
        let mut b = booking();
        b.start(Utc::now()).unwrap();
        assert!(matches!(
            b.fail("timeout", Utc::now()),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn overdue_after_deadline() {
        let b = booking();
        assert!(!b.is_payment_overdue(Utc::now()));
        assert!(b.is_payment_overdue(Utc::now() + Duration::hours(25)));
    }
}
