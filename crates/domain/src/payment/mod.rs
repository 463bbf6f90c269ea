//! Payment attempts against bookings.

mod registry;
mod state;

pub use registry::PaymentRegistry;
pub use state::PaymentStatus;

use chrono::{DateTime, Utc};
use common::{BookingId, PaymentId};
use serde::{Deserialize, Serialize};
use store::Version;

use crate::entity::impl_entity;
use crate::error::DomainError;
use crate::money::Money;

/// One payment attempt. A booking accumulates one row per attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub booking_id: BookingId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub payment_method: String,
    /// Provider name reported by the gateway adapter.
    pub gateway: String,
    pub failure_reason: Option<String>,
    /// 1-based attempt number for the booking.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: Version,
}

impl_entity!(Payment, "payment");

impl Payment {
    pub fn new(
        booking_id: BookingId,
        amount: Money,
        payment_method: impl Into<String>,
        gateway: impl Into<String>,
        attempt: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            booking_id,
            amount,
            status: PaymentStatus::Pending,
            transaction_id: None,
            payment_method: payment_method.into(),
            gateway: gateway.into(),
            failure_reason: None,
            attempt,
            created_at: now,
            completed_at: None,
            updated_at: now,
            version: Version::initial(),
        }
    }

    /// Pending → Completed. Returns false if it was already Completed.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<bool, DomainError> {
        match self.status {
            PaymentStatus::Completed => Ok(false),
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Completed;
                self.completed_at = Some(now);
                self.updated_at = now;
                Ok(true)
            }
            _ => Err(self.invalid("complete")),
        }
    }

    /// Pending → Failed. Returns false if it was already Failed.
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<bool, DomainError> {
        match self.status {
            PaymentStatus::Failed => Ok(false),
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Failed;
                self.failure_reason = Some(reason.into());
                self.updated_at = now;
                Ok(true)
            }
            _ => Err(self.invalid("fail")),
        }
    }

    /// Any state → Refunded once the provider returned the money.
    ///
    /// A Pending or Failed payment is refunded when money arrived that no
    /// booking can use. Returns false if it was already Refunded.
    pub fn refund(&mut self, now: DateTime<Utc>) -> Result<bool, DomainError> {
        if self.status == PaymentStatus::Refunded {
            return Ok(false);
        }
        self.status = PaymentStatus::Refunded;
        self.updated_at = now;
        Ok(true)
    }

    fn invalid(&self, action: &'static str) -> DomainError {
        DomainError::InvalidTransition {
            entity: "payment",
            current: self.status.to_string(),
            action,
        }
    }
}
