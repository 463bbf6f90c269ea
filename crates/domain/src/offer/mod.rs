//! Craftsman bids and the ledger that decides them.

mod ledger;
mod state;

pub use ledger::{NewOffer, OfferLedger};
pub use state::OfferStatus;

use chrono::{DateTime, Utc};
use common::{CraftsmanId, OfferId, ServiceRequestId};
use serde::{Deserialize, Serialize};
use store::Version;

use crate::entity::impl_entity;
use crate::error::DomainError;
use crate::money::Money;

/// A craftsman's priced bid against a service request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub service_request_id: ServiceRequestId,
    pub craftsman_id: CraftsmanId,
    pub offered_price: Money,
    pub status: OfferStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: Version,
}

impl_entity!(Offer, "offer");

impl Offer {
    /// Creates a pending offer.
    pub fn new(
        service_request_id: ServiceRequestId,
        craftsman_id: CraftsmanId,
        offered_price: Money,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OfferId::new(),
            service_request_id,
            craftsman_id,
            offered_price,
            status: OfferStatus::Pending,
            rejection_reason: None,
            created_at: now,
            accepted_at: None,
            rejected_at: None,
            updated_at: now,
            version: Version::initial(),
        }
    }

    /// Pending → Accepted. Any other state is a `Conflict`: someone already
    /// decided this offer.
    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.is_pending() {
            return Err(DomainError::Conflict(format!(
                "offer {} is {}, not Pending",
                self.id, self.status
            )));
        }
        self.status = OfferStatus::Accepted;
        self.accepted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Pending or Accepted → Rejected.
    pub fn reject(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !matches!(self.status, OfferStatus::Pending | OfferStatus::Accepted) {
            return Err(self.invalid("reject"));
        }
        self.status = OfferStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        self.rejected_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Pending → Withdrawn.
    pub fn withdraw(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.is_pending() {
            return Err(DomainError::Conflict(format!(
                "offer {} is {}, only Pending offers can be withdrawn",
                self.id, self.status
            )));
        }
        self.status = OfferStatus::Withdrawn;
        self.updated_at = now;
        Ok(())
    }

    /// Pending → Expired.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.is_pending() {
            return Err(self.invalid("expire"));
        }
        self.status = OfferStatus::Expired;
        self.updated_at = now;
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> DomainError {
        DomainError::InvalidTransition {
            entity: "offer",
            current: self.status.to_string(),
            action,
        }
    }
}
