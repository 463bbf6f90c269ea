//! Customer-authored job postings.

mod state;

pub use state::ServiceRequestStatus;

use chrono::{DateTime, Utc};
use common::{CraftId, CustomerId, ServiceRequestId};
use serde::{Deserialize, Serialize};
use store::Version;

use crate::entity::impl_entity;
use crate::error::DomainError;

/// Payment method used when a request does not name one.
pub const DEFAULT_PAYMENT_METHOD: &str = "card";

/// A job posting that craftsmen bid on.
///
/// `offers_count` never exceeds `max_offers`, and the request moves to
/// `OfferAccepted` at most once per accepted offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: ServiceRequestId,
    pub customer_id: CustomerId,
    pub craft_id: CraftId,
    pub title: String,
    pub status: ServiceRequestStatus,
    pub payment_method: Option<String>,
    pub preferred_date: Option<DateTime<Utc>>,
    pub max_offers: u32,
    pub offers_count: u32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: Version,
}

impl_entity!(ServiceRequest, "service_request");

impl ServiceRequest {
    /// Creates an open request.
    pub fn new(
        customer_id: CustomerId,
        craft_id: CraftId,
        title: impl Into<String>,
        max_offers: u32,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ServiceRequestId::new(),
            customer_id,
            craft_id,
            title: title.into(),
            status: ServiceRequestStatus::Open,
            payment_method: None,
            preferred_date: None,
            max_offers,
            offers_count: 0,
            expires_at,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        }
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_preferred_date(mut self, date: DateTime<Utc>) -> Self {
        self.preferred_date = Some(date);
        self
    }

    /// Returns the payment method, falling back to [`DEFAULT_PAYMENT_METHOD`].
    pub fn resolved_payment_method(&self) -> &str {
        self.payment_method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_PAYMENT_METHOD)
    }

    /// Returns true if the request has passed its expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Records a new offer against this request.
    pub fn register_offer(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.is_open() {
            return Err(self.invalid("receive offers"));
        }
        if self.is_expired_at(now) {
            return Err(DomainError::Validation(format!(
                "service request {} expired at {}",
                self.id, self.expires_at
            )));
        }
        if self.offers_count >= self.max_offers {
            return Err(DomainError::Validation(format!(
                "service request {} already has the maximum of {} offers",
                self.id, self.max_offers
            )));
        }
        self.offers_count += 1;
        self.updated_at = now;
        Ok(())
    }

    /// Moves the request to `OfferAccepted`. Fails with `Conflict` unless open.
    pub fn mark_offer_accepted(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.is_open() {
            return Err(DomainError::Conflict(format!(
                "service request {} is {}, not accepting offers",
                self.id, self.status
            )));
        }
        self.status = ServiceRequestStatus::OfferAccepted;
        self.updated_at = now;
        Ok(())
    }

    /// Moves the request back to `Open` after its accepted offer was reverted.
    ///
    /// Returns false (and changes nothing) when the request is not `OfferAccepted`.
    pub fn reopen(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.can_reopen() {
            return false;
        }
        self.status = ServiceRequestStatus::Open;
        self.updated_at = now;
        true
    }

    /// Open → Expired once the deadline has passed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.is_open() {
            return Err(self.invalid("expire"));
        }
        if !self.is_expired_at(now) {
            return Err(DomainError::Validation(format!(
                "service request {} does not expire until {}",
                self.id, self.expires_at
            )));
        }
        self.status = ServiceRequestStatus::Expired;
        self.updated_at = now;
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> DomainError {
        DomainError::InvalidTransition {
            entity: "service request",
            current: self.status.to_string(),
            action,
        }
    }
}
