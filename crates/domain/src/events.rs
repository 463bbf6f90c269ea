//! Marketplace events handed to the notification port.

use chrono::{DateTime, Utc};
use common::{BookingId, OfferId, PaymentId, ServiceRequestId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Trait for events that carry a stable type name.
pub trait DomainEvent: Serialize + Send + Sync + Clone {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;
}

/// Things participants are told about after a workflow commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MarketplaceEvent {
    /// The customer accepted this craftsman's offer.
    OfferAccepted(OfferAcceptedData),

    /// The offer lost to a sibling or was reverted.
    OfferRejected(OfferRejectedData),

    /// A booking now awaits payment.
    BookingCreated(BookingCreatedData),

    /// Payment failed or the deadline passed.
    BookingFailed(BookingFailedData),

    /// The gateway confirmed payment.
    PaymentCompleted(PaymentCompletedData),
}

impl DomainEvent for MarketplaceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MarketplaceEvent::OfferAccepted(_) => "OfferAccepted",
            MarketplaceEvent::OfferRejected(_) => "OfferRejected",
            MarketplaceEvent::BookingCreated(_) => "BookingCreated",
            MarketplaceEvent::BookingFailed(_) => "BookingFailed",
            MarketplaceEvent::PaymentCompleted(_) => "PaymentCompleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferAcceptedData {
    pub offer_id: OfferId,
    pub service_request_id: ServiceRequestId,
    pub booking_id: BookingId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRejectedData {
    pub offer_id: OfferId,
    pub service_request_id: ServiceRequestId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingCreatedData {
    pub booking_id: BookingId,
    pub amount: Money,
    pub booking_date: DateTime<Utc>,
    pub payment_deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingFailedData {
    pub booking_id: BookingId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCompletedData {
    pub booking_id: BookingId,
    pub payment_id: PaymentId,
    pub amount: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = MarketplaceEvent::BookingFailed(BookingFailedData {
            booking_id: BookingId::new(),
            reason: "payment deadline exceeded".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BookingFailed");
        assert_eq!(json["data"]["reason"], "payment deadline exceeded");
        assert_eq!(event.event_type(), "BookingFailed");
    }
}
