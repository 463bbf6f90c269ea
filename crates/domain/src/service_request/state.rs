//! Service request state machine.

use serde::{Deserialize, Serialize};

/// The state of a service request in its lifecycle.
///
/// State transitions:
/// ```text
/// Open ──┬──► OfferAccepted ──► Completed
///        │        │
///        │        └──► Open  (accepted offer reverted after payment failure)
///        ├──► Cancelled
///        └──► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ServiceRequestStatus {
    /// Accepting offers.
    #[default]
    Open,

    /// One offer won; a booking exists for it.
    OfferAccepted,

    /// The work was done (terminal state).
    Completed,

    /// The customer withdrew the request (terminal state).
    Cancelled,

    /// No offer was accepted before the request expired (terminal state).
    Expired,
}

impl ServiceRequestStatus {
    /// Returns true if offers may be submitted or accepted in this state.
    pub fn is_open(&self) -> bool {
        matches!(self, ServiceRequestStatus::Open)
    }

    /// Returns true if an accepted offer may be reverted from this state.
    pub fn can_reopen(&self) -> bool {
        matches!(self, ServiceRequestStatus::OfferAccepted)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServiceRequestStatus::Completed
                | ServiceRequestStatus::Cancelled
                | ServiceRequestStatus::Expired
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRequestStatus::Open => "Open",
            ServiceRequestStatus::OfferAccepted => "OfferAccepted",
            ServiceRequestStatus::Completed => "Completed",
            ServiceRequestStatus::Cancelled => "Cancelled",
            ServiceRequestStatus::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for ServiceRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_open() {
        assert_eq!(ServiceRequestStatus::default(), ServiceRequestStatus::Open);
    }

    #[test]
    fn test_only_offer_accepted_can_reopen() {
        assert!(!ServiceRequestStatus::Open.can_reopen());
        assert!(ServiceRequestStatus::OfferAccepted.can_reopen());
        assert!(!ServiceRequestStatus::Completed.can_reopen());
        assert!(!ServiceRequestStatus::Cancelled.can_reopen());
        assert!(!ServiceRequestStatus::Expired.can_reopen());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ServiceRequestStatus::Open.is_terminal());
        assert!(!ServiceRequestStatus::OfferAccepted.is_terminal());
        assert!(ServiceRequestStatus::Completed.is_terminal());
        assert!(ServiceRequestStatus::Cancelled.is_terminal());
        assert!(ServiceRequestStatus::Expired.is_terminal());
    }

    #[test]
    fn test_serializes_as_variant_name() {
        let json = serde_json::to_value(ServiceRequestStatus::OfferAccepted).unwrap();
        assert_eq!(json, serde_json::json!("OfferAccepted"));
    }
}
