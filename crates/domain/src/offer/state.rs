//! Offer state machine.

use serde::{Deserialize, Serialize};

/// The state of an offer in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Accepted ──► Rejected  (payment failed)
///           ├──► Rejected
///           ├──► Withdrawn
///           └──► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OfferStatus {
    /// Awaiting the customer's decision.
    #[default]
    Pending,

    /// The customer accepted this offer.
    Accepted,

    /// Lost to a sibling offer or reverted after payment failure (terminal state).
    Rejected,

    /// Pulled back by the craftsman (terminal state).
    Withdrawn,

    /// The service request expired first (terminal state).
    Expired,
}

impl OfferStatus {
    /// All states, for exhaustive checks.
    pub const ALL: [OfferStatus; 5] = [
        OfferStatus::Pending,
        OfferStatus::Accepted,
        OfferStatus::Rejected,
        OfferStatus::Withdrawn,
        OfferStatus::Expired,
    ];

    /// Returns true if the offer may be accepted, rejected or withdrawn.
    pub fn is_pending(&self) -> bool {
        matches!(self, OfferStatus::Pending)
    }

    /// Returns true if the offer may be reverted by compensation.
    pub fn can_revert(&self) -> bool {
        matches!(self, OfferStatus::Accepted)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OfferStatus::Rejected | OfferStatus::Withdrawn | OfferStatus::Expired
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "Pending",
            OfferStatus::Accepted => "Accepted",
            OfferStatus::Rejected => "Rejected",
            OfferStatus::Withdrawn => "Withdrawn",
            OfferStatus::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_pending() {
        assert_eq!(OfferStatus::default(), OfferStatus::Pending);
    }

    #[test]
    fn test_only_accepted_can_revert() {
        for status in OfferStatus::ALL {
            assert_eq!(status.can_revert(), status == OfferStatus::Accepted);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OfferStatus::Pending.is_terminal());
        assert!(!OfferStatus::Accepted.is_terminal());
        assert!(OfferStatus::Rejected.is_terminal());
        assert!(OfferStatus::Withdrawn.is_terminal());
        assert!(OfferStatus::Expired.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(OfferStatus::Pending.to_string(), "Pending");
        assert_eq!(OfferStatus::Withdrawn.to_string(), "Withdrawn");
    }
}
