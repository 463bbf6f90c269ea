//! Payment state machine.

use serde::{Deserialize, Serialize};

/// The state of one payment attempt.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Completed ──► Refunded
///           ├──► Failed ─────► Refunded
///           └──────────────► Refunded
/// ```
///
/// Refunds out of Pending or Failed cover money that arrived for a booking
/// that can no longer use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Initialized at the gateway, not yet paid.
    #[default]
    Pending,

    /// The gateway confirmed the money arrived.
    Completed,

    /// Declined, abandoned or superseded.
    Failed,

    /// Paid and returned to the customer (terminal state).
    Refunded,
}

impl PaymentStatus {
    /// Returns true for the states a booking may hold at most one of.
    pub fn is_live(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_states() {
        assert!(PaymentStatus::Pending.is_live());
        assert!(PaymentStatus::Completed.is_live());
        assert!(!PaymentStatus::Failed.is_live());
        assert!(!PaymentStatus::Refunded.is_live());
    }
}
