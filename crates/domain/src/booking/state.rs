//! Booking state machine.

use serde::{Deserialize, Serialize};

/// The state of a booking in its lifecycle.
///
/// State transitions:
/// ```text
/// Confirmed ──► InProgress ──► Completed
///     │              │
///     ├──────────────┴──► Cancelled
///     └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BookingStatus {
    /// Created by the acceptance workflow, awaiting payment.
    #[default]
    Confirmed,

    /// Work has started.
    InProgress,

    /// Work is done (terminal state).
    Completed,

    /// Called off by a participant (terminal state).
    Cancelled,

    /// Payment failed or timed out (terminal state).
    Failed,
}

impl BookingStatus {
    pub fn can_start(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    pub fn can_complete(&self) -> bool {
        matches!(self, BookingStatus::InProgress)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::InProgress)
    }

    /// Returns true if payment failure may still move the booking to `Failed`.
    pub fn can_fail(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Failed
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::InProgress => "InProgress",
            BookingStatus::Completed => "Completed",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_is_terminal() {
        let status = BookingStatus::Failed;
        assert!(status.is_terminal());
        assert!(!status.can_start());
        assert!(!status.can_cancel());
        assert!(!status.can_fail());
    }

    #[test]
    fn confirmed_transitions() {
        let status = BookingStatus::Confirmed;
        assert!(status.can_start());
        assert!(status.can_cancel());
        assert!(status.can_fail());
        assert!(!status.can_complete());
    }

    #[test]
    fn in_progress_transitions() {
        let status = BookingStatus::InProgress;
        assert!(status.can_complete());
        assert!(status.can_cancel());
        assert!(!status.can_fail());
    }

    #[test]
    fn serializes_as_variant_name() {
        let json = serde_json::to_string(&BookingStatus::InProgress).unwrap();
        assert_eq!(json, "\"InProgress\"");
    }
}
