//! Tunables shared by the workflows.

use std::time::Duration;

/// Settings for the acceptance, retry and sweep workflows.
#[derive(Debug, Clone)]
pub struct SagaSettings {
    /// How long a customer has to pay after acceptance.
    pub payment_grace: chrono::Duration,
    /// Upper bound on one gateway call. Elapsing counts as a decline.
    pub gateway_timeout: Duration,
    /// Maximum payment rows per booking, first attempt included.
    pub max_payment_attempts: u32,
    /// Bookings compensated in parallel by one sweep.
    pub sweep_concurrency: usize,
    /// Booking date used when the service request names none.
    pub default_booking_lead: chrono::Duration,
}

impl Default for SagaSettings {
    fn default() -> Self {
        Self {
            payment_grace: chrono::Duration::hours(domain::booking::DEFAULT_PAYMENT_GRACE_HOURS),
            gateway_timeout: Duration::from_secs(30),
            max_payment_attempts: 3,
            sweep_concurrency: 4,
            default_booking_lead: chrono::Duration::days(1),
        }
    }
}
