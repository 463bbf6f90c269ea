//! Booking workflows for the craftsman marketplace.
//!
//! This crate orchestrates the domain services into the workflows that
//! involve the payment provider:
//! 1. [`AcceptanceSaga`]: reserve the offer, create the booking and payment,
//!    initialize checkout, all in one unit of work
//! 2. [`FailureCompensator`]: fail the booking and revert its offer once
//!    payment is known to have failed
//! 3. [`PaymentConfirmation`]: verify and complete payments, or hand them to
//!    the compensator
//! 4. [`PaymentRetry`]: open another payment attempt within the retry budget
//! 5. [`ExpirySweeper`]: compensate bookings past their payment deadline
//!
//! Every workflow returns `Result<WorkflowResult<T>, SagaError>`. Business
//! failures are `Ok(WorkflowResult::Failed)`; `Err` means the outcome is
//! unknown.

pub mod acceptance;
pub mod cancel;
pub mod compensation;
pub mod confirmation;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod retry;
pub mod settings;
pub mod sweeper;
pub mod webhook;
pub mod workflow;

pub use acceptance::{AcceptanceSaga, BookingPaymentInfo};
pub use cancel::{CancelHandle, CancelSignal};
pub use compensation::{ALREADY_PROCESSED, FailureCompensator};
pub use confirmation::{
    ALREADY_COMPLETED, PAYMENT_PENDING, PAYMENT_REFUNDED, PaymentConfirmation, PaymentOutcome,
};
pub use error::{GatewayError, SagaError};
pub use gateway::{
    CashGateway, GatewayFactory, HttpGateway, HttpGatewayConfig, InMemoryGateway, PaymentGateway,
    PaymentInitRequest, PaymentInitResponse, PaymentVerification, RefundRequest, RefundResponse,
    Settlement,
};
pub use notify::{Notifier, RecordingNotifier, TracingNotifier};
pub use retry::{PaymentRetry, REASON_SUPERSEDED};
pub use settings::SagaSettings;
pub use sweeper::{ExpirySweeper, REASON_DEADLINE_EXCEEDED, SweepReport};
pub use webhook::{WebhookPayload, verify_signature};
pub use workflow::{FailureKind, WorkflowFailure, WorkflowResult, WorkflowStep};
