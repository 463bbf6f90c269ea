//! The failure compensator: unwinds an accepted offer after payment failed.

use std::sync::Arc;

use common::{BookingId, PaymentId, UserId};
use domain::events::{BookingFailedData, OfferRejectedData};
use domain::{
    BookingManager, BookingStatus, Craftsman, Customer, DomainError, MarketplaceEvent,
    OfferLedger, PaymentRegistry, PaymentStatus, REASON_PAYMENT_FAILED,
};
use store::{Store, TransactionExt};

use crate::error::SagaError;
use crate::notify::{Notifier, dispatch};
use crate::workflow::{Abort, FailureKind, StepExt, WorkflowResult, WorkflowStep, conclude};

/// Message returned when a compensation finds nothing left to do.
pub const ALREADY_PROCESSED: &str = "already processed";

/// Marks a booking and its payment Failed and reverts the accepted offer.
///
/// Only a Pending payment is compensated. Once it is Failed, later calls
/// return success without touching anything, which the webhook and the
/// sweeper rely on when they race. A payment that was superseded by a
/// retry is Failed while its booking lives on, so it is skipped the same way.
pub struct FailureCompensator<S: Store> {
    store: S,
    ledger: OfferLedger,
    bookings: BookingManager,
    payments: PaymentRegistry,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store> FailureCompensator<S> {
    pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            ledger: OfferLedger::new(),
            bookings: BookingManager::default(),
            payments: PaymentRegistry::new(),
            notifier,
        }
    }

    /// Returns `true` when this call changed state and `false` when the pair
    /// was already compensated.
    #[tracing::instrument(skip(self))]
    pub async fn execute(
        &self,
        booking_id: BookingId,
        payment_id: PaymentId,
        failure_reason: &str,
    ) -> Result<WorkflowResult<bool>, SagaError> {
        let mut tx = self.store.begin().await?;
        let outcome = self.run(&mut tx, booking_id, payment_id, failure_reason).await;

        match conclude(tx, outcome).await? {
            Ok(None) => {
                metrics::counter!("compensations_skipped_total").increment(1);
                tracing::debug!(%booking_id, %payment_id, "compensation already processed");
                Ok(WorkflowResult::success_with_message(false, ALREADY_PROCESSED))
            }
            Ok(Some(notifications)) => {
                metrics::counter!("compensations_total").increment(1);
                for (user_id, event) in notifications {
                    dispatch(self.notifier.as_ref(), user_id, event).await;
                }
                tracing::info!(%booking_id, %payment_id, reason = failure_reason, "booking compensated");
                Ok(WorkflowResult::success(true))
            }
            Err(failure) => {
                if failure.kind == FailureKind::DataIntegrity {
                    tracing::error!(%booking_id, %payment_id, message = %failure.message, "compensation needs manual review");
                } else {
                    tracing::warn!(%booking_id, step = %failure.step, message = %failure.message, "compensation failed");
                }
                Ok(failure.into())
            }
        }
    }

    /// `None` means the payment was no longer Pending.
    async fn run(
        &self,
        tx: &mut S::Tx,
        booking_id: BookingId,
        payment_id: PaymentId,
        reason: &str,
    ) -> Result<Option<Vec<(UserId, MarketplaceEvent)>>, Abort> {
        // Lock order: booking, then payment, then request and offer (via revert).
        let booking = self
            .bookings
            .lock(tx, booking_id)
            .await
            .at(WorkflowStep::LoadBooking)?;
        let payment = self
            .payments
            .lock(tx, payment_id)
            .await
            .at(WorkflowStep::LoadPayment)?;

        if payment.booking_id != booking.id {
            return Err(Abort::fail(
                WorkflowStep::LoadPayment,
                FailureKind::Validation,
                format!("payment {payment_id} does not belong to booking {booking_id}"),
            ));
        }

        match payment.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Completed => {
                return Err(Abort::fail(
                    WorkflowStep::LoadPayment,
                    FailureKind::Conflict,
                    format!("payment {payment_id} is already completed"),
                ));
            }
            PaymentStatus::Failed | PaymentStatus::Refunded => {
                if booking.status != BookingStatus::Failed {
                    tracing::debug!(%booking_id, %payment_id, status = %payment.status, "payment is not the booking's live attempt");
                }
                return Ok(None);
            }
        }

        self.payments
            .mark_failed(tx, payment_id, reason)
            .await
            .at(WorkflowStep::MarkFailed)?;
        let booking = self
            .bookings
            .mark_failed(tx, booking_id, reason)
            .await
            .at(WorkflowStep::MarkFailed)?;

        let Some(offer_id) = booking.accepted_offer_id else {
            return Err(Abort::fail(
                WorkflowStep::RevertOfferReservation,
                FailureKind::DataIntegrity,
                format!("failed booking {booking_id} has no accepted offer"),
            ));
        };

        let reverted = match self.ledger.revert(tx, offer_id).await {
            Ok(offer) => Some(offer),
            Err(DomainError::NotFound { .. }) => {
                tracing::warn!(%booking_id, %offer_id, "accepted offer is gone, treating as reverted");
                None
            }
            Err(other) => return Err(Abort::domain(WorkflowStep::RevertOfferReservation, other)),
        };

        let mut notifications = Vec::new();
        if let Some(customer) = tx.load::<Customer>(booking.customer_id.as_uuid()).await? {
            notifications.push((
                customer.user_id,
                MarketplaceEvent::BookingFailed(BookingFailedData {
                    booking_id,
                    reason: reason.to_string(),
                }),
            ));
        }
        if let Some(offer) = reverted
            && let Some(craftsman) = tx.load::<Craftsman>(offer.craftsman_id.as_uuid()).await?
        {
            notifications.push((
                craftsman.user_id,
                MarketplaceEvent::OfferRejected(OfferRejectedData {
                    offer_id: offer.id,
                    service_request_id: offer.service_request_id,
                    reason: REASON_PAYMENT_FAILED.to_string(),
                }),
            ));
        }

        Ok(Some(notifications))
    }
}
