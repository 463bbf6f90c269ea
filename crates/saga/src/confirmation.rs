//! Payment confirmation: the webhook and verification path.

use std::future::Future;
use std::sync::Arc;

use common::{BookingId, PaymentId, UserId};
use domain::events::PaymentCompletedData;
use domain::{
    BookingManager, BookingStatus, Customer, MarketplaceEvent, Money, Payment, PaymentRegistry,
    PaymentStatus,
};
use serde::Serialize;
use store::{Store, TransactionExt};

use crate::compensation::{ALREADY_PROCESSED, FailureCompensator};
use crate::error::{GatewayError, SagaError};
use crate::gateway::{
    GatewayFactory, PaymentGateway, PaymentVerification, RefundRequest, Settlement,
};
use crate::notify::{Notifier, dispatch};
use crate::settings::SagaSettings;
use crate::webhook::WebhookPayload;
use crate::workflow::{
    Abort, FailureKind, StepExt, WorkflowFailure, WorkflowResult, WorkflowStep, conclude,
};

/// Message returned when a payment was already completed.
pub const ALREADY_COMPLETED: &str = "already completed";

/// Message returned while the provider has not settled the checkout.
pub const PAYMENT_PENDING: &str = "payment pending";

/// Message returned when paid money was sent back to the customer.
pub const PAYMENT_REFUNDED: &str = "payment refunded";

/// Where a payment ended up after confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentOutcome {
    pub booking_id: BookingId,
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
}

impl PaymentOutcome {
    fn of(payment: &Payment, status: PaymentStatus) -> Self {
        Self {
            booking_id: payment.booking_id,
            payment_id: payment.id,
            status,
        }
    }
}

enum Settled {
    Completed(PaymentOutcome, Option<(UserId, MarketplaceEvent)>),
    /// Paid, but neither the payment nor its booking can take the money.
    Unusable(String),
}

/// Settles payments once the provider reports on them.
///
/// A paid payment whose amount matches is completed. A final decline or a
/// wrong amount is handed to the [`FailureCompensator`]. Money that arrives
/// for a failed payment or a dead booking is refunded.
pub struct PaymentConfirmation<S: Store> {
    store: S,
    bookings: BookingManager,
    payments: PaymentRegistry,
    gateways: GatewayFactory,
    compensator: Arc<FailureCompensator<S>>,
    notifier: Arc<dyn Notifier>,
    settings: SagaSettings,
}

impl<S: Store + Clone> PaymentConfirmation<S> {
    pub fn new(
        store: S,
        gateways: GatewayFactory,
        notifier: Arc<dyn Notifier>,
        settings: SagaSettings,
    ) -> Self {
        let compensator = Arc::new(FailureCompensator::new(store.clone(), notifier.clone()));
        Self::with_compensator(store, gateways, compensator, notifier, settings)
    }

    /// Shares a compensator with other workflows.
    pub fn with_compensator(
        store: S,
        gateways: GatewayFactory,
        compensator: Arc<FailureCompensator<S>>,
        notifier: Arc<dyn Notifier>,
        settings: SagaSettings,
    ) -> Self {
        Self {
            store,
            bookings: BookingManager::new(settings.payment_grace),
            payments: PaymentRegistry::new(),
            gateways,
            compensator,
            notifier,
            settings,
        }
    }
}

impl<S: Store> PaymentConfirmation<S> {
    /// Verifies `transaction_id` with its provider and settles the payment.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(
        &self,
        transaction_id: &str,
    ) -> Result<WorkflowResult<PaymentOutcome>, SagaError> {
        let payment = match self.find_payment(transaction_id).await? {
            Ok(payment) => payment,
            Err(failure) => return Ok(failure.into()),
        };

        match payment.status {
            PaymentStatus::Refunded => return Ok(already_processed(&payment)),
            PaymentStatus::Completed => {
                return Ok(WorkflowResult::success_with_message(
                    PaymentOutcome::of(&payment, PaymentStatus::Completed),
                    ALREADY_COMPLETED,
                ));
            }
            PaymentStatus::Pending | PaymentStatus::Failed => {}
        }

        let verification = match self.verify(&payment, transaction_id).await {
            Ok(verification) => verification,
            Err(failure) => {
                tracing::warn!(%transaction_id, message = %failure.message, "payment verification failed");
                return Ok(failure.into());
            }
        };

        if payment.status == PaymentStatus::Failed {
            if verification.status() != Settlement::Paid {
                return Ok(already_processed(&payment));
            }
            let reason = format!("payment {} was already failed", payment.id);
            return self.refund(&payment, verification.paid_amount, &reason).await;
        }

        match verification.status() {
            Settlement::Paid if verification.paid_amount == payment.amount => {
                self.complete(&payment, verification.paid_amount).await
            }
            Settlement::Paid => {
                let reason = format!(
                    "paid amount {} does not match {}",
                    verification.paid_amount, payment.amount
                );
                self.compensate(&payment, &reason).await
            }
            Settlement::Declined => {
                let reason = verification
                    .error_message
                    .unwrap_or_else(|| "payment declined by provider".to_string());
                self.compensate(&payment, &reason).await
            }
            Settlement::Pending => {
                tracing::info!(%transaction_id, message = ?verification.error_message, "payment not settled yet");
                Ok(WorkflowResult::success_with_message(
                    PaymentOutcome::of(&payment, PaymentStatus::Pending),
                    PAYMENT_PENDING,
                ))
            }
        }
    }

    /// Routes a verified webhook payload.
    ///
    /// The signature must already have been checked.
    #[tracing::instrument(skip(self, payload), fields(transaction_id = %payload.transaction_id, success = payload.success))]
    pub async fn handle_webhook(
        &self,
        payload: &WebhookPayload,
    ) -> Result<WorkflowResult<PaymentOutcome>, SagaError> {
        if payload.success {
            return self.confirm(&payload.transaction_id).await;
        }

        let payment = match self.find_payment(&payload.transaction_id).await? {
            Ok(payment) => payment,
            Err(failure) => return Ok(failure.into()),
        };
        match payment.status {
            PaymentStatus::Pending => self.compensate(&payment, &payload.failure_reason()).await,
            PaymentStatus::Failed | PaymentStatus::Refunded => Ok(already_processed(&payment)),
            PaymentStatus::Completed => {
                tracing::error!(
                    payment_id = %payment.id,
                    "provider reported failure for a completed payment"
                );
                Ok(WorkflowResult::failure(
                    WorkflowStep::LoadPayment,
                    FailureKind::Conflict,
                    format!("payment {} is already completed", payment.id),
                ))
            }
        }
    }

    async fn find_payment(
        &self,
        transaction_id: &str,
    ) -> Result<Result<Payment, WorkflowFailure>, SagaError> {
        let mut tx = self.store.begin().await?;
        let found = self
            .payments
            .by_transaction(&mut tx, transaction_id)
            .await
            .at(WorkflowStep::LoadPayment)
            .and_then(|payment| {
                payment.ok_or_else(|| {
                    Abort::fail(
                        WorkflowStep::LoadPayment,
                        FailureKind::NotFound,
                        format!("no payment for transaction {transaction_id}"),
                    )
                })
            });
        conclude(tx, found).await
    }

    fn gateway_for(
        &self,
        payment: &Payment,
        step: WorkflowStep,
    ) -> Result<Arc<dyn PaymentGateway>, WorkflowFailure> {
        self.gateways.for_provider(&payment.gateway).ok_or_else(|| {
            WorkflowFailure::new(
                step,
                FailureKind::Validation,
                format!("no gateway registered for provider {}", payment.gateway),
            )
        })
    }

    /// Bounds a provider call made outside any unit of work.
    async fn call_gateway<T>(
        &self,
        step: WorkflowStep,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, WorkflowFailure> {
        let timeout = self.settings.gateway_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(error)) => Err(WorkflowFailure::new(
                step,
                FailureKind::Gateway,
                error.to_string(),
            )),
            Err(_) => Err(WorkflowFailure::new(
                step,
                FailureKind::Gateway,
                format!("payment gateway timed out after {timeout:?}"),
            )),
        }
    }

    async fn verify(
        &self,
        payment: &Payment,
        transaction_id: &str,
    ) -> Result<PaymentVerification, WorkflowFailure> {
        let gateway = self.gateway_for(payment, WorkflowStep::VerifyPayment)?;
        self.call_gateway(WorkflowStep::VerifyPayment, gateway.verify(transaction_id))
            .await
    }

    async fn complete(
        &self,
        payment: &Payment,
        paid: Money,
    ) -> Result<WorkflowResult<PaymentOutcome>, SagaError> {
        let mut tx = self.store.begin().await?;
        let outcome = self.complete_in(&mut tx, payment).await;

        match conclude(tx, outcome).await? {
            Ok(Settled::Completed(outcome, notification)) => {
                metrics::counter!("payments_confirmed_total").increment(1);
                if let Some((user_id, event)) = notification {
                    dispatch(self.notifier.as_ref(), user_id, event).await;
                }
                tracing::info!(payment_id = %payment.id, booking_id = %payment.booking_id, "payment completed");
                Ok(WorkflowResult::success(outcome))
            }
            Ok(Settled::Unusable(reason)) => self.refund(payment, paid, &reason).await,
            Err(failure) => Ok(failure.into()),
        }
    }

    async fn complete_in(&self, tx: &mut S::Tx, payment: &Payment) -> Result<Settled, Abort> {
        // Booking before payment, same as the compensator.
        let booking = self
            .bookings
            .lock(tx, payment.booking_id)
            .await
            .at(WorkflowStep::LoadBooking)?;
        let current = self
            .payments
            .lock(tx, payment.id)
            .await
            .at(WorkflowStep::LoadPayment)?;

        if current.status == PaymentStatus::Failed {
            return Ok(Settled::Unusable(format!(
                "payment {} was already failed",
                payment.id
            )));
        }
        // Cash is collected on site, so started and finished jobs still settle.
        if matches!(booking.status, BookingStatus::Failed | BookingStatus::Cancelled) {
            return Ok(Settled::Unusable(format!(
                "booking {} is {}",
                booking.id, booking.status
            )));
        }

        let completed = self
            .payments
            .mark_completed(tx, payment.id)
            .await
            .at(WorkflowStep::CompletePayment)?;

        let notification = tx
            .load::<Customer>(booking.customer_id.as_uuid())
            .await?
            .map(|customer| {
                (
                    customer.user_id,
                    MarketplaceEvent::PaymentCompleted(PaymentCompletedData {
                        booking_id: booking.id,
                        payment_id: completed.id,
                        amount: completed.amount,
                    }),
                )
            });

        Ok(Settled::Completed(
            PaymentOutcome::of(&completed, PaymentStatus::Completed),
            notification,
        ))
    }

    /// Sends paid money back, then records the payment as Refunded.
    async fn refund(
        &self,
        payment: &Payment,
        amount: Money,
        reason: &str,
    ) -> Result<WorkflowResult<PaymentOutcome>, SagaError> {
        tracing::warn!(payment_id = %payment.id, booking_id = %payment.booking_id, %amount, reason, "refunding unusable payment");

        let request = RefundRequest {
            booking_id: payment.booking_id,
            payment_id: payment.id,
            original_transaction_id: payment.transaction_id.clone(),
            amount,
            reason: Some(reason.to_string()),
        };
        let answer = match self.gateway_for(payment, WorkflowStep::RefundPayment) {
            Ok(gateway) => {
                self.call_gateway(WorkflowStep::RefundPayment, gateway.refund(&request))
                    .await
            }
            Err(failure) => Err(failure),
        };
        let refused = match answer {
            Ok(response) if response.is_success => None,
            Ok(response) => Some(WorkflowFailure::new(
                WorkflowStep::RefundPayment,
                FailureKind::Gateway,
                response
                    .error_message
                    .unwrap_or_else(|| "refund refused by provider".to_string()),
            )),
            Err(failure) => Some(failure),
        };
        if let Some(failure) = refused {
            metrics::counter!("payment_refunds_failed_total").increment(1);
            tracing::error!(payment_id = %payment.id, message = %failure.message, "refund failed, needs manual review");
            return Ok(failure.into());
        }

        let mut tx = self.store.begin().await?;
        let recorded = self.record_refund(&mut tx, payment).await;
        match conclude(tx, recorded).await? {
            Ok(refunded) => {
                metrics::counter!("payments_refunded_total").increment(1);
                tracing::info!(payment_id = %payment.id, booking_id = %payment.booking_id, "payment refunded");
                Ok(WorkflowResult::success_with_message(
                    PaymentOutcome::of(&refunded, PaymentStatus::Refunded),
                    PAYMENT_REFUNDED,
                ))
            }
            Err(failure) => Ok(failure.into()),
        }
    }

    async fn record_refund(&self, tx: &mut S::Tx, payment: &Payment) -> Result<Payment, Abort> {
        self.bookings
            .lock(tx, payment.booking_id)
            .await
            .at(WorkflowStep::LoadBooking)?;
        self.payments
            .mark_refunded(tx, payment.id)
            .await
            .at(WorkflowStep::RefundPayment)
    }

    async fn compensate(
        &self,
        payment: &Payment,
        reason: &str,
    ) -> Result<WorkflowResult<PaymentOutcome>, SagaError> {
        let result = self
            .compensator
            .execute(payment.booking_id, payment.id, reason)
            .await?;
        Ok(match result {
            WorkflowResult::Succeeded { message, .. } => WorkflowResult::Succeeded {
                value: PaymentOutcome::of(payment, PaymentStatus::Failed),
                message,
            },
            WorkflowResult::Failed(failure) => WorkflowResult::Failed(failure),
        })
    }
}

fn already_processed(payment: &Payment) -> WorkflowResult<PaymentOutcome> {
    WorkflowResult::success_with_message(
        PaymentOutcome::of(payment, payment.status),
        ALREADY_PROCESSED,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Money;

    #[test]
    fn outcome_copies_ids() {
        let payment = Payment::new(BookingId::new(), Money::from_minor_units(100), "card", "card", 1);
        let outcome = PaymentOutcome::of(&payment, PaymentStatus::Completed);
        assert_eq!(outcome.booking_id, payment.booking_id);
        assert_eq!(outcome.payment_id, payment.id);
        assert_eq!(outcome.status, PaymentStatus::Completed);
    }
}
