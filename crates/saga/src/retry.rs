//! Payment retry for a booking whose first checkout did not go through.

use chrono::Utc;
use common::{BookingId, CustomerId};
use domain::{BookingManager, BookingStatus, PaymentRegistry, PaymentStatus, ServiceRequest};
use store::{Store, TransactionExt};

use crate::acceptance::{
    BookingPaymentInfo, FALLBACK_CRAFTSMAN_NAME, accepted_transaction, initialize_payment, load_parties,
    payment_init_request,
};
use crate::cancel::CancelSignal;
use crate::error::SagaError;
use crate::gateway::GatewayFactory;
use crate::settings::SagaSettings;
use crate::workflow::{Abort, FailureKind, StepExt, WorkflowResult, WorkflowStep, conclude};

/// Reason stored on a Pending payment replaced by a new attempt.
pub const REASON_SUPERSEDED: &str = "superseded by retry";

/// Opens a fresh payment attempt on a Confirmed, unpaid booking.
///
/// The booking keeps at most one Pending payment and at most
/// `max_payment_attempts` payment rows. Past the budget the booking is left
/// for the sweeper to fail.
pub struct PaymentRetry<S: Store> {
    store: S,
    bookings: BookingManager,
    payments: PaymentRegistry,
    gateways: GatewayFactory,
    settings: SagaSettings,
}

impl<S: Store> PaymentRetry<S> {
    pub fn new(store: S, gateways: GatewayFactory, settings: SagaSettings) -> Self {
        Self {
            store,
            bookings: BookingManager::new(settings.payment_grace),
            payments: PaymentRegistry::new(),
            gateways,
            settings,
        }
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn retry(
        &self,
        customer_id: CustomerId,
        booking_id: BookingId,
        cancel: CancelSignal,
    ) -> Result<WorkflowResult<BookingPaymentInfo>, SagaError> {
        let mut tx = self.store.begin().await?;
        let outcome = self.run(&mut tx, customer_id, booking_id, &cancel).await;

        match conclude(tx, outcome).await? {
            Ok(info) => {
                tracing::info!(%booking_id, payment_id = %info.payment_id, "payment retried");
                Ok(WorkflowResult::success(info))
            }
            Err(failure) => {
                tracing::warn!(%booking_id, step = %failure.step, message = %failure.message, "payment retry failed");
                Ok(failure.into())
            }
        }
    }

    async fn run(
        &self,
        tx: &mut S::Tx,
        customer_id: CustomerId,
        booking_id: BookingId,
        cancel: &CancelSignal,
    ) -> Result<BookingPaymentInfo, Abort> {
        let booking = self
            .bookings
            .lock(tx, booking_id)
            .await
            .at(WorkflowStep::LoadBooking)?;
        if booking.customer_id != customer_id {
            return Err(Abort::fail(
                WorkflowStep::LoadBooking,
                FailureKind::NotFound,
                format!("booking {booking_id} not found"),
            ));
        }
        if booking.status != BookingStatus::Confirmed {
            return Err(Abort::fail(
                WorkflowStep::LoadBooking,
                FailureKind::Validation,
                format!("booking {booking_id} is {}", booking.status),
            ));
        }
        if booking.is_payment_overdue(Utc::now()) {
            return Err(Abort::fail(
                WorkflowStep::LoadBooking,
                FailureKind::Validation,
                format!("payment deadline for booking {booking_id} has passed"),
            ));
        }

        let attempts = self
            .payments
            .for_booking(tx, booking_id)
            .await
            .at(WorkflowStep::LoadPayment)?;
        if attempts.iter().any(|p| p.status == PaymentStatus::Completed) {
            return Err(Abort::fail(
                WorkflowStep::LoadPayment,
                FailureKind::Validation,
                format!("booking {booking_id} is already paid"),
            ));
        }
        let limit = self.settings.max_payment_attempts;
        if attempts.len() >= limit as usize {
            return Err(Abort::fail(
                WorkflowStep::CheckRetryBudget,
                FailureKind::Validation,
                format!("booking {booking_id} reached the limit of {limit} payment attempts"),
            ));
        }

        for pending in attempts.iter().filter(|p| p.status == PaymentStatus::Pending) {
            self.payments
                .mark_failed(tx, pending.id, REASON_SUPERSEDED)
                .await
                .at(WorkflowStep::MarkFailed)?;
        }

        let request = tx
            .load::<ServiceRequest>(booking.service_request_id.as_uuid())
            .await?
            .ok_or_else(|| {
                Abort::fail(
                    WorkflowStep::LoadServiceRequest,
                    FailureKind::NotFound,
                    format!("service request {} not found", booking.service_request_id),
                )
            })?;
        let parties =
            load_parties(tx, booking.customer_id, booking.craftsman_id.as_uuid(), &request).await?;

        let payment_method = attempts
            .last()
            .map(|p| p.payment_method.clone())
            .unwrap_or_else(|| request.resolved_payment_method().to_string());
        let gateway = self
            .gateways
            .for_method(&payment_method)
            .at(WorkflowStep::CreatePayment)?;
        let payment = self
            .payments
            .open(tx, &booking, &payment_method, gateway.provider_name())
            .await
            .at(WorkflowStep::CreatePayment)?;

        let init = payment_init_request(
            &parties,
            booking.id,
            payment.id,
            booking.total_amount,
            booking.booking_date,
        );
        let response = initialize_payment(
            gateway.as_ref(),
            &init,
            self.settings.gateway_timeout,
            cancel,
        )
        .await?;
        let transaction_id = accepted_transaction(response.clone())?;

        self.payments
            .attach_transaction(tx, payment.id, &transaction_id)
            .await
            .at(WorkflowStep::CreatePayment)?;

        Ok(BookingPaymentInfo {
            booking_id: booking.id,
            payment_id: payment.id,
            amount: booking.total_amount,
            payment_method,
            payment_link: response.payment_link,
            payment_token: response.payment_token,
            transaction_id,
            booking_date: booking.booking_date,
            payment_deadline: booking.payment_deadline,
            craftsman_name: parties
                .craftsman_profile
                .display_name(FALLBACK_CRAFTSMAN_NAME)
                .to_string(),
            craft_name: parties.craft.name,
        })
    }
}
