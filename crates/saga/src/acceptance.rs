//! The offer acceptance saga.
//!
//! Turns a customer's acceptance of one offer into a Confirmed booking with a
//! Pending payment. Every step runs in one unit of work that commits only
//! after the payment gateway has answered, so a decline or timeout leaves no
//! trace: the offer stays Pending and no booking or payment exists.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{BookingId, CustomerId, OfferId, PaymentId, UserId};
use domain::events::{BookingCreatedData, OfferAcceptedData, OfferRejectedData};
use domain::{
    BookingManager, Craft, Craftsman, Customer, MarketplaceEvent, Money, NewBooking, Offer,
    OfferLedger, PaymentRegistry, ServiceRequest, UserProfile, REASON_ANOTHER_OFFER_ACCEPTED,
};
use serde::Serialize;
use store::{Entity, Store, Transaction, TransactionExt};

use crate::cancel::CancelSignal;
use crate::error::SagaError;
use crate::gateway::{GatewayFactory, PaymentGateway, PaymentInitRequest, PaymentInitResponse};
use crate::notify::{Notifier, dispatch};
use crate::settings::SagaSettings;
use crate::workflow::{Abort, FailureKind, StepExt, WorkflowResult, WorkflowStep, conclude};

const FALLBACK_EMAIL: &str = "no-reply@marketplace.invalid";
const FALLBACK_PHONE: &str = "0000000000";
const FALLBACK_CUSTOMER_NAME: &str = "Customer";
pub(crate) const FALLBACK_CRAFTSMAN_NAME: &str = "Craftsman";

/// What the customer needs to complete checkout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingPaymentInfo {
    pub booking_id: BookingId,
    pub payment_id: PaymentId,
    pub amount: Money,
    pub payment_method: String,
    pub payment_link: Option<String>,
    pub payment_token: Option<String>,
    pub transaction_id: String,
    pub booking_date: DateTime<Utc>,
    pub payment_deadline: DateTime<Utc>,
    pub craftsman_name: String,
    pub craft_name: String,
}

/// Result of the work done inside the unit of work, before commit.
pub(crate) struct Staged<T> {
    pub value: T,
    pub notifications: Vec<(UserId, MarketplaceEvent)>,
}

/// Participants loaded for the gateway request.
pub(crate) struct Parties {
    pub customer: Customer,
    pub customer_profile: UserProfile,
    pub craftsman: Craftsman,
    pub craftsman_profile: UserProfile,
    pub craft: Craft,
}

/// Orchestrates offer reservation, booking creation and payment
/// initialization as one atomic workflow.
pub struct AcceptanceSaga<S: Store> {
    store: S,
    ledger: OfferLedger,
    bookings: BookingManager,
    payments: PaymentRegistry,
    gateways: GatewayFactory,
    notifier: Arc<dyn Notifier>,
    settings: SagaSettings,
}

impl<S: Store> AcceptanceSaga<S> {
    pub fn new(
        store: S,
        gateways: GatewayFactory,
        notifier: Arc<dyn Notifier>,
        settings: SagaSettings,
    ) -> Self {
        Self {
            store,
            ledger: OfferLedger::new(),
            bookings: BookingManager::new(settings.payment_grace),
            payments: PaymentRegistry::new(),
            gateways,
            notifier,
            settings,
        }
    }

    /// Accepts `offer_id` on behalf of `customer_id`.
    ///
    /// Returns `Err` only when the outcome is unknown (store or commit
    /// failure); the caller must then verify with the gateway before retrying.
    #[tracing::instrument(skip(self, cancel), fields(saga_type = "OfferAcceptance"))]
    pub async fn execute(
        &self,
        customer_id: CustomerId,
        offer_id: OfferId,
        cancel: CancelSignal,
    ) -> Result<WorkflowResult<BookingPaymentInfo>, SagaError> {
        metrics::counter!("acceptance_saga_executions_total").increment(1);
        let started = Instant::now();

        let mut tx = self.store.begin().await?;
        let outcome = self.run(&mut tx, customer_id, offer_id, &cancel).await;
        let result = conclude(tx, outcome).await;

        metrics::histogram!("acceptance_saga_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match result? {
            Ok(staged) => {
                for (user_id, event) in staged.notifications {
                    dispatch(self.notifier.as_ref(), user_id, event).await;
                }
                tracing::info!(
                    booking_id = %staged.value.booking_id,
                    transaction_id = %staged.value.transaction_id,
                    "offer accepted"
                );
                Ok(WorkflowResult::success(staged.value))
            }
            Err(failure) => {
                metrics::counter!("acceptance_saga_failed_total", "step" => failure.step.as_str())
                    .increment(1);
                tracing::warn!(step = %failure.step, message = %failure.message, "offer acceptance failed");
                Ok(failure.into())
            }
        }
    }

    async fn run(
        &self,
        tx: &mut S::Tx,
        customer_id: CustomerId,
        offer_id: OfferId,
        cancel: &CancelSignal,
    ) -> Result<Staged<BookingPaymentInfo>, Abort> {
        // Offer and its request, scoped to the customer.
        let offer = tx.load::<Offer>(offer_id.as_uuid()).await?.ok_or_else(|| {
            Abort::fail(
                WorkflowStep::ValidateOffer,
                FailureKind::NotFound,
                format!("offer {offer_id} not found"),
            )
        })?;
        let request = tx
            .load::<ServiceRequest>(offer.service_request_id.as_uuid())
            .await?
            .ok_or_else(|| {
                Abort::fail(
                    WorkflowStep::LoadServiceRequest,
                    FailureKind::NotFound,
                    format!("service request {} not found", offer.service_request_id),
                )
            })?;
        if request.customer_id != customer_id {
            return Err(Abort::fail(
                WorkflowStep::ValidateOffer,
                FailureKind::NotFound,
                format!("offer {offer_id} not found"),
            ));
        }

        let payment_method = request.resolved_payment_method().to_string();

        check_cancelled(cancel, WorkflowStep::ReserveOffer)?;

        // Single-winner reservation, then everyone else loses.
        let offer = self
            .ledger
            .reserve(tx, offer_id)
            .await
            .at(WorkflowStep::ReserveOffer)?;
        let rejected = self
            .ledger
            .reject_siblings(tx, request.id, offer_id)
            .await
            .at(WorkflowStep::RejectSiblings)?;

        let parties = load_parties(tx, customer_id, offer.craftsman_id.as_uuid(), &request).await?;

        let booking_date = request
            .preferred_date
            .unwrap_or_else(|| Utc::now() + self.settings.default_booking_lead);
        let booking = self
            .bookings
            .create_from_offer(
                tx,
                NewBooking {
                    customer_id,
                    craftsman_id: offer.craftsman_id,
                    craft_id: request.craft_id,
                    service_request_id: request.id,
                    offer_id,
                    amount: offer.offered_price,
                    booking_date,
                },
            )
            .await
            .at(WorkflowStep::CreateBooking)?;

        let gateway = self
            .gateways
            .for_method(&payment_method)
            .at(WorkflowStep::CreatePayment)?;
        let payment = self
            .payments
            .open(tx, &booking, &payment_method, gateway.provider_name())
            .await
            .at(WorkflowStep::CreatePayment)?;

        // The one external call. Nothing is committed until it answers.
        let init = payment_init_request(&parties, booking.id, payment.id, booking.total_amount, booking_date);
        let response = initialize_payment(
            gateway.as_ref(),
            &init,
            self.settings.gateway_timeout,
            cancel,
        )
        .await?;
        let transaction_id = accepted_transaction(response.clone())?;

        // From here on cancellation is ignored: the gateway said yes.
        self.payments
            .attach_transaction(tx, payment.id, &transaction_id)
            .await
            .at(WorkflowStep::CreatePayment)?;

        let mut notifications = vec![
            (
                parties.customer.user_id,
                MarketplaceEvent::BookingCreated(BookingCreatedData {
                    booking_id: booking.id,
                    amount: booking.total_amount,
                    booking_date: booking.booking_date,
                    payment_deadline: booking.payment_deadline,
                }),
            ),
            (
                parties.craftsman.user_id,
                MarketplaceEvent::OfferAccepted(OfferAcceptedData {
                    offer_id,
                    service_request_id: request.id,
                    booking_id: booking.id,
                }),
            ),
        ];
        for sibling in &rejected {
            if let Some(owner) = tx.load::<Craftsman>(sibling.craftsman_id.as_uuid()).await? {
                notifications.push((
                    owner.user_id,
                    MarketplaceEvent::OfferRejected(OfferRejectedData {
                        offer_id: sibling.id,
                        service_request_id: request.id,
                        reason: REASON_ANOTHER_OFFER_ACCEPTED.to_string(),
                    }),
                ));
            }
        }

        let info = BookingPaymentInfo {
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
            craft_name: parties.craft.name.clone(),
        };

        Ok(Staged {
            value: info,
            notifications,
        })
    }
}

fn check_cancelled(cancel: &CancelSignal, step: WorkflowStep) -> Result<(), Abort> {
    if cancel.is_cancelled() {
        return Err(Abort::fail(step, FailureKind::Cancelled, "cancelled by caller"));
    }
    Ok(())
}

async fn require<E: Entity, T: Transaction>(
    tx: &mut T,
    id: uuid::Uuid,
    label: &str,
) -> Result<E, Abort> {
    tx.load::<E>(id).await?.ok_or_else(|| {
        Abort::fail(
            WorkflowStep::LoadRelatedData,
            FailureKind::Validation,
            format!("{label} {id} does not exist"),
        )
    })
}

/// Loads the customer, craftsman, their profiles and the craft.
pub(crate) async fn load_parties<T: Transaction>(
    tx: &mut T,
    customer_id: CustomerId,
    craftsman_id: uuid::Uuid,
    request: &ServiceRequest,
) -> Result<Parties, Abort> {
    let customer: Customer = require(tx, customer_id.as_uuid(), "customer").await?;
    let craftsman: Craftsman = require(tx, craftsman_id, "craftsman").await?;
    let customer_profile: UserProfile =
        require(tx, customer.user_id.as_uuid(), "customer profile").await?;
    let craftsman_profile: UserProfile =
        require(tx, craftsman.user_id.as_uuid(), "craftsman profile").await?;
    let craft: Craft = require(tx, request.craft_id.as_uuid(), "craft").await?;

    Ok(Parties {
        customer,
        customer_profile,
        craftsman,
        craftsman_profile,
        craft,
    })
}

/// Builds the gateway request, filling in safe defaults for missing contact
/// details.
pub(crate) fn payment_init_request(
    parties: &Parties,
    booking_id: BookingId,
    payment_id: PaymentId,
    amount: Money,
    booking_date: DateTime<Utc>,
) -> PaymentInitRequest {
    let profile = &parties.customer_profile;
    let non_empty = |value: &Option<String>, fallback: &str| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(fallback)
            .to_string()
    };

    PaymentInitRequest {
        booking_id,
        payment_id,
        amount,
        customer_email: non_empty(&profile.email, FALLBACK_EMAIL),
        customer_phone: non_empty(&profile.phone, FALLBACK_PHONE),
        customer_name: profile.display_name(FALLBACK_CUSTOMER_NAME).to_string(),
        customer_address: profile.address.clone(),
        craft_name: parties.craft.name.clone(),
        craftsman_name: parties
            .craftsman_profile
            .display_name(FALLBACK_CRAFTSMAN_NAME)
            .to_string(),
        booking_date,
    }
}

/// Calls `initialize` with a bounded timeout, honoring cancellation until the
/// gateway answers. Timeouts and transport failures count as declines.
pub(crate) async fn initialize_payment(
    gateway: &dyn PaymentGateway,
    request: &PaymentInitRequest,
    timeout: std::time::Duration,
    cancel: &CancelSignal,
) -> Result<PaymentInitResponse, Abort> {
    check_cancelled(cancel, WorkflowStep::InitializePaymentGateway)?;

    let call = tokio::time::timeout(timeout, gateway.initialize(request));
    let answer = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(Abort::fail(
                WorkflowStep::InitializePaymentGateway,
                FailureKind::Cancelled,
                "cancelled before the payment gateway answered",
            ));
        }
        answer = call => answer,
    };

    Ok(match answer {
        Err(_) => {
            tracing::warn!(provider = gateway.provider_name(), ?timeout, "payment gateway timed out");
            PaymentInitResponse::declined(format!("payment gateway timed out after {timeout:?}"))
        }
        Ok(Err(error)) => {
            tracing::warn!(provider = gateway.provider_name(), %error, "payment gateway unavailable");
            PaymentInitResponse::declined(error.to_string())
        }
        Ok(Ok(response)) => response,
    })
}

/// Returns the transaction id of a successful answer, or the failure.
pub(crate) fn accepted_transaction(response: PaymentInitResponse) -> Result<String, Abort> {
    if !response.is_success {
        return Err(Abort::fail(
            WorkflowStep::InitializePaymentGateway,
            FailureKind::Gateway,
            response
                .error_message
                .unwrap_or_else(|| "payment initialization failed".to_string()),
        ));
    }
    response.transaction_id.filter(|t| !t.is_empty()).ok_or_else(|| {
        Abort::fail(
            WorkflowStep::InitializePaymentGateway,
            FailureKind::Gateway,
            "payment gateway returned no transaction id",
        )
    })
}
