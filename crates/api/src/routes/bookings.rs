//! Booking lookup and payment retry endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{BookingId, OfferId, PaymentId};
use domain::{BookingManager, BookingStatus, Money, PaymentRegistry, PaymentStatus};
use saga::BookingPaymentInfo;
use serde::Serialize;
use store::{Store, Transaction};

use super::{CustomerIdentity, parse_id, run_guarded};
use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct PaymentSummary {
    pub id: PaymentId,
    pub status: PaymentStatus,
    pub amount: Money,
    pub attempt: u32,
    pub payment_method: String,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
}

#[derive(Serialize)]
pub struct BookingResponse {
    pub id: BookingId,
    pub status: BookingStatus,
    pub accepted_offer_id: Option<OfferId>,
    pub total_amount: Money,
    pub booking_date: DateTime<Utc>,
    pub payment_deadline: DateTime<Utc>,
    pub cancellation_reason: Option<String>,
    pub payments: Vec<PaymentSummary>,
}

/// GET /bookings/{id}: a booking and its payment attempts.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CustomerIdentity(customer_id): CustomerIdentity,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking_id: BookingId = parse_id(&id)?;
    let not_found = || ApiError::NotFound("booking not found".to_string());

    let mut tx = state.store.begin().await?;
    let booking = BookingManager::default()
        .get(&mut tx, booking_id)
        .await?
        .filter(|b| b.customer_id == customer_id)
        .ok_or_else(not_found)?;
    let payments = PaymentRegistry::new().for_booking(&mut tx, booking_id).await?;
    tx.rollback().await?;

    Ok(Json(BookingResponse {
        id: booking.id,
        status: booking.status,
        accepted_offer_id: booking.accepted_offer_id,
        total_amount: booking.total_amount,
        booking_date: booking.booking_date,
        payment_deadline: booking.payment_deadline,
        cancellation_reason: booking.cancellation_reason,
        payments: payments
            .into_iter()
            .map(|p| PaymentSummary {
                id: p.id,
                status: p.status,
                amount: p.amount,
                attempt: p.attempt,
                payment_method: p.payment_method,
                transaction_id: p.transaction_id,
                failure_reason: p.failure_reason,
            })
            .collect(),
    }))
}

/// POST /bookings/{id}/retry-payment: open a new payment attempt.
#[tracing::instrument(skip(state))]
pub async fn retry_payment<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CustomerIdentity(customer_id): CustomerIdentity,
    Path(id): Path<String>,
) -> Result<Json<BookingPaymentInfo>, ApiError> {
    let booking_id: BookingId = parse_id(&id)?;

    let info = run_guarded(move |cancel| async move {
        state.retry.retry(customer_id, booking_id, cancel).await
    })
    .await?;

    Ok(Json(info))
}
