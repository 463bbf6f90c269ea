//! Payment provider webhook and manual verification.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{BookingId, PaymentId};
use domain::PaymentStatus;
use saga::{PaymentOutcome, WebhookPayload, WorkflowResult, verify_signature};
use serde::Serialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct PaymentOutcomeResponse {
    pub booking_id: BookingId,
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub message: Option<String>,
}

impl PaymentOutcomeResponse {
    fn from_result(result: WorkflowResult<PaymentOutcome>) -> Result<Self, ApiError> {
        match result {
            WorkflowResult::Succeeded { value, message } => Ok(Self {
                booking_id: value.booking_id,
                payment_id: value.payment_id,
                status: value.status,
                message,
            }),
            WorkflowResult::Failed(failure) => Err(failure.into()),
        }
    }
}

/// POST /payments/webhook: settlement notice from the payment provider.
///
/// Payloads whose signature does not verify are rejected before any
/// workflow runs.
#[tracing::instrument(skip(state, payload), fields(transaction_id = %payload.transaction_id))]
pub async fn webhook<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<PaymentOutcomeResponse>, ApiError> {
    if !verify_signature(&state.webhook_secret, &payload) {
        tracing::warn!("webhook signature rejected");
        metrics::counter!("webhook_signature_rejected_total").increment(1);
        return Err(ApiError::Unauthorized("invalid signature".to_string()));
    }

    let result = state.confirmation.handle_webhook(&payload).await?;
    Ok(Json(PaymentOutcomeResponse::from_result(result)?))
}

/// POST /payments/{transaction_id}/verify: ask the provider and settle.
#[tracing::instrument(skip(state))]
pub async fn verify<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(transaction_id): Path<String>,
) -> Result<Json<PaymentOutcomeResponse>, ApiError> {
    let result = state.confirmation.confirm(&transaction_id).await?;
    Ok(Json(PaymentOutcomeResponse::from_result(result)?))
}
