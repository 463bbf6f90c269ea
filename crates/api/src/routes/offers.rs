//! Offer acceptance endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OfferId;
use saga::BookingPaymentInfo;
use store::Store;

use super::{CustomerIdentity, parse_id, run_guarded};
use crate::AppState;
use crate::error::ApiError;

/// POST /offers/{id}/accept: accept an offer and start checkout.
///
/// Returns the booking and the payment link. A lost race answers 409.
#[tracing::instrument(skip(state))]
pub async fn accept<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CustomerIdentity(customer_id): CustomerIdentity,
    Path(id): Path<String>,
) -> Result<Json<BookingPaymentInfo>, ApiError> {
    let offer_id: OfferId = parse_id(&id)?;

    let info = run_guarded(move |cancel| async move {
        state.acceptance.execute(customer_id, offer_id, cancel).await
    })
    .await?;

    Ok(Json(info))
}
