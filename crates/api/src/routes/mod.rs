//! HTTP handlers.

pub mod bookings;
pub mod health;
pub mod metrics;
pub mod offers;
pub mod payments;

use std::future::Future;
use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::CustomerId;
use saga::{CancelHandle, CancelSignal, SagaError, WorkflowResult};

use crate::error::ApiError;

/// Header carrying the authenticated customer, set by the gateway in front
/// of this service.
pub const CUSTOMER_HEADER: &str = "x-customer-id";

/// The customer making the request.
#[derive(Debug, Clone, Copy)]
pub struct CustomerIdentity(pub CustomerId);

impl<S: Send + Sync> FromRequestParts<S> for CustomerIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(CUSTOMER_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing customer identity".to_string()))?
            .to_str()
            .map_err(|_| ApiError::BadRequest("invalid customer identity".to_string()))?;
        let id = CustomerId::from_str(raw.trim())
            .map_err(|_| ApiError::BadRequest("invalid customer identity".to_string()))?;
        Ok(CustomerIdentity(id))
    }
}

pub(crate) fn parse_id<T: FromStr>(raw: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid id: {raw}")))
}

pub(crate) fn into_value<T>(result: WorkflowResult<T>) -> Result<T, ApiError> {
    match result {
        WorkflowResult::Succeeded { value, .. } => Ok(value),
        WorkflowResult::Failed(failure) => Err(failure.into()),
    }
}

/// Cancels the workflow if the request future is dropped first.
struct CancelOnDrop(Option<CancelHandle>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.cancel();
        }
    }
}

/// Runs a cancellable workflow on its own task.
///
/// A client that disconnects cancels the workflow instead of dropping it
/// mid-flight, so a gateway answer that already arrived still commits.
pub(crate) async fn run_guarded<T, F, Fut>(work: F) -> Result<T, ApiError>
where
    F: FnOnce(CancelSignal) -> Fut,
    Fut: Future<Output = Result<WorkflowResult<T>, SagaError>> + Send + 'static,
    T: Send + 'static,
{
    let (handle, signal) = CancelSignal::new();
    let guard = CancelOnDrop(Some(handle));
    let outcome = tokio::spawn(work(signal))
        .await
        .map_err(|e| ApiError::Internal(format!("workflow task failed: {e}")))?;
    guard.disarm();
    into_value(outcome?)
}
