//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use saga::{FailureKind, SagaError, WorkflowFailure, WorkflowStep};
use store::StoreError;

/// Shown to customers who lose the race for an offer.
pub const OFFER_UNAVAILABLE: &str = "this offer is no longer available";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or invalid credentials or signature.
    Unauthorized(String),
    /// A workflow stopped at a named step.
    Workflow(WorkflowFailure),
    /// A workflow fault with unknown outcome.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, step) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Workflow(failure) => {
                let (status, message) = workflow_failure_to_response(&failure);
                (status, message, Some(failure.step.as_str()))
            }
            ApiError::Saga(err) => {
                tracing::error!(error = %err, "workflow outcome unknown");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "the request could not be completed; check its status before retrying"
                        .to_string(),
                    None,
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    None,
                )
            }
        };

        let body = match step {
            Some(step) => serde_json::json!({ "error": message, "step": step }),
            None => serde_json::json!({ "error": message }),
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Maps a failed step to a status and a message safe to show the caller.
fn workflow_failure_to_response(failure: &WorkflowFailure) -> (StatusCode, String) {
    match failure.kind {
        FailureKind::Conflict => match failure.step {
            WorkflowStep::ValidateOffer | WorkflowStep::ReserveOffer => {
                (StatusCode::CONFLICT, OFFER_UNAVAILABLE.to_string())
            }
            _ => (StatusCode::CONFLICT, failure.message.clone()),
        },
        FailureKind::NotFound => (StatusCode::NOT_FOUND, not_found_message(failure.step)),
        FailureKind::Validation => match failure.step {
            WorkflowStep::InitializePaymentGateway => {
                (StatusCode::UNPROCESSABLE_ENTITY, failure.message.clone())
            }
            _ => (StatusCode::BAD_REQUEST, failure.message.clone()),
        },
        FailureKind::Gateway => match failure.step {
            WorkflowStep::VerifyPayment => (
                StatusCode::BAD_GATEWAY,
                "payment provider could not be reached".to_string(),
            ),
            WorkflowStep::RefundPayment => (
                StatusCode::BAD_GATEWAY,
                "payment could not be refunded".to_string(),
            ),
            _ => (StatusCode::UNPROCESSABLE_ENTITY, failure.message.clone()),
        },
        FailureKind::Cancelled => (StatusCode::REQUEST_TIMEOUT, "request cancelled".to_string()),
        FailureKind::DataIntegrity => {
            tracing::error!(step = %failure.step, message = %failure.message, "data integrity failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
    }
}

fn not_found_message(step: WorkflowStep) -> String {
    let what = match step {
        WorkflowStep::ValidateOffer | WorkflowStep::ReserveOffer => "offer",
        WorkflowStep::LoadServiceRequest => "service request",
        WorkflowStep::LoadBooking => "booking",
        WorkflowStep::LoadPayment => "payment",
        _ => "resource",
    };
    format!("{what} not found")
}

impl From<WorkflowFailure> for ApiError {
    fn from(failure: WorkflowFailure) -> Self {
        ApiError::Workflow(failure)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity, .. } => ApiError::NotFound(format!("{entity} not found")),
            DomainError::Validation(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(step: WorkflowStep, kind: FailureKind) -> (StatusCode, String) {
        workflow_failure_to_response(&WorkflowFailure::new(step, kind, "offer 1234 is Accepted"))
    }

    #[test]
    fn lost_race_is_conflict_without_identifiers() {
        let (status, message) = status_of(WorkflowStep::ReserveOffer, FailureKind::Conflict);
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(message, OFFER_UNAVAILABLE);
    }

    #[test]
    fn gateway_decline_is_unprocessable() {
        let (status, _) = status_of(WorkflowStep::InitializePaymentGateway, FailureKind::Gateway);
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let (status, _) =
            status_of(WorkflowStep::InitializePaymentGateway, FailureKind::Validation);
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn failed_refund_is_bad_gateway() {
        let (status, message) = status_of(WorkflowStep::RefundPayment, FailureKind::Gateway);
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(message, "payment could not be refunded");
    }

    #[test]
    fn not_found_hides_identifiers() {
        let (status, message) = status_of(WorkflowStep::LoadBooking, FailureKind::NotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "booking not found");
    }

    #[test]
    fn data_integrity_is_generic_server_error() {
        let (status, message) =
            status_of(WorkflowStep::RevertOfferReservation, FailureKind::DataIntegrity);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "internal server error");
    }
}
