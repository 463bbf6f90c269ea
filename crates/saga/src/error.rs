//! Saga error types.

use std::time::Duration;

use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Unexpected faults that escape a workflow.
///
/// Business failures never use this type; they come back as
/// [`WorkflowResult::Failed`](crate::WorkflowResult::Failed). A caller that
/// receives `SagaError` does not know whether the workflow's writes landed and
/// must verify before retrying.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Domain error that could not be classified as a business failure.
    #[error("Domain error: {0}")]
    Domain(DomainError),

    /// The store failed, including on commit.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<DomainError> for SagaError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Store(e) => SagaError::Store(e),
            other => SagaError::Domain(other),
        }
    }
}

/// Failures talking to a payment provider.
///
/// Provider-side rejections are not errors; they are responses with
/// `is_success = false`.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure: connection refused, DNS, TLS, 5xx.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    /// The provider did not answer in time.
    #[error("Payment gateway timed out after {0:?}")]
    Timeout(Duration),

    /// The provider answered with something we could not read.
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Unavailable(err.to_string())
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
