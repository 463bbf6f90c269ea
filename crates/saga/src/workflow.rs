//! Tagged workflow outcomes.

use domain::DomainError;
use serde::Serialize;
use store::{StoreError, Transaction};

use crate::error::SagaError;

/// A named step of one of the workflows. Failures carry the step they
/// happened in so callers can map them to a user-facing response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WorkflowStep {
    ValidateOffer,
    LoadServiceRequest,
    ReserveOffer,
    RejectSiblings,
    LoadRelatedData,
    CreateBooking,
    CreatePayment,
    InitializePaymentGateway,
    LoadBooking,
    LoadPayment,
    MarkFailed,
    RevertOfferReservation,
    VerifyPayment,
    CompletePayment,
    RefundPayment,
    CheckRetryBudget,
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::ValidateOffer => "ValidateOffer",
            WorkflowStep::LoadServiceRequest => "LoadServiceRequest",
            WorkflowStep::ReserveOffer => "ReserveOffer",
            WorkflowStep::RejectSiblings => "RejectSiblings",
            WorkflowStep::LoadRelatedData => "LoadRelatedData",
            WorkflowStep::CreateBooking => "CreateBooking",
            WorkflowStep::CreatePayment => "CreatePayment",
            WorkflowStep::InitializePaymentGateway => "InitializePaymentGateway",
            WorkflowStep::LoadBooking => "LoadBooking",
            WorkflowStep::LoadPayment => "LoadPayment",
            WorkflowStep::MarkFailed => "MarkFailed",
            WorkflowStep::RevertOfferReservation => "RevertOfferReservation",
            WorkflowStep::VerifyPayment => "VerifyPayment",
            WorkflowStep::CompletePayment => "CompletePayment",
            WorkflowStep::RefundPayment => "RefundPayment",
            WorkflowStep::CheckRetryBudget => "CheckRetryBudget",
        }
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a workflow stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// A referenced entity is missing or an input is invalid.
    Validation,
    /// Someone else already decided the target.
    Conflict,
    /// The target of the workflow does not exist.
    NotFound,
    /// The payment provider declined, failed or timed out.
    Gateway,
    /// Stored state is broken and needs manual review.
    DataIntegrity,
    /// The caller gave up before the gateway answered.
    Cancelled,
}

/// A business failure at a named step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowFailure {
    pub step: WorkflowStep,
    pub kind: FailureKind,
    pub message: String,
}

impl WorkflowFailure {
    pub fn new(step: WorkflowStep, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            step,
            kind,
            message: message.into(),
        }
    }

    /// Classifies a domain error raised at `step`.
    ///
    /// Store faults are not business failures and come back as `Err`.
    pub fn from_domain(step: WorkflowStep, err: DomainError) -> Result<Self, SagaError> {
        let kind = match &err {
            DomainError::Validation(_) | DomainError::InvalidTransition { .. } => {
                FailureKind::Validation
            }
            DomainError::Conflict(_) => FailureKind::Conflict,
            DomainError::NotFound { .. } => FailureKind::NotFound,
            DomainError::DataIntegrity(_) => FailureKind::DataIntegrity,
            DomainError::Store(_) => return Err(err.into()),
        };
        Ok(Self::new(step, kind, err.to_string()))
    }
}

impl std::fmt::Display for WorkflowFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.step, self.message)
    }
}

/// Outcome of a workflow that ran to a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowResult<T> {
    Succeeded { value: T, message: Option<String> },
    Failed(WorkflowFailure),
}

impl<T> WorkflowResult<T> {
    pub fn success(value: T) -> Self {
        WorkflowResult::Succeeded {
            value,
            message: None,
        }
    }

    pub fn success_with_message(value: T, message: impl Into<String>) -> Self {
        WorkflowResult::Succeeded {
            value,
            message: Some(message.into()),
        }
    }

    pub fn failure(step: WorkflowStep, kind: FailureKind, message: impl Into<String>) -> Self {
        WorkflowResult::Failed(WorkflowFailure::new(step, kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, WorkflowResult::Succeeded { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            WorkflowResult::Succeeded { value, .. } => Some(value),
            WorkflowResult::Failed(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            WorkflowResult::Succeeded { value, .. } => Some(value),
            WorkflowResult::Failed(_) => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            WorkflowResult::Succeeded { message, .. } => message.as_deref(),
            WorkflowResult::Failed(failure) => Some(&failure.message),
        }
    }

    pub fn failure_ref(&self) -> Option<&WorkflowFailure> {
        match self {
            WorkflowResult::Succeeded { .. } => None,
            WorkflowResult::Failed(failure) => Some(failure),
        }
    }

    /// Returns the step this workflow failed at, if it failed.
    pub fn failed_step(&self) -> Option<WorkflowStep> {
        self.failure_ref().map(|f| f.step)
    }
}

impl<T> From<WorkflowFailure> for WorkflowResult<T> {
    fn from(failure: WorkflowFailure) -> Self {
        WorkflowResult::Failed(failure)
    }
}

/// Why a workflow body stopped early.
pub(crate) enum Abort {
    /// Business failure: roll back and report.
    Failed(WorkflowFailure),
    /// Unexpected fault: roll back and propagate.
    Fault(SagaError),
}

impl Abort {
    pub(crate) fn fail(step: WorkflowStep, kind: FailureKind, message: impl Into<String>) -> Self {
        Abort::Failed(WorkflowFailure::new(step, kind, message))
    }

    pub(crate) fn domain(step: WorkflowStep, err: DomainError) -> Self {
        match WorkflowFailure::from_domain(step, err) {
            Ok(failure) => Abort::Failed(failure),
            Err(fault) => Abort::Fault(fault),
        }
    }
}

impl From<SagaError> for Abort {
    fn from(err: SagaError) -> Self {
        Abort::Fault(err)
    }
}

impl From<StoreError> for Abort {
    fn from(err: StoreError) -> Self {
        Abort::Fault(err.into())
    }
}

/// Tags a domain result with the step it belongs to.
pub(crate) trait StepExt<T> {
    fn at(self, step: WorkflowStep) -> Result<T, Abort>;
}

impl<T> StepExt<T> for Result<T, DomainError> {
    fn at(self, step: WorkflowStep) -> Result<T, Abort> {
        self.map_err(|err| Abort::domain(step, err))
    }
}

/// Commits on success and rolls back otherwise.
///
/// A failed commit is a fault: the caller cannot know what landed.
pub(crate) async fn conclude<T, Tx: Transaction>(
    tx: Tx,
    outcome: Result<T, Abort>,
) -> Result<Result<T, WorkflowFailure>, SagaError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(Ok(value))
        }
        Err(Abort::Failed(failure)) => {
            if let Err(error) = tx.rollback().await {
                tracing::warn!(%error, "rollback failed; transaction dropped");
            }
            Ok(Err(failure))
        }
        Err(Abort::Fault(fault)) => {
            drop(tx);
            Err(fault)
        }
    }
}
