//! Domain error types.

use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A referenced entity is missing or an input is invalid. Not retriable.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Someone else already decided the target, or a concurrent writer won.
    /// Not retriable for the same target.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The target entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Stored state breaks an invariant and needs manual review.
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    /// The entity is not in a state that allows the action.
    #[error("Invalid state transition: cannot {action} {entity} in {current} state")]
    InvalidTransition {
        entity: &'static str,
        current: String,
        action: &'static str,
    },

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl DomainError {
    /// Creates a not-found error for an entity id.
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        if err.is_conflict() {
            DomainError::Conflict(err.to_string())
        } else {
            DomainError::Store(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::Version;
    use uuid::Uuid;

    #[test]
    fn store_conflicts_become_domain_conflicts() {
        let err: DomainError = StoreError::ConcurrencyConflict {
            kind: "offer".to_string(),
            id: Uuid::new_v4(),
            expected: Version::first(),
            actual: Version::new(2),
        }
        .into();
        assert!(matches!(err, DomainError::Conflict(_)));

        let err: DomainError = StoreError::LockTimeout {
            kind: "service_request".to_string(),
            id: Uuid::new_v4(),
        }
        .into();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn other_store_errors_are_wrapped() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: DomainError = StoreError::Serialization(json_err).into();
        assert!(matches!(err, DomainError::Store(_)));
    }
}
