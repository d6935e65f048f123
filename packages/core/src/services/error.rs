//! Service-Layer Error Types
//!
//! Domain errors surfaced by `FamilyService` and `TreeService`. Messages on
//! invariant violations are short, user-visible strings ("Max 4 spouses",
//! "Node children existed") suitable for direct display. Invariant checks
//! run before any write; a violation aborts with zero side effects.

use crate::models::ValidationError;
use thiserror::Error;

/// Errors from family graph operations
#[derive(Error, Debug)]
pub enum FamilyServiceError {
    /// Anchor or referenced node does not exist
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A new node description is malformed
    #[error(transparent)]
    ValidationFailed(#[from] ValidationError),

    /// A domain invariant would be broken; message is user-visible
    #[error("{0}")]
    InvariantViolation(String),

    /// Underlying store failure, opaque beyond retry-or-abort
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl FamilyServiceError {
    /// Create a not-found error for the given node id
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound(id.into())
    }

    /// Create an invariant violation with a user-visible message
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

impl From<anyhow::Error> for FamilyServiceError {
    fn from(e: anyhow::Error) -> Self {
        Self::DatabaseError(format!("{e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_message_is_verbatim() {
        let err = FamilyServiceError::invariant("Max 4 spouses");
        assert_eq!(err.to_string(), "Max 4 spouses");
    }

    #[test]
    fn test_not_found_names_the_id() {
        let err = FamilyServiceError::node_not_found("abc");
        assert_eq!(err.to_string(), "Node not found: abc");
    }

    #[test]
    fn test_validation_error_passthrough() {
        let err: FamilyServiceError =
            ValidationError::MissingField("name.first".to_string()).into();
        assert_eq!(err.to_string(), "Missing required field: name.first");
    }
}
