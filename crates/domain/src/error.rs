//! Unified error types for the intake domain
//!
//! Every refused operation in the domain layer reports one of these variants,
//! so the session layer can wrap them without falling back to strings.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Validation failed (e.g., invalid field values)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Business rule violation
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// State transition not allowed
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// An answer was written with a shape that does not match its question type
    #[error("Type mismatch for question {question_id}: expected {expected}, found {found}")]
    TypeMismatch {
        question_id: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Mutation attempted while the form is read-only
    #[error("Read-only: {0}")]
    ReadOnly(String),
}

impl DomainError {
    /// Creates a validation error for user-correctable input problems.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Create a constraint violation error
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// Create an invalid state transition error
    pub fn invalid_state_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    /// Creates a type mismatch error.
    ///
    /// Raised when a caller writes an answer whose shape differs from the
    /// shape the owning question expects. The prior value is kept.
    pub fn type_mismatch(
        question_id: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            question_id: question_id.into(),
            expected,
            found,
        }
    }

    /// Create a read-only error
    pub fn read_only(msg: impl Into<String>) -> Self {
        Self::ReadOnly(msg.into())
    }
}
