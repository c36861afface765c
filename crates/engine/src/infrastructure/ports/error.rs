//! Error types for port operations.

/// Failures reported by the schema, draft, save and file collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request never got a response.
    #[error("Network error in {operation}: {message}")]
    Network {
        operation: &'static str,
        message: String,
    },

    /// The server answered with a failure status.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Entity not found - includes entity type and ID for actionable error messages.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TransportError {
    pub fn network(operation: &'static str, message: impl ToString) -> Self {
        Self::Network {
            operation,
            message: message.to_string(),
        }
    }

    pub fn rejected(status: u16, message: impl ToString) -> Self {
        Self::Rejected {
            status,
            message: message.to_string(),
        }
    }

    /// Create a NotFound error with entity type and ID context.
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    /// Network failures and server-side errors are worth retrying as-is.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::NotFound { .. } | Self::Serialization(_) => false,
        }
    }
}
