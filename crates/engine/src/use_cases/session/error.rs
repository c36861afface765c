//! Form session errors.

use intake_domain::DomainError;

use crate::infrastructure::ports::TransportError;

/// Errors that can occur during form session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Session is read-only")]
    ReadOnly,
    #[error("Session has not been loaded")]
    NotLoaded,
    #[error("Session was torn down")]
    TornDown,
    #[error("A save is already in flight")]
    SaveInFlight,
    /// Final submission blocked by validation
    #[error("{summary}")]
    Incomplete { steps: Vec<i32>, summary: String },
    #[error("Save ticket does not match the outstanding save")]
    StaleTicket,
}

impl SessionError {
    /// Whether the failed operation can be retried without losing data.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retriable(),
            Self::SaveInFlight => true,
            _ => false,
        }
    }
}
