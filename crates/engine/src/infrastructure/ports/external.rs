//! Collaborator port traits: schema source, draft lookup, save endpoint, file fetch.

use async_trait::async_trait;
use intake_domain::{
    FileId, PortfolioId, Question, SavePayload, SaveReceipt, SubmissionDraft, SubmissionId,
};

use super::error::TransportError;

// =============================================================================
// Session context
// =============================================================================

/// Opaque credentials handed over by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub member_id: String,
    pub access_token: String,
}

/// How an existing draft is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftLookup {
    BySubmission(SubmissionId),
    ByPortfolio {
        portfolio_id: PortfolioId,
        credentials: Credentials,
    },
}

// =============================================================================
// Ports
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Questions of a portfolio, in no particular order.
    async fn get_questions(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<Question>, TransportError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DraftSource: Send + Sync {
    async fn get_draft(
        &self,
        lookup: &DraftLookup,
    ) -> Result<Option<SubmissionDraft>, TransportError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmissionApi: Send + Sync {
    /// Store a draft.
    ///
    /// The receipt carries the submission id, newly issued on first save, and
    /// the server id of every uploaded file.
    async fn save_draft(&self, payload: &SavePayload) -> Result<SaveReceipt, TransportError>;

    /// Finalize the submission, creating it first if no draft exists yet.
    async fn submit_final(&self, payload: &SavePayload) -> Result<SaveReceipt, TransportError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileDownloader: Send + Sync {
    async fn download_file(&self, file_id: &FileId) -> Result<Vec<u8>, TransportError>;
}
