//! Session context, save tickets and notices.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use intake_domain::{
    Answers, CompositeStores, PortfolioId, SavePayload, SaveReceipt, SubmissionId, ValidationRules,
};

use crate::infrastructure::config::{AutosaveConfig, EngineConfig};
use crate::infrastructure::ports::{
    AutosaveScheduler, ClockPort, Credentials, DraftSource, FileDownloader, SchemaSource,
    SubmissionApi, TransportError,
};

/// What a session is opened on. Passed explicitly instead of read from
/// ambient storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub portfolio_id: PortfolioId,
    pub submission_id: Option<SubmissionId>,
    pub credentials: Option<Credentials>,
    /// Detail mode: navigation only
    pub read_only: bool,
}

impl SessionContext {
    pub fn new(portfolio_id: impl Into<PortfolioId>) -> Self {
        Self {
            portfolio_id: portfolio_id.into(),
            submission_id: None,
            credentials: None,
            read_only: false,
        }
    }

    pub fn with_submission(mut self, submission_id: impl Into<SubmissionId>) -> Self {
        self.submission_id = Some(submission_id.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn detail(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Collaborators a session talks to.
#[derive(Clone)]
pub struct SessionPorts {
    pub schema: Arc<dyn SchemaSource>,
    pub drafts: Arc<dyn DraftSource>,
    pub submissions: Arc<dyn SubmissionApi>,
    pub files: Arc<dyn FileDownloader>,
    pub clock: Arc<dyn ClockPort>,
    pub scheduler: Arc<dyn AutosaveScheduler>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSettings {
    pub autosave: AutosaveConfig,
    pub rules: ValidationRules,
}

impl From<&EngineConfig> for SessionSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            autosave: config.autosave,
            rules: config.validation_rules(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Autosave,
    Manual,
    StepTransition,
    Final,
}

impl fmt::Display for SaveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveKind::Autosave => write!(f, "autosave"),
            SaveKind::Manual => write!(f, "manual"),
            SaveKind::StepTransition => write!(f, "step_transition"),
            SaveKind::Final => write!(f, "final"),
        }
    }
}

/// Local state exactly as it was packaged into a save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentState {
    pub answers: Answers,
    pub composites: CompositeStores,
}

/// An outstanding save. Created by `begin_save`, resolved by `complete_save`.
#[derive(Debug, Clone)]
pub struct SaveTicket {
    pub kind: SaveKind,
    pub generation: u64,
    pub payload: SavePayload,
    pub(crate) sent: SentState,
}

impl SaveTicket {
    /// Send the payload to the endpoint matching the save kind.
    pub async fn dispatch(&self, api: &dyn SubmissionApi) -> Result<SaveReceipt, TransportError> {
        match self.kind {
            SaveKind::Final => api.submit_final(&self.payload).await,
            SaveKind::Autosave | SaveKind::Manual | SaveKind::StepTransition => {
                api.save_draft(&self.payload).await
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { submission_id: SubmissionId },
    /// The session was torn down before the response arrived
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeStatus {
    Saved,
    Failed { message: String, retriable: bool },
}

/// Last save result, for "saved at ..." or a dismissible retry prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveNotice {
    pub kind: SaveKind,
    pub at: DateTime<Utc>,
    pub status: NoticeStatus,
}

impl SaveNotice {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, NoticeStatus::Failed { .. })
    }
}

/// How a post-save re-fetch was merged into local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Values replaced by the server's
    pub adopted: usize,
    /// Values edited during the save and kept
    pub preserved: usize,
}
