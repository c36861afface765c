//! In-memory portfolio backend for development and testing
//!
//! Implements every collaborator port against process memory. Behaves like
//! the real submission server where the engine can observe it: drafts are
//! stored as one merged response document, file bytes are kept per question
//! under server-issued ids, and fetched drafts carry persisted file nodes
//! keyed by question id. Nothing is persisted.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use intake_domain::{
    FileId, FileRef, IssuedFile, PortfolioId, Question, QuestionId, QuestionType, SavePayload,
    SaveReceipt, SubmissionDraft, SubmissionId,
};

use crate::infrastructure::ports::{
    DraftLookup, DraftSource, FileDownloader, SchemaSource, SubmissionApi, TransportError,
};

#[derive(Debug, Clone)]
struct StoredFile {
    file_id: FileId,
    name: String,
}

#[derive(Debug, Clone)]
struct StoredSubmission {
    portfolio_id: PortfolioId,
    document: Map<String, Value>,
    is_draft: bool,
    files: BTreeMap<QuestionId, Vec<StoredFile>>,
}

#[derive(Debug, Default)]
struct BackendState {
    questions: HashMap<PortfolioId, Vec<Question>>,
    submissions: BTreeMap<SubmissionId, StoredSubmission>,
    blobs: HashMap<FileId, Arc<[u8]>>,
    next_submission: u64,
    next_file: u64,
}

/// In-memory backend.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<BackendState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the question schema of a portfolio.
    pub fn with_questions(
        self,
        portfolio_id: impl Into<PortfolioId>,
        questions: Vec<Question>,
    ) -> Self {
        let mut state = self.state.into_inner();
        state.questions.insert(portfolio_id.into(), questions);
        Self {
            state: RwLock::new(state),
        }
    }

    /// Whether a submission exists and is still a draft.
    pub async fn is_draft(&self, submission_id: &SubmissionId) -> Option<bool> {
        let state = self.state.read().await;
        state.submissions.get(submission_id).map(|s| s.is_draft)
    }

    /// Number of files stored for a question of a submission.
    pub async fn stored_file_count(
        &self,
        submission_id: &SubmissionId,
        question_id: &QuestionId,
    ) -> usize {
        let state = self.state.read().await;
        state
            .submissions
            .get(submission_id)
            .and_then(|s| s.files.get(question_id))
            .map_or(0, Vec::len)
    }

    fn store(
        state: &mut BackendState,
        payload: &SavePayload,
        finalize: bool,
    ) -> Result<SaveReceipt, TransportError> {
        let submission_id = match &payload.submission_id {
            Some(id) => {
                let existing = state
                    .submissions
                    .get(id)
                    .ok_or_else(|| TransportError::not_found("Submission", id))?;
                if !existing.is_draft {
                    return Err(TransportError::rejected(409, "submission is already final"));
                }
                id.clone()
            }
            None => {
                state.next_submission += 1;
                let id = SubmissionId::from(format!("{}", 1000 + state.next_submission));
                state.submissions.insert(
                    id.clone(),
                    StoredSubmission {
                        portfolio_id: payload.portfolio_id.clone(),
                        document: Map::new(),
                        is_draft: true,
                        files: BTreeMap::new(),
                    },
                );
                id
            }
        };

        let mut issued = Vec::new();
        let mut receipt = SaveReceipt::new(submission_id.clone());
        for op in &payload.file_ops {
            for file in &op.new_files {
                state.next_file += 1;
                let file_id = FileId::from(format!("f{}", state.next_file));
                state.blobs.insert(file_id.clone(), file.data.clone());
                receipt.issued_files.push(IssuedFile {
                    token: file.token,
                    file_id: file_id.clone(),
                    url: Some(format!("/files/{file_id}")),
                });
                issued.push((
                    op.question_id.clone(),
                    StoredFile {
                        file_id,
                        name: file.name.clone(),
                    },
                ));
            }
        }

        let submission = state
            .submissions
            .get_mut(&submission_id)
            .ok_or_else(|| TransportError::not_found("Submission", &submission_id))?;
        for op in &payload.file_ops {
            if let Some(files) = submission.files.get_mut(&op.question_id) {
                files.retain(|f| !op.delete_file_ids.contains(&f.file_id));
            }
        }
        for (question_id, file) in issued {
            submission.files.entry(question_id).or_default().push(file);
        }
        submission.document = payload.response_document();
        submission.is_draft = !finalize;

        tracing::debug!(
            submission_id = %submission_id,
            file_ops = payload.file_ops.len(),
            issued_files = receipt.issued_files.len(),
            finalize,
            "Stored submission"
        );
        Ok(receipt)
    }

    /// The stored document with file nodes injected for file questions.
    fn render_draft(
        state: &BackendState,
        submission_id: &SubmissionId,
        submission: &StoredSubmission,
    ) -> SubmissionDraft {
        let mut document = submission.document.clone();
        let questions = state
            .questions
            .get(&submission.portfolio_id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for question in questions.iter().filter(|q| q.question_type.is_file()) {
            let nodes: Vec<Value> = submission
                .files
                .get(&question.id)
                .into_iter()
                .flatten()
                .filter_map(|f| {
                    FileRef::Persisted {
                        file_id: f.file_id.clone(),
                        name: f.name.clone(),
                        url: Some(format!("/files/{}", f.file_id)),
                    }
                    .to_node()
                })
                .collect();
            let value = match question.question_type {
                QuestionType::File => nodes.into_iter().last().unwrap_or(Value::Null),
                _ => Value::Array(nodes),
            };
            document.insert(question.id.to_string(), value);
        }

        SubmissionDraft {
            portfolio_id: submission.portfolio_id.clone(),
            submission_id: Some(submission_id.clone()),
            document,
            is_draft: submission.is_draft,
        }
    }
}

#[async_trait]
impl SchemaSource for InMemoryBackend {
    async fn get_questions(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<Question>, TransportError> {
        let state = self.state.read().await;
        state
            .questions
            .get(portfolio_id)
            .cloned()
            .ok_or_else(|| TransportError::not_found("Portfolio", portfolio_id))
    }
}

#[async_trait]
impl DraftSource for InMemoryBackend {
    async fn get_draft(
        &self,
        lookup: &DraftLookup,
    ) -> Result<Option<SubmissionDraft>, TransportError> {
        let state = self.state.read().await;
        match lookup {
            DraftLookup::BySubmission(submission_id) => Ok(state
                .submissions
                .get(submission_id)
                .map(|s| Self::render_draft(&state, submission_id, s))),
            DraftLookup::ByPortfolio {
                portfolio_id,
                credentials,
            } => {
                if credentials.access_token.is_empty() {
                    return Err(TransportError::rejected(401, "missing access token"));
                }
                // Latest open draft of the portfolio.
                Ok(state
                    .submissions
                    .iter()
                    .rev()
                    .find(|(_, s)| s.is_draft && &s.portfolio_id == portfolio_id)
                    .map(|(id, s)| Self::render_draft(&state, id, s)))
            }
        }
    }
}

#[async_trait]
impl SubmissionApi for InMemoryBackend {
    async fn save_draft(&self, payload: &SavePayload) -> Result<SaveReceipt, TransportError> {
        let mut state = self.state.write().await;
        Self::store(&mut state, payload, false)
    }

    async fn submit_final(&self, payload: &SavePayload) -> Result<SaveReceipt, TransportError> {
        let mut state = self.state.write().await;
        Self::store(&mut state, payload, true)
    }
}

#[async_trait]
impl FileDownloader for InMemoryBackend {
    async fn download_file(&self, file_id: &FileId) -> Result<Vec<u8>, TransportError> {
        let state = self.state.read().await;
        state
            .blobs
            .get(file_id)
            .map(|data| data.to_vec())
            .ok_or_else(|| TransportError::not_found("File", file_id))
    }
}
