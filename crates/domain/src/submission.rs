//! Submission drafts and save payloads
//!
//! The server stores one merged response document per submission: generic
//! answers keyed by question id plus the composite lists under reserved keys.
//! File bytes travel separately as per-question file operations, and the
//! server re-injects persisted file nodes when a draft is fetched.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::answer::Answers;
use crate::composite::{CompositeStores, RefundTier, RoomEntry, SpecialEntry};
use crate::file_diff::{FileHandle, QuestionFileOps};
use crate::ids::{FileId, FileToken, PortfolioId, QuestionId, SubmissionId};
use crate::question::FormSchema;

pub const ROOMS_KEY: &str = "rooms";
pub const SPECIALS_KEY: &str = "specials";
pub const REFUNDS_KEY: &str = "refunds";

/// The externally visible aggregate, as returned by the draft lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionDraft {
    pub portfolio_id: PortfolioId,
    pub submission_id: Option<SubmissionId>,
    /// Merged response document
    pub document: Map<String, Value>,
    pub is_draft: bool,
}

impl SubmissionDraft {
    /// Split the merged document back into answers and composite stores.
    pub fn restore(&self, schema: &FormSchema) -> (Answers, CompositeStores) {
        split_document(schema, &self.document)
    }
}

fn entries<T: serde::de::DeserializeOwned>(document: &Map<String, Value>, key: &str) -> Vec<T> {
    document
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

pub fn split_document(
    schema: &FormSchema,
    document: &Map<String, Value>,
) -> (Answers, CompositeStores) {
    let answers = Answers::from_stored(schema, document);
    let composites = CompositeStores::restore(
        entries::<RoomEntry>(document, ROOMS_KEY),
        entries::<SpecialEntry>(document, SPECIALS_KEY),
        entries::<RefundTier>(document, REFUNDS_KEY),
    );
    (answers, composites)
}

// =============================================================================
// Save payload
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositePayload {
    pub rooms: Vec<RoomEntry>,
    pub specials: Vec<SpecialEntry>,
    pub refunds: Vec<RefundTier>,
}

impl From<&CompositeStores> for CompositePayload {
    fn from(stores: &CompositeStores) -> Self {
        Self {
            rooms: stores.rooms.entries().to_vec(),
            specials: stores.specials.entries().to_vec(),
            refunds: stores.refunds.entries().to_vec(),
        }
    }
}

/// File operations of one question, addressed the way the server files them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOp {
    pub question_id: QuestionId,
    pub step: i32,
    pub order: i32,
    pub new_files: Vec<FileHandle>,
    pub delete_file_ids: Vec<FileId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePayload {
    pub portfolio_id: PortfolioId,
    pub submission_id: Option<SubmissionId>,
    /// Answer JSON with every file-bearing question nulled
    pub answers: Map<String, Value>,
    pub composites: CompositePayload,
    pub file_ops: Vec<FileOp>,
}

impl SavePayload {
    pub fn build(
        portfolio_id: PortfolioId,
        submission_id: Option<SubmissionId>,
        schema: &FormSchema,
        answers: &Answers,
        composites: &CompositeStores,
        snapshot: Vec<QuestionFileOps>,
    ) -> Self {
        let mut json = Map::new();
        for (id, answer) in answers.iter() {
            let file_bearing = schema
                .find(id)
                .is_some_and(|q| q.question_type.is_file());
            let value = if file_bearing {
                Value::Null
            } else {
                answer.to_json()
            };
            json.insert(id.to_string(), value);
        }

        let file_ops = snapshot
            .into_iter()
            .filter_map(|ops| {
                let question = schema.find(&ops.question_id)?;
                Some(FileOp {
                    question_id: ops.question_id,
                    step: question.step,
                    order: question.order,
                    new_files: ops.new_files,
                    delete_file_ids: ops.delete_ids,
                })
            })
            .collect();

        Self {
            portfolio_id,
            submission_id,
            answers: json,
            composites: CompositePayload::from(composites),
            file_ops,
        }
    }

    /// Answers merged with the composite lists under their reserved keys.
    pub fn response_document(&self) -> Map<String, Value> {
        let mut document = self.answers.clone();
        let composites = [
            (ROOMS_KEY, serde_json::to_value(&self.composites.rooms)),
            (SPECIALS_KEY, serde_json::to_value(&self.composites.specials)),
            (REFUNDS_KEY, serde_json::to_value(&self.composites.refunds)),
        ];
        for (key, value) in composites {
            document.insert(key.to_string(), value.unwrap_or(Value::Array(Vec::new())));
        }
        document
    }

    /// The diff entries this payload carries, for acknowledging after success.
    pub fn included_file_ops(&self) -> Vec<QuestionFileOps> {
        self.file_ops
            .iter()
            .map(|op| QuestionFileOps {
                question_id: op.question_id.clone(),
                new_files: op.new_files.clone(),
                delete_ids: op.delete_file_ids.clone(),
            })
            .collect()
    }
}

// =============================================================================
// Save receipts
// =============================================================================

/// A file the server stored while handling a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedFile {
    /// Token of the uploaded [`FileHandle`]
    pub token: FileToken,
    pub file_id: FileId,
    pub url: Option<String>,
}

/// What the server reports back for an accepted save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReceipt {
    pub submission_id: SubmissionId,
    pub issued_files: Vec<IssuedFile>,
}

impl SaveReceipt {
    pub fn new(submission_id: SubmissionId) -> Self {
        Self {
            submission_id,
            issued_files: Vec::new(),
        }
    }

    pub fn with_file(mut self, token: FileToken, file_id: impl Into<FileId>) -> Self {
        self.issued_files.push(IssuedFile {
            token,
            file_id: file_id.into(),
            url: None,
        });
        self
    }

    pub fn issued(&self, token: FileToken) -> Option<&IssuedFile> {
        self.issued_files.iter().find(|f| f.token == token)
    }
}

impl From<SubmissionId> for SaveReceipt {
    fn from(submission_id: SubmissionId) -> Self {
        Self::new(submission_id)
    }
}
