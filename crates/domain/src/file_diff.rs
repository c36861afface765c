//! File diff tracker
//!
//! Binary attachments never travel inside the JSON answer payload. Per
//! question, the tracker records files attached since the last acknowledged
//! save and persisted file ids marked for deletion.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ids::{FileId, FileToken, QuestionId};

/// A locally attached file awaiting upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub token: FileToken,
    pub name: String,
    pub content_type: Option<String>,
    pub data: Arc<[u8]>,
}

impl FileHandle {
    pub fn new(
        name: impl Into<String>,
        content_type: Option<String>,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            token: FileToken::new(),
            name: name.into(),
            content_type,
            data: data.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct QuestionDiff {
    new_files: Vec<FileHandle>,
    delete_ids: Vec<FileId>,
}

impl QuestionDiff {
    fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.delete_ids.is_empty()
    }
}

/// File operations of one question, as included in a save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionFileOps {
    pub question_id: QuestionId,
    pub new_files: Vec<FileHandle>,
    pub delete_ids: Vec<FileId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiffTracker {
    diffs: BTreeMap<QuestionId, QuestionDiff>,
}

impl FileDiffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_new_file(&mut self, question_id: &QuestionId, file: FileHandle) {
        self.diffs
            .entry(question_id.clone())
            .or_default()
            .new_files
            .push(file);
    }

    pub fn record_delete(&mut self, question_id: &QuestionId, file_id: FileId) {
        let diff = self.diffs.entry(question_id.clone()).or_default();
        if !diff.delete_ids.contains(&file_id) {
            diff.delete_ids.push(file_id);
        }
    }

    /// Drop a not-yet-uploaded file. Nothing is recorded as deleted since the
    /// server never saw it.
    pub fn retract_new_file(
        &mut self,
        question_id: &QuestionId,
        index: usize,
    ) -> Option<FileHandle> {
        let diff = self.diffs.get_mut(question_id)?;
        if index >= diff.new_files.len() {
            return None;
        }
        let removed = diff.new_files.remove(index);
        if diff.is_empty() {
            self.diffs.remove(question_id);
        }
        Some(removed)
    }

    /// Same as [`retract_new_file`](Self::retract_new_file), addressed by token.
    pub fn retract_token(
        &mut self,
        question_id: &QuestionId,
        token: FileToken,
    ) -> Option<FileHandle> {
        let index = self
            .pending_for(question_id)
            .iter()
            .position(|f| f.token == token)?;
        self.retract_new_file(question_id, index)
    }

    /// Clear everything recorded for a question. Calling it again is a no-op.
    pub fn flush(&mut self, question_id: &QuestionId) {
        self.diffs.remove(question_id);
    }

    pub fn snapshot(&self) -> Vec<QuestionFileOps> {
        self.diffs
            .iter()
            .filter(|(_, diff)| !diff.is_empty())
            .map(|(question_id, diff)| QuestionFileOps {
                question_id: question_id.clone(),
                new_files: diff.new_files.clone(),
                delete_ids: diff.delete_ids.clone(),
            })
            .collect()
    }

    /// Forget exactly the operations a successful save carried.
    ///
    /// Files attached or deletes recorded after the snapshot was taken stay
    /// in the tracker for the next save.
    pub fn acknowledge(&mut self, included: &[QuestionFileOps]) {
        for ops in included {
            let Some(diff) = self.diffs.get_mut(&ops.question_id) else {
                continue;
            };
            diff.new_files
                .retain(|f| !ops.new_files.iter().any(|sent| sent.token == f.token));
            diff.delete_ids.retain(|id| !ops.delete_ids.contains(id));
            if diff.is_empty() {
                self.diffs.remove(&ops.question_id);
            }
        }
    }

    pub fn pending_for(&self, question_id: &QuestionId) -> &[FileHandle] {
        self.diffs
            .get(question_id)
            .map(|d| d.new_files.as_slice())
            .unwrap_or_default()
    }

    pub fn deletes_for(&self, question_id: &QuestionId) -> &[FileId] {
        self.diffs
            .get(question_id)
            .map(|d| d.delete_ids.as_slice())
            .unwrap_or_default()
    }

    pub fn has_pending(&self, question_id: &QuestionId) -> bool {
        !self.pending_for(question_id).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.values().all(QuestionDiff::is_empty)
    }
}
