//! Merging a re-fetched draft into local state.
//!
//! Server values win for everything the last confirmed save carried. Values
//! edited locally since that save are kept for the next one. File questions
//! always show the server's stored files, minus pending deletes, plus local
//! files that have not been uploaded yet.

use serde::Serialize;

use intake_domain::{
    Answer, Answers, CompositeStores, EntryList, FileDiffTracker, FileRef, FormSchema,
    QuestionId, ResolvedField,
};

use super::types::{ReconcileReport, SentState};

fn same_content<T: Serialize>(a: &T, b: &T) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn merge_files(
    question: &QuestionId,
    local: Option<&Answer>,
    server: Option<&Answer>,
    pending: &FileDiffTracker,
) -> Answer {
    let deleted = pending.deletes_for(question);
    let waiting = pending.pending_for(question);

    let mut files: Vec<FileRef> = match server {
        Some(Answer::Files(stored)) => stored
            .iter()
            .filter(|f| f.file_id().map_or(true, |id| !deleted.contains(id)))
            .filter(|f| !f.is_pending())
            .cloned()
            .collect(),
        _ => Vec::new(),
    };
    if let Some(Answer::Files(current)) = local {
        let still_pending = current.iter().filter(|f| match f {
            FileRef::Pending { token, .. } => waiting.iter().any(|h| h.token == *token),
            FileRef::Persisted { .. } => false,
        });
        files.extend(still_pending.cloned());
    }
    Answer::Files(files)
}

fn merge_list<T>(
    local: &EntryList<T>,
    baseline: Option<&EntryList<T>>,
    server: &EntryList<T>,
    report: &mut ReconcileReport,
) -> EntryList<T>
where
    T: Serialize,
    EntryList<T>: Clone + PartialEq,
{
    if baseline.is_some_and(|b| b != local) {
        report.preserved += 1;
        local.clone()
    } else if same_content(local, server) {
        local.clone()
    } else {
        report.adopted += 1;
        server.clone()
    }
}

pub(super) fn reconcile(
    schema: &FormSchema,
    local: (&Answers, &CompositeStores),
    baseline: Option<&SentState>,
    server: (&Answers, &CompositeStores),
    files: &FileDiffTracker,
) -> (Answers, CompositeStores, ReconcileReport) {
    let (local_answers, local_composites) = local;
    let (server_answers, server_composites) = server;
    let mut report = ReconcileReport::default();
    let mut merged = Answers::new();

    for question in schema.questions() {
        if ResolvedField::for_question(question).kind.answer_shape().is_none() {
            continue;
        }
        let id = &question.id;
        let local_value = local_answers.get(id);

        let value = if question.question_type.is_file() {
            let value = merge_files(id, local_value, server_answers.get(id), files);
            let shown = local_value.cloned().unwrap_or(Answer::Files(Vec::new()));
            if shown != value {
                report.adopted += 1;
            }
            Some(value)
        } else {
            let edited = baseline.is_some_and(|b| b.answers.get(id) != local_value);
            match server_answers.get(id) {
                _ if edited => {
                    report.preserved += 1;
                    local_value.cloned()
                }
                Some(server_value) if Some(server_value) != local_value => {
                    report.adopted += 1;
                    Some(server_value.clone())
                }
                _ => local_value.cloned(),
            }
        };

        if let Some(value) = value {
            if let Err(e) = merged.set(schema, id, value) {
                tracing::warn!(question_id = %id, error = %e, "Dropping unmergeable value");
            }
        }
    }

    let composites = CompositeStores {
        rooms: merge_list(
            &local_composites.rooms,
            baseline.map(|b| &b.composites.rooms),
            &server_composites.rooms,
            &mut report,
        ),
        specials: merge_list(
            &local_composites.specials,
            baseline.map(|b| &b.composites.specials),
            &server_composites.specials,
            &mut report,
        ),
        refunds: merge_list(
            &local_composites.refunds,
            baseline.map(|b| &b.composites.refunds),
            &server_composites.refunds,
            &mut report,
        ),
    };

    (merged, composites, report)
}
