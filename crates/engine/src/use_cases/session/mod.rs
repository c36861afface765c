//! Form session use case.
//!
//! One `FormSession` per opened questionnaire. It owns the answer map, the
//! composite stores, the file diff tracker and the step navigator, and runs
//! the save pipeline against the submission collaborator.
//!
//! Saves are split in two so local edits keep flowing while a request is
//! outstanding: `begin_save` packages a [`SaveTicket`], the caller awaits
//! [`SaveTicket::dispatch`], and `complete_save` applies the result. Only one
//! ticket can be outstanding at a time. `save_draft`, `submit_final` and
//! `on_autosave_tick` run the whole round-trip for callers that do not need
//! to interleave edits.

mod error;
mod reconcile;
mod types;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;

use intake_domain::{
    summary_columns, Answer, Answers, CompositeStores, DomainError, EntryId, FileDiffTracker,
    FileRef, FormSchema, FormValidation, FormView, NextOutcome, PortfolioId, QuestionId,
    QuestionType, RefundPatch, RemovalConfirmer, RemoveOutcome, ResolvedField, RoomPatch,
    SavePayload, SaveReceipt, SpecialPatch, StepNavigator, SubmissionDraft, SubmissionId,
    SummaryColumn,
};

use crate::infrastructure::ports::{DraftLookup, SubmissionApi, TransportError};
use crate::use_cases::render::{apply_field_change, render_step, FieldChange, FileEffect, StepView};

pub use error::SessionError;
pub use types::{
    NoticeStatus, ReconcileReport, SaveKind, SaveNotice, SaveOutcome, SaveTicket, SentState,
    SessionContext, SessionPorts, SessionSettings,
};

pub struct FormSession {
    ports: SessionPorts,
    settings: SessionSettings,
    portfolio_id: Option<PortfolioId>,
    submission_id: Option<SubmissionId>,
    schema: FormSchema,
    answers: Answers,
    composites: CompositeStores,
    files: FileDiffTracker,
    navigator: StepNavigator,
    errors: BTreeMap<QuestionId, String>,
    read_only: bool,
    loaded: bool,
    torn_down: bool,
    save_in_flight: bool,
    save_generation: u64,
    confirmed: Option<SentState>,
    notice: Option<SaveNotice>,
}

impl FormSession {
    pub fn new(ports: SessionPorts, settings: SessionSettings) -> Self {
        Self {
            ports,
            settings,
            portfolio_id: None,
            submission_id: None,
            schema: FormSchema::default(),
            answers: Answers::new(),
            composites: CompositeStores::default(),
            files: FileDiffTracker::new(),
            navigator: StepNavigator::new(),
            errors: BTreeMap::new(),
            read_only: false,
            loaded: false,
            torn_down: false,
            save_in_flight: false,
            save_generation: 0,
            confirmed: None,
            notice: None,
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Fetch the schema and any existing draft, then enter the first step.
    ///
    /// A finalized draft opens in read-only mode regardless of the context.
    pub async fn load(&mut self, context: SessionContext) -> Result<(), SessionError> {
        if self.torn_down {
            return Err(SessionError::TornDown);
        }

        let questions = self.ports.schema.get_questions(&context.portfolio_id).await?;
        let schema = FormSchema::new(questions);

        let lookup = match (&context.submission_id, &context.credentials) {
            (Some(submission_id), _) => Some(DraftLookup::BySubmission(submission_id.clone())),
            (None, Some(credentials)) => Some(DraftLookup::ByPortfolio {
                portfolio_id: context.portfolio_id.clone(),
                credentials: credentials.clone(),
            }),
            (None, None) => None,
        };
        let draft = match lookup {
            Some(lookup) => self.ports.drafts.get_draft(&lookup).await?,
            None => None,
        };

        let (answers, composites) = draft
            .as_ref()
            .map(|d| d.restore(&schema))
            .unwrap_or_default();
        let finalized = draft.as_ref().is_some_and(|d| !d.is_draft);

        self.submission_id = draft
            .and_then(|d| d.submission_id)
            .or(context.submission_id);
        self.portfolio_id = Some(context.portfolio_id);
        self.answers = answers;
        self.composites = composites;
        self.files = FileDiffTracker::new();
        self.errors.clear();
        self.confirmed = None;
        self.read_only = context.read_only || finalized;
        self.schema = schema;
        self.navigator.on_schema_loaded(&self.schema);
        self.loaded = true;

        if !self.read_only && self.settings.autosave.enabled {
            self.ports.scheduler.arm(self.settings.autosave.interval);
        } else {
            self.ports.scheduler.disarm();
        }

        tracing::info!(
            portfolio_id = ?self.portfolio_id,
            submission_id = ?self.submission_id,
            questions = self.schema.questions().len(),
            read_only = self.read_only,
            "Form session loaded"
        );
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn composites(&self) -> &CompositeStores {
        &self.composites
    }

    pub fn file_diff(&self) -> &FileDiffTracker {
        &self.files
    }

    pub fn errors(&self) -> &BTreeMap<QuestionId, String> {
        &self.errors
    }

    pub fn submission_id(&self) -> Option<&SubmissionId> {
        self.submission_id.as_ref()
    }

    pub fn current_step(&self) -> Option<i32> {
        self.navigator.current_step()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_save_in_flight(&self) -> bool {
        self.save_in_flight
    }

    pub fn notice(&self) -> Option<&SaveNotice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// The save endpoint, for callers driving `begin_save`/`complete_save`.
    pub fn submission_api(&self) -> Arc<dyn SubmissionApi> {
        Arc::clone(&self.ports.submissions)
    }

    /// The current step's view. `None` while loading.
    pub fn render(&self) -> Option<StepView> {
        render_step(
            &self.schema,
            &self.navigator,
            &self.answers,
            &self.composites,
            &self.errors,
            self.read_only,
        )
    }

    /// Spreadsheet-style summary of the current answers.
    pub fn summary(&self) -> Vec<SummaryColumn> {
        summary_columns(&self.schema, &self.answers, &self.composites)
    }

    fn view(&self) -> FormView<'_> {
        FormView {
            schema: &self.schema,
            answers: &self.answers,
            composites: &self.composites,
            files: &self.files,
            rules: self.settings.rules,
        }
    }

    pub fn validate_all(&self) -> FormValidation {
        self.view().validate_all()
    }

    fn ensure_loaded(&self) -> Result<(), SessionError> {
        if self.torn_down {
            return Err(SessionError::TornDown);
        }
        if !self.loaded {
            return Err(SessionError::NotLoaded);
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        self.ensure_loaded()?;
        if self.read_only {
            return Err(SessionError::ReadOnly);
        }
        Ok(())
    }

    // =========================================================================
    // Field edits
    // =========================================================================

    /// Apply an edit to a non-composite question and clear its error.
    pub fn change_field(
        &mut self,
        question_id: &QuestionId,
        change: FieldChange,
    ) -> Result<(), SessionError> {
        self.ensure_editable()?;
        let question = self
            .schema
            .find(question_id)
            .ok_or_else(|| DomainError::not_found("Question", question_id.as_str()))?;
        let resolved = ResolvedField::for_question(question);
        let update =
            apply_field_change(question, &resolved, self.answers.get(question_id), change)?;

        self.answers.set(&self.schema, question_id, update.answer)?;
        for effect in update.file_effects {
            match effect {
                FileEffect::Record(handle) => self.files.record_new_file(question_id, handle),
                FileEffect::Retract(token) => {
                    self.files.retract_token(question_id, token);
                }
                FileEffect::Delete(file_id) => self.files.record_delete(question_id, file_id),
            }
        }
        self.errors.remove(question_id);
        Ok(())
    }

    /// Write a whole answer value. Refused when its shape does not fit the question.
    pub fn set_answer(
        &mut self,
        question_id: &QuestionId,
        answer: Answer,
    ) -> Result<(), SessionError> {
        self.ensure_editable()?;
        if matches!(answer, Answer::Files(_)) {
            let message = "file answers change through attach and delete";
            return Err(DomainError::constraint(message).into());
        }
        self.answers.set(&self.schema, question_id, answer)?;
        self.errors.remove(question_id);
        Ok(())
    }

    // =========================================================================
    // Composite lists
    // =========================================================================

    fn clear_composite_error(&mut self, question_type: QuestionType) {
        if let Some(question) = self.schema.composite_question(&question_type) {
            self.errors.remove(&question.id);
        }
    }

    /// Returns the id of the new room.
    pub fn add_room(&mut self) -> Result<EntryId, SessionError> {
        self.ensure_editable()?;
        let rooms = self.composites.rooms.add();
        let id = rooms
            .entries()
            .last()
            .map(|r| r.id)
            .ok_or_else(|| DomainError::constraint("room list is empty after add"))?;
        self.composites.rooms = rooms;
        self.clear_composite_error(QuestionType::Parlor);
        Ok(id)
    }

    /// Returns false when the confirmer declined.
    pub fn remove_room(
        &mut self,
        id: EntryId,
        confirmer: &dyn RemovalConfirmer,
    ) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        match self.composites.rooms.remove(id, confirmer)? {
            RemoveOutcome::Removed(rooms) => {
                self.composites.rooms = rooms;
                self.clear_composite_error(QuestionType::Parlor);
                Ok(true)
            }
            RemoveOutcome::Declined => Ok(false),
        }
    }

    pub fn update_room(&mut self, id: EntryId, patch: RoomPatch) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.composites.rooms = self.composites.rooms.update(id, patch)?;
        self.clear_composite_error(QuestionType::Parlor);
        Ok(())
    }

    pub fn add_special(&mut self) -> Result<EntryId, SessionError> {
        self.ensure_editable()?;
        let specials = self.composites.specials.add();
        let id = specials
            .entries()
            .last()
            .map(|s| s.id)
            .ok_or_else(|| DomainError::constraint("special list is empty after add"))?;
        self.composites.specials = specials;
        self.clear_composite_error(QuestionType::Special);
        Ok(id)
    }

    pub fn remove_special(
        &mut self,
        id: EntryId,
        confirmer: &dyn RemovalConfirmer,
    ) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        match self.composites.specials.remove(id, confirmer)? {
            RemoveOutcome::Removed(specials) => {
                self.composites.specials = specials;
                self.clear_composite_error(QuestionType::Special);
                Ok(true)
            }
            RemoveOutcome::Declined => Ok(false),
        }
    }

    pub fn update_special(&mut self, id: EntryId, patch: SpecialPatch) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.composites.specials = self.composites.specials.update(id, patch)?;
        self.clear_composite_error(QuestionType::Special);
        Ok(())
    }

    pub fn add_refund_tier(&mut self) -> Result<EntryId, SessionError> {
        self.ensure_editable()?;
        let refunds = self.composites.refunds.add();
        let id = refunds
            .entries()
            .last()
            .map(|t| t.id)
            .ok_or_else(|| DomainError::constraint("refund schedule is empty after add"))?;
        self.composites.refunds = refunds;
        self.clear_composite_error(QuestionType::Refund);
        Ok(id)
    }

    pub fn remove_refund_tier(&mut self, id: EntryId) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.composites.refunds = self.composites.refunds.remove(id)?;
        self.clear_composite_error(QuestionType::Refund);
        Ok(())
    }

    pub fn update_refund_tier(
        &mut self,
        id: EntryId,
        patch: RefundPatch,
    ) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.composites.refunds = self.composites.refunds.update(id, patch)?;
        self.clear_composite_error(QuestionType::Refund);
        Ok(())
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Move forward. In edit mode the current step is validated first and a
    /// successful move saves the draft. A failed save does not undo the move;
    /// it is reported through the notice.
    pub async fn next(&mut self) -> Result<NextOutcome, SessionError> {
        self.ensure_loaded()?;
        let view = FormView {
            schema: &self.schema,
            answers: &self.answers,
            composites: &self.composites,
            files: &self.files,
            rules: self.settings.rules,
        };
        let outcome = self
            .navigator
            .next(&self.schema, self.read_only, |step| view.validate_step(step))?;

        match &outcome {
            NextOutcome::Blocked(result) => {
                tracing::debug!(
                    step = ?self.navigator.current_step(),
                    errors = result.errors.len(),
                    "Step blocked by validation"
                );
                self.errors = result.errors.clone();
            }
            NextOutcome::Advanced { from, to } => {
                tracing::info!(from, to, "Advanced to next step");
                self.errors.clear();
                if !self.read_only {
                    self.save_on_transition().await;
                }
            }
            NextOutcome::Stayed(step) => {
                tracing::debug!(step, "Already at the last step");
            }
        }
        Ok(outcome)
    }

    async fn save_on_transition(&mut self) {
        if self.save_in_flight {
            tracing::debug!("Step save skipped: save in flight");
            return;
        }
        if let Err(e) = self.run_save(SaveKind::StepTransition).await {
            tracing::warn!(error = %e, "Step transition save failed");
        }
    }

    /// Move back one step. Never validates.
    pub fn previous(&mut self) -> Result<i32, SessionError> {
        self.ensure_loaded()?;
        let step = self.navigator.previous(&self.schema)?;
        self.errors.clear();
        tracing::debug!(step, "Moved to previous step");
        Ok(step)
    }

    /// Jump to a step; in edit mode only backward. Clears validation errors.
    pub fn go_to(&mut self, step: i32) -> Result<i32, SessionError> {
        self.ensure_loaded()?;
        let step = self.navigator.go_to(&self.schema, step, self.read_only)?;
        self.errors.clear();
        Ok(step)
    }

    // =========================================================================
    // Save pipeline
    // =========================================================================

    /// Package the current state into a save request.
    ///
    /// Final submission validates every step first and records the field
    /// errors when it is blocked.
    pub fn begin_save(&mut self, kind: SaveKind) -> Result<SaveTicket, SessionError> {
        self.ensure_editable()?;
        if self.save_in_flight {
            return Err(SessionError::SaveInFlight);
        }
        if kind == SaveKind::Final {
            let validation = self.view().validate_all();
            if !validation.valid {
                let summary = validation.summary().unwrap_or_default();
                tracing::info!(steps = ?validation.incomplete_steps, "Final submission blocked");
                self.errors = validation.errors;
                return Err(SessionError::Incomplete {
                    steps: validation.incomplete_steps,
                    summary,
                });
            }
        }

        let portfolio_id = self.portfolio_id.clone().ok_or(SessionError::NotLoaded)?;
        let payload = SavePayload::build(
            portfolio_id,
            self.submission_id.clone(),
            &self.schema,
            &self.answers,
            &self.composites,
            self.files.snapshot(),
        );

        self.save_in_flight = true;
        self.save_generation += 1;
        tracing::debug!(
            kind = %kind,
            generation = self.save_generation,
            file_ops = payload.file_ops.len(),
            "Save started"
        );

        Ok(SaveTicket {
            kind,
            generation: self.save_generation,
            payload,
            sent: SentState {
                answers: self.answers.clone(),
                composites: self.composites.clone(),
            },
        })
    }

    /// Apply the result of a dispatched ticket.
    ///
    /// On success the server id is adopted, the file operations the ticket
    /// carried are acknowledged, uploaded files turn into their stored form
    /// and the autosave timer restarts. On failure local state and the file
    /// diff are kept for the retry. Results arriving after teardown are
    /// discarded.
    pub fn complete_save(
        &mut self,
        mut ticket: SaveTicket,
        result: Result<SaveReceipt, TransportError>,
    ) -> Result<SaveOutcome, SessionError> {
        if self.torn_down {
            tracing::debug!(kind = %ticket.kind, "Discarding save result for torn-down session");
            return Ok(SaveOutcome::Discarded);
        }
        if !self.save_in_flight || ticket.generation != self.save_generation {
            return Err(SessionError::StaleTicket);
        }
        self.save_in_flight = false;
        let at = self.ports.clock.now();

        match result {
            Ok(receipt) => {
                let submission_id = receipt.submission_id.clone();
                match &self.submission_id {
                    None => {
                        tracing::info!(
                            submission_id = %submission_id,
                            "Adopted server-issued submission id"
                        );
                    }
                    Some(existing) if *existing != submission_id => {
                        tracing::warn!(
                            local = %existing,
                            server = %submission_id,
                            "Server answered with a different submission id"
                        );
                    }
                    Some(_) => {}
                }
                self.submission_id = Some(submission_id.clone());
                self.files.acknowledge(&ticket.payload.included_file_ops());
                promote_uploaded(
                    &ticket.payload,
                    &receipt,
                    [&mut self.answers, &mut ticket.sent.answers],
                );
                self.confirmed = Some(ticket.sent);

                if ticket.kind == SaveKind::Final {
                    self.read_only = true;
                    self.ports.scheduler.disarm();
                    tracing::info!(submission_id = %submission_id, "Final submission accepted");
                } else if self.settings.autosave.enabled {
                    self.ports.scheduler.arm(self.settings.autosave.interval);
                }

                tracing::debug!(kind = %ticket.kind, "Save completed");
                self.notice = Some(SaveNotice {
                    kind: ticket.kind,
                    at,
                    status: NoticeStatus::Saved,
                });
                Ok(SaveOutcome::Saved { submission_id })
            }
            Err(e) => {
                tracing::warn!(
                    kind = %ticket.kind,
                    error = %e,
                    "Save failed, keeping local state for retry"
                );
                self.notice = Some(SaveNotice {
                    kind: ticket.kind,
                    at,
                    status: NoticeStatus::Failed {
                        message: e.to_string(),
                        retriable: e.is_retriable(),
                    },
                });
                Err(SessionError::Transport(e))
            }
        }
    }

    async fn run_save(&mut self, kind: SaveKind) -> Result<SaveOutcome, SessionError> {
        let ticket = self.begin_save(kind)?;
        let api = self.submission_api();
        let result = ticket.dispatch(api.as_ref()).await;
        self.complete_save(ticket, result)
    }

    /// User-triggered draft save. Restarts the autosave countdown.
    pub async fn save_draft(&mut self) -> Result<SaveOutcome, SessionError> {
        self.run_save(SaveKind::Manual).await
    }

    /// Validate everything and submit. On success the session turns read-only.
    pub async fn submit_final(&mut self) -> Result<SaveOutcome, SessionError> {
        self.run_save(SaveKind::Final).await
    }

    /// Handle one autosave interval. Skipped while a save is outstanding,
    /// in read-only mode or when the timer is disarmed.
    pub async fn on_autosave_tick(&mut self) -> Result<Option<SaveOutcome>, SessionError> {
        if self.torn_down || !self.loaded || self.read_only || !self.ports.scheduler.is_armed() {
            tracing::debug!("Autosave tick ignored");
            return Ok(None);
        }
        if self.save_in_flight {
            tracing::debug!("Autosave tick skipped: save in flight");
            return Ok(None);
        }
        self.run_save(SaveKind::Autosave).await.map(Some)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Merge a re-fetched draft into local state.
    pub fn reconcile(&mut self, draft: &SubmissionDraft) -> ReconcileReport {
        if self.torn_down || !self.loaded {
            return ReconcileReport::default();
        }
        let (server_answers, server_composites) = draft.restore(&self.schema);
        let (answers, composites, report) = reconcile::reconcile(
            &self.schema,
            (&self.answers, &self.composites),
            self.confirmed.as_ref(),
            (&server_answers, &server_composites),
            &self.files,
        );
        self.answers = answers;
        self.composites = composites;
        tracing::debug!(
            adopted = report.adopted,
            preserved = report.preserved,
            "Reconciled with server draft"
        );
        report
    }

    /// Re-fetch the saved draft and reconcile with it.
    pub async fn refresh(&mut self) -> Result<ReconcileReport, SessionError> {
        self.ensure_loaded()?;
        let submission_id = self.submission_id.clone().ok_or_else(|| {
            DomainError::invalid_state_transition("nothing saved yet to refresh from")
        })?;
        let draft = self
            .ports
            .drafts
            .get_draft(&DraftLookup::BySubmission(submission_id.clone()))
            .await?
            .ok_or_else(|| TransportError::not_found("Submission", &submission_id))?;
        Ok(self.reconcile(&draft))
    }

    // =========================================================================
    // Files and teardown
    // =========================================================================

    /// Re-download a stored file.
    pub async fn download(&self, file: &FileRef) -> Result<Vec<u8>, SessionError> {
        let file_id = file.file_id().ok_or_else(|| {
            DomainError::validation(format!("file '{}' has not been uploaded yet", file.name()))
        })?;
        Ok(self.ports.files.download_file(file_id).await?)
    }

    /// Stop the autosave timer. Save results arriving later are discarded.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.ports.scheduler.disarm();
        tracing::info!(submission_id = ?self.submission_id, "Form session torn down");
    }
}

/// Swap the pending refs a save uploaded for the files the server stored.
fn promote_uploaded(
    payload: &SavePayload,
    receipt: &SaveReceipt,
    mut targets: [&mut Answers; 2],
) {
    for op in &payload.file_ops {
        for file in &op.new_files {
            let Some(issued) = receipt.issued(file.token) else {
                tracing::warn!(
                    question_id = %op.question_id,
                    name = %file.name,
                    "Server did not report an id for an uploaded file"
                );
                continue;
            };
            for answers in &mut targets {
                answers.promote_pending(
                    &op.question_id,
                    file.token,
                    issued.file_id.clone(),
                    issued.url.clone(),
                );
            }
        }
    }
}
