use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use intake_domain::{
    CompositeKind, DayBucket, FileHandle, FileId, Question, QuestionType, SaveReceipt, Season,
};
use mockall::predicate::*;
use serde_json::Value;

use super::*;
use crate::infrastructure::clock::FixedClock;
use crate::infrastructure::config::AutosaveConfig;
use crate::infrastructure::in_memory::InMemoryBackend;
use crate::infrastructure::ports::{
    AutosaveScheduler, Credentials, MockAutosaveScheduler, MockClockPort, MockDraftSource,
    MockFileDownloader, MockSchemaSource, MockSubmissionApi,
};
use crate::infrastructure::scheduler::ManualScheduler;

const INTERVAL: Duration = Duration::from_secs(180);

fn questions() -> Vec<Question> {
    vec![
        Question::new("rooms", 5, 0, QuestionType::Parlor).required(),
        Question::new("intro", 0, 0, QuestionType::Agreement),
        Question::new("name", 2, 0, QuestionType::Text)
            .required()
            .with_title("숙소명"),
        Question::new("logo", 2, 1, QuestionType::File),
    ]
}

/// Same form with the logo upload made mandatory.
fn required_logo_questions() -> Vec<Question> {
    questions()
        .into_iter()
        .map(|q| if q.id.as_str() == "logo" { q.required() } else { q })
        .collect()
}

fn qid(id: &str) -> QuestionId {
    QuestionId::from(id)
}

/// Receipt issuing `f1`, `f2`, ... for every file the payload uploads.
fn receipt_for(payload: &SavePayload, submission_id: &str) -> SaveReceipt {
    payload
        .file_ops
        .iter()
        .flat_map(|op| &op.new_files)
        .enumerate()
        .fold(
            SaveReceipt::new(SubmissionId::from(submission_id)),
            |receipt, (i, file)| receipt.with_file(file.token, format!("f{}", i + 1)),
        )
}

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
        .single()
        .expect("valid time")
}

fn schema_source(questions: Vec<Question>) -> MockSchemaSource {
    let mut schema = MockSchemaSource::new();
    schema
        .expect_get_questions()
        .with(eq(PortfolioId::from("p1")))
        .returning(move |_| Ok(questions.clone()));
    schema
}

struct Harness {
    scheduler: Arc<ManualScheduler>,
    session: FormSession,
}

fn harness(drafts: MockDraftSource, api: MockSubmissionApi, files: MockFileDownloader) -> Harness {
    harness_with(questions(), drafts, api, files)
}

fn harness_with(
    questions: Vec<Question>,
    drafts: MockDraftSource,
    api: MockSubmissionApi,
    files: MockFileDownloader,
) -> Harness {
    let scheduler = Arc::new(ManualScheduler::new());
    let ports = SessionPorts {
        schema: Arc::new(schema_source(questions)),
        drafts: Arc::new(drafts),
        submissions: Arc::new(api),
        files: Arc::new(files),
        clock: Arc::new(FixedClock(fixed_time())),
        scheduler: scheduler.clone(),
    };
    let settings = SessionSettings {
        autosave: AutosaveConfig {
            enabled: true,
            interval: INTERVAL,
        },
        ..SessionSettings::default()
    };
    Harness {
        scheduler,
        session: FormSession::new(ports, settings),
    }
}

async fn loaded(api: MockSubmissionApi) -> Harness {
    let mut h = harness(MockDraftSource::new(), api, MockFileDownloader::new());
    h.session
        .load(SessionContext::new("p1"))
        .await
        .expect("session loads");
    h
}

fn backend_ports(backend: Arc<InMemoryBackend>, scheduler: Arc<ManualScheduler>) -> SessionPorts {
    SessionPorts {
        schema: backend.clone(),
        drafts: backend.clone(),
        submissions: backend.clone(),
        files: backend,
        clock: Arc::new(FixedClock(Utc::now())),
        scheduler,
    }
}

fn fill_room(session: &mut FormSession) {
    let id = session.composites().rooms.entries()[0].id;
    let fields = [
        RoomPatch::Name("디럭스".into()),
        RoomPatch::Desc("바다 전망".into()),
        RoomPatch::StandardOccupancy("2".into()),
        RoomPatch::MaxOccupancy("4".into()),
        RoomPatch::RoomType("원룸".into()),
    ];
    for patch in fields {
        session.update_room(id, patch).expect("room field");
    }
    for season in [Season::Low, Season::Mid, Season::High] {
        for day in [DayBucket::Weekday, DayBucket::Fri, DayBucket::Sat, DayBucket::Sun] {
            session
                .update_room(
                    id,
                    RoomPatch::Price {
                        season,
                        day,
                        value: "100000".into(),
                    },
                )
                .expect("room price");
        }
    }
}

// =============================================================================
// Loading and modes
// =============================================================================

#[tokio::test]
async fn load_enters_first_present_step_and_arms_autosave() {
    let h = loaded(MockSubmissionApi::new()).await;

    assert_eq!(h.session.current_step(), Some(0));
    assert!(h.scheduler.is_armed());
    assert!(h.session.submission_id().is_none());

    let view = h.session.render().expect("step view");
    assert_eq!(view.label, "안내사항");
    assert_eq!(view.progress, Some(1.0 / 6.0));
}

#[tokio::test]
async fn credentials_lookup_seeds_existing_draft() {
    let mut drafts = MockDraftSource::new();
    drafts
        .expect_get_draft()
        .withf(|lookup| match lookup {
            DraftLookup::ByPortfolio { credentials, .. } => credentials.member_id == "m1",
            DraftLookup::BySubmission(_) => false,
        })
        .times(1)
        .returning(|_| {
            let mut document = serde_json::Map::new();
            document.insert("name".into(), Value::String("바다펜션".into()));
            Ok(Some(SubmissionDraft {
                portfolio_id: PortfolioId::from("p1"),
                submission_id: Some(SubmissionId::from("41")),
                document,
                is_draft: true,
            }))
        });

    let mut h = harness(drafts, MockSubmissionApi::new(), MockFileDownloader::new());
    h.session
        .load(SessionContext::new("p1").with_credentials(Credentials {
            member_id: "m1".into(),
            access_token: "token".into(),
        }))
        .await
        .expect("session loads");

    assert_eq!(h.session.submission_id(), Some(&SubmissionId::from("41")));
    assert_eq!(h.session.answers().get(&qid("name")), Some(&Answer::Text("바다펜션".into())));
    assert!(!h.session.is_read_only());
}

#[tokio::test]
async fn finalized_draft_opens_read_only() {
    let mut drafts = MockDraftSource::new();
    drafts.expect_get_draft().returning(|_| {
        Ok(Some(SubmissionDraft {
            portfolio_id: PortfolioId::from("p1"),
            submission_id: Some(SubmissionId::from("9")),
            document: serde_json::Map::new(),
            is_draft: false,
        }))
    });

    let mut h = harness(drafts, MockSubmissionApi::new(), MockFileDownloader::new());
    h.session
        .load(SessionContext::new("p1").with_submission("9"))
        .await
        .expect("session loads");

    assert!(h.session.is_read_only());
    assert!(!h.scheduler.is_armed());
}

#[tokio::test]
async fn detail_mode_navigates_without_validation_or_edits() {
    let mut h = harness(
        MockDraftSource::new(),
        MockSubmissionApi::new(),
        MockFileDownloader::new(),
    );
    h.session
        .load(SessionContext::new("p1").detail())
        .await
        .expect("session loads");

    let err = h
        .session
        .change_field(&qid("name"), FieldChange::Text("x".into()))
        .expect_err("edits refused");
    assert!(matches!(err, SessionError::ReadOnly));
    assert!(matches!(h.session.add_room(), Err(SessionError::ReadOnly)));

    // Required "name" is empty, yet detail mode walks straight through.
    h.session.next().await.expect("next");
    let outcome = h.session.next().await.expect("next");
    assert_eq!(outcome, NextOutcome::Advanced { from: 2, to: 5 });
    assert!(h.session.go_to(0).is_ok());
    assert!(!h.scheduler.is_armed());
}

#[tokio::test]
async fn detail_mode_never_arms_the_timer() {
    let mut scheduler = MockAutosaveScheduler::new();
    scheduler.expect_arm().never();
    scheduler.expect_disarm().times(1).return_const(());

    let ports = SessionPorts {
        schema: Arc::new(schema_source(questions())),
        drafts: Arc::new(MockDraftSource::new()),
        submissions: Arc::new(MockSubmissionApi::new()),
        files: Arc::new(MockFileDownloader::new()),
        clock: Arc::new(MockClockPort::new()),
        scheduler: Arc::new(scheduler),
    };
    let mut session = FormSession::new(ports, SessionSettings::default());

    session
        .load(SessionContext::new("p1").detail())
        .await
        .expect("session loads");
    assert!(session.is_read_only());
}

#[tokio::test]
async fn operations_before_load_are_refused() {
    let mut h = harness(
        MockDraftSource::new(),
        MockSubmissionApi::new(),
        MockFileDownloader::new(),
    );
    assert!(matches!(h.session.previous(), Err(SessionError::NotLoaded)));
    assert!(h.session.render().is_none());
}

// =============================================================================
// Navigation
// =============================================================================

#[tokio::test]
async fn next_is_blocked_by_validation_and_edit_clears_the_error() {
    let mut api = MockSubmissionApi::new();
    api.expect_save_draft().returning(|_| Ok(SubmissionId::from("77").into()));
    let mut h = loaded(api).await;

    h.session.next().await.expect("leave step 0");
    let outcome = h.session.next().await.expect("next");

    assert!(matches!(outcome, NextOutcome::Blocked(_)));
    assert_eq!(h.session.current_step(), Some(2));
    assert!(h.session.errors().contains_key(&qid("name")));

    h.session
        .change_field(&qid("name"), FieldChange::Text("바다펜션".into()))
        .expect("edit");
    assert!(h.session.errors().is_empty());

    let outcome = h.session.next().await.expect("next");
    assert_eq!(outcome, NextOutcome::Advanced { from: 2, to: 5 });
}

#[tokio::test]
async fn advancing_saves_the_draft_and_adopts_the_server_id() {
    let mut api = MockSubmissionApi::new();
    api.expect_save_draft()
        .withf(|p| p.submission_id.is_none())
        .times(1)
        .returning(|_| Ok(SubmissionId::from("77").into()));
    let mut h = loaded(api).await;

    let outcome = h.session.next().await.expect("next");

    assert_eq!(outcome, NextOutcome::Advanced { from: 0, to: 2 });
    assert_eq!(h.session.submission_id(), Some(&SubmissionId::from("77")));
    let notice = h.session.notice().expect("notice");
    assert_eq!(notice.kind, SaveKind::StepTransition);
    assert_eq!(notice.status, NoticeStatus::Saved);
}

#[tokio::test]
async fn failed_step_save_still_advances() {
    let mut api = MockSubmissionApi::new();
    api.expect_save_draft()
        .returning(|_| Err(TransportError::network("save_draft", "connection reset")));
    let mut h = loaded(api).await;

    let outcome = h.session.next().await.expect("next");

    assert_eq!(outcome, NextOutcome::Advanced { from: 0, to: 2 });
    assert!(h.session.notice().is_some_and(SaveNotice::is_failure));
}

#[tokio::test]
async fn previous_never_validates() {
    let mut api = MockSubmissionApi::new();
    api.expect_save_draft().returning(|_| Ok(SubmissionId::from("77").into()));
    let mut h = loaded(api).await;

    h.session.next().await.expect("next");
    h.session.next().await.expect("blocked next");
    assert!(!h.session.errors().is_empty());

    assert_eq!(h.session.previous().expect("previous"), 0);
    assert!(h.session.errors().is_empty());
    assert_eq!(h.session.previous().expect("previous at first"), 0);
}

#[tokio::test]
async fn jumping_back_clears_stale_errors() {
    let mut api = MockSubmissionApi::new();
    api.expect_save_draft().returning(|_| Ok(SubmissionId::from("77").into()));
    let mut h = loaded(api).await;

    h.session.next().await.expect("next");
    h.session.next().await.expect("blocked next");
    assert!(h.session.errors().contains_key(&qid("name")));

    assert_eq!(h.session.go_to(0).expect("jump back"), 0);
    assert!(h.session.errors().is_empty());
}

// =============================================================================
// Saving
// =============================================================================

#[tokio::test]
async fn autosave_tick_saves_and_reuses_the_issued_id() {
    let mut api = MockSubmissionApi::new();
    api.expect_save_draft()
        .withf(|p| p.submission_id.is_none())
        .times(1)
        .returning(|_| Ok(SubmissionId::from("77").into()));
    api.expect_save_draft()
        .withf(|p| p.submission_id == Some(SubmissionId::from("77")))
        .times(1)
        .returning(|_| Ok(SubmissionId::from("77").into()));
    let mut h = loaded(api).await;

    assert_eq!(h.scheduler.advance(INTERVAL), 1);
    let first = h.session.on_autosave_tick().await.expect("tick");
    assert_eq!(
        first,
        Some(SaveOutcome::Saved {
            submission_id: SubmissionId::from("77")
        })
    );

    assert_eq!(h.scheduler.advance(INTERVAL), 1);
    h.session.on_autosave_tick().await.expect("tick");
    assert_eq!(h.scheduler.arm_count(), 3);
}

#[tokio::test]
async fn manual_save_restarts_the_countdown() {
    let mut api = MockSubmissionApi::new();
    api.expect_save_draft().returning(|_| Ok(SubmissionId::from("77").into()));
    let mut h = loaded(api).await;

    h.scheduler.advance(Duration::from_secs(170));
    h.session.save_draft().await.expect("manual save");

    assert!(h.scheduler.is_armed());
    assert_eq!(h.scheduler.advance(Duration::from_secs(20)), 0);
}

#[tokio::test]
async fn tick_is_skipped_while_a_save_is_in_flight() {
    let mut h = loaded(MockSubmissionApi::new()).await;

    let ticket = h.session.begin_save(SaveKind::Manual).expect("ticket");
    assert!(matches!(h.session.begin_save(SaveKind::Manual), Err(SessionError::SaveInFlight)));

    h.scheduler.advance(INTERVAL);
    assert_eq!(h.session.on_autosave_tick().await.expect("tick"), None);

    h.session
        .complete_save(ticket, Ok(SubmissionId::from("5").into()))
        .expect("complete");
    assert!(!h.session.is_save_in_flight());
}

#[tokio::test]
async fn payload_nulls_file_questions_and_carries_file_ops() {
    let mut api = MockSubmissionApi::new();
    api.expect_save_draft()
        .withf(|p| {
            p.answers.get("logo") == Some(&Value::Null)
                && p.file_ops.len() == 1
                && p.file_ops[0].question_id == QuestionId::from("logo")
                && p.file_ops[0].step == 2
                && p.file_ops[0].new_files.len() == 1
        })
        .times(1)
        .returning(|_| Ok(SubmissionId::from("77").into()));
    let mut h = loaded(api).await;

    h.session
        .change_field(
            &qid("logo"),
            FieldChange::AttachFile(FileHandle::new(
                "logo.png",
                Some("image/png".into()),
                vec![1, 2, 3],
            )),
        )
        .expect("attach");
    h.session.save_draft().await.expect("save");

    assert!(h.session.file_diff().is_empty());
}

#[tokio::test]
async fn failed_save_keeps_the_diff_for_retry() {
    let mut api = MockSubmissionApi::new();
    api.expect_save_draft()
        .times(1)
        .returning(|_| Err(TransportError::rejected(503, "maintenance")));
    api.expect_save_draft()
        .times(1)
        .returning(|_| Ok(SubmissionId::from("77").into()));
    let mut h = loaded(api).await;

    let logo = FileHandle::new("a.png", None, vec![1]);
    h.session
        .change_field(&qid("logo"), FieldChange::AttachFile(logo))
        .expect("attach");

    let err = h.session.save_draft().await.expect_err("save fails");
    assert!(err.is_retriable());
    assert!(h.session.file_diff().has_pending(&qid("logo")));
    let notice = h.session.notice().expect("notice");
    assert!(matches!(notice.status, NoticeStatus::Failed { retriable: true, .. }));
    assert_eq!(notice.at, fixed_time());

    h.session.save_draft().await.expect("retry");
    assert!(h.session.file_diff().is_empty());
    assert_eq!(h.session.notice().map(|n| &n.status), Some(&NoticeStatus::Saved));
}

#[tokio::test]
async fn notice_is_stamped_with_the_clock() {
    let saved_at = Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 0).single().expect("valid time");
    let mut clock = MockClockPort::new();
    clock.expect_now().times(1).return_const(saved_at);
    let mut api = MockSubmissionApi::new();
    api.expect_save_draft().returning(|_| Ok(SubmissionId::from("77").into()));

    let ports = SessionPorts {
        schema: Arc::new(schema_source(questions())),
        drafts: Arc::new(MockDraftSource::new()),
        submissions: Arc::new(api),
        files: Arc::new(MockFileDownloader::new()),
        clock: Arc::new(clock),
        scheduler: Arc::new(ManualScheduler::new()),
    };
    let mut session = FormSession::new(ports, SessionSettings::default());
    session.load(SessionContext::new("p1")).await.expect("load");

    session.save_draft().await.expect("save");

    let notice = session.notice().expect("notice");
    assert_eq!(notice.at, saved_at);
    assert_eq!(notice.kind, SaveKind::Manual);
    session.dismiss_notice();
    assert!(session.notice().is_none());
}

#[tokio::test]
async fn edits_during_a_save_stay_for_the_next_one() {
    let mut h = loaded(MockSubmissionApi::new()).await;
    let logo = qid("logo");

    h.session
        .change_field(&logo, FieldChange::AttachFile(FileHandle::new("first.png", None, vec![1])))
        .expect("attach");
    let ticket = h.session.begin_save(SaveKind::Manual).expect("ticket");

    let second = FileHandle::new("second.png", None, vec![2]);
    let second_token = second.token;
    h.session
        .change_field(&logo, FieldChange::AttachFile(second))
        .expect("attach during save");

    h.session
        .complete_save(ticket, Ok(SubmissionId::from("77").into()))
        .expect("complete");

    let pending = h.session.file_diff().pending_for(&logo);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].token, second_token);
    // The first file was pending and was superseded, so nothing is left to delete.
    assert!(h.session.file_diff().deletes_for(&logo).is_empty());
}

#[tokio::test]
async fn stale_ticket_is_rejected() {
    let mut h = loaded(MockSubmissionApi::new()).await;

    let ticket = h.session.begin_save(SaveKind::Manual).expect("ticket");
    let copy = ticket.clone();
    h.session
        .complete_save(ticket, Ok(SubmissionId::from("1").into()))
        .expect("complete");

    let err = h
        .session
        .complete_save(copy, Ok(SubmissionId::from("1").into()))
        .expect_err("stale");
    assert!(matches!(err, SessionError::StaleTicket));
}

#[tokio::test]
async fn results_after_teardown_are_discarded() {
    let mut h = loaded(MockSubmissionApi::new()).await;

    let ticket = h.session.begin_save(SaveKind::Autosave).expect("ticket");
    h.session.teardown();
    assert!(!h.scheduler.is_armed());

    let outcome = h
        .session
        .complete_save(ticket, Ok(SubmissionId::from("77").into()))
        .expect("discarded");
    assert_eq!(outcome, SaveOutcome::Discarded);
    assert!(h.session.submission_id().is_none());
    assert_eq!(h.session.on_autosave_tick().await.expect("tick"), None);
}

#[tokio::test]
async fn final_submission_is_blocked_until_complete() {
    let api = MockSubmissionApi::new();
    let mut h = loaded(api).await;

    let err = h.session.submit_final().await.expect_err("blocked");
    let SessionError::Incomplete { steps, summary } = err else {
        panic!("expected incomplete error");
    };
    assert_eq!(steps, vec![2, 5]);
    assert_eq!(summary, "2, 5단계에 미완성된 필수 항목이 있습니다.");
    assert!(h.session.errors().contains_key(&qid("name")));
    assert!(h.session.errors().contains_key(&qid("rooms")));
    assert!(!h.session.is_save_in_flight());
}

#[tokio::test]
async fn final_submission_freezes_the_session() {
    let mut api = MockSubmissionApi::new();
    api.expect_submit_final()
        .withf(|p| p.composites.rooms.len() == 1 && p.submission_id.is_none())
        .times(1)
        .returning(|_| Ok(SubmissionId::from("100").into()));
    let mut h = loaded(api).await;

    h.session
        .change_field(&qid("name"), FieldChange::Text("바다펜션".into()))
        .expect("name");
    fill_room(&mut h.session);

    let outcome = h.session.submit_final().await.expect("submitted");

    assert_eq!(
        outcome,
        SaveOutcome::Saved {
            submission_id: SubmissionId::from("100")
        }
    );
    assert!(h.session.is_read_only());
    assert!(!h.scheduler.is_armed());
    assert!(matches!(h.session.save_draft().await, Err(SessionError::ReadOnly)));
}

// =============================================================================
// Composite lists
// =============================================================================

#[tokio::test]
async fn composite_edits_follow_list_rules() {
    let mut h = loaded(MockSubmissionApi::new()).await;
    let first = h.session.composites().rooms.entries()[0].id;

    h.session
        .update_room(first, RoomPatch::Name("스탠다드".into()))
        .expect("rename");
    let copy = h.session.add_room().expect("add room");
    assert_eq!(h.session.composites().rooms.entries()[1].name, "스탠다드");

    let declined = h
        .session
        .remove_room(copy, &|_: CompositeKind, _: usize| false)
        .expect("asked");
    assert!(!declined);
    assert_eq!(h.session.composites().rooms.len(), 2);

    assert!(h.session.remove_room(copy, &|_: CompositeKind, _: usize| true).expect("removed"));
    let err = h
        .session
        .remove_room(first, &|_: CompositeKind, _: usize| true)
        .expect_err("last room stays");
    assert!(matches!(err, SessionError::Domain(DomainError::Constraint(_))));

    let fixed = h.session.composites().refunds.entries()[1].id;
    assert!(h.session.remove_refund_tier(fixed).is_err());
    let extra = h.session.add_refund_tier().expect("add tier");
    h.session
        .update_refund_tier(extra, RefundPatch::Day("3".into()))
        .expect("tier day");
    h.session.remove_refund_tier(extra).expect("remove tier");
    assert_eq!(h.session.composites().refunds.len(), 2);
}

#[tokio::test]
async fn composite_edit_clears_the_composite_error() {
    let mut h = loaded(MockSubmissionApi::new()).await;
    assert!(h.session.submit_final().await.is_err());
    assert!(h.session.errors().contains_key(&qid("rooms")));

    let id = h.session.composites().rooms.entries()[0].id;
    h.session
        .update_room(id, RoomPatch::Name("A".into()))
        .expect("edit");
    assert!(!h.session.errors().contains_key(&qid("rooms")));
}

#[tokio::test]
async fn set_answer_rejects_cross_type_writes() {
    let mut h = loaded(MockSubmissionApi::new()).await;

    let err = h
        .session
        .set_answer(&qid("name"), Answer::Agreement { agreed: true })
        .expect_err("shape mismatch");
    assert!(matches!(err, SessionError::Domain(DomainError::TypeMismatch { .. })));
    assert!(h.session.answers().get(&qid("name")).is_none());
}

// =============================================================================
// Files
// =============================================================================

#[tokio::test]
async fn download_only_serves_stored_files() {
    let mut files = MockFileDownloader::new();
    files
        .expect_download_file()
        .with(eq(FileId::from("f1")))
        .times(1)
        .returning(|_| Ok(vec![7, 7]));
    let mut h = harness(MockDraftSource::new(), MockSubmissionApi::new(), files);
    h.session.load(SessionContext::new("p1")).await.expect("load");

    let stored = FileRef::Persisted {
        file_id: FileId::from("f1"),
        name: "a.pdf".into(),
        url: None,
    };
    assert_eq!(h.session.download(&stored).await.expect("download"), vec![7, 7]);

    let pending = FileRef::Pending {
        token: intake_domain::FileToken::new(),
        name: "b.pdf".into(),
    };
    assert!(matches!(
        h.session.download(&pending).await,
        Err(SessionError::Domain(DomainError::Validation(_)))
    ));
}

#[tokio::test]
async fn saved_upload_counts_for_a_required_file_question() {
    let mut api = MockSubmissionApi::new();
    api.expect_save_draft()
        .returning(|payload| Ok(receipt_for(payload, "77")));
    let mut h = harness_with(
        required_logo_questions(),
        MockDraftSource::new(),
        api,
        MockFileDownloader::new(),
    );
    h.session.load(SessionContext::new("p1")).await.expect("load");
    h.session.next().await.expect("leave step 0");

    h.session
        .change_field(&qid("name"), FieldChange::Text("바다펜션".into()))
        .expect("name");
    let logo = FileHandle::new("logo.png", None, vec![1]);
    h.session
        .change_field(&qid("logo"), FieldChange::AttachFile(logo))
        .expect("attach");
    fill_room(&mut h.session);
    h.session.save_draft().await.expect("save");

    assert!(h.session.file_diff().is_empty());
    let Some(Answer::Files(files)) = h.session.answers().get(&qid("logo")) else {
        panic!("expected logo files");
    };
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name(), "logo.png");
    assert_eq!(files[0].file_id(), Some(&FileId::from("f1")));

    let validation = h.session.validate_all();
    assert!(validation.valid, "unexpected errors: {:?}", validation.errors);
    let outcome = h.session.next().await.expect("next");
    assert_eq!(outcome, NextOutcome::Advanced { from: 2, to: 5 });
}

#[tokio::test]
async fn step_save_turns_uploads_into_stored_files() {
    let mut api = MockSubmissionApi::new();
    // Both step saves without file changes.
    api.expect_save_draft()
        .withf(|p| p.file_ops.is_empty())
        .times(2)
        .returning(|payload| Ok(receipt_for(payload, "77")));
    api.expect_save_draft()
        .withf(|p| p.file_ops.len() == 1 && p.file_ops[0].new_files.len() == 1)
        .times(1)
        .returning(|payload| Ok(receipt_for(payload, "77")));
    api.expect_save_draft()
        .withf(|p| {
            p.file_ops.len() == 1
                && p.file_ops[0].new_files.is_empty()
                && p.file_ops[0].delete_file_ids == [FileId::from("f1")]
        })
        .times(1)
        .returning(|payload| Ok(receipt_for(payload, "77")));
    let mut h = harness_with(
        required_logo_questions(),
        MockDraftSource::new(),
        api,
        MockFileDownloader::new(),
    );
    h.session.load(SessionContext::new("p1")).await.expect("load");
    h.session.next().await.expect("leave step 0");

    h.session
        .change_field(&qid("name"), FieldChange::Text("바다펜션".into()))
        .expect("name");
    let logo = FileHandle::new("logo.png", None, vec![1]);
    h.session
        .change_field(&qid("logo"), FieldChange::AttachFile(logo))
        .expect("attach");
    let outcome = h.session.next().await.expect("next");
    assert_eq!(outcome, NextOutcome::Advanced { from: 2, to: 5 });

    let stored = FileRef::Persisted {
        file_id: FileId::from("f1"),
        name: "logo.png".into(),
        url: None,
    };
    assert_eq!(
        h.session.answers().get(&qid("logo")),
        Some(&Answer::Files(vec![stored]))
    );
    assert!(!h.session.validate_all().errors.contains_key(&qid("logo")));

    // Back on the step, the stored copy passes validation again and can be deleted.
    assert_eq!(h.session.previous().expect("previous"), 2);
    let outcome = h.session.next().await.expect("next");
    assert_eq!(outcome, NextOutcome::Advanced { from: 2, to: 5 });
    h.session.go_to(2).expect("jump back");
    h.session
        .change_field(
            &qid("logo"),
            FieldChange::DeleteFile {
                file_id: FileId::from("f1"),
            },
        )
        .expect("delete stored logo");
    assert_eq!(h.session.file_diff().deletes_for(&qid("logo")), [FileId::from("f1")]);
    h.session.save_draft().await.expect("save delete");
    assert!(h.session.file_diff().is_empty());
}

// =============================================================================
// Against the in-memory backend
// =============================================================================

#[tokio::test]
async fn saved_draft_restores_in_a_new_session() {
    let backend = Arc::new(InMemoryBackend::new().with_questions("p1", questions()));
    let settings = SessionSettings::default();

    let ports = backend_ports(backend.clone(), Arc::new(ManualScheduler::new()));
    let mut first = FormSession::new(ports, settings);
    first.load(SessionContext::new("p1")).await.expect("load");
    first
        .change_field(&qid("name"), FieldChange::Text("바다펜션".into()))
        .expect("name");
    let logo = FileHandle::new("logo.png", None, vec![9]);
    first
        .change_field(&qid("logo"), FieldChange::AttachFile(logo))
        .expect("logo");
    fill_room(&mut first);
    first.save_draft().await.expect("save");
    let submission_id = first.submission_id().cloned().expect("issued id");
    first.teardown();

    let ports = backend_ports(backend, Arc::new(ManualScheduler::new()));
    let mut second = FormSession::new(ports, settings);
    second
        .load(SessionContext::new("p1").with_submission(submission_id))
        .await
        .expect("reload");

    assert_eq!(second.answers().get(&qid("name")), first.answers().get(&qid("name")));
    assert_eq!(
        serde_json::to_value(&second.composites().rooms).expect("rooms json"),
        serde_json::to_value(&first.composites().rooms).expect("rooms json"),
    );
    let Some(Answer::Files(files)) = second.answers().get(&qid("logo")) else {
        panic!("expected restored logo");
    };
    assert_eq!(files.len(), 1);
    assert!(!files[0].is_pending());
    assert_eq!(second.download(&files[0]).await.expect("download"), vec![9]);
}

#[tokio::test]
async fn refresh_adopts_server_files_and_keeps_edits_made_during_the_save() {
    let backend = Arc::new(InMemoryBackend::new().with_questions("p1", questions()));
    let mut session = FormSession::new(
        backend_ports(backend, Arc::new(ManualScheduler::new())),
        SessionSettings::default(),
    );
    session.load(SessionContext::new("p1")).await.expect("load");
    session
        .change_field(&qid("name"), FieldChange::Text("초안".into()))
        .expect("name");
    let logo = FileHandle::new("logo.png", None, vec![1]);
    session
        .change_field(&qid("logo"), FieldChange::AttachFile(logo))
        .expect("logo");

    let ticket = session.begin_save(SaveKind::Manual).expect("ticket");
    let api = session.submission_api();
    let result = ticket.dispatch(api.as_ref()).await;
    session
        .change_field(&qid("name"), FieldChange::Text("수정본".into()))
        .expect("edit while saving");
    session.complete_save(ticket, result).expect("complete");

    let report = session.refresh().await.expect("refresh");

    assert_eq!(report.preserved, 1);
    assert_eq!(session.answers().get(&qid("name")), Some(&Answer::Text("수정본".into())));
    let Some(Answer::Files(files)) = session.answers().get(&qid("logo")) else {
        panic!("expected logo files");
    };
    assert_eq!(files.len(), 1);
    assert!(files[0].file_id().is_some());
}

#[tokio::test]
async fn backend_issued_file_ids_replace_pending_uploads() {
    let backend = Arc::new(InMemoryBackend::new().with_questions("p1", required_logo_questions()));
    let mut session = FormSession::new(
        backend_ports(backend.clone(), Arc::new(ManualScheduler::new())),
        SessionSettings::default(),
    );
    session.load(SessionContext::new("p1")).await.expect("load");
    session.next().await.expect("leave step 0");

    session
        .change_field(&qid("name"), FieldChange::Text("바다펜션".into()))
        .expect("name");
    let logo = FileHandle::new("logo.png", None, vec![4, 2]);
    session
        .change_field(&qid("logo"), FieldChange::AttachFile(logo))
        .expect("logo");
    let outcome = session.next().await.expect("next");
    assert_eq!(outcome, NextOutcome::Advanced { from: 2, to: 5 });

    let Some(Answer::Files(files)) = session.answers().get(&qid("logo")) else {
        panic!("expected logo files");
    };
    let [stored] = files.as_slice() else {
        panic!("expected exactly one logo");
    };
    assert!(!stored.is_pending());
    assert_eq!(
        stored,
        &FileRef::Persisted {
            file_id: FileId::from("f1"),
            name: "logo.png".into(),
            url: Some("/files/f1".into()),
        }
    );
    assert_eq!(session.download(stored).await.expect("download"), vec![4, 2]);
    assert!(!session.validate_all().errors.contains_key(&qid("logo")));

    let submission_id = session.submission_id().cloned().expect("issued id");
    assert_eq!(backend.stored_file_count(&submission_id, &qid("logo")).await, 1);
}

#[tokio::test]
async fn summary_reflects_current_answers() {
    let mut h = loaded(MockSubmissionApi::new()).await;
    h.session
        .change_field(&qid("name"), FieldChange::Text("바다펜션".into()))
        .expect("name");

    let columns = h.session.summary();
    assert!(columns.iter().any(|c| c.value == "바다펜션"));
}
