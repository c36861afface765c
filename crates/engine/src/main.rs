//! Portfolio intake engine - demo entry point.
//!
//! Opens a session against the in-memory backend, fills in a sample
//! questionnaire and keeps autosaving until Ctrl-C, then submits.

use std::sync::Arc;

use anyhow::Context;
use intake_domain::{DayBucket, NextOutcome, Question, QuestionType, RoomPatch, Season};
use tokio_util::sync::CancellationToken;

use intake_engine::infrastructure::{
    config::EngineConfig, in_memory::InMemoryBackend, scheduler::TokioScheduler, telemetry,
};
use intake_engine::use_cases::session::{FormSession, SessionContext, SessionError};
use intake_engine::use_cases::FieldChange;
use intake_engine::App;

const DEMO_PORTFOLIO: &str = "demo";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root.
    load_dotenv_from_repo_root();

    let config = EngineConfig::from_env().context("Failed to load engine configuration")?;
    telemetry::init_tracing(config.log_filter.as_deref());

    tracing::info!(
        autosave_enabled = config.autosave.enabled,
        autosave_interval_secs = config.autosave.interval.as_secs(),
        "Starting portfolio intake engine"
    );

    let backend =
        Arc::new(InMemoryBackend::new().with_questions(DEMO_PORTFOLIO, sample_questions()));
    let (scheduler, mut ticks) = TokioScheduler::new();
    let app = App::in_memory(backend, Arc::new(scheduler), config);

    let mut session = app
        .open_session(SessionContext::new(DEMO_PORTFOLIO))
        .await
        .context("Failed to open form session")?;

    fill_sample_answers(&mut session)?;
    loop {
        match session.next().await? {
            NextOutcome::Advanced { from, to } => tracing::info!(from, to, "Advanced"),
            NextOutcome::Blocked(result) => {
                tracing::warn!(errors = ?result.errors, "Step incomplete");
                break;
            }
            NextOutcome::Stayed(_) => break,
        }
    }

    let cancel_token = CancellationToken::new();
    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, submitting");
        }
        shutdown.cancel();
    });

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            tick = ticks.recv() => {
                let Some(tick) = tick else { break };
                match session.on_autosave_tick().await {
                    Ok(Some(outcome)) => tracing::info!(?outcome, at = ?tick.at, "Autosaved"),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, retriable = e.is_retriable(), "Autosave failed");
                    }
                }
            }
        }
    }

    match session.submit_final().await {
        Ok(outcome) => tracing::info!(?outcome, "Submitted"),
        Err(SessionError::Incomplete { steps, summary }) => {
            tracing::warn!(?steps, %summary, "Submission blocked");
        }
        Err(e) => return Err(e.into()),
    }

    for column in session.summary() {
        tracing::info!(header = %column.header, value = %column.value, "Summary");
    }
    session.teardown();

    Ok(())
}

fn sample_questions() -> Vec<Question> {
    vec![
        Question::new("notice", 0, 0, QuestionType::Agreement)
            .required()
            .with_title("입점 안내")
            .with_options(r#"{"agreementItems":["입점 심사는 영업일 기준 3일 소요됩니다."]}"#),
        Question::new("name", 1, 0, QuestionType::Text)
            .required()
            .with_title("숙소명")
            .with_max_length(40),
        Question::new("amenities", 1, 1, QuestionType::Checkbox)
            .with_title("편의시설")
            .with_options(
                r#"{"checkboxes":[{"label":"수영장"},{"label":"기타","hasInput":true}],"multiple":true}"#,
            ),
        Question::new("rooms", 2, 0, QuestionType::Parlor)
            .required()
            .with_title("객실 정보"),
        Question::new("refunds", 3, 0, QuestionType::Refund).with_title("환불 규정"),
    ]
}

fn fill_sample_answers(session: &mut FormSession) -> Result<(), SessionError> {
    session.change_field(&"notice".into(), FieldChange::SetAgreement(true))?;
    session.change_field(&"name".into(), FieldChange::Text("바다펜션".into()))?;
    session.change_field(
        &"amenities".into(),
        FieldChange::ToggleOption {
            label: "수영장".into(),
        },
    )?;

    let Some(room) = session.composites().rooms.entries().first().map(|r| r.id) else {
        return Ok(());
    };
    let fields = [
        RoomPatch::Name("오션뷰 디럭스".into()),
        RoomPatch::Desc("바다가 보이는 객실".into()),
        RoomPatch::StandardOccupancy("2".into()),
        RoomPatch::MaxOccupancy("4".into()),
        RoomPatch::RoomType("침대 2개".into()),
    ];
    for patch in fields {
        session.update_room(room, patch)?;
    }
    for season in [Season::Low, Season::Mid, Season::High] {
        for day in [DayBucket::Weekday, DayBucket::Fri, DayBucket::Sat, DayBucket::Sun] {
            session.update_room(
                room,
                RoomPatch::Price {
                    season,
                    day,
                    value: "120000".into(),
                },
            )?;
        }
    }
    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
