//! Validation engine
//!
//! Two passes over the form: one step at a time (gating `Next`) and the whole
//! form (gating final submission). Errors are one message per question id;
//! a composite failure summarizes its whole list.

use std::collections::{BTreeMap, BTreeSet};

use crate::answer::{Answer, Answers};
use crate::composite::{CompositeStores, RefundTier, RoomEntry, SpecialEntry, FIXED_REFUND_TIERS};
use crate::file_diff::FileDiffTracker;
use crate::ids::QuestionId;
use crate::options::{CheckboxOptions, CompositeKind, FieldKind, ResolvedField};
use crate::question::{FormSchema, Question};

pub const MSG_REQUIRED: &str = "이 항목은 필수입니다.";
pub const MSG_MULTI_TEXT: &str = "두 항목을 모두 입력해주세요.";
pub const MSG_FILE: &str = "파일을 업로드해주세요.";
pub const MSG_SELECT_ANY: &str = "최소 하나 이상 선택해주세요.";
pub const MSG_SELECT_ONE: &str = "하나를 선택해주세요.";
pub const MSG_COMPANION_INPUT: &str = "선택한 항목의 입력란을 작성해주세요.";
pub const MSG_CHECKED_LINES: &str = "선택한 항목의 내용을 모두 입력해주세요.";
pub const MSG_AGREEMENT: &str = "안내사항에 동의해주세요.";
pub const MSG_ROOMS_EMPTY: &str = "객실을 최소 1개 이상 입력해주세요.";
pub const MSG_ROOMS_INCOMPLETE: &str = "객실의 모든 항목을 입력해주세요.";
pub const MSG_SPECIALS_EMPTY: &str = "스페셜을 최소 1개 이상 입력해주세요.";
pub const MSG_REFUNDS_MISSING: &str = "환불 정책을 입력해주세요.";
pub const MSG_REFUND_SAME_DAY: &str = "방문 당일 환불 비율을 입력해주세요.";
pub const MSG_REFUND_TIER: &str = "환불 비율과 방문일 기준을 모두 입력해주세요.";

pub const DEFAULT_SPECIAL_DESC_MIN_LEN: usize = 20;

fn min_length_message(n: usize) -> String {
    format!("최소 {n}자 이상 입력해주세요.")
}

fn specials_message(min_len: usize) -> String {
    format!("스페셜명과 스페셜 설명을 입력하고, 설명은 최소 {min_len}자 이상이어야 합니다.")
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Tunable thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationRules {
    pub special_desc_min_len: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            special_desc_min_len: DEFAULT_SPECIAL_DESC_MIN_LEN,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepValidation {
    pub valid: bool,
    pub errors: BTreeMap<QuestionId, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValidation {
    pub valid: bool,
    pub errors: BTreeMap<QuestionId, String>,
    /// Sorted, distinct steps holding at least one failure
    pub incomplete_steps: Vec<i32>,
}

impl FormValidation {
    /// The step-level notice shown when final submission is blocked.
    pub fn summary(&self) -> Option<String> {
        if self.incomplete_steps.is_empty() {
            return None;
        }
        let steps = self
            .incomplete_steps
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!("{steps}단계에 미완성된 필수 항목이 있습니다."))
    }
}

/// Everything a validation pass reads.
#[derive(Debug, Clone, Copy)]
pub struct FormView<'a> {
    pub schema: &'a FormSchema,
    pub answers: &'a Answers,
    pub composites: &'a CompositeStores,
    pub files: &'a FileDiffTracker,
    pub rules: ValidationRules,
}

impl<'a> FormView<'a> {
    pub fn validate_step(&self, step: i32) -> StepValidation {
        let errors: BTreeMap<_, _> = self
            .schema
            .questions_in_step(step)
            .filter_map(|q| self.validate_question(q).map(|msg| (q.id.clone(), msg)))
            .collect();
        StepValidation {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn validate_all(&self) -> FormValidation {
        let mut errors = BTreeMap::new();
        let mut steps = BTreeSet::new();
        for question in self.schema.questions() {
            if let Some(message) = self.validate_question(question) {
                errors.insert(question.id.clone(), message);
                steps.insert(question.step);
            }
        }
        FormValidation {
            valid: errors.is_empty(),
            errors,
            incomplete_steps: steps.into_iter().collect(),
        }
    }

    /// The failure message for one question, if it fails.
    pub fn validate_question(&self, question: &Question) -> Option<String> {
        let resolved = ResolvedField::for_question(question);
        let required = question.is_required;

        if let FieldKind::Composite(kind) = resolved.kind {
            return match kind {
                CompositeKind::Rooms => check_rooms(self.composites.rooms.entries(), required),
                CompositeKind::Specials => check_specials(
                    self.composites.specials.entries(),
                    required,
                    self.rules.special_desc_min_len,
                ),
                CompositeKind::Refunds => {
                    check_refunds(self.composites.refunds.entries(), required)
                }
            };
        }

        let fallback = resolved.kind.initial_answer();
        let answer = match self.answers.get(&question.id) {
            Some(answer) if Some(answer.shape()) == resolved.kind.answer_shape() => Some(answer),
            _ => fallback.as_ref(),
        }?;

        match (&resolved.kind, answer) {
            (FieldKind::FreeText { .. }, Answer::Text(text)) => {
                check_text(question, text, required)
            }
            (FieldKind::MultiText, Answer::MultiText(lines)) => {
                let any_filled = lines.iter().any(|l| !blank(l));
                let complete = lines.len() == 2 && lines.iter().all(|l| !blank(l));
                if complete || !(required || any_filled) {
                    None
                } else {
                    Some(MSG_MULTI_TEXT.to_string())
                }
            }
            (FieldKind::File { .. }, Answer::Files(files)) => {
                let has_new = self.files.has_pending(&question.id);
                let has_saved = files.iter().any(|f| !f.is_pending());
                (required && !has_new && !has_saved).then(|| MSG_FILE.to_string())
            }
            (FieldKind::Checkbox(options), Answer::CheckboxMulti { checked, inputs }) => {
                if checked.is_empty() {
                    return required.then(|| MSG_SELECT_ANY.to_string());
                }
                checked
                    .iter()
                    .any(|label| companion_missing(options, label, inputs))
                    .then(|| MSG_COMPANION_INPUT.to_string())
            }
            (FieldKind::Checkbox(options), Answer::CheckboxSingle { selected, inputs }) => {
                let Some(label) = selected.as_deref().filter(|s| !s.is_empty()) else {
                    return required.then(|| MSG_SELECT_ONE.to_string());
                };
                companion_missing(options, label, inputs).then(|| MSG_COMPANION_INPUT.to_string())
            }
            (FieldKind::CheckboxInput(_), Answer::CheckboxInput { checked, inputs }) => {
                if checked.is_empty() {
                    return required.then(|| MSG_SELECT_ANY.to_string());
                }
                checked
                    .iter()
                    .any(|idx| inputs.get(*idx).map_or(true, |v| blank(v)))
                    .then(|| MSG_CHECKED_LINES.to_string())
            }
            (FieldKind::Agreement(_), Answer::Agreement { agreed }) => {
                (required && !agreed).then(|| MSG_AGREEMENT.to_string())
            }
            // Shapes are checked above; anything else cannot be judged.
            _ => None,
        }
    }
}

fn check_text(question: &Question, text: &str, required: bool) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return required.then(|| MSG_REQUIRED.to_string());
    }
    match question.enforced_min_length() {
        Some(min) if trimmed.chars().count() < min => Some(min_length_message(min)),
        _ => None,
    }
}

fn companion_missing(
    options: &CheckboxOptions,
    label: &str,
    inputs: &BTreeMap<String, String>,
) -> bool {
    options.requires_input(label) && inputs.get(label).map_or(true, |v| blank(v))
}

/// Optional composites only judge the entries the user started filling in.
fn check_rooms(rooms: &[RoomEntry], required: bool) -> Option<String> {
    if required && rooms.is_empty() {
        return Some(MSG_ROOMS_EMPTY.to_string());
    }
    rooms
        .iter()
        .filter(|room| required || !room.is_blank())
        .any(|room| !room.is_complete())
        .then(|| MSG_ROOMS_INCOMPLETE.to_string())
}

fn check_specials(specials: &[SpecialEntry], required: bool, min_len: usize) -> Option<String> {
    if required && specials.is_empty() {
        return Some(MSG_SPECIALS_EMPTY.to_string());
    }
    specials
        .iter()
        .filter(|special| required || !special.is_blank())
        .any(|special| {
            let desc = special.desc.trim();
            blank(&special.name) || (!desc.is_empty() && desc.chars().count() < min_len)
        })
        .then(|| specials_message(min_len))
}

fn check_refunds(tiers: &[RefundTier], required: bool) -> Option<String> {
    if required && tiers.len() < FIXED_REFUND_TIERS {
        return Some(MSG_REFUNDS_MISSING.to_string());
    }
    if let Some(same_day) = tiers.get(1) {
        if (required || !same_day.is_blank()) && blank(&same_day.percent) {
            return Some(MSG_REFUND_SAME_DAY.to_string());
        }
    }
    tiers
        .iter()
        .skip(FIXED_REFUND_TIERS)
        .filter(|tier| required || !tier.is_blank())
        .any(|tier| blank(&tier.percent) || blank(&tier.day))
        .then(|| MSG_REFUND_TIER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::FileRef;
    use crate::composite::{RefundPatch, RefundSchedule, SpecialPatch};
    use crate::file_diff::FileHandle;
    use crate::ids::FileId;
    use crate::question::QuestionType;

    struct Fixture {
        schema: FormSchema,
        answers: Answers,
        composites: CompositeStores,
        files: FileDiffTracker,
    }

    impl Fixture {
        fn new(questions: Vec<Question>) -> Self {
            Self {
                schema: FormSchema::new(questions),
                answers: Answers::new(),
                composites: CompositeStores::default(),
                files: FileDiffTracker::new(),
            }
        }

        fn answer(mut self, id: &str, answer: Answer) -> Self {
            self.answers
                .set(&self.schema, &id.into(), answer)
                .expect("answer fits");
            self
        }

        fn view(&self) -> FormView<'_> {
            FormView {
                schema: &self.schema,
                answers: &self.answers,
                composites: &self.composites,
                files: &self.files,
                rules: ValidationRules::default(),
            }
        }
    }

    fn refunds(values: &[(&str, &str)]) -> RefundSchedule {
        let mut schedule = RefundSchedule::seeded();
        while schedule.len() < values.len() {
            schedule = schedule.add();
        }
        for (i, (day, percent)) in values.iter().enumerate() {
            let id = schedule.entries()[i].id;
            schedule = schedule
                .update(id, RefundPatch::Day(day.to_string()))
                .and_then(|s| s.update(id, RefundPatch::Percent(percent.to_string())))
                .expect("tier update");
        }
        schedule
    }

    #[test]
    fn required_text_fails_iff_blank_or_short() {
        let q = Question::new("t", 1, 0, QuestionType::Text)
            .required()
            .with_min_length(5);
        let cases = [
            ("", false),
            ("   ", false),
            ("abc", false),
            ("  abcd  ", false),
            ("abcde", true),
            ("한글다섯자", true),
        ];
        for (input, valid) in cases {
            let fx = Fixture::new(vec![q.clone()]).answer("t", Answer::Text(input.into()));
            assert_eq!(fx.view().validate_step(1).valid, valid, "{input:?}");
        }

        let fx = Fixture::new(vec![q]).answer("t", Answer::Text("abc".into()));
        assert_eq!(
            fx.view().validate_step(1).errors.get(&"t".into()).map(String::as_str),
            Some("최소 5자 이상 입력해주세요.")
        );
    }

    #[test]
    fn unanswered_required_text_fails() {
        let fx = Fixture::new(vec![Question::new("t", 1, 0, QuestionType::Textarea).required()]);
        let result = fx.view().validate_step(1);
        assert!(!result.valid);
        assert_eq!(result.errors[&QuestionId::from("t")], MSG_REQUIRED);
    }

    #[test]
    fn optional_text_still_checks_min_length_when_filled() {
        let q = Question::new("t", 1, 0, QuestionType::Text).with_min_length(10);
        let empty = Fixture::new(vec![q.clone()]);
        assert!(empty.view().validate_step(1).valid);

        let short = Fixture::new(vec![q]).answer("t", Answer::Text("short".into()));
        assert!(!short.view().validate_step(1).valid);
    }

    #[test]
    fn multi_text_needs_both_lines() {
        let q = Question::new("m", 1, 0, QuestionType::MultiText).required();
        let half = Fixture::new(vec![q.clone()])
            .answer("m", Answer::MultiText(vec!["a".into(), " ".into()]));
        assert!(!half.view().validate_step(1).valid);

        let full =
            Fixture::new(vec![q]).answer("m", Answer::MultiText(vec!["a".into(), "b".into()]));
        assert!(full.view().validate_step(1).valid);
    }

    #[test]
    fn file_accepts_pending_or_persisted() {
        let q = Question::new("f", 1, 0, QuestionType::File).required();
        let mut fx = Fixture::new(vec![q.clone()]);
        assert_eq!(fx.view().validate_step(1).errors[&QuestionId::from("f")], MSG_FILE);

        fx.files
            .record_new_file(&"f".into(), FileHandle::new("a.png", None, vec![0u8]));
        assert!(fx.view().validate_step(1).valid);

        let saved = Fixture::new(vec![q]).answer(
            "f",
            Answer::Files(vec![FileRef::Persisted {
                file_id: FileId::from("3"),
                name: "a.png".into(),
                url: None,
            }]),
        );
        assert!(saved.view().validate_step(1).valid);
    }

    #[test]
    fn single_select_with_companion_input() {
        let q = Question::new("c", 1, 0, QuestionType::Checkbox)
            .required()
            .with_options(r#"{"checkboxes":[{"label":"A","hasInput":true}],"multiple":false}"#);

        let empty_companion = Fixture::new(vec![q.clone()]).answer(
            "c",
            Answer::CheckboxSingle {
                selected: Some("A".into()),
                inputs: BTreeMap::new(),
            },
        );
        let result = empty_companion.view().validate_step(1);
        assert!(!result.valid);
        assert!(result.errors[&QuestionId::from("c")].contains("입력란을 작성"));

        let filled = Fixture::new(vec![q]).answer(
            "c",
            Answer::CheckboxSingle {
                selected: Some("A".into()),
                inputs: BTreeMap::from([("A".to_string(), "Rooftop bar".to_string())]),
            },
        );
        assert!(filled.view().validate_step(1).valid);
    }

    #[test]
    fn multi_select_requires_a_choice() {
        let q = Question::new("c", 1, 0, QuestionType::Checkbox)
            .required()
            .with_options(r#"{"checkboxes":["Pool","Gym"]}"#);
        let fx = Fixture::new(vec![q]);
        assert_eq!(fx.view().validate_step(1).errors[&QuestionId::from("c")], MSG_SELECT_ANY);
    }

    #[test]
    fn checkbox_input_checked_lines_need_text() {
        let q = Question::new("ci", 1, 0, QuestionType::CheckboxInput)
            .required()
            .with_options(r#"{"defaults":["Breakfast","Parking"]}"#);
        let fx = Fixture::new(vec![q.clone()]).answer(
            "ci",
            Answer::CheckboxInput {
                checked: vec![1],
                inputs: vec!["Breakfast".into(), "".into()],
            },
        );
        assert_eq!(fx.view().validate_step(1).errors[&QuestionId::from("ci")], MSG_CHECKED_LINES);

        let ok = Fixture::new(vec![q]).answer(
            "ci",
            Answer::CheckboxInput {
                checked: vec![0],
                inputs: vec!["Breakfast".into(), "".into()],
            },
        );
        assert!(ok.view().validate_step(1).valid);
    }

    #[test]
    fn agreement_requires_consent() {
        let q = Question::new("a", 0, 0, QuestionType::Agreement).required();
        let fx = Fixture::new(vec![q]);
        assert_eq!(fx.view().validate_step(0).errors[&QuestionId::from("a")], MSG_AGREEMENT);
    }

    #[test]
    fn two_tier_refund_with_same_day_percent_is_valid() {
        let mut fx = Fixture::new(vec![Question::new("r", 4, 0, QuestionType::Refund).required()]);
        fx.composites.refunds = refunds(&[("", ""), ("", "100")]);
        assert!(fx.view().validate_all().valid);
    }

    #[test]
    fn third_refund_tier_missing_day_names_both_fields() {
        let mut fx = Fixture::new(vec![Question::new("r", 4, 0, QuestionType::Refund).required()]);
        fx.composites.refunds = refunds(&[("", ""), ("", "100"), ("", "50")]);
        let result = fx.view().validate_step(4);
        assert!(!result.valid);
        let message = &result.errors[&QuestionId::from("r")];
        assert!(message.contains("환불 비율"));
        assert!(message.contains("방문일"));
    }

    #[test]
    fn same_day_tier_needs_percent() {
        let mut fx = Fixture::new(vec![Question::new("r", 4, 0, QuestionType::Refund).required()]);
        fx.composites.refunds = refunds(&[("", "10"), ("", "")]);
        assert_eq!(fx.view().validate_step(4).errors[&QuestionId::from("r")], MSG_REFUND_SAME_DAY);
    }

    #[test]
    fn required_rooms_must_be_complete() {
        let fx = Fixture::new(vec![Question::new("p", 3, 0, QuestionType::Parlor).required()]);
        assert_eq!(fx.view().validate_step(3).errors[&QuestionId::from("p")], MSG_ROOMS_INCOMPLETE);
    }

    #[test]
    fn optional_rooms_ignore_untouched_entries() {
        let fx = Fixture::new(vec![Question::new("p", 3, 0, QuestionType::Parlor)]);
        assert!(fx.view().validate_step(3).valid);
    }

    #[test]
    fn special_description_length_applies_when_present() {
        let mut fx = Fixture::new(vec![Question::new("s", 3, 0, QuestionType::Special).required()]);
        let id = fx.composites.specials.entries()[0].id;
        fx.composites.specials = fx
            .composites
            .specials
            .update(id, SpecialPatch::Name("Spa".into()))
            .expect("update");
        assert!(fx.view().validate_step(3).valid);

        fx.composites.specials = fx
            .composites
            .specials
            .update(id, SpecialPatch::Desc("too short".into()))
            .expect("update");
        assert!(!fx.view().validate_step(3).valid);

        fx.composites.specials = fx
            .composites
            .specials
            .update(id, SpecialPatch::Desc("a description of twenty+ chars".into()))
            .expect("update");
        assert!(fx.view().validate_step(3).valid);
    }

    #[test]
    fn validate_all_collects_incomplete_steps() {
        let fx = Fixture::new(vec![
            Question::new("a", 0, 0, QuestionType::Agreement),
            Question::new("t5", 5, 0, QuestionType::Text).required(),
            Question::new("t2", 2, 0, QuestionType::Text).required(),
            Question::new("t2b", 2, 1, QuestionType::Text).required(),
        ]);
        let result = fx.view().validate_all();
        assert!(!result.valid);
        assert_eq!(result.incomplete_steps, vec![2, 5]);
        assert_eq!(result.errors.len(), 3);
        assert_eq!(
            result.summary().as_deref(),
            Some("2, 5단계에 미완성된 필수 항목이 있습니다.")
        );
    }

    #[test]
    fn validate_step_ignores_other_steps() {
        let fx = Fixture::new(vec![
            Question::new("t1", 1, 0, QuestionType::Text),
            Question::new("t2", 2, 0, QuestionType::Text).required(),
        ]);
        assert!(fx.view().validate_step(1).valid);
        assert!(!fx.view().validate_step(2).valid);
    }
}
