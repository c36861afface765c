//! Field rendering.
//!
//! Pure view-models: one [`FieldWidget`] case per resolved field kind, built
//! from the question, its current value, the composite stores and the
//! displayed error. Value changes flow back through [`apply_field_change`].

mod change;

use std::collections::BTreeMap;

use intake_domain::{
    step_label, Answer, Answers, CompositeKind, CompositeStores, FieldKind, FileId, FileRef,
    FormSchema, Question, QuestionId, ResolvedField, RoomEntry, SpecialEntry, StepNavigator,
    EntryId, EMPTY_STEP_MESSAGE, FIXED_REFUND_TIERS,
};

pub use change::{apply_field_change, FieldChange, FieldUpdate, FileEffect};

/// Operator-facing notice for a question whose options could not be decoded.
pub const CONFIG_NOTICE: &str = "체크박스 설정 오류: 관리자에게 문의하세요.";

#[derive(Debug, Clone, PartialEq)]
pub struct FieldView {
    pub question_id: QuestionId,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub required: bool,
    pub read_only: bool,
    pub error: Option<String>,
    pub config_notice: Option<&'static str>,
    pub widget: FieldWidget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldWidget {
    Text {
        value: String,
        multiline: bool,
        max_length: Option<usize>,
        min_length: Option<usize>,
    },
    MultiText {
        values: Vec<String>,
    },
    Files {
        multiple: bool,
        files: Vec<FileChip>,
    },
    Checkbox {
        multiple: bool,
        choices: Vec<CheckboxChoice>,
    },
    CheckboxInput {
        lines: Vec<CheckboxLine>,
    },
    Agreement {
        notices: Vec<String>,
        agreed: bool,
    },
    Rooms {
        rooms: Vec<RoomEntry>,
        removable: bool,
    },
    Specials {
        specials: Vec<SpecialEntry>,
        removable: bool,
    },
    Refunds {
        tiers: Vec<RefundRow>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChip {
    pub name: String,
    pub pending: bool,
    pub file_id: Option<FileId>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckboxChoice {
    pub label: String,
    pub checked: bool,
    pub has_input: bool,
    pub input: String,
    /// The companion input accepts text only while its option is checked
    pub input_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckboxLine {
    pub index: usize,
    pub text: String,
    pub checked: bool,
}

/// Refund tier role, by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundRole {
    BaseFee,
    SameDay,
    DaysBefore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRow {
    pub id: EntryId,
    pub index: usize,
    pub role: RefundRole,
    pub day: String,
    pub percent: String,
    pub removable: bool,
}

fn file_chip(file: &FileRef) -> FileChip {
    match file {
        FileRef::Pending { name, .. } => FileChip {
            name: name.clone(),
            pending: true,
            file_id: None,
            url: None,
        },
        FileRef::Persisted { file_id, name, url } => FileChip {
            name: name.clone(),
            pending: false,
            file_id: Some(file_id.clone()),
            url: url.clone(),
        },
    }
}

fn composite_widget(
    kind: CompositeKind,
    composites: &CompositeStores,
    read_only: bool,
) -> FieldWidget {
    match kind {
        CompositeKind::Rooms => FieldWidget::Rooms {
            rooms: composites.rooms.entries().to_vec(),
            removable: !read_only && composites.rooms.len() > 1,
        },
        CompositeKind::Specials => FieldWidget::Specials {
            specials: composites.specials.entries().to_vec(),
            removable: !read_only && composites.specials.len() > 1,
        },
        CompositeKind::Refunds => FieldWidget::Refunds {
            tiers: composites
                .refunds
                .entries()
                .iter()
                .enumerate()
                .map(|(index, tier)| RefundRow {
                    id: tier.id,
                    index,
                    role: match index {
                        0 => RefundRole::BaseFee,
                        1 => RefundRole::SameDay,
                        _ => RefundRole::DaysBefore,
                    },
                    day: tier.day.clone(),
                    percent: tier.percent.clone(),
                    removable: !read_only && index >= FIXED_REFUND_TIERS,
                })
                .collect(),
        },
    }
}

/// Build the view of one question.
///
/// A stored value whose shape does not fit the field is shown as the
/// field's initial value.
pub fn render_field(
    question: &Question,
    value: Option<&Answer>,
    composites: &CompositeStores,
    error: Option<&str>,
    read_only: bool,
) -> FieldView {
    let resolved = ResolvedField::for_question(question);
    let value = value
        .filter(|v| resolved.kind.answer_shape() == Some(v.shape()))
        .cloned()
        .or_else(|| resolved.kind.initial_answer());

    let widget = match (&resolved.kind, value) {
        (FieldKind::Composite(kind), _) => composite_widget(*kind, composites, read_only),
        (FieldKind::FreeText { multiline }, Some(Answer::Text(text))) => FieldWidget::Text {
            value: text,
            multiline: *multiline,
            max_length: question.max_length,
            min_length: question.enforced_min_length(),
        },
        (FieldKind::MultiText, Some(Answer::MultiText(values))) => {
            FieldWidget::MultiText { values }
        }
        (FieldKind::File { multiple }, Some(Answer::Files(files))) => FieldWidget::Files {
            multiple: *multiple,
            files: files.iter().map(file_chip).collect(),
        },
        (FieldKind::Checkbox(options), Some(answer)) => {
            let (checked, inputs): (Vec<String>, BTreeMap<String, String>) = match answer {
                Answer::CheckboxMulti { checked, inputs } => (checked, inputs),
                Answer::CheckboxSingle { selected, inputs } => {
                    (selected.into_iter().collect(), inputs)
                }
                _ => (Vec::new(), BTreeMap::new()),
            };
            FieldWidget::Checkbox {
                multiple: options.multiple,
                choices: options
                    .checkboxes
                    .iter()
                    .map(|option| {
                        let is_checked = checked.contains(&option.label);
                        CheckboxChoice {
                            label: option.label.clone(),
                            checked: is_checked,
                            has_input: option.has_input,
                            input: inputs.get(&option.label).cloned().unwrap_or_default(),
                            input_active: option.has_input && is_checked && !read_only,
                        }
                    })
                    .collect(),
            }
        }
        (FieldKind::CheckboxInput(options), Some(Answer::CheckboxInput { checked, inputs })) => {
            FieldWidget::CheckboxInput {
                lines: (0..options.defaults.len().max(inputs.len()))
                    .map(|index| CheckboxLine {
                        index,
                        text: inputs
                            .get(index)
                            .or_else(|| options.defaults.get(index))
                            .cloned()
                            .unwrap_or_default(),
                        checked: checked.contains(&index),
                    })
                    .collect(),
            }
        }
        (FieldKind::Agreement(options), Some(Answer::Agreement { agreed })) => {
            FieldWidget::Agreement {
                notices: options.items.clone(),
                agreed,
            }
        }
        // Unreachable shapes fall back to free-text capture.
        (_, _) => FieldWidget::Text {
            value: String::new(),
            multiline: false,
            max_length: question.max_length,
            min_length: None,
        },
    };

    FieldView {
        question_id: question.id.clone(),
        title: question.title.clone(),
        description: question.description.clone(),
        thumbnail: question.thumbnail.clone(),
        required: question.is_required,
        read_only,
        error: error.map(str::to_string),
        config_notice: resolved.config_error.then_some(CONFIG_NOTICE),
        widget,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepView {
    pub step: i32,
    pub label: String,
    pub progress: Option<f64>,
    pub is_first: bool,
    pub is_last: bool,
    pub fields: Vec<FieldView>,
    pub empty_message: Option<&'static str>,
}

/// Build the current step's view. `None` while the schema is loading.
pub fn render_step(
    schema: &FormSchema,
    navigator: &StepNavigator,
    answers: &Answers,
    composites: &CompositeStores,
    errors: &BTreeMap<QuestionId, String>,
    read_only: bool,
) -> Option<StepView> {
    let step = navigator.current_step()?;
    let fields: Vec<FieldView> = schema
        .questions_in_step(step)
        .map(|question| {
            render_field(
                question,
                answers.get(&question.id),
                composites,
                errors.get(&question.id).map(String::as_str),
                read_only,
            )
        })
        .collect();

    Some(StepView {
        step,
        label: step_label(step),
        progress: navigator.progress(schema),
        is_first: navigator.is_first(schema),
        is_last: navigator.is_last(schema),
        empty_message: fields.is_empty().then_some(EMPTY_STEP_MESSAGE),
        fields,
    })
}
