//! Type-specific question options
//!
//! The `options` string on a question is hand-authored JSON. Decoding never
//! fails loudly: anything malformed yields `None`, and the field degrades to a
//! free-text capture flagged with a configuration error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::question::{Question, QuestionType};

/// Which options shape a caller expects for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionsShape {
    Checkbox,
    CheckboxInput,
    Agreement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckboxOption {
    pub label: String,
    /// The option carries a companion free-text input
    #[serde(default)]
    pub has_input: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckboxOptions {
    pub checkboxes: Vec<CheckboxOption>,
    pub multiple: bool,
}

impl CheckboxOptions {
    pub fn find(&self, label: &str) -> Option<&CheckboxOption> {
        self.checkboxes.iter().find(|c| c.label == label)
    }

    /// Whether the option with this label declares a companion input.
    pub fn requires_input(&self, label: &str) -> bool {
        self.find(label).is_some_and(|c| c.has_input)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementOptions {
    /// Read-only notice lines shown above the consent flag
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckboxInputOptions {
    /// Pre-filled text of each toggleable line
    pub defaults: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Options {
    Checkbox(CheckboxOptions),
    CheckboxInput(CheckboxInputOptions),
    Agreement(AgreementOptions),
}

/// Decode an options string into the expected shape.
///
/// Shape discrimination is structural: a checkbox payload must carry a
/// `checkboxes` array, an agreement payload an `agreementItems` array and a
/// checkbox_input payload a `defaults` (or `items`) array.
pub fn decode_options(raw: Option<&str>, shape: OptionsShape) -> Option<Options> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;

    match shape {
        OptionsShape::Checkbox => decode_checkbox(object).map(Options::Checkbox),
        OptionsShape::CheckboxInput => decode_checkbox_input(object).map(Options::CheckboxInput),
        OptionsShape::Agreement => decode_agreement(object).map(Options::Agreement),
    }
}

fn decode_checkbox(object: &Map<String, Value>) -> Option<CheckboxOptions> {
    let entries = object.get("checkboxes")?.as_array()?;
    let checkboxes = entries
        .iter()
        .map(decode_checkbox_option)
        .collect::<Option<Vec<_>>>()?;
    if checkboxes.is_empty() {
        return None;
    }

    let multiple = match object.get("multiple") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return None,
    };

    Some(CheckboxOptions {
        checkboxes,
        multiple,
    })
}

fn decode_checkbox_option(value: &Value) -> Option<CheckboxOption> {
    match value {
        Value::String(label) => Some(CheckboxOption {
            label: label.clone(),
            has_input: false,
        }),
        Value::Object(entry) => {
            let label = entry.get("label")?.as_str()?.to_string();
            let has_input = entry
                .get("hasInput")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Some(CheckboxOption { label, has_input })
        }
        _ => None,
    }
}

fn decode_checkbox_input(object: &Map<String, Value>) -> Option<CheckboxInputOptions> {
    let entries = object
        .get("defaults")
        .or_else(|| object.get("items"))?
        .as_array()?;
    let defaults = string_list(entries)?;
    if defaults.is_empty() {
        return None;
    }
    Some(CheckboxInputOptions { defaults })
}

fn decode_agreement(object: &Map<String, Value>) -> Option<AgreementOptions> {
    let entries = object.get("agreementItems")?.as_array()?;
    Some(AgreementOptions {
        items: string_list(entries)?,
    })
}

fn string_list(values: &[Value]) -> Option<Vec<String>> {
    values
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

// =============================================================================
// Field resolution
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeKind {
    Rooms,
    Specials,
    Refunds,
}

/// How a question is captured once its options have been decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    FreeText { multiline: bool },
    MultiText,
    File { multiple: bool },
    Checkbox(CheckboxOptions),
    CheckboxInput(CheckboxInputOptions),
    Agreement(AgreementOptions),
    Composite(CompositeKind),
}

/// A question's effective field, plus whether its configuration was unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub kind: FieldKind,
    pub config_error: bool,
}

impl ResolvedField {
    fn ok(kind: FieldKind) -> Self {
        Self {
            kind,
            config_error: false,
        }
    }

    fn degraded() -> Self {
        Self {
            kind: FieldKind::FreeText { multiline: false },
            config_error: true,
        }
    }

    pub fn for_question(question: &Question) -> Self {
        let raw = question.options.as_deref();
        match &question.question_type {
            QuestionType::Text => Self::ok(FieldKind::FreeText { multiline: false }),
            QuestionType::Textarea => Self::ok(FieldKind::FreeText { multiline: true }),
            QuestionType::MultiText => Self::ok(FieldKind::MultiText),
            QuestionType::File => Self::ok(FieldKind::File { multiple: false }),
            QuestionType::Files => Self::ok(FieldKind::File { multiple: true }),
            QuestionType::Checkbox => match decode_options(raw, OptionsShape::Checkbox) {
                Some(Options::Checkbox(options)) => Self::ok(FieldKind::Checkbox(options)),
                _ => Self::degraded(),
            },
            QuestionType::CheckboxInput => {
                match decode_options(raw, OptionsShape::CheckboxInput) {
                    Some(Options::CheckboxInput(options)) => {
                        Self::ok(FieldKind::CheckboxInput(options))
                    }
                    _ => Self::degraded(),
                }
            }
            // The consent flag stays usable without notices.
            QuestionType::Agreement => match decode_options(raw, OptionsShape::Agreement) {
                Some(Options::Agreement(options)) => Self::ok(FieldKind::Agreement(options)),
                _ => Self {
                    kind: FieldKind::Agreement(AgreementOptions { items: Vec::new() }),
                    config_error: raw.is_some_and(|r| !r.trim().is_empty()),
                },
            },
            QuestionType::Parlor => Self::ok(FieldKind::Composite(CompositeKind::Rooms)),
            QuestionType::Special => Self::ok(FieldKind::Composite(CompositeKind::Specials)),
            QuestionType::Refund => Self::ok(FieldKind::Composite(CompositeKind::Refunds)),
            QuestionType::Other(_) => Self::ok(FieldKind::FreeText { multiline: false }),
        }
    }
}
