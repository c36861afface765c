//! Question schema
//!
//! Operators author an ordered questionnaire; the engine only reads it.
//! Questions are grouped into sparse integer steps and ordered within a step.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::ids::QuestionId;

// =============================================================================
// Question Type
// =============================================================================

/// Closed set of question types.
///
/// Unknown names are preserved in `Other` and treated as free text everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum QuestionType {
    #[default]
    Text,
    Textarea,
    MultiText,
    File,
    Files,
    Checkbox,
    CheckboxInput,
    Agreement,
    /// Room list composite
    Parlor,
    /// Promotional item composite
    Special,
    /// Cancellation-fee tier composite
    Refund,
    Other(String),
}

impl QuestionType {
    /// Parse a raw type name. Absent or blank names mean plain text.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Text;
        };
        let name = raw.trim().to_ascii_lowercase();
        match name.as_str() {
            "" | "text" => Self::Text,
            "textarea" => Self::Textarea,
            "multi_text" => Self::MultiText,
            "file" => Self::File,
            "files" => Self::Files,
            "checkbox" => Self::Checkbox,
            "checkbox_input" => Self::CheckboxInput,
            "agreement" => Self::Agreement,
            "parlor" => Self::Parlor,
            "special" => Self::Special,
            "refund" => Self::Refund,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::MultiText => "multi_text",
            Self::File => "file",
            Self::Files => "files",
            Self::Checkbox => "checkbox",
            Self::CheckboxInput => "checkbox_input",
            Self::Agreement => "agreement",
            Self::Parlor => "parlor",
            Self::Special => "special",
            Self::Refund => "refund",
            Self::Other(name) => name,
        }
    }

    /// Composite types render outside the generic per-question flow.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Parlor | Self::Special | Self::Refund)
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File | Self::Files)
    }
}

impl From<Option<String>> for QuestionType {
    fn from(value: Option<String>) -> Self {
        Self::parse(value.as_deref())
    }
}

impl From<QuestionType> for String {
    fn from(value: QuestionType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Question
// =============================================================================

/// One schema-defined prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub step: i32,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub question_type: QuestionType,
    /// Opaque, hand-authored configuration string
    #[serde(default)]
    pub options: Option<String>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub require_min_length: bool,
    #[serde(default)]
    pub is_required: bool,
}

impl Question {
    pub fn new(
        id: impl Into<QuestionId>,
        step: i32,
        order: i32,
        question_type: QuestionType,
    ) -> Self {
        Self {
            id: id.into(),
            step,
            order,
            title: String::new(),
            description: None,
            thumbnail: None,
            question_type,
            options: None,
            min_length: None,
            max_length: None,
            require_min_length: false,
            is_required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self.require_min_length = true;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Minimum length that applies to this question, if any.
    pub fn enforced_min_length(&self) -> Option<usize> {
        if self.require_min_length {
            self.min_length.filter(|n| *n > 0)
        } else {
            None
        }
    }
}

// =============================================================================
// Form Schema
// =============================================================================

/// Questions of one portfolio, sorted by `(step, order)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormSchema {
    questions: Vec<Question>,
}

impl FormSchema {
    /// Build a schema from questions in any order.
    pub fn new(mut questions: Vec<Question>) -> Self {
        questions.sort_by(|a, b| (a.step, a.order).cmp(&(b.step, b.order)));
        Self { questions }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn find(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == id)
    }

    /// Distinct step numbers present in the schema.
    pub fn steps(&self) -> BTreeSet<i32> {
        self.questions.iter().map(|q| q.step).collect()
    }

    pub fn min_step(&self) -> Option<i32> {
        self.questions.iter().map(|q| q.step).min()
    }

    pub fn max_step(&self) -> Option<i32> {
        self.questions.iter().map(|q| q.step).max()
    }

    pub fn questions_in_step(&self, step: i32) -> impl Iterator<Item = &Question> + '_ {
        self.questions.iter().filter(move |q| q.step == step)
    }

    /// Smallest step present that is greater than `step`.
    pub fn next_step_after(&self, step: i32) -> Option<i32> {
        self.steps()
            .range((Bound::Excluded(step), Bound::Unbounded))
            .next()
            .copied()
    }

    /// Greatest step present that is smaller than `step`.
    pub fn previous_step_before(&self, step: i32) -> Option<i32> {
        self.steps().range(..step).next_back().copied()
    }

    /// First question of the given composite type, if the schema has one.
    pub fn composite_question(&self, question_type: &QuestionType) -> Option<&Question> {
        self.questions
            .iter()
            .find(|q| &q.question_type == question_type)
    }
}
