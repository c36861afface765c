//! Per-question answers
//!
//! One typed value per non-composite question. The value's shape is fixed by
//! the owning question's resolved field; writes with any other shape are
//! refused and the prior value is kept.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::error::DomainError;
use crate::ids::{FileId, FileToken, QuestionId};
use crate::options::{FieldKind, ResolvedField};
use crate::question::FormSchema;

// =============================================================================
// File references
// =============================================================================

/// A file shown in a file question's value list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    /// Attached locally, not uploaded yet; its bytes live in the diff tracker
    Pending { token: FileToken, name: String },
    /// Already stored on the server
    Persisted {
        file_id: FileId,
        name: String,
        url: Option<String>,
    },
}

impl FileRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Pending { name, .. } | Self::Persisted { name, .. } => name,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn file_id(&self) -> Option<&FileId> {
        match self {
            Self::Persisted { file_id, .. } => Some(file_id),
            Self::Pending { .. } => None,
        }
    }

    /// Server file node: `{type: "file", fileId, name, url}`. Pending files have none.
    pub fn to_node(&self) -> Option<Value> {
        match self {
            Self::Persisted { file_id, name, url } => Some(json!({
                "type": "file",
                "fileId": file_id.as_str(),
                "name": name,
                "url": url,
            })),
            Self::Pending { .. } => None,
        }
    }

    pub fn from_node(value: &Value) -> Option<Self> {
        let node = value.as_object()?;
        if let Some(kind) = node.get("type").and_then(Value::as_str) {
            if kind != "file" {
                return None;
            }
        }
        let file_id = match node.get("fileId")? {
            Value::String(s) if !s.is_empty() => FileId::from(s.as_str()),
            Value::Number(n) => FileId::from(n.to_string()),
            _ => return None,
        };
        Some(Self::Persisted {
            file_id,
            name: node
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            url: node.get("url").and_then(Value::as_str).map(str::to_string),
        })
    }
}

// =============================================================================
// Answer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerShape {
    Text,
    MultiText,
    Agreement,
    CheckboxMulti,
    CheckboxSingle,
    CheckboxInput,
    Files,
}

impl AnswerShape {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::MultiText => "multi_text",
            Self::Agreement => "agreement",
            Self::CheckboxMulti => "checkbox_multi",
            Self::CheckboxSingle => "checkbox_single",
            Self::CheckboxInput => "checkbox_input",
            Self::Files => "files",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Text(String),
    /// Two free-text lines
    MultiText(Vec<String>),
    Agreement {
        agreed: bool,
    },
    CheckboxMulti {
        checked: Vec<String>,
        inputs: BTreeMap<String, String>,
    },
    CheckboxSingle {
        selected: Option<String>,
        inputs: BTreeMap<String, String>,
    },
    CheckboxInput {
        checked: Vec<usize>,
        inputs: Vec<String>,
    },
    Files(Vec<FileRef>),
}

impl Answer {
    pub fn shape(&self) -> AnswerShape {
        match self {
            Self::Text(_) => AnswerShape::Text,
            Self::MultiText(_) => AnswerShape::MultiText,
            Self::Agreement { .. } => AnswerShape::Agreement,
            Self::CheckboxMulti { .. } => AnswerShape::CheckboxMulti,
            Self::CheckboxSingle { .. } => AnswerShape::CheckboxSingle,
            Self::CheckboxInput { .. } => AnswerShape::CheckboxInput,
            Self::Files(_) => AnswerShape::Files,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::MultiText(lines) => json!(lines),
            Self::Agreement { agreed } => json!({ "agreed": agreed }),
            Self::CheckboxMulti { checked, inputs } => {
                json!({ "checked": checked, "inputs": inputs })
            }
            Self::CheckboxSingle { selected, inputs } => {
                json!({ "selected": selected, "inputs": inputs })
            }
            Self::CheckboxInput { checked, inputs } => {
                json!({ "checked": checked, "inputs": inputs })
            }
            Self::Files(files) => Value::Array(files.iter().filter_map(FileRef::to_node).collect()),
        }
    }

    /// Decode a stored value into the given shape. `None` when it does not fit.
    pub fn from_json(shape: AnswerShape, value: &Value) -> Option<Self> {
        match shape {
            AnswerShape::Text => match value {
                Value::String(text) => Some(Self::Text(text.clone())),
                Value::Number(n) => Some(Self::Text(n.to_string())),
                _ => None,
            },
            AnswerShape::MultiText => {
                let lines = value
                    .as_array()?
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()?;
                Some(Self::MultiText(lines))
            }
            AnswerShape::Agreement => match value {
                Value::Bool(agreed) => Some(Self::Agreement { agreed: *agreed }),
                Value::Object(map) => Some(Self::Agreement {
                    agreed: map.get("agreed").and_then(Value::as_bool).unwrap_or(false),
                }),
                _ => None,
            },
            AnswerShape::CheckboxMulti => {
                let map = value.as_object()?;
                let checked = match map.get("checked") {
                    Some(Value::Array(labels)) => labels
                        .iter()
                        .map(|v| v.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()?,
                    // A value saved while the question was single-select
                    _ => map
                        .get("selected")
                        .and_then(Value::as_str)
                        .map(|s| vec![s.to_string()])
                        .unwrap_or_default(),
                };
                Some(Self::CheckboxMulti {
                    checked,
                    inputs: label_inputs(map),
                })
            }
            AnswerShape::CheckboxSingle => {
                let map = value.as_object()?;
                let selected = match map.get("selected") {
                    Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                    Some(Value::String(_)) | Some(Value::Null) => None,
                    Some(_) => return None,
                    None => map
                        .get("checked")
                        .and_then(Value::as_array)
                        .and_then(|labels| labels.first())
                        .and_then(Value::as_str)
                        .map(str::to_string),
                };
                Some(Self::CheckboxSingle {
                    selected,
                    inputs: label_inputs(map),
                })
            }
            AnswerShape::CheckboxInput => {
                let map = value.as_object()?;
                let checked = map
                    .get("checked")
                    .and_then(Value::as_array)
                    .map(|indices| {
                        indices
                            .iter()
                            .map(|v| v.as_u64().map(|n| n as usize))
                            .collect::<Option<Vec<_>>>()
                    })
                    .unwrap_or(Some(Vec::new()))?;
                let inputs = map
                    .get("inputs")
                    .and_then(Value::as_array)
                    .map(|lines| {
                        lines
                            .iter()
                            .map(|v| v.as_str().unwrap_or_default().to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                Some(Self::CheckboxInput { checked, inputs })
            }
            AnswerShape::Files => match value {
                Value::Array(nodes) => Some(Self::Files(
                    nodes.iter().filter_map(FileRef::from_node).collect(),
                )),
                Value::Object(_) => Some(Self::Files(
                    FileRef::from_node(value).into_iter().collect(),
                )),
                _ => None,
            },
        }
    }
}

fn label_inputs(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.get("inputs")
        .and_then(Value::as_object)
        .map(|inputs| {
            inputs
                .iter()
                .filter_map(|(label, v)| v.as_str().map(|s| (label.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

impl FieldKind {
    /// Shape of answers for this field. Composites keep no per-question answer.
    pub fn answer_shape(&self) -> Option<AnswerShape> {
        match self {
            Self::FreeText { .. } => Some(AnswerShape::Text),
            Self::MultiText => Some(AnswerShape::MultiText),
            Self::File { .. } => Some(AnswerShape::Files),
            Self::Checkbox(options) if options.multiple => Some(AnswerShape::CheckboxMulti),
            Self::Checkbox(_) => Some(AnswerShape::CheckboxSingle),
            Self::CheckboxInput(_) => Some(AnswerShape::CheckboxInput),
            Self::Agreement(_) => Some(AnswerShape::Agreement),
            Self::Composite(_) => None,
        }
    }

    /// The value shown before the user has answered.
    pub fn initial_answer(&self) -> Option<Answer> {
        let answer = match self {
            Self::FreeText { .. } => Answer::Text(String::new()),
            Self::MultiText => Answer::MultiText(vec![String::new(), String::new()]),
            Self::File { .. } => Answer::Files(Vec::new()),
            Self::Checkbox(options) if options.multiple => Answer::CheckboxMulti {
                checked: Vec::new(),
                inputs: BTreeMap::new(),
            },
            Self::Checkbox(_) => Answer::CheckboxSingle {
                selected: None,
                inputs: BTreeMap::new(),
            },
            Self::CheckboxInput(options) => Answer::CheckboxInput {
                checked: Vec::new(),
                inputs: options.defaults.clone(),
            },
            Self::Agreement(_) => Answer::Agreement { agreed: false },
            Self::Composite(_) => return None,
        };
        Some(answer)
    }
}

// =============================================================================
// Answer map
// =============================================================================

/// Answers keyed by question id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answers {
    values: BTreeMap<QuestionId, Answer>,
}

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &QuestionId) -> Option<&Answer> {
        self.values.get(id)
    }

    /// Write an answer, checking it against the owning question.
    ///
    /// Returns the replaced value. On error the map is left unchanged.
    pub fn set(
        &mut self,
        schema: &FormSchema,
        id: &QuestionId,
        answer: Answer,
    ) -> Result<Option<Answer>, DomainError> {
        let question = schema
            .find(id)
            .ok_or_else(|| DomainError::not_found("Question", id.as_str()))?;
        let resolved = ResolvedField::for_question(question);
        let Some(expected) = resolved.kind.answer_shape() else {
            return Err(DomainError::constraint(format!(
                "question {} is a {} composite and keeps no answer",
                id, question.question_type
            )));
        };
        if answer.shape() != expected {
            return Err(DomainError::type_mismatch(
                id.as_str(),
                expected.name(),
                answer.shape().name(),
            ));
        }
        Ok(self.values.insert(id.clone(), answer))
    }

    pub fn remove(&mut self, id: &QuestionId) -> Option<Answer> {
        self.values.remove(id)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, QuestionId, Answer> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace the pending file `token` of a question with its stored form.
    ///
    /// Returns false when the question holds no such pending file.
    pub fn promote_pending(
        &mut self,
        question_id: &QuestionId,
        token: FileToken,
        file_id: FileId,
        url: Option<String>,
    ) -> bool {
        let Some(Answer::Files(files)) = self.values.get_mut(question_id) else {
            return false;
        };
        let Some(slot) = files
            .iter_mut()
            .find(|f| matches!(f, FileRef::Pending { token: t, .. } if *t == token))
        else {
            return false;
        };
        let name = slot.name().to_string();
        *slot = FileRef::Persisted { file_id, name, url };
        true
    }

    /// Decode stored values against the schema.
    ///
    /// Entries for unknown questions, composite questions or values of the
    /// wrong shape are dropped.
    pub fn from_stored(schema: &FormSchema, stored: &Map<String, Value>) -> Self {
        let mut values = BTreeMap::new();
        for question in schema.questions() {
            let Some(shape) = ResolvedField::for_question(question).kind.answer_shape() else {
                continue;
            };
            let Some(value) = stored.get(question.id.as_str()) else {
                continue;
            };
            if let Some(answer) = Answer::from_json(shape, value) {
                values.insert(question.id.clone(), answer);
            }
        }
        Self { values }
    }
}
