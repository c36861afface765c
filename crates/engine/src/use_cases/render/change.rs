//! Value changes coming back from a rendered field.

use intake_domain::{
    Answer, DomainError, FieldKind, FileHandle, FileId, FileRef, FileToken, Question,
    ResolvedField,
};

/// One edit to a non-composite question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    Text(String),
    MultiText([String; 2]),
    /// Attach a local file
    AttachFile(FileHandle),
    /// Drop the n-th not-yet-uploaded file of the question
    RemoveTempFile { index: usize },
    /// Remove a stored file
    DeleteFile { file_id: FileId },
    /// Check or uncheck an option (select or deselect for single choice)
    ToggleOption { label: String },
    /// Make an option the selected one (checks it for multiple choice)
    SelectOption { label: String },
    ClearOptions,
    SetOptionInput { label: String, text: String },
    ToggleLine { index: usize },
    SetLineText { index: usize, text: String },
    SetAgreement(bool),
}

impl FieldChange {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::MultiText(_) => "multi_text",
            Self::AttachFile(_) => "attach_file",
            Self::RemoveTempFile { .. } => "remove_temp_file",
            Self::DeleteFile { .. } => "delete_file",
            Self::ToggleOption { .. } => "toggle_option",
            Self::SelectOption { .. } => "select_option",
            Self::ClearOptions => "clear_options",
            Self::SetOptionInput { .. } => "set_option_input",
            Self::ToggleLine { .. } => "toggle_line",
            Self::SetLineText { .. } => "set_line_text",
            Self::SetAgreement(_) => "set_agreement",
        }
    }
}

/// What the file diff tracker has to do for a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEffect {
    Record(FileHandle),
    Retract(FileToken),
    Delete(FileId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpdate {
    pub answer: Answer,
    pub file_effects: Vec<FileEffect>,
}

impl FieldUpdate {
    fn value(answer: Answer) -> Self {
        Self {
            answer,
            file_effects: Vec::new(),
        }
    }
}

fn truncate(text: String, max_length: Option<usize>) -> String {
    match max_length {
        Some(max) if text.chars().count() > max => text.chars().take(max).collect(),
        _ => text,
    }
}

fn superseded(old: &FileRef) -> Option<FileEffect> {
    match old {
        FileRef::Pending { token, .. } => Some(FileEffect::Retract(*token)),
        FileRef::Persisted { file_id, .. } => Some(FileEffect::Delete(file_id.clone())),
    }
}

/// Compute the new value of a question after a change.
///
/// The current value is never mutated. A change that does not fit the
/// question's field is refused with the prior value untouched.
pub fn apply_field_change(
    question: &Question,
    field: &ResolvedField,
    current: Option<&Answer>,
    change: FieldChange,
) -> Result<FieldUpdate, DomainError> {
    let current = current
        .filter(|v| field.kind.answer_shape() == Some(v.shape()))
        .cloned()
        .or_else(|| field.kind.initial_answer())
        .ok_or_else(|| {
            DomainError::constraint(format!(
                "question {} is a composite and is edited through its list",
                question.id
            ))
        })?;

    let mismatch = |change: &FieldChange, answer: &Answer| {
        DomainError::type_mismatch(question.id.as_str(), answer.shape().name(), change.name())
    };

    match (&field.kind, current, change) {
        (FieldKind::FreeText { .. }, Answer::Text(_), FieldChange::Text(text)) => Ok(
            FieldUpdate::value(Answer::Text(truncate(text, question.max_length))),
        ),

        (FieldKind::MultiText, Answer::MultiText(_), FieldChange::MultiText(values)) => {
            Ok(FieldUpdate::value(Answer::MultiText(
                values
                    .into_iter()
                    .map(|v| truncate(v, question.max_length))
                    .collect(),
            )))
        }

        (FieldKind::File { multiple }, Answer::Files(mut files), change) => {
            let mut effects = Vec::new();
            match change {
                FieldChange::AttachFile(handle) => {
                    if !multiple {
                        effects.extend(files.drain(..).filter_map(|old| superseded(&old)));
                    }
                    files.push(FileRef::Pending {
                        token: handle.token,
                        name: handle.name.clone(),
                    });
                    effects.push(FileEffect::Record(handle));
                }
                FieldChange::RemoveTempFile { index } => {
                    let position = files
                        .iter()
                        .enumerate()
                        .filter(|(_, f)| f.is_pending())
                        .nth(index)
                        .map(|(position, _)| position)
                        .ok_or_else(|| DomainError::not_found("PendingFile", index.to_string()))?;
                    if let FileRef::Pending { token, .. } = files.remove(position) {
                        effects.push(FileEffect::Retract(token));
                    }
                }
                FieldChange::DeleteFile { file_id } => {
                    let position = files
                        .iter()
                        .position(|f| f.file_id() == Some(&file_id))
                        .ok_or_else(|| DomainError::not_found("File", file_id.as_str()))?;
                    files.remove(position);
                    effects.push(FileEffect::Delete(file_id));
                }
                other => return Err(mismatch(&other, &Answer::Files(files))),
            }
            Ok(FieldUpdate {
                answer: Answer::Files(files),
                file_effects: effects,
            })
        }

        (
            FieldKind::Checkbox(options),
            Answer::CheckboxMulti {
                mut checked,
                mut inputs,
            },
            change,
        ) => {
            match change {
                FieldChange::ToggleOption { label } | FieldChange::SelectOption { label }
                    if options.find(&label).is_none() =>
                {
                    return Err(DomainError::not_found("Option", label));
                }
                FieldChange::ToggleOption { label } => {
                    if let Some(position) = checked.iter().position(|l| *l == label) {
                        checked.remove(position);
                        inputs.remove(&label);
                    } else {
                        checked.push(label);
                    }
                }
                FieldChange::SelectOption { label } => {
                    if !checked.contains(&label) {
                        checked.push(label);
                    }
                }
                FieldChange::ClearOptions => {
                    checked.clear();
                    inputs.clear();
                }
                FieldChange::SetOptionInput { label, text } => {
                    if !options.requires_input(&label) || !checked.contains(&label) {
                        return Err(DomainError::validation(format!(
                            "option '{label}' has no active input"
                        )));
                    }
                    inputs.insert(label, text);
                }
                other => {
                    return Err(mismatch(&other, &Answer::CheckboxMulti { checked, inputs }));
                }
            }
            Ok(FieldUpdate::value(Answer::CheckboxMulti { checked, inputs }))
        }

        (
            FieldKind::Checkbox(options),
            Answer::CheckboxSingle {
                mut selected,
                mut inputs,
            },
            change,
        ) => {
            match change {
                FieldChange::ToggleOption { label } | FieldChange::SelectOption { label }
                    if options.find(&label).is_none() =>
                {
                    return Err(DomainError::not_found("Option", label));
                }
                FieldChange::ToggleOption { label }
                    if selected.as_deref() == Some(label.as_str()) =>
                {
                    selected = None;
                    inputs.clear();
                }
                FieldChange::ToggleOption { label } | FieldChange::SelectOption { label } => {
                    inputs.retain(|key, _| *key == label);
                    selected = Some(label);
                }
                FieldChange::ClearOptions => {
                    selected = None;
                    inputs.clear();
                }
                FieldChange::SetOptionInput { label, text } => {
                    if !options.requires_input(&label)
                        || selected.as_deref() != Some(label.as_str())
                    {
                        return Err(DomainError::validation(format!(
                            "option '{label}' has no active input"
                        )));
                    }
                    inputs.insert(label, text);
                }
                other => {
                    return Err(mismatch(&other, &Answer::CheckboxSingle { selected, inputs }));
                }
            }
            Ok(FieldUpdate::value(Answer::CheckboxSingle { selected, inputs }))
        }

        (
            FieldKind::CheckboxInput(options),
            Answer::CheckboxInput {
                mut checked,
                mut inputs,
            },
            change,
        ) => {
            let lines = options.defaults.len().max(inputs.len());
            match change {
                FieldChange::ToggleLine { index } | FieldChange::SetLineText { index, .. }
                    if index >= lines =>
                {
                    return Err(DomainError::not_found("Line", index.to_string()));
                }
                FieldChange::ToggleLine { index } => {
                    if let Some(position) = checked.iter().position(|i| *i == index) {
                        checked.remove(position);
                    } else {
                        checked.push(index);
                        checked.sort_unstable();
                    }
                }
                FieldChange::SetLineText { index, text } => {
                    if inputs.len() < lines {
                        let missing = options.defaults.iter().skip(inputs.len()).cloned();
                        inputs.extend(missing);
                        inputs.resize(lines, String::new());
                    }
                    inputs[index] = text;
                }
                other => {
                    return Err(mismatch(&other, &Answer::CheckboxInput { checked, inputs }));
                }
            }
            Ok(FieldUpdate::value(Answer::CheckboxInput { checked, inputs }))
        }

        (FieldKind::Agreement(_), Answer::Agreement { .. }, FieldChange::SetAgreement(agreed)) => {
            Ok(FieldUpdate::value(Answer::Agreement { agreed }))
        }

        (_, answer, change) => Err(mismatch(&change, &answer)),
    }
}
