//! Answer capture: turn what the user picked into a validated payload.
//!
//! Renderers keep an [`AnswerDraft`] up to date through their capture
//! callback; nothing here reads presentation state.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::FormError;
use crate::types::{
    AnswerPayload, AnswerSubmission, QuestionType, RangeSelection, SelectedFile, StepDescriptor,
    TypeConfig,
};

/// Limit used when a size string cannot be parsed
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

static FILE_SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+(?:\.\d+)?)\s*([A-Z]{1,2})$").expect("file size pattern is valid")
});

/// Current, not yet submitted, answer for a choice, range or text step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerDraft {
    Choice { value: String },
    Range { value: String, label: String },
    Text(String),
}

impl AnswerDraft {
    /// Draft for the option at `index` of a multiple choice step
    pub fn choice(config: &TypeConfig, index: usize) -> Option<Self> {
        let option = config.option(index)?;
        Some(AnswerDraft::Choice {
            value: option.choice_value(),
        })
    }

    /// Draft for the option at `index` of a range step
    pub fn range(config: &TypeConfig, index: usize) -> Option<Self> {
        let option = config.option(index)?;
        Some(AnswerDraft::Range {
            value: option.range_value(index),
            label: option.text.clone(),
        })
    }

    pub fn text(value: impl Into<String>) -> Self {
        AnswerDraft::Text(value.into())
    }
}

/// Check that the current input satisfies the step's question type.
pub fn validate_answer(
    step: &StepDescriptor,
    draft: Option<&AnswerDraft>,
    file: Option<&SelectedFile>,
) -> Result<(), FormError> {
    match (&step.question_type, draft) {
        (QuestionType::MultipleChoice, Some(AnswerDraft::Choice { .. })) => Ok(()),
        (QuestionType::MultipleChoice, _) => Err(FormError::validation("Please select an option")),
        (QuestionType::Range, Some(AnswerDraft::Range { .. })) => Ok(()),
        (QuestionType::Range, _) => Err(FormError::validation(
            "Please select a value on the range",
        )),
        (QuestionType::TextInput, Some(AnswerDraft::Text(text))) if !text.trim().is_empty() => {
            Ok(())
        }
        (QuestionType::TextInput, _) => Err(FormError::validation("Please enter your answer")),
        (QuestionType::FileUpload, _) if file.is_some() => Ok(()),
        (QuestionType::FileUpload, _) => Err(FormError::validation("Please select a file")),
        (QuestionType::Unsupported(name), _) => Err(FormError::validation(format!(
            "Unsupported question type: {name}"
        ))),
    }
}

/// Validate and build the answer sent with the next step request.
pub fn capture_answer(
    step: &StepDescriptor,
    draft: Option<&AnswerDraft>,
    file: Option<&SelectedFile>,
) -> Result<AnswerSubmission, FormError> {
    validate_answer(step, draft, file)?;

    let payload = match (&step.question_type, draft, file) {
        (QuestionType::MultipleChoice, Some(AnswerDraft::Choice { value }), _) => {
            AnswerPayload::Choice(value.clone())
        }
        (QuestionType::Range, Some(AnswerDraft::Range { value, label }), _) => {
            AnswerPayload::Range(RangeSelection {
                value: value.clone(),
                label: label.clone(),
            })
        }
        (QuestionType::TextInput, Some(AnswerDraft::Text(text)), _) => {
            AnswerPayload::Text(text.trim().to_string())
        }
        (QuestionType::FileUpload, _, Some(file)) => AnswerPayload::File(file.meta()),
        _ => return Err(FormError::validation("No answer captured")),
    };

    Ok(AnswerSubmission {
        question: step.question_text.clone(),
        payload,
    })
}

/// Check a picked file against the step's size limit and accepted types.
pub fn validate_file(
    file: &SelectedFile,
    config: &TypeConfig,
    default_limit: u64,
) -> Result<(), FormError> {
    let limit = config
        .max_file_size
        .as_deref()
        .map(parse_file_size)
        .unwrap_or(default_limit);

    if file.size() > limit {
        let shown = config.max_size.as_deref().unwrap_or("10MB");
        return Err(FormError::validation(format!(
            "File size exceeds maximum limit of {shown}"
        )));
    }

    let accepted_types = config.accepted();
    if !accepted_types.is_empty() {
        let extension = file.extension();
        let accepted = accepted_types
            .iter()
            .any(|t| Some(t.to_lowercase()) == extension || *t == file.mime_type);
        if !accepted {
            return Err(FormError::validation(format!(
                "File type not allowed. Accepted types: {}",
                accepted_types.join(", ")
            )));
        }
    }

    Ok(())
}

/// Parse sizes like `"10MB"`, `"1.5 GB"` or `"512kb"` into bytes.
///
/// Unknown units count as bytes; unparsable input yields the 10 MB default.
pub fn parse_file_size(size: &str) -> u64 {
    let Some(caps) = FILE_SIZE_RE.captures(size.trim()) else {
        return DEFAULT_MAX_FILE_SIZE;
    };

    let amount: f64 = caps[1].parse().unwrap_or(0.0);
    let unit: u64 = match caps[2].to_uppercase().as_str() {
        "KB" => 1024,
        "MB" => 1024 * 1024,
        "GB" => 1024 * 1024 * 1024,
        _ => 1,
    };

    (amount * unit as f64) as u64
}
