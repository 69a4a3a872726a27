//! Backend-supplied step descriptors and the raw orchestration response

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::answer::HistoryEntry;

/// Message some completion paths send instead of `isComplete`
pub const COMPLETION_MESSAGE: &str = "Form completed successfully";

/// Closed set of question kinds the form understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionType {
    MultipleChoice,
    Range,
    TextInput,
    FileUpload,
    /// Anything else the backend sends; cannot be answered
    Unsupported(String),
}

impl QuestionType {
    /// Parse the wire name used by the orchestration endpoint
    pub fn from_wire(name: &str) -> Self {
        match name {
            "multiple_choice" => QuestionType::MultipleChoice,
            "range" => QuestionType::Range,
            "text_input" => QuestionType::TextInput,
            "file_upload" => QuestionType::FileUpload,
            other => QuestionType::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::Range => "range",
            QuestionType::TextInput => "text_input",
            QuestionType::FileUpload => "file_upload",
            QuestionType::Unsupported(name) => name,
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable option of a choice or range question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub text: String,
}

impl ChoiceOption {
    /// Value submitted for a multiple choice selection
    pub fn choice_value(&self) -> String {
        self.value
            .as_ref()
            .and_then(scalar_to_string)
            .unwrap_or_else(|| self.text.clone())
    }

    /// Value submitted for a range selection at `index` (zero-based)
    pub fn range_value(&self, index: usize) -> String {
        self.id
            .as_ref()
            .and_then(scalar_to_string)
            .or_else(|| self.value.as_ref().and_then(scalar_to_string))
            .unwrap_or_else(|| (index + 1).to_string())
    }
}

/// Render a JSON scalar the way a form field would hold it.
///
/// Empty strings, `false`, zero and null count as absent.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Per-type configuration attached to a step. Unknown keys are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeConfig {
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
    /// Pre-signed destination for file steps
    #[serde(default)]
    pub upload_url: Option<String>,
    #[serde(default)]
    pub s3_key: Option<String>,
    /// Size limit such as `"5MB"`
    #[serde(default)]
    pub max_file_size: Option<String>,
    /// Human readable limit shown in messages
    #[serde(default)]
    pub max_size: Option<String>,
    #[serde(default)]
    pub accepted_types: Vec<String>,
    /// File picker filter, used when `accepted_types` is empty
    #[serde(default)]
    pub accepted_file_types: Vec<String>,
    #[serde(default)]
    pub multiline: bool,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub rows: Option<u32>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl TypeConfig {
    pub fn option(&self, index: usize) -> Option<&ChoiceOption> {
        self.options.get(index)
    }

    /// Extensions or MIME types a file step accepts. Empty means any.
    pub fn accepted(&self) -> &[String] {
        if self.accepted_types.is_empty() {
            &self.accepted_file_types
        } else {
            &self.accepted_types
        }
    }
}

/// Optional progress hint for display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub current: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
}

/// The step currently presented. Replaced wholesale on every response.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDescriptor {
    /// Backend-assigned index; absent when the backend omits it
    pub step_index: Option<u32>,
    pub question_text: String,
    pub question_type: QuestionType,
    pub type_config: TypeConfig,
    pub progress: Option<Progress>,
    pub is_last_step: bool,
}

impl StepDescriptor {
    /// Label for the step counter, e.g. "Step 2 of 7"
    pub fn step_label(&self) -> Option<String> {
        let index = self.step_index?;
        match self.progress.as_ref().and_then(|p| p.total) {
            Some(total) => Some(format!("Step {index} of {total}")),
            None => Some(format!("Step {index}")),
        }
    }

    /// Label for the submit control
    pub fn submit_label(&self) -> &'static str {
        if self.is_last_step {
            "Submit Form"
        } else {
            "Continue"
        }
    }
}

/// Raw response of the orchestration endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse {
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub history: Option<Value>,
    #[serde(default)]
    pub current_step: Option<Value>,
    #[serde(default)]
    pub question_type: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub config: Option<TypeConfig>,
    #[serde(default)]
    pub progress: Option<Progress>,
    #[serde(default)]
    pub is_last_step: Option<bool>,
}

/// What the backend decided after a step exchange
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Present this step next
    Step(StepDescriptor),
    /// The questionnaire is finished. `history` is empty when the backend
    /// did not return one.
    Complete { history: Vec<HistoryEntry> },
}

impl StepResponse {
    pub fn signals_completion(&self) -> bool {
        self.is_complete || self.message.as_deref() == Some(COMPLETION_MESSAGE)
    }

    pub fn into_outcome(self) -> StepOutcome {
        if self.signals_completion() {
            let history = match self.history {
                Some(Value::Array(entries)) => entries
                    .into_iter()
                    .filter_map(|entry| serde_json::from_value(entry).ok())
                    .collect(),
                _ => Vec::new(),
            };
            return StepOutcome::Complete { history };
        }

        let step_index = self.current_step.as_ref().and_then(|v| match v {
            Value::Number(n) => n.as_u64().map(|n| n as u32),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        StepOutcome::Step(StepDescriptor {
            step_index,
            question_text: self.question.unwrap_or_default(),
            question_type: QuestionType::from_wire(self.question_type.as_deref().unwrap_or("")),
            type_config: self.config.unwrap_or_default(),
            progress: self.progress,
            is_last_step: self.is_last_step.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> StepOutcome {
        serde_json::from_value::<StepResponse>(value)
            .unwrap()
            .into_outcome()
    }

    #[test]
    fn test_step_response_parses_descriptor() {
        let outcome = parse(json!({
            "currentStep": 3,
            "questionType": "multiple_choice",
            "question": "Who are your buyers?",
            "config": {"options": [{"text": "SMB", "value": "smb"}, {"text": "Enterprise"}]},
            "progress": {"total": 8},
            "isLastStep": false
        }));

        let StepOutcome::Step(step) = outcome else {
            panic!("expected a step");
        };
        assert_eq!(step.step_index, Some(3));
        assert_eq!(step.question_type, QuestionType::MultipleChoice);
        assert_eq!(step.type_config.options.len(), 2);
        assert_eq!(step.step_label().as_deref(), Some("Step 3 of 8"));
        assert_eq!(step.submit_label(), "Continue");
    }

    #[test]
    fn test_completion_by_flag_and_by_message() {
        let outcome = parse(json!({"isComplete": true, "history": [
            {"step": 1, "question": "Q1", "answer": {"textInput": "a"}}
        ]}));
        match outcome {
            StepOutcome::Complete { history } => {
                assert_eq!(history.len(), 1);
                assert_eq!(history[0].question.as_deref(), Some("Q1"));
            }
            StepOutcome::Step(_) => panic!("expected completion"),
        }

        let outcome = parse(json!({"message": "Form completed successfully"}));
        assert_eq!(outcome, StepOutcome::Complete { history: vec![] });
    }

    #[test]
    fn test_non_array_history_is_treated_as_missing() {
        let outcome = parse(json!({"isComplete": true, "history": "n/a"}));
        assert_eq!(outcome, StepOutcome::Complete { history: vec![] });
    }

    #[test]
    fn test_unknown_question_type_is_unsupported() {
        let StepOutcome::Step(step) = parse(json!({"currentStep": "2", "questionType": "matrix"}))
        else {
            panic!("expected a step");
        };
        assert_eq!(step.step_index, Some(2));
        assert_eq!(
            step.question_type,
            QuestionType::Unsupported("matrix".to_string())
        );
    }

    #[test]
    fn test_type_config_keeps_upload_fields_and_extras() {
        let config: TypeConfig = serde_json::from_value(json!({
            "uploadUrl": "https://bucket.example/put",
            "s3Key": "uploads/a.pdf",
            "maxFileSize": "5MB",
            "acceptedTypes": [".pdf"],
            "theme": "dark"
        }))
        .unwrap();
        assert_eq!(config.upload_url.as_deref(), Some("https://bucket.example/put"));
        assert_eq!(config.s3_key.as_deref(), Some("uploads/a.pdf"));
        assert_eq!(config.max_file_size.as_deref(), Some("5MB"));
        assert_eq!(config.extra.get("theme"), Some(&json!("dark")));
    }

    #[test]
    fn test_option_values() {
        let option = ChoiceOption {
            id: None,
            value: Some(json!(4)),
            text: "Often".into(),
        };
        assert_eq!(option.choice_value(), "4");
        assert_eq!(option.range_value(0), "4");

        let bare = ChoiceOption {
            text: "Never".into(),
            ..ChoiceOption::default()
        };
        assert_eq!(bare.choice_value(), "Never");
        assert_eq!(bare.range_value(2), "3");

        let with_id = ChoiceOption {
            id: Some(json!("r1")),
            value: Some(json!("x")),
            text: "Rarely".into(),
        };
        assert_eq!(with_id.range_value(0), "r1");
    }
}
