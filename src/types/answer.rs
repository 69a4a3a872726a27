//! Answers, the answer history and the transient file selection

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use ts_rs::TS;

/// Normalized answer value, tagged by question type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum AnswerPayload {
    #[serde(rename = "mcqInput")]
    Choice(String),
    #[serde(rename = "rangeInput")]
    Range(RangeSelection),
    #[serde(rename = "textInput")]
    Text(String),
    #[serde(rename = "fileUpload")]
    File(FileMeta),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RangeSelection {
    #[serde(rename = "selectedValue")]
    pub value: String,
    #[serde(rename = "selectedText")]
    pub label: String,
}

/// Metadata sent in place of the file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FileMeta {
    #[serde(rename = "fileName")]
    pub name: String,
    #[serde(rename = "fileSize")]
    #[ts(type = "number")]
    pub size: u64,
    #[serde(rename = "fileType")]
    pub mime_type: String,
}

/// The `answer` object sent to the orchestration endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AnswerSubmission {
    pub question: String,
    pub payload: AnswerPayload,
}

/// Locally recorded answer for one presented step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerRecord {
    #[serde(rename = "step")]
    pub step_index: u32,
    #[serde(rename = "question")]
    pub question_text: String,
    #[serde(rename = "answer")]
    pub payload: AnswerPayload,
}

/// Append-only answers in presentation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerHistory {
    records: Vec<AnswerRecord>,
}

impl AnswerHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: AnswerRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AnswerRecord] {
        &self.records
    }

    /// Index to record when the backend did not assign one
    pub fn next_step_index(&self) -> u32 {
        self.records.len() as u32 + 1
    }

    /// History in the same shape the backend returns it
    pub fn to_entries(&self) -> Vec<HistoryEntry> {
        self.records.iter().map(HistoryEntry::from).collect()
    }
}

/// A history entry as returned by the backend. All fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub step: Option<Value>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<Value>,
}

impl HistoryEntry {
    /// Fill in defaults for a serialized prompt: position, empty question,
    /// empty answer object.
    pub fn sanitized(&self, index: usize) -> Value {
        json!({
            "step": self.step.clone().unwrap_or_else(|| json!(index + 1)),
            "question": self.question.clone().unwrap_or_default(),
            "answer": self.answer.clone().unwrap_or_else(|| json!({})),
        })
    }
}

impl From<&AnswerRecord> for HistoryEntry {
    fn from(record: &AnswerRecord) -> Self {
        Self {
            step: Some(json!(record.step_index)),
            question: Some(record.question_text.clone()),
            answer: serde_json::to_value(&record.payload).ok(),
        }
    }
}

/// File picked for the current upload step. At most one exists at a time.
#[derive(Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lower-cased extension with its dot, e.g. `.pdf`
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.name.rsplit_once('.')?;
        Some(format!(".{}", ext.to_lowercase()))
    }

    pub fn meta(&self) -> FileMeta {
        FileMeta {
            name: self.name.clone(),
            size: self.size(),
            mime_type: self.mime_type.clone(),
        }
    }
}

impl std::fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}
