//! Final submission payload and job tracking types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use super::step::scalar_to_string;

/// Identifies the backend job created by the final submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JobHandle {
    pub job_id: String,
    pub user_id: String,
}

/// Response of the job status endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JobStatus {
    #[serde(default)]
    pub item_status: Option<String>,
    #[serde(default)]
    pub item_link: Option<String>,
}

impl JobStatus {
    /// Result link when the job reached a completed status with a real link.
    ///
    /// The backend reports `placeholder` as the link before the result is
    /// ready, so that value never counts.
    pub fn completed_link(
        &self,
        completed_statuses: &[String],
        placeholder: &str,
    ) -> Option<&str> {
        let status = self.item_status.as_deref()?;
        if !completed_statuses.iter().any(|s| s == status) {
            return None;
        }
        self.item_link
            .as_deref()
            .filter(|link| !link.is_empty() && *link != placeholder)
    }
}

/// Attempt bookkeeping for one polling run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollAttemptState {
    pub attempt_count: u32,
    pub last_status: Option<JobStatus>,
}

/// A single multipart field of the final submission
#[derive(Debug, Clone, PartialEq)]
pub enum JobField {
    Text(String),
    /// Structured value, sent as its JSON serialization
    Json(Value),
    Blob {
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
}

/// Aggregated job payload built on completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FinalJobData {
    pub user_id: Option<String>,
    pub process: String,
    pub session_id: String,
    pub user_prompt: String,
}

impl FinalJobData {
    /// Multipart fields in submission order. Absent values are skipped.
    pub fn fields(&self) -> Vec<(&'static str, JobField)> {
        let mut fields = Vec::with_capacity(4);
        if let Some(user_id) = &self.user_id {
            fields.push(("user_id", JobField::Text(user_id.clone())));
        }
        fields.push(("process", JobField::Text(self.process.clone())));
        fields.push(("session_id", JobField::Text(self.session_id.clone())));
        fields.push(("user_prompt", JobField::Text(self.user_prompt.clone())));
        fields
    }
}

/// What the submission endpoint acknowledged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub job_id: Option<String>,
}

impl SubmissionReceipt {
    /// Extract the job id from `item_name`, `jobId` or `id`, in that order.
    pub fn from_response(body: &Value) -> Self {
        let job_id = ["item_name", "jobId", "id"]
            .iter()
            .find_map(|key| body.get(*key).and_then(scalar_to_string));
        Self { job_id }
    }
}
