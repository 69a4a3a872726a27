//! Final job submission client (multipart)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{build_http_client, status_line};
use crate::config::Config;
use crate::error::FormError;
use crate::types::{FinalJobData, JobField, SubmissionReceipt};

/// Posts the aggregated job payload and returns what the backend acknowledged
#[async_trait]
pub trait FinalSubmissionClient: Send + Sync {
    async fn submit(&self, job: &FinalJobData) -> Result<SubmissionReceipt, FormError>;
}

pub struct HttpSubmissionClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    bearer_token: Option<String>,
}

impl HttpSubmissionClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FormError> {
        Ok(Self {
            client: build_http_client()?,
            url: url.into(),
            timeout,
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, FormError> {
        Ok(
            Self::new(&config.endpoints.final_submission_url, config.request_timeout())?
                .with_bearer_token(config.identity.bearer_token()),
        )
    }
}

/// Encode job fields as a multipart form. Structured values are serialized.
pub(crate) fn build_form(fields: Vec<(&'static str, JobField)>) -> Result<Form, FormError> {
    let mut form = Form::new();
    for (name, field) in fields {
        form = match field {
            JobField::Text(value) => form.text(name, value),
            JobField::Json(value) => form.text(name, value.to_string()),
            JobField::Blob {
                file_name,
                mime_type,
                bytes,
            } => {
                let part = Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str(&mime_type)
                    .map_err(|e| FormError::validation(format!("Invalid file type: {e}")))?;
                form.part(name, part)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl FinalSubmissionClient for HttpSubmissionClient {
    #[instrument(skip(self, job), fields(session_id = %job.session_id))]
    async fn submit(&self, job: &FinalJobData) -> Result<SubmissionReceipt, FormError> {
        let form = build_form(job.fields())?;

        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .multipart(form);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FormError::from_transport("Final submission request", &e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Final submission rejected");
            return Err(FormError::api(
                format!("Final submission failed: {}", status_line(status)),
                status.as_u16(),
            ));
        }

        // Some deployments answer with an empty or non-JSON body
        let body = response
            .text()
            .await
            .map_err(|e| FormError::from_transport("Final submission request", &e))?;
        let value = serde_json::from_str::<Value>(&body).unwrap_or(Value::Null);
        let receipt = SubmissionReceipt::from_response(&value);

        info!(job_id = ?receipt.job_id, "Final submission accepted");
        Ok(receipt)
    }
}
