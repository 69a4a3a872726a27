//! Job status endpoint client

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{build_http_client, status_line};
use crate::config::Config;
use crate::error::{FormError, PollingError};
use crate::types::{JobHandle, JobStatus};

/// One status fetch per call; the poller owns scheduling
#[async_trait]
pub trait JobStatusClient: Send + Sync {
    async fn fetch_status(&self, job: &JobHandle) -> Result<JobStatus, PollingError>;
}

#[derive(Debug, Serialize)]
struct StatusRequest<'a> {
    user_id: &'a str,
    item_name: &'a str,
}

pub struct HttpStatusClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    bearer_token: Option<String>,
}

impl HttpStatusClient {
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
        Ok(Self::new(&config.endpoints.status_url, config.request_timeout())?
            .with_bearer_token(config.identity.bearer_token()))
    }
}

#[async_trait]
impl JobStatusClient for HttpStatusClient {
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    async fn fetch_status(&self, job: &JobHandle) -> Result<JobStatus, PollingError> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&StatusRequest {
                user_id: &job.user_id,
                item_name: &job.job_id,
            });
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PollingError::StatusFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollingError::StatusFetch(status_line(status)));
        }

        let job_status: JobStatus = response
            .json()
            .await
            .map_err(|e| PollingError::StatusFetch(e.to_string()))?;

        debug!(
            item_status = ?job_status.item_status,
            item_link = ?job_status.item_link,
            "Fetched job status"
        );
        Ok(job_status)
    }
}
