//! Raw-byte upload to a pre-signed destination

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{info, instrument, warn};

use super::{build_http_client, status_line};
use crate::config::Config;
use crate::error::FormError;
use crate::types::SelectedFile;

#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// PUT the file bytes to `destination`. Never retried.
    async fn upload(&self, file: &SelectedFile, destination: &str) -> Result<(), FormError>;
}

pub struct HttpUploadTransport {
    client: reqwest::Client,
    timeout: Duration,
    content_type: String,
}

impl HttpUploadTransport {
    pub fn new(timeout: Duration, content_type: impl Into<String>) -> Result<Self, FormError> {
        Ok(Self {
            client: build_http_client()?,
            timeout,
            content_type: content_type.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FormError> {
        Self::new(config.upload_timeout(), &config.upload.content_type)
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    #[instrument(skip(self, file, destination), fields(file_name = %file.name, size = file.size()))]
    async fn upload(&self, file: &SelectedFile, destination: &str) -> Result<(), FormError> {
        let response = self
            .client
            .put(destination)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, &self.content_type)
            .body(file.bytes.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FormError::upload("Upload timed out")
                } else {
                    FormError::upload(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Upload rejected");
            return Err(FormError::upload(format!(
                "Upload failed: {}",
                status_line(status)
            )));
        }

        info!("File uploaded");
        Ok(())
    }
}
