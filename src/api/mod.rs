//! HTTP clients for the remote endpoints the form talks to
//!
//! Each endpoint sits behind an `async_trait` so the controller can be
//! driven by the reqwest implementations in production and by in-memory
//! doubles in tests.

pub mod status;
pub mod step_client;
pub mod submission;
pub mod upload;

pub use status::{HttpStatusClient, JobStatusClient};
pub use step_client::{HttpStepClient, RemoteStepClient, StepRequest};
pub use submission::{FinalSubmissionClient, HttpSubmissionClient};
pub use upload::{HttpUploadTransport, UploadTransport};

use reqwest::StatusCode;

use crate::error::FormError;

const USER_AGENT: &str = concat!("stepform/", env!("CARGO_PKG_VERSION"));

/// Build the shared reqwest client. Timeouts are set per request.
pub(crate) fn build_http_client() -> Result<reqwest::Client, FormError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| FormError::network(format!("Failed to build HTTP client: {e}")))
}

/// `"404 Not Found"` style text for a status
pub(crate) fn status_line(status: StatusCode) -> String {
    format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    )
    .trim_end()
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(StatusCode::NOT_FOUND), "404 Not Found");
        assert_eq!(
            status_line(StatusCode::from_u16(599).unwrap()),
            "599"
        );
    }
}
