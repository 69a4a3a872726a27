//! Error taxonomy for the form lifecycle.
//!
//! Every core operation returns [`FormError`]. Callers that need a single
//! line for the user call [`FormError::user_message`], which applies the
//! status-bucket classification for remote rejections.

use thiserror::Error;

/// Errors raised while driving the questionnaire
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormError {
    /// Local input problem the user can fix in place
    #[error("{0}")]
    Validation(String),

    /// Remote endpoint answered with a non-success status
    #[error("{message}")]
    Api { message: String, status_code: u16 },

    /// Request exceeded its deadline
    #[error("{operation} timed out")]
    Timeout { operation: String },

    /// File upload failed; the step was not submitted
    #[error("upload failed: {0}")]
    Upload(String),

    /// Job polling ended without a result
    #[error(transparent)]
    Polling(#[from] PollingError),

    /// Transport failure before any response arrived
    #[error("network error: {0}")]
    Network(String),

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Operation is not valid in the current form phase
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Terminal polling failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollingError {
    #[error("Job took too long to finish after {attempts} status checks. Please try again later.")]
    BudgetExceeded { attempts: u32 },

    #[error("Polling failed: {0}")]
    StatusFetch(String),

    /// A newer polling run replaced this one
    #[error("polling run was superseded")]
    Superseded,

    /// The host stopped tracking the job
    #[error("Polling cancelled. Please try again later.")]
    Cancelled,
}

impl FormError {
    pub fn validation(message: impl Into<String>) -> Self {
        FormError::Validation(message.into())
    }

    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        FormError::Api {
            message: message.into(),
            status_code,
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        FormError::Timeout {
            operation: operation.into(),
        }
    }

    pub fn upload(message: impl Into<String>) -> Self {
        FormError::Upload(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        FormError::Network(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        FormError::Decode(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        FormError::InvalidState(message.into())
    }

    /// Map a transport error from reqwest, separating deadline expiry.
    pub fn from_transport(operation: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FormError::timeout(operation)
        } else if err.is_decode() {
            FormError::decode(err.to_string())
        } else {
            FormError::network(err.to_string())
        }
    }

    /// Status code for remote rejections
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FormError::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Whether the user can fix the problem without leaving the current step
    pub fn is_validation(&self) -> bool {
        matches!(self, FormError::Validation(_))
    }

    /// Whether a fresh user-initiated attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FormError::Timeout { .. } | FormError::Network(_) | FormError::Upload(_) => true,
            FormError::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// The single message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            FormError::Validation(message) => message.clone(),
            FormError::Upload(_) => "File upload failed. Please try again.".to_string(),
            FormError::Api {
                message,
                status_code,
            } => match *status_code {
                404 => "Form not found. Please check your configuration.".to_string(),
                400 => "Invalid request. Please refresh the page and try again.".to_string(),
                code if code >= 500 => "Server error. Please try again in a moment.".to_string(),
                _ => message.clone(),
            },
            FormError::Timeout { .. } => "Request timeout. Please try again.".to_string(),
            FormError::Polling(err) => match err {
                PollingError::Superseded => {
                    "A newer status check replaced this one.".to_string()
                }
                other => other.to_string(),
            },
            FormError::Network(_) => {
                "Network error. Please check your connection and try again.".to_string()
            }
            FormError::Decode(_) | FormError::InvalidState(_) => {
                "An unexpected error occurred. Please try again.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_status_buckets() {
        assert_eq!(
            FormError::api("nope", 404).user_message(),
            "Form not found. Please check your configuration."
        );
        assert_eq!(
            FormError::api("bad", 400).user_message(),
            "Invalid request. Please refresh the page and try again."
        );
        assert_eq!(
            FormError::api("boom", 500).user_message(),
            "Server error. Please try again in a moment."
        );
        assert_eq!(
            FormError::api("boom", 503).user_message(),
            "Server error. Please try again in a moment."
        );
        assert_eq!(
            FormError::api("Session expired", 409).user_message(),
            "Session expired"
        );
    }

    #[test]
    fn test_validation_message_passes_through() {
        let err = FormError::validation("Please select an option");
        assert!(err.is_validation());
        assert_eq!(err.user_message(), "Please select an option");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FormError::timeout("step request").is_retryable());
        assert!(FormError::network("reset").is_retryable());
        assert!(FormError::api("x", 502).is_retryable());
        assert!(!FormError::api("x", 404).is_retryable());
        assert!(!FormError::from(PollingError::BudgetExceeded { attempts: 100 }).is_retryable());
    }

    #[test]
    fn test_polling_messages() {
        let err = FormError::from(PollingError::BudgetExceeded { attempts: 100 });
        assert!(err.user_message().contains("too long"));

        let err = FormError::from(PollingError::StatusFetch("502 Bad Gateway".into()));
        assert_eq!(err.user_message(), "Polling failed: 502 Bad Gateway");

        let err = FormError::from(PollingError::Cancelled);
        assert_eq!(
            err.user_message(),
            "Polling cancelled. Please try again later."
        );
    }

    #[test]
    fn test_status_code() {
        assert_eq!(FormError::api("x", 418).status_code(), Some(418));
        assert_eq!(FormError::timeout("upload").status_code(), None);
    }
}
