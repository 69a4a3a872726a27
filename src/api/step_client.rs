//! Orchestration endpoint client

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use ts_rs::TS;

use super::build_http_client;
use crate::config::Config;
use crate::error::FormError;
use crate::types::{AnswerSubmission, IntroResponse, Session, StepOutcome, StepResponse};

/// Body of one step exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StepRequest {
    pub user_id: Option<String>,
    pub session_id: String,
    pub process: String,
    pub sector: String,
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub answer: Option<AnswerSubmission>,
}

impl StepRequest {
    pub fn new(session: &Session, intro: &IntroResponse, answer: Option<AnswerSubmission>) -> Self {
        Self {
            user_id: session.user_id.clone(),
            session_id: session.session_id.clone(),
            process: session.process_name.clone(),
            sector: intro.sector.clone(),
            company: intro.company.clone(),
            answer,
        }
    }
}

/// Exchanges session context and an optional answer for the next step
#[async_trait]
pub trait RemoteStepClient: Send + Sync {
    async fn exchange(&self, request: &StepRequest) -> Result<StepOutcome, FormError>;
}

/// reqwest-backed [`RemoteStepClient`]
pub struct HttpStepClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpStepClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FormError> {
        Ok(Self {
            client: build_http_client()?,
            url: url.into(),
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FormError> {
        Self::new(&config.endpoints.step_url, config.request_timeout())
    }
}

#[async_trait]
impl RemoteStepClient for HttpStepClient {
    #[instrument(skip(self, request), fields(session_id = %request.session_id, has_answer = request.answer.is_some()))]
    async fn exchange(&self, request: &StepRequest) -> Result<StepOutcome, FormError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| FormError::from_transport("Step request", &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| {
                    format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or_default()
                    )
                });
            warn!(status = status.as_u16(), %message, "Step request rejected");
            return Err(FormError::api(message, status.as_u16()));
        }

        let body: StepResponse = response
            .json()
            .await
            .map_err(|e| FormError::from_transport("Step request", &e))?;

        let outcome = body.into_outcome();
        match &outcome {
            StepOutcome::Step(step) => debug!(
                step_index = ?step.step_index,
                question_type = %step.question_type,
                "Received next step"
            ),
            StepOutcome::Complete { history } => {
                debug!(history_len = history.len(), "Backend reported completion")
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnswerPayload;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let session = Session {
            user_id: None,
            session_id: "session-1".into(),
            process_name: "gtmstrategy".into(),
        };
        let intro = IntroResponse::new("tech", None).unwrap();

        let request = StepRequest::new(&session, &intro, None);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "userId": null,
                "sessionId": "session-1",
                "process": "gtmstrategy",
                "sector": "tech",
                "company": null
            })
        );

        let answer = AnswerSubmission {
            question: "Q".into(),
            payload: AnswerPayload::Text("a".into()),
        };
        let request = StepRequest::new(&session, &intro, Some(answer));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["answer"],
            json!({"question": "Q", "payload": {"textInput": "a"}})
        );
    }
}
