//! Final prompt rendering

use handlebars::Handlebars;
use serde_json::{json, Value};

use crate::config::PromptConfig;
use crate::error::FormError;
use crate::types::{FinalJobData, HistoryEntry, IntroResponse, Session};

const TEMPLATE_NAME: &str = "final_prompt";

/// Renders the natural-language prompt sent with the final submission
pub struct PromptBuilder {
    handlebars: Handlebars<'static>,
    unspecified_company: String,
    unspecified_sector: String,
}

impl PromptBuilder {
    pub fn new(config: &PromptConfig) -> Result<Self, FormError> {
        let mut handlebars = Handlebars::new();
        // Plain text prompt, nothing to escape
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string(TEMPLATE_NAME, &config.template)
            .map_err(|e| FormError::invalid_state(format!("Invalid prompt template: {e}")))?;

        Ok(Self {
            handlebars,
            unspecified_company: config.unspecified_company.clone(),
            unspecified_sector: config.unspecified_sector.clone(),
        })
    }

    /// Render the prompt for `intro` and the given history.
    ///
    /// History entries are sanitized and embedded as pretty-printed JSON.
    pub fn render(
        &self,
        intro: &IntroResponse,
        history: &[HistoryEntry],
    ) -> Result<String, FormError> {
        let sanitized: Vec<Value> = history
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.sanitized(index))
            .collect();
        let history_json = serde_json::to_string_pretty(&sanitized)
            .map_err(|e| FormError::decode(e.to_string()))?;

        let sector = if intro.sector.trim().is_empty() {
            self.unspecified_sector.as_str()
        } else {
            intro.sector.as_str()
        };
        let company = intro
            .company
            .as_deref()
            .unwrap_or(self.unspecified_company.as_str());

        let context = json!({
            "company": company,
            "sector": sector,
            "history": history_json,
        });

        self.handlebars
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| FormError::invalid_state(format!("Failed to render prompt: {e}")))
    }

    /// Assemble the final job payload for this session
    pub fn build_final_job_data(
        &self,
        session: &Session,
        intro: &IntroResponse,
        history: &[HistoryEntry],
    ) -> Result<FinalJobData, FormError> {
        Ok(FinalJobData {
            user_id: session.user_id.clone(),
            process: session.process_name.clone(),
            session_id: session.session_id.clone(),
            user_prompt: self.render(intro, history)?,
        })
    }
}
