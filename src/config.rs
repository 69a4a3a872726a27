use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::capture::parse_file_size;
use crate::types::QuestionType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub form: FormConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote endpoints the form talks to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Step orchestration endpoint (POST, JSON)
    #[serde(default = "default_step_url")]
    pub step_url: String,
    /// Final job submission endpoint (POST, multipart)
    #[serde(default = "default_final_submission_url")]
    pub final_submission_url: String,
    /// Job status endpoint (POST, JSON)
    #[serde(default = "default_status_url")]
    pub status_url: String,
    /// Result viewer the user is redirected to once the job is published
    #[serde(default = "default_result_viewer_url")]
    pub result_viewer_url: String,
}

fn default_step_url() -> String {
    "https://rjttx5p195.execute-api.eu-central-1.amazonaws.com/default/multiStep_form_Orchestrator"
        .to_string()
}

fn default_final_submission_url() -> String {
    "https://gdi9c82r4j.execute-api.eu-west-1.amazonaws.com/moderate-test".to_string()
}

fn default_status_url() -> String {
    "https://gdi9c82r4j.execute-api.eu-west-1.amazonaws.com/getitemstatus".to_string()
}

fn default_result_viewer_url() -> String {
    "https://app.gbqr.us/models/xavier-ai-editor".to_string()
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            step_url: default_step_url(),
            final_submission_url: default_final_submission_url(),
            status_url: default_status_url(),
            result_viewer_url: default_result_viewer_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    /// Backend workflow selector sent with every request
    #[serde(default = "default_process")]
    pub process: String,
    /// Delay before a choice selection auto-submits (default: 600ms)
    #[serde(default = "default_auto_submit_delay")]
    pub auto_submit_delay_ms: u64,
    /// Delay before a range selection auto-submits (default: 800ms)
    #[serde(default = "default_range_auto_submit_delay")]
    pub range_auto_submit_delay_ms: u64,
    /// Timeout in seconds for step and final submission requests (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_process() -> String {
    "gtmstrategy".to_string()
}

fn default_auto_submit_delay() -> u64 {
    600
}

fn default_range_auto_submit_delay() -> u64 {
    800
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            process: default_process(),
            auto_submit_delay_ms: default_auto_submit_delay(),
            range_auto_submit_delay_ms: default_range_auto_submit_delay(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Timeout in seconds for a single file upload (default: 30)
    #[serde(default = "default_upload_timeout")]
    pub timeout_secs: u64,
    /// Size limit applied when the step does not declare one
    #[serde(default = "default_max_file_size")]
    pub max_file_size: String,
    /// Content type sent with the raw upload body
    #[serde(default = "default_upload_content_type")]
    pub content_type: String,
}

fn default_upload_timeout() -> u64 {
    30
}

fn default_max_file_size() -> String {
    "10MB".to_string()
}

fn default_upload_content_type() -> String {
    "binary/octet-stream".to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_upload_timeout(),
            max_file_size: default_max_file_size(),
            content_type: default_upload_content_type(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between job status checks (default: 5)
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    /// Status checks allowed before giving up (default: 100)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Statuses that mean the job finished successfully
    #[serde(default = "default_completed_statuses")]
    pub completed_statuses: Vec<String>,
    /// Link value the backend reports before the real result exists
    #[serde(default = "default_placeholder_link")]
    pub placeholder_link: String,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    100
}

fn default_completed_statuses() -> Vec<String> {
    vec!["ITEM_PUBLISHED".to_string(), "ITEM_PUBLISHED_POLL".to_string()]
}

fn default_placeholder_link() -> String {
    "testeLink".to_string()
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            max_attempts: default_max_attempts(),
            completed_statuses: default_completed_statuses(),
            placeholder_link: default_placeholder_link(),
        }
    }
}

/// Final prompt rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Handlebars template with `company`, `sector` and `history` variables
    #[serde(default = "default_prompt_template")]
    pub template: String,
    #[serde(default = "default_unspecified_company")]
    pub unspecified_company: String,
    #[serde(default = "default_unspecified_sector")]
    pub unspecified_sector: String,
}

fn default_prompt_template() -> String {
    "I want a strategic plan for a company {{company}} in the sector {{sector}}. \
     Please take into account the following questions that were asked:\n{{history}}"
        .to_string()
}

fn default_unspecified_company() -> String {
    "an unspecified company".to_string()
}

fn default_unspecified_sector() -> String {
    "an unspecified sector".to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: default_prompt_template(),
            unspecified_company: default_unspecified_company(),
            unspecified_sector: default_unspecified_sector(),
        }
    }
}

/// External identity, owned by the host environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// User id of the signed-in member, if any
    #[serde(default)]
    pub user_id: Option<String>,
    /// Environment variable holding the member bearer token
    #[serde(default)]
    pub token_env: Option<String>,
}

impl IdentityConfig {
    /// Read the bearer token from the configured environment variable.
    ///
    /// A missing variable or an empty value yields `None`.
    pub fn bearer_token(&self) -> Option<String> {
        let var = self.token_env.as_deref()?;
        match std::env::var(var) {
            Ok(token) if !token.is_empty() => Some(token),
            _ => {
                tracing::debug!(env_var = var, "Bearer token environment variable is not set");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to log to a file instead of stderr
    #[serde(default)]
    pub to_file: bool,

    /// Directory for log files (default: ./logs)
    #[serde(default = "default_log_directory")]
    pub directory: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
            directory: default_log_directory(),
        }
    }
}

impl Config {
    /// Path to the project-local config file
    pub fn local_config_path() -> PathBuf {
        PathBuf::from("stepform.toml")
    }

    /// Load configuration from layered sources.
    ///
    /// Precedence (lowest first): embedded defaults, `./stepform.toml`,
    /// `~/.config/stepform/config.toml`, the explicit path, then
    /// `STEPFORM__*` environment variables.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let local_config = Self::local_config_path();
        if local_config.exists() {
            builder = builder.add_source(config::File::from(local_config));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("stepform").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("STEPFORM")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.form.request_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload.timeout_secs)
    }

    /// Auto-submit delay for a question type, `None` when it never auto-submits
    pub fn auto_submit_delay(&self, question_type: &QuestionType) -> Option<Duration> {
        match question_type {
            QuestionType::MultipleChoice => {
                Some(Duration::from_millis(self.form.auto_submit_delay_ms))
            }
            QuestionType::Range => Some(Duration::from_millis(
                self.form.range_auto_submit_delay_ms,
            )),
            _ => None,
        }
    }

    /// Default upload size limit in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        parse_file_size(&self.upload.max_file_size)
    }

    /// Path to the logs directory
    pub fn logs_path(&self) -> PathBuf {
        PathBuf::from(&self.logging.directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_backend_contract() {
        let config = Config::default();
        assert_eq!(config.form.process, "gtmstrategy");
        assert_eq!(config.polling.max_attempts, 100);
        assert_eq!(config.polling.interval(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.upload_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_file_size_bytes(), 10 * 1024 * 1024);
        assert_eq!(
            config.polling.completed_statuses,
            vec!["ITEM_PUBLISHED", "ITEM_PUBLISHED_POLL"]
        );
        assert_eq!(config.polling.placeholder_link, "testeLink");
    }

    #[test]
    fn test_load_with_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[form]\nprocess = \"pricing\"\n\n[polling]\nmax_attempts = 7\ninterval_secs = 1"
        )
        .unwrap();

        let config = Config::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.form.process, "pricing");
        assert_eq!(config.polling.max_attempts, 7);
        assert_eq!(config.polling.interval(), Duration::from_secs(1));
        // Untouched sections keep their defaults
        assert_eq!(config.upload.content_type, "binary/octet-stream");
        assert_eq!(config.form.request_timeout_secs, 30);
    }

    #[test]
    fn test_bearer_token_missing_env_is_none() {
        let identity = IdentityConfig {
            user_id: None,
            token_env: Some("STEPFORM_TEST_TOKEN_THAT_IS_NEVER_SET".to_string()),
        };
        assert_eq!(identity.bearer_token(), None);

        let no_env = IdentityConfig::default();
        assert_eq!(no_env.bearer_token(), None);
    }
}
