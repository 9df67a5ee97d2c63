use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// All engine-relevant environment variables, loaded once at process
/// start: read-env-with-default, fail fast on required.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub task_sync_interval_minutes: i64,
    pub task_sync_threshold_minutes: i64,
    pub task_queued_timeout_minutes: i64,
    pub eval_interval_minutes: i64,
    pub pipeline_poll_interval_ms: u64,
    pub pipeline_status_timeout_minutes: i64,
    pub stuck_eval_check_interval_minutes: i64,
    pub stuck_evaluation_timeout_minutes: i64,
    pub api_base_url: Option<String>,
    pub ci_callback_token: Option<String>,
    pub anthropic_platform_api_key: Option<String>,
    pub gitlab_host: Option<String>,
    pub gitlab_token: Option<String>,
    pub gitlab_user: Option<String>,
    pub encryption_key: String,
    pub jira_oauth_client_id: Option<String>,
    pub jira_oauth_client_secret: Option<String>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            task_sync_interval_minutes: optional_parse("TASK_SYNC_INTERVAL_MINUTES", 15)?,
            task_sync_threshold_minutes: optional_parse("TASK_SYNC_THRESHOLD_MINUTES", 30)?,
            task_queued_timeout_minutes: optional_parse("TASK_QUEUED_TIMEOUT_MINUTES", 120)?,
            eval_interval_minutes: optional_parse("EVAL_INTERVAL_MINUTES", 1)?,
            pipeline_poll_interval_ms: optional_parse("PIPELINE_POLL_INTERVAL_MS", 600_000)?,
            pipeline_status_timeout_minutes: optional_parse("PIPELINE_STATUS_TIMEOUT_MINUTES", 30)?,
            stuck_eval_check_interval_minutes: optional_parse("STUCK_EVAL_CHECK_INTERVAL_MINUTES", 15)?,
            stuck_evaluation_timeout_minutes: optional_parse("STUCK_EVALUATION_TIMEOUT_MINUTES", 60)?,
            api_base_url: env::var("API_BASE_URL").ok(),
            ci_callback_token: env::var("API_TOKEN").ok(),
            anthropic_platform_api_key: env::var("ANTHROPIC_PLATFORM_API_KEY").ok(),
            gitlab_host: env::var("GITLAB_HOST").ok(),
            gitlab_token: env::var("GITLAB_TOKEN").ok(),
            gitlab_user: env::var("GITLAB_USER").ok(),
            encryption_key: required("ENCRYPTION_KEY")?,
            jira_oauth_client_id: env::var("JIRA_OAUTH_CLIENT_ID").ok(),
            jira_oauth_client_secret: env::var("JIRA_OAUTH_CLIENT_SECRET").ok(),
        })
    }

    pub fn pipeline_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pipeline_poll_interval_ms)
    }

    /// The platform-wide Anthropic config `Selector` falls back to when a
    /// project's owner hasn't configured their own credential.
    /// `None` when `ANTHROPIC_PLATFORM_API_KEY` isn't set, which simply
    /// removes that fallback tier — every caller then resolves against
    /// their project's own config.
    pub fn platform_config(&self) -> Option<serde_json::Value> {
        self.anthropic_platform_api_key.as_ref().map(|key| {
            serde_json::json!({
                "api_key": key,
            })
        })
    }

    /// The GitLab host used for CI calls when a worker repository's own
    /// `source` blob doesn't carry one.
    pub fn default_gitlab_host(&self) -> String {
        self.gitlab_host.clone().unwrap_or_else(|| "https://gitlab.com".to_string())
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn optional_parse<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}
