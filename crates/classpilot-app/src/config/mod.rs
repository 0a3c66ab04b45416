//! Configuration loading and XDG path helpers.
//!
//! Sources, lowest precedence first: built-in defaults, the XDG
//! `settings.toml`, the local `config/settings.toml`, the file named by
//! `CLASSPILOT_CONFIG_FILE`, then `CLASSPILOT__SECTION__KEY` variables.

use std::{env, fmt, path::PathBuf, time::Duration};

use classpilot_server::ServerConfig;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::services::completion::{CompletionSettings, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::services::sweeper::SweeperConfig;

const LOCAL_CONFIG_FILE: &str = "config/settings";
const SETTINGS_FILE_NAME: &str = "settings.toml";
const CONFIG_FILE_ENV: &str = "CLASSPILOT_CONFIG_FILE";
const ENV_PREFIX: &str = "CLASSPILOT";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8000";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error("no completion API key; set completion.api_key or OPENAI_API_KEY")]
    MissingApiKey,
    #[error("invalid configuration value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub completion: CompletionConfig,
    pub jobs: JobsConfig,
}

#[derive(Deserialize, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct JobsConfig {
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

impl fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("min_backoff_ms", &self.min_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .finish()
    }
}

impl AppConfig {
    /// Credential from `completion.api_key`, falling back to `OPENAI_API_KEY`.
    pub fn resolve_api_key(&self) -> Result<String, AppConfigError> {
        non_blank(self.completion.api_key.clone())
            .or_else(|| non_blank(env::var(API_KEY_ENV).ok()))
            .ok_or(AppConfigError::MissingApiKey)
    }

    pub fn completion_settings(&self, api_key: String) -> CompletionSettings {
        let completion = &self.completion;
        CompletionSettings::builder()
            .api_key(api_key)
            .base_url(completion.base_url.clone())
            .model(completion.model.clone())
            .timeout(Duration::from_secs(completion.timeout_secs))
            .max_retries(completion.max_retries)
            .min_backoff(Duration::from_millis(completion.min_backoff_ms))
            .max_backoff(Duration::from_millis(completion.max_backoff_ms))
            .build()
    }

    pub fn sweeper(&self) -> SweeperConfig {
        SweeperConfig {
            retention: Duration::from_secs(self.jobs.retention_secs),
            interval: Duration::from_secs(self.jobs.sweep_interval_secs),
        }
    }

    fn validate(&self) -> Result<(), AppConfigError> {
        if self.completion.model.trim().is_empty() {
            return Err(AppConfigError::Invalid {
                field: "completion.model",
                reason: "must not be empty".to_string(),
            });
        }
        if self.completion.timeout_secs == 0 {
            return Err(AppConfigError::Invalid {
                field: "completion.timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.completion.min_backoff_ms > self.completion.max_backoff_ms {
            return Err(AppConfigError::Invalid {
                field: "completion.min_backoff_ms",
                reason: format!(
                    "{} exceeds max_backoff_ms {}",
                    self.completion.min_backoff_ms, self.completion.max_backoff_ms
                ),
            });
        }
        if self.jobs.sweep_interval_secs == 0 {
            return Err(AppConfigError::Invalid {
                field: "jobs.sweep_interval_secs",
                reason: "must be positive".to_string(),
            });
        }
        self.server
            .cors
            .validate()
            .map_err(|reason| AppConfigError::Invalid {
                field: "server.cors",
                reason,
            })
    }
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let mut builder = Config::builder()
        .set_default("server.listen_addr", DEFAULT_LISTEN_ADDR)?
        .set_default("completion.base_url", DEFAULT_BASE_URL)?
        .set_default("completion.model", DEFAULT_MODEL)?
        .set_default("completion.timeout_secs", 60)?
        .set_default("completion.max_retries", 3)?
        .set_default("completion.min_backoff_ms", 250)?
        .set_default("completion.max_backoff_ms", 5000)?
        .set_default("jobs.retention_secs", 3600)?
        .set_default("jobs.sweep_interval_secs", 60)?;

    match xdg_config_file() {
        Ok(path) => builder = builder.add_source(File::from(path).required(false)),
        Err(err) => tracing::debug!(error = %err, "skipping XDG config file"),
    }

    builder = builder.add_source(File::with_name(LOCAL_CONFIG_FILE).required(false));

    if let Some(path) = env::var_os(CONFIG_FILE_ENV).filter(|value| !value.is_empty()) {
        builder = builder.add_source(File::from(PathBuf::from(path)).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("dev", "classpilot", "classpilot").ok_or(AppConfigError::MissingProjectDirs)
}

fn xdg_config_file() -> Result<PathBuf, AppConfigError> {
    Ok(project_dirs()?.config_dir().join(SETTINGS_FILE_NAME))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}
