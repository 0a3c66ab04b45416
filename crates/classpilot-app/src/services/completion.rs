//! Chat-completion client with bounded retries on transient failures.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use bon::Builder;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        system_instruction: &str,
        prompt: &str,
        model: &str,
    ) -> Result<String, CompletionError>;
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion API key is not configured")]
    MissingApiKey,
    #[error("failed to build HTTP client: {source}")]
    BuildClient {
        #[source]
        source: reqwest::Error,
    },
    #[error("completion request failed: {source}")]
    Request {
        #[source]
        source: reqwest::Error,
    },
    #[error("completion service returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("failed to decode completion response: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },
    #[error("completion response contained no content")]
    EmptyResponse,
}

impl CompletionError {
    /// Timeouts, connection failures, 429 and 5xx are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::Request { source } => source.is_timeout() || source.is_connect(),
            CompletionError::HttpStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(status)
            }
            CompletionError::MissingApiKey
            | CompletionError::BuildClient { .. }
            | CompletionError::Decode { .. }
            | CompletionError::EmptyResponse => false,
        }
    }
}

/// Connection and retry parameters for [`OpenAiCompletionClient`].
#[derive(Clone, Builder)]
pub struct CompletionSettings {
    #[builder(into)]
    pub api_key: String,
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    pub base_url: String,
    #[builder(into, default = DEFAULT_MODEL.to_string())]
    pub model: String,
    #[builder(default = Duration::from_secs(60))]
    pub timeout: Duration,
    #[builder(default = 3)]
    pub max_retries: usize,
    #[builder(default = Duration::from_millis(250))]
    pub min_backoff: Duration,
    #[builder(default = Duration::from_secs(5))]
    pub max_backoff: Duration,
}

impl fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("min_backoff", &self.min_backoff)
            .field("max_backoff", &self.max_backoff)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Clone)]
pub struct OpenAiCompletionClient {
    http: Client,
    endpoint: String,
    api_key: String,
    backoff: ExponentialBuilder,
}

impl OpenAiCompletionClient {
    pub fn new(settings: CompletionSettings) -> Result<Self, CompletionError> {
        let api_key = settings.api_key.trim();
        if api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }
        debug_assert!(settings.min_backoff <= settings.max_backoff);

        let http = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("classpilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| CompletionError::BuildClient { source })?;

        let backoff = ExponentialBuilder::default()
            .with_min_delay(settings.min_backoff)
            .with_max_delay(settings.max_backoff)
            .with_max_times(settings.max_retries)
            .with_jitter();

        Ok(Self {
            http,
            endpoint: format!(
                "{}/chat/completions",
                settings.base_url.trim_end_matches('/')
            ),
            api_key: api_key.to_string(),
            backoff,
        })
    }

    async fn send_once(&self, request: &ChatRequest<'_>) -> Result<String, CompletionError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|source| CompletionError::Request { source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| CompletionError::Request { source })?;

        if !status.is_success() {
            return Err(CompletionError::HttpStatus {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|source| CompletionError::Decode { source })?;

        if let Some(usage) = parsed.usage.as_ref() {
            debug!(
                model = request.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "completion usage"
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(
        &self,
        system_instruction: &str,
        prompt: &str,
        model: &str,
    ) -> Result<String, CompletionError> {
        debug_assert!(!model.is_empty());
        let request = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let attempt = || async { self.send_once(&request).await };

        attempt
            .retry(self.backoff.clone())
            .sleep(sleep)
            .when(CompletionError::is_transient)
            .notify(|err: &CompletionError, delay: Duration| {
                warn!(
                    model,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "retrying completion request"
                );
            })
            .await
    }
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
