mod gemini;
pub mod health;
mod ollama;
pub mod session;
pub mod types;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use verifai_common::config::{LlmConfig, RetryConfig};

use crate::config::Credentials;
use crate::retry::Backoff;

pub use health::check_backend;
pub use types::{
    ChatOptions, ContentBlock, LlmResponse, Message, Role, StopReason, TokenUsage, ToolDefinition,
};

/// LLM API client with provider dispatch and retry logic.
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
    retry_config: RetryConfig,
    base_url: String,
    api_key: Option<String>,
}

/// Errors from LLM API calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM HTTP error: {0}")]
    Http(String),

    #[error("LLM backend unreachable at {url}: {detail}")]
    Unreachable { url: String, detail: String },

    #[error("LLM auth error: {0}")]
    Auth(String),

    #[error("LLM rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("LLM context window exceeded: {0}")]
    ContextWindowExceeded(String),

    #[error("Model not available: {0}")]
    ModelNotFound(String),

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("LLM response parse error: {0}")]
    Parse(String),
}

impl LlmError {
    /// Whether this error should not be retried.
    fn is_non_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Auth(_) | LlmError::ContextWindowExceeded(_) | LlmError::ModelNotFound(_)
        )
    }
}

impl From<LlmError> for verifai_common::VerifaiError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Auth(_) | LlmError::ModelNotFound(_) | LlmError::Unreachable { .. } => {
                verifai_common::VerifaiError::Config(e.to_string())
            }
            other => verifai_common::VerifaiError::LlmApi(other.to_string()),
        }
    }
}

impl LlmClient {
    /// Create a new LLM client for the configured provider.
    ///
    /// Gemini requires an API key; Ollama needs none.
    pub fn new(
        config: LlmConfig,
        retry_config: RetryConfig,
        credentials: &Credentials,
    ) -> Result<Self, LlmError> {
        let (base_url, api_key) = match config.provider.as_str() {
            "ollama" => (
                config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| ollama::DEFAULT_BASE_URL.to_string()),
                None,
            ),
            "gemini" => {
                let key = credentials.gemini_api_key.clone().ok_or_else(|| {
                    LlmError::Auth("GEMINI_API_KEY is required for the gemini provider".into())
                })?;
                (
                    config
                        .base_url
                        .clone()
                        .unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string()),
                    Some(key),
                )
            }
            other => return Err(LlmError::Api(format!("Unknown provider: {}", other))),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        Ok(Self {
            http,
            config,
            retry_config,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send a chat request to the configured provider with retry logic.
    pub async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: ChatOptions,
    ) -> Result<LlmResponse, LlmError> {
        let mut backoff = Backoff::new(&self.retry_config);

        loop {
            let result = self.send_once(system, messages, tools, options).await;

            match result {
                Ok(response) => return Ok(response),
                Err(ref e) if e.is_non_retryable() => {
                    metrics::counter!("llm.api.errors", "provider" => self.config.provider.clone())
                        .increment(1);
                    return result;
                }
                Err(LlmError::RateLimited { retry_after }) => {
                    let Some(delay) = backoff.next_delay() else {
                        metrics::counter!("llm.api.errors", "provider" => self.config.provider.clone())
                            .increment(1);
                        return Err(LlmError::RateLimited { retry_after });
                    };
                    let wait = retry_after.map(Duration::from_secs).unwrap_or(delay);
                    tracing::warn!(
                        attempt = backoff.attempts(),
                        wait_ms = wait.as_millis() as u64,
                        "LLM rate limited, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    let Some(wait) = backoff.next_delay() else {
                        metrics::counter!("llm.api.errors", "provider" => self.config.provider.clone())
                            .increment(1);
                        return Err(e);
                    };
                    tracing::warn!(
                        attempt = backoff.attempts(),
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "LLM API error, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Single attempt, routed to the provider module.
    async fn send_once(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: ChatOptions,
    ) -> Result<LlmResponse, LlmError> {
        match self.config.provider.as_str() {
            "ollama" => {
                ollama::send_chat(
                    &self.http,
                    &self.base_url,
                    &self.config,
                    system,
                    messages,
                    tools,
                    options,
                )
                .await
            }
            "gemini" => {
                gemini::generate_content(
                    &self.http,
                    &self.base_url,
                    self.api_key.as_deref().unwrap_or_default(),
                    &self.config,
                    system,
                    messages,
                    tools,
                    options,
                )
                .await
            }
            other => Err(LlmError::Api(format!("Unknown provider: {}", other))),
        }
    }

    /// List models installed on the backend. Ollama only.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        match self.config.provider.as_str() {
            "ollama" => ollama::list_models(&self.http, &self.base_url).await,
            other => Err(LlmError::Api(format!(
                "Model listing is not supported for provider {}",
                other
            ))),
        }
    }
}

/// Object-safe trait for testability (dyn dispatch).
/// Tests provide scripted mocks; production uses LlmClient.
pub trait LlmCaller: Send + Sync {
    fn chat<'a>(
        &'a self,
        system: &'a str,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
        options: ChatOptions,
    ) -> Pin<Box<dyn Future<Output = Result<LlmResponse, LlmError>> + Send + 'a>>;
}

impl LlmCaller for LlmClient {
    fn chat<'a>(
        &'a self,
        system: &'a str,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
        options: ChatOptions,
    ) -> Pin<Box<dyn Future<Output = Result<LlmResponse, LlmError>> + Send + 'a>> {
        Box::pin(self.chat(system, messages, tools, options))
    }
}
