use serde::{Deserialize, Serialize};

/// Top-level system configuration, deserialized from system.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemConfig {
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub retry: RetryDefaults,
    pub search: SearchConfig,
    pub fetch: FetchConfig,
    pub tool_results: ToolResultLimits,
    pub report: ReportConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl SystemConfig {
    /// Parse a system.toml document.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// LLM backend selection. One backend serves every stage of a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name ("ollama" or "gemini").
    pub provider: String,
    /// Model identifier (e.g. "mistral:latest", "gemini-2.0-flash").
    pub model: String,
    /// Override for the provider endpoint. Defaults per provider when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Max tokens in the response.
    pub max_tokens: u32,
    /// Temperature (0.0–2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Per-request HTTP timeout. Local inference is slow, so this is generous.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    300
}

/// What to do when the wall-clock budget expires mid-run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Normalize whatever stage output exists (usually ends in a fallback report).
    Recover,
    /// Treat the run as failed; no report is produced.
    Abort,
}

/// Pipeline execution limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Wall-clock ceiling for the whole run.
    pub max_execution_seconds: u64,
    pub timeout_policy: TimeoutPolicy,
    /// Max model turns (tool round-trips) per stage.
    pub max_turns_per_stage: u32,
    /// Consecutive malformed tool calls before a stage session ends.
    pub max_consecutive_malformed_tool_calls: u32,
    /// Queries shorter than this (after trimming) are rejected.
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
}

fn default_min_query_chars() -> usize {
    3
}

/// Default retry parameters per dependency.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryDefaults {
    pub llm_api: RetryConfig,
    pub external_modules: RetryConfig,
}

/// Retry configuration for a specific target.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

/// Web search backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Provider name ("serper").
    pub provider: String,
    pub endpoint: String,
    /// Results requested per query.
    pub max_results: usize,
}

/// Page fetching for the scrape tools.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Page cache TTL in seconds.
    pub cache_ttl_seconds: u64,
    /// Requests per second allowed per domain.
    pub rate_limit_per_second: f64,
}

/// Tool result size limits, keeping tool output inside small local context windows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResultLimits {
    /// Max items returned from search results.
    pub max_search_results: u32,
    /// Max characters of extracted page text returned by scrape_website.
    pub max_page_chars: u32,
    /// Max passages returned by search_website.
    pub max_passages: u32,
}

/// Report export settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportConfig {
    pub output_dir: String,
    /// Hard cap on raw model text copied into a fallback report.
    pub fallback_excerpt_chars: usize,
}

/// Logging and metrics output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// "json" or "pretty".
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Address for the Prometheus scrape endpoint, e.g. "127.0.0.1:9000".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_listen: Option<String>,
}

fn default_log_format() -> String {
    "json".into()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            metrics_listen: None,
        }
    }
}
