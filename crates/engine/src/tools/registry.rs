use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use verifai_common::config::{RetryConfig, SearchConfig, SystemConfig, ToolResultLimits};

use super::fetch::PageFetcher;
use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::config::Credentials;
use crate::llm::session::{ToolExecutionResult, ToolExecutor};
use crate::llm::types::ToolDefinition;

/// Prefix handlers use for argument decoding failures; such calls count as malformed.
pub const INVALID_ARGUMENTS: &str = "Invalid arguments";

/// Shared context available to all tool handlers.
pub struct ToolHandlerContext {
    pub http: reqwest::Client,
    pub credentials: Credentials,
    pub search: SearchConfig,
    pub retry: RetryConfig,
    pub fetcher: PageFetcher,
    pub limits: ToolResultLimits,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub counters: ToolCounters,
}

impl ToolHandlerContext {
    pub fn new(
        system: &SystemConfig,
        credentials: Credentials,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .user_agent(system.fetch.user_agent.clone())
            .timeout(Duration::from_secs(system.fetch.timeout_seconds))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            fetcher: PageFetcher::new(http.clone(), &system.fetch),
            http,
            credentials,
            search: system.search.clone(),
            retry: system.retry.external_modules.clone(),
            limits: system.tool_results.clone(),
            breakers,
            counters: ToolCounters::default(),
        })
    }
}

/// Counters of tool activity across a run.
#[derive(Default)]
pub struct ToolCounters {
    pub searches: AtomicU32,
    pub pages_fetched: AtomicU32,
    pub cache_hits: AtomicU32,
}

/// Handler function signature: takes args and context, returns JSON or an error string.
pub type ToolHandler = Arc<
    dyn Fn(
            Value,
            Arc<ToolHandlerContext>,
        ) -> Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>
        + Send
        + Sync,
>;

/// Registry of tool handlers with their schema definitions.
pub struct ToolRegistry {
    handlers: HashMap<String, ToolHandler>,
    definitions: Vec<ToolDefinition>,
    context: Arc<ToolHandlerContext>,
}

impl ToolRegistry {
    pub fn new(context: ToolHandlerContext) -> Self {
        Self {
            handlers: HashMap::new(),
            definitions: Vec::new(),
            context: Arc::new(context),
        }
    }

    /// Register a tool handler by name.
    pub fn register(&mut self, name: &str, handler: ToolHandler) {
        self.handlers.insert(name.to_string(), handler);
    }

    /// Load tool definitions for `role` from the config-loaded schemas.
    ///
    /// Every loaded definition must have a registered handler.
    pub fn load_definitions(
        &mut self,
        tool_schemas: &HashMap<String, Value>,
        role: &str,
    ) -> Result<(), String> {
        let prefix = format!("{}/", role);

        let mut keys: Vec<&String> = tool_schemas
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .collect();
        keys.sort();

        for key in keys {
            let schema = &tool_schemas[key];
            let field = |name: &str| {
                schema
                    .get(name)
                    .ok_or_else(|| format!("Tool schema '{}' missing '{}' field", key, name))
            };

            let name = field("name")?
                .as_str()
                .ok_or_else(|| format!("Tool schema '{}' has a non-string name", key))?
                .to_string();
            let description = field("description")?
                .as_str()
                .ok_or_else(|| format!("Tool schema '{}' has a non-string description", key))?
                .to_string();
            let input_schema = field("input_schema")?.clone();

            if !self.handlers.contains_key(&name) {
                return Err(format!(
                    "Tool schema '{}' declares '{}' but no handler is registered",
                    key, name
                ));
            }

            self.definitions.push(ToolDefinition {
                name,
                description,
                input_schema,
            });
        }

        tracing::info!(
            role = role,
            tools = self.definitions.len(),
            "Loaded tool definitions"
        );

        Ok(())
    }

    /// Tool definitions for sending to the LLM.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn counters(&self) -> &ToolCounters {
        &self.context.counters
    }

    pub fn context(&self) -> &Arc<ToolHandlerContext> {
        &self.context
    }

    /// Execute a tool call by name.
    pub async fn execute(&self, tool_name: &str, args: Value) -> ToolExecutionResult {
        dispatch(&self.handlers, &self.context, tool_name.to_string(), args).await
    }

    /// Create a ToolExecutor closure for use with `run_session`.
    pub fn as_executor(&self) -> ToolExecutor {
        let handlers = Arc::new(self.handlers.clone());
        let context = Arc::clone(&self.context);

        Box::new(move |name: String, args: Value| {
            let handlers = Arc::clone(&handlers);
            let context = Arc::clone(&context);
            Box::pin(async move { dispatch(&handlers, &context, name, args).await })
        })
    }
}

async fn dispatch(
    handlers: &HashMap<String, ToolHandler>,
    context: &Arc<ToolHandlerContext>,
    name: String,
    args: Value,
) -> ToolExecutionResult {
    let start = std::time::Instant::now();

    tracing::info!(tool = %name, "Tool call started");

    let Some(handler) = handlers.get(&name) else {
        tracing::warn!(tool = %name, "Unknown tool called");
        metrics::counter!("tools.execution.errors", "tool" => name.clone()).increment(1);
        let mut available: Vec<&String> = handlers.keys().collect();
        available.sort();
        return ToolExecutionResult {
            content: format!(
                "Unknown tool: '{}'. Available tools: {:?}",
                name, available
            ),
            is_error: true,
            is_malformed: true,
        };
    };

    let result = handler(args, Arc::clone(context)).await;

    let latency = start.elapsed().as_secs_f64();
    metrics::histogram!("tools.execution.latency", "tool" => name.clone()).record(latency);
    metrics::counter!("tools.execution.count", "tool" => name.clone()).increment(1);

    match result {
        Ok(value) => {
            let content = serde_json::to_string(&value).unwrap_or_else(|e| {
                format!("{{\"error\": \"Failed to serialize result: {}\"}}", e)
            });
            tracing::info!(
                tool = %name,
                latency_s = latency,
                result_len = content.len(),
                "Tool call succeeded"
            );
            ToolExecutionResult {
                content,
                is_error: false,
                is_malformed: false,
            }
        }
        Err(msg) => {
            tracing::warn!(
                tool = %name,
                latency_s = latency,
                error = %msg,
                "Tool call failed"
            );
            metrics::counter!("tools.execution.errors", "tool" => name).increment(1);
            ToolExecutionResult {
                is_malformed: msg.starts_with(INVALID_ARGUMENTS),
                content: msg,
                is_error: true,
            }
        }
    }
}

/// Decode handler arguments, mapping failures to a malformed-call message.
pub fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("{}: {}", INVALID_ARGUMENTS, e))
}
