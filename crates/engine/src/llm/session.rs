use std::future::Future;
use std::pin::Pin;

use super::types::{ChatOptions, ContentBlock, Message, Role, StopReason, ToolDefinition};
use super::{LlmCaller, LlmError};

/// How a stage session ended.
pub enum SessionResult {
    /// The model answered with text only.
    Completed {
        final_text: String,
        stats: SessionStats,
    },
    /// Turn limit hit. `partial_text` is the last assistant text seen, if any.
    MaxTurnsReached {
        partial_text: Option<String>,
        stats: SessionStats,
    },
    /// Too many consecutive malformed tool calls.
    MalformedToolCallLimit {
        partial_text: Option<String>,
        stats: SessionStats,
    },
    /// The backend failed after its own retries.
    Failed { error: LlmError, stats: SessionStats },
}

impl SessionResult {
    pub fn stats(&self) -> &SessionStats {
        match self {
            Self::Completed { stats, .. }
            | Self::MaxTurnsReached { stats, .. }
            | Self::MalformedToolCallLimit { stats, .. }
            | Self::Failed { stats, .. } => stats,
        }
    }

    /// Short outcome label for logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::MaxTurnsReached { .. } => "max_turns",
            Self::MalformedToolCallLimit { .. } => "malformed_limit",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Accumulated statistics for a session.
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    pub turns: u32,
    pub tool_calls: u32,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub malformed_tool_calls: u32,
}

/// Configuration for the agentic loop.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub max_turns: u32,
    pub max_consecutive_malformed: u32,
    pub options: ChatOptions,
}

/// Result from executing a single tool call.
pub struct ToolExecutionResult {
    pub content: String,
    pub is_error: bool,
    /// Only malformed calls count toward the consecutive limit.
    pub is_malformed: bool,
}

/// Closure type for the tool executor passed to `run_session`.
pub type ToolExecutor = Box<
    dyn Fn(String, serde_json::Value) -> Pin<Box<dyn Future<Output = ToolExecutionResult> + Send>>
        + Send
        + Sync,
>;

/// Run the generic agentic loop for one stage.
///
/// The model is called with the stage's system prompt and task; tool calls are
/// executed and fed back until it answers with text only.
pub async fn run_session(
    llm: &dyn LlmCaller,
    system_prompt: &str,
    initial_user_message: &str,
    tools: &[ToolDefinition],
    tool_executor: &ToolExecutor,
    config: &SessionConfig,
) -> SessionResult {
    let mut history = vec![Message::user_text(initial_user_message)];

    let mut stats = SessionStats::default();
    let mut consecutive_malformed: u32 = 0;
    let mut last_text: Option<String> = None;

    loop {
        if stats.turns >= config.max_turns {
            tracing::warn!(turns = stats.turns, "Session hit max turns limit");
            return SessionResult::MaxTurnsReached {
                partial_text: last_text,
                stats,
            };
        }

        stats.turns += 1;

        let response = match llm
            .chat(system_prompt, &history, tools, config.options)
            .await
        {
            Ok(r) => r,
            Err(error) => {
                tracing::error!(error = %error, "LLM API error during session");
                return SessionResult::Failed { error, stats };
            }
        };

        stats.total_input_tokens += response.usage.input_tokens;
        stats.total_output_tokens += response.usage.output_tokens;

        let text = response.text();
        if !text.trim().is_empty() {
            last_text = Some(text.clone());
        }

        history.push(Message {
            role: Role::Assistant,
            content: response.content.clone(),
        });

        let tool_uses: Vec<_> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect();

        if tool_uses.is_empty() {
            match response.stop_reason {
                StopReason::Blocked => {
                    tracing::warn!(turns = stats.turns, "Backend blocked the response")
                }
                StopReason::MaxTokens => {
                    tracing::warn!(turns = stats.turns, "Response truncated at max_tokens")
                }
                _ => {}
            }
            return SessionResult::Completed {
                final_text: text,
                stats,
            };
        }

        let mut tool_results = Vec::new();

        for (id, name, input) in tool_uses {
            stats.tool_calls += 1;
            let result = tool_executor(name.clone(), input).await;

            if result.is_malformed {
                consecutive_malformed += 1;
                stats.malformed_tool_calls += 1;
            } else {
                consecutive_malformed = 0;
            }

            tool_results.push(ContentBlock::ToolResult {
                tool_use_id: id,
                name,
                content: result.content,
                is_error: if result.is_error { Some(true) } else { None },
            });
        }

        if consecutive_malformed >= config.max_consecutive_malformed {
            tracing::warn!(
                consecutive = consecutive_malformed,
                "Session hit malformed tool call limit"
            );
            return SessionResult::MalformedToolCallLimit {
                partial_text: last_text,
                stats,
            };
        }

        history.push(Message {
            role: Role::User,
            content: tool_results,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
