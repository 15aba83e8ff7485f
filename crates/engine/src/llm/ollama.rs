use serde::{Deserialize, Serialize};
use serde_json::Value;
use verifai_common::config::LlmConfig;

use super::types::{
    ChatOptions, ContentBlock, LlmResponse, Message, Role, StopReason, TokenUsage, ToolDefinition,
};
use super::LlmError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool>,
    options: ChatRequestOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Serialize)]
struct ChatRequestOptions {
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Serialize)]
struct ChatTool {
    r#type: &'static str,
    function: ChatFunction,
}

#[derive(Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize, Deserialize)]
struct ChatToolCall {
    function: ChatToolCallFunction,
}

#[derive(Serialize, Deserialize)]
struct ChatToolCallFunction {
    name: String,
    /// Ollama sends arguments as a JSON object, not a string.
    #[serde(default)]
    arguments: Value,
}

// ---------------------------------------------------------------------------
// Response wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Deserialize)]
struct OllamaError {
    error: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagsModel>,
}

#[derive(Deserialize)]
struct TagsModel {
    name: String,
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn to_wire_messages(system: &str, messages: &[Message]) -> Vec<ChatMessage> {
    let mut wire = vec![ChatMessage {
        role: "system",
        content: system.to_string(),
        tool_calls: None,
        tool_name: None,
    }];

    for msg in messages {
        match msg.role {
            Role::User => {
                for block in &msg.content {
                    match block {
                        ContentBlock::Text { text } => wire.push(ChatMessage {
                            role: "user",
                            content: text.clone(),
                            tool_calls: None,
                            tool_name: None,
                        }),
                        ContentBlock::ToolResult { name, content, .. } => {
                            wire.push(ChatMessage {
                                role: "tool",
                                content: content.clone(),
                                tool_calls: None,
                                tool_name: Some(name.clone()),
                            })
                        }
                        ContentBlock::ToolUse { .. } => {}
                    }
                }
            }
            Role::Assistant => {
                let mut text_parts = Vec::new();
                let mut tool_calls = Vec::new();

                for block in &msg.content {
                    match block {
                        ContentBlock::Text { text } => text_parts.push(text.clone()),
                        ContentBlock::ToolUse { name, input, .. } => {
                            tool_calls.push(ChatToolCall {
                                function: ChatToolCallFunction {
                                    name: name.clone(),
                                    arguments: input.clone(),
                                },
                            })
                        }
                        ContentBlock::ToolResult { .. } => {}
                    }
                }

                wire.push(ChatMessage {
                    role: "assistant",
                    content: text_parts.join("\n"),
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                    tool_name: None,
                });
            }
        }
    }

    wire
}

fn from_wire_response(resp: ChatResponse) -> LlmResponse {
    let mut content = Vec::new();

    if !resp.message.content.trim().is_empty() {
        content.push(ContentBlock::Text {
            text: resp.message.content,
        });
    }

    let has_tool_calls = !resp.message.tool_calls.is_empty();

    // Ollama does not assign call ids; synthesize stable ones per response.
    for (i, tc) in resp.message.tool_calls.into_iter().enumerate() {
        let input = match tc.function.arguments {
            Value::Object(_) => tc.function.arguments,
            Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };
        content.push(ContentBlock::ToolUse {
            id: format!("call_{}", i),
            name: tc.function.name,
            input,
        });
    }

    let stop_reason = if has_tool_calls {
        StopReason::ToolUse
    } else {
        match resp.done_reason.as_deref() {
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        }
    };

    LlmResponse {
        content,
        stop_reason,
        usage: TokenUsage {
            input_tokens: resp.prompt_eval_count.unwrap_or(0),
            output_tokens: resp.eval_count.unwrap_or(0),
        },
    }
}

fn map_send_error(base_url: &str, e: reqwest::Error) -> LlmError {
    if e.is_connect() {
        LlmError::Unreachable {
            url: base_url.to_string(),
            detail: "connection refused (is `ollama serve` running?)".into(),
        }
    } else {
        LlmError::Http(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Send a non-streaming chat request to Ollama's native `/api/chat`.
pub async fn send_chat(
    http: &reqwest::Client,
    base_url: &str,
    config: &LlmConfig,
    system: &str,
    messages: &[Message],
    tools: &[ToolDefinition],
    options: ChatOptions,
) -> Result<LlmResponse, LlmError> {
    let start = std::time::Instant::now();

    let request = ChatRequest {
        model: &config.model,
        messages: to_wire_messages(system, messages),
        stream: false,
        tools: tools
            .iter()
            .map(|t| ChatTool {
                r#type: "function",
                function: ChatFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect(),
        options: ChatRequestOptions {
            num_predict: config.max_tokens,
            temperature: config.temperature,
        },
        format: options.json_output.then_some("json"),
    };

    let response = http
        .post(format!("{}/api/chat", base_url))
        .json(&request)
        .send()
        .await
        .map_err(|e| map_send_error(base_url, e))?;

    let status = response.status();
    let latency = start.elapsed().as_secs_f64();
    metrics::histogram!("llm.api.latency", "provider" => "ollama", "model" => config.model.clone())
        .record(latency);

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let msg = serde_json::from_str::<OllamaError>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        if status == reqwest::StatusCode::NOT_FOUND || msg.contains("not found") {
            return Err(LlmError::ModelNotFound(msg));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited { retry_after: None });
        }
        return Err(LlmError::Api(format!("{}: {}", status, msg)));
    }

    let body: ChatResponse = response
        .json()
        .await
        .map_err(|e| LlmError::Parse(format!("Failed to parse Ollama response: {}", e)))?;

    let llm_response = from_wire_response(body);

    metrics::counter!("llm.api.input_tokens", "provider" => "ollama")
        .increment(llm_response.usage.input_tokens);
    metrics::counter!("llm.api.output_tokens", "provider" => "ollama")
        .increment(llm_response.usage.output_tokens);

    Ok(llm_response)
}

/// List installed models via `/api/tags`.
pub async fn list_models(http: &reqwest::Client, base_url: &str) -> Result<Vec<String>, LlmError> {
    let response = http
        .get(format!("{}/api/tags", base_url))
        .send()
        .await
        .map_err(|e| map_send_error(base_url, e))?;

    if !response.status().is_success() {
        return Err(LlmError::Api(format!(
            "Ollama returned status code: {}",
            response.status()
        )));
    }

    let tags: TagsResponse = response
        .json()
        .await
        .map_err(|e| LlmError::Parse(format!("Failed to parse /api/tags: {}", e)))?;

    Ok(tags.models.into_iter().map(|m| m.name).collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_response() {
        let json = r#"{
            "model": "mistral:latest",
            "message": {"role": "assistant", "content": "Three articles found."},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 42,
            "eval_count": 7
        }"#;

        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        let parsed = from_wire_response(resp);

        assert_eq!(parsed.stop_reason, StopReason::EndTurn);
        assert_eq!(parsed.usage.input_tokens, 42);
        assert_eq!(parsed.usage.output_tokens, 7);
        assert_eq!(parsed.text(), "Three articles found.");
    }

    #[test]
    fn test_parse_tool_call_response() {
        let json = r#"{
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "web_search", "arguments": {"query": "election fraud claims"}}},
                    {"function": {"name": "scrape_website", "arguments": "{\"url\": \"https://a.example\"}"}}
                ]
            },
            "done": true
        }"#;

        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        let parsed = from_wire_response(resp);

        assert_eq!(parsed.stop_reason, StopReason::ToolUse);
        assert_eq!(parsed.content.len(), 2);
        match &parsed.content[0] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "call_0");
                assert_eq!(name, "web_search");
                assert_eq!(input["query"], "election fraud claims");
            }
            _ => panic!("Expected tool_use block"),
        }
        match &parsed.content[1] {
            ContentBlock::ToolUse { input, .. } => {
                assert_eq!(input["url"], "https://a.example");
            }
            _ => panic!("Expected tool_use block"),
        }
    }

    #[test]
    fn test_wire_messages_carry_tool_results_by_name() {
        let messages = vec![
            Message::user_text("Find news"),
            Message {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: "call_0".into(),
                    name: "web_search".into(),
                    input: serde_json::json!({"query": "x"}),
                }],
            },
            Message {
                role: Role::User,
                content: vec![ContentBlock::ToolResult {
                    tool_use_id: "call_0".into(),
                    name: "web_search".into(),
                    content: "{}".into(),
                    is_error: None,
                }],
            },
        ];

        let wire = to_wire_messages("You are a crawler.", &messages);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[2].role, "assistant");
        assert!(wire[2].tool_calls.is_some());
        assert_eq!(wire[3].role, "tool");
        assert_eq!(wire[3].tool_name.as_deref(), Some("web_search"));
    }

    #[test]
    fn test_json_format_requested_only_when_asked() {
        let config = LlmConfig {
            provider: "ollama".into(),
            model: "mistral".into(),
            base_url: None,
            max_tokens: 256,
            temperature: None,
            request_timeout_seconds: 30,
        };
        let request = ChatRequest {
            model: &config.model,
            messages: vec![],
            stream: false,
            tools: vec![],
            options: ChatRequestOptions {
                num_predict: config.max_tokens,
                temperature: config.temperature,
            },
            format: ChatOptions { json_output: true }.json_output.then_some("json"),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["format"], "json");
        assert!(value.get("tools").is_none());
        assert!(value["options"].get("temperature").is_none());
    }
}
