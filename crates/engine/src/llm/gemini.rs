use serde::{Deserialize, Serialize};
use serde_json::Value;
use verifai_common::config::LlmConfig;

use super::types::{
    ChatOptions, ContentBlock, LlmResponse, Message, Role, StopReason, TokenUsage, ToolDefinition,
};
use super::LlmError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
    system_instruction: GeminiContent,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
}

#[derive(Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

// ---------------------------------------------------------------------------
// Response wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: Option<u64>,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn to_wire_contents(messages: &[Message]) -> Vec<GeminiContent> {
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            let parts = msg
                .content
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => GeminiPart::Text { text: text.clone() },
                    ContentBlock::ToolUse { name, input, .. } => GeminiPart::FunctionCall {
                        function_call: FunctionCall {
                            name: name.clone(),
                            args: input.clone(),
                        },
                    },
                    ContentBlock::ToolResult { name, content, .. } => {
                        // functionResponse.response must be an object.
                        let parsed = serde_json::from_str::<Value>(content)
                            .unwrap_or_else(|_| Value::String(content.clone()));
                        let response = match parsed {
                            Value::Object(_) => parsed,
                            other => serde_json::json!({ "content": other }),
                        };
                        GeminiPart::FunctionResponse {
                            function_response: FunctionResponse {
                                name: name.clone(),
                                response,
                            },
                        }
                    }
                })
                .collect();
            GeminiContent {
                role: Some(role.to_string()),
                parts,
            }
        })
        .collect()
}

fn from_wire_response(resp: GenerateResponse) -> LlmResponse {
    let usage = resp
        .usage_metadata
        .map(|u| TokenUsage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count.unwrap_or(0),
        })
        .unwrap_or_default();

    let Some(candidate) = resp.candidates.into_iter().next() else {
        let stop_reason = if resp
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .is_some()
        {
            StopReason::Blocked
        } else {
            StopReason::EndTurn
        };
        return LlmResponse {
            content: Vec::new(),
            stop_reason,
            usage,
        };
    };

    let mut content = Vec::new();
    let mut call_index = 0;
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        match part {
            GeminiPart::Text { text } => {
                if !text.trim().is_empty() {
                    content.push(ContentBlock::Text { text });
                }
            }
            GeminiPart::FunctionCall { function_call } => {
                let input = if function_call.args.is_null() {
                    Value::Object(serde_json::Map::new())
                } else {
                    function_call.args
                };
                content.push(ContentBlock::ToolUse {
                    id: format!("call_{}", call_index),
                    name: function_call.name,
                    input,
                });
                call_index += 1;
            }
            GeminiPart::FunctionResponse { .. } => {}
        }
    }

    let stop_reason = if call_index > 0 {
        StopReason::ToolUse
    } else {
        match candidate.finish_reason.as_deref() {
            Some("MAX_TOKENS") => StopReason::MaxTokens,
            Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST")
            | Some("PROHIBITED_CONTENT") | Some("SPII") => StopReason::Blocked,
            _ => StopReason::EndTurn,
        }
    };

    LlmResponse {
        content,
        stop_reason,
        usage,
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str, retry_after: Option<u64>) -> LlmError {
    let (message, api_status) = serde_json::from_str::<GeminiError>(body)
        .map(|e| (e.error.message, e.error.status))
        .unwrap_or_else(|_| (body.to_string(), String::new()));

    match status.as_u16() {
        401 | 403 => LlmError::Auth(message),
        404 => LlmError::ModelNotFound(message),
        429 => LlmError::RateLimited { retry_after },
        400 if api_status == "INVALID_ARGUMENT"
            && message.contains("token")
            && message.contains("exceed") =>
        {
            LlmError::ContextWindowExceeded(message)
        }
        400 if message.contains("API key") => LlmError::Auth(message),
        _ => LlmError::Api(format!("{}: {}", status, message)),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Call `models/{model}:generateContent`.
#[allow(clippy::too_many_arguments)]
pub async fn generate_content(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    config: &LlmConfig,
    system: &str,
    messages: &[Message],
    tools: &[ToolDefinition],
    options: ChatOptions,
) -> Result<LlmResponse, LlmError> {
    let start = std::time::Instant::now();

    let request = GenerateRequest {
        contents: to_wire_contents(messages),
        system_instruction: GeminiContent {
            role: None,
            parts: vec![GeminiPart::Text {
                text: system.to_string(),
            }],
        },
        generation_config: GenerationConfig {
            max_output_tokens: config.max_tokens,
            temperature: config.temperature,
            response_mime_type: options.json_output.then_some("application/json"),
        },
        tools: if tools.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTool {
                function_declarations: tools
                    .iter()
                    .map(|t| FunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    })
                    .collect(),
            }]
        },
    };

    let response = http
        .post(format!(
            "{}/models/{}:generateContent",
            base_url, config.model
        ))
        .header("x-goog-api-key", api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| {
            if e.is_connect() {
                LlmError::Unreachable {
                    url: base_url.to_string(),
                    detail: e.to_string(),
                }
            } else {
                LlmError::Http(e.to_string())
            }
        })?;

    let status = response.status();
    let latency = start.elapsed().as_secs_f64();
    metrics::histogram!("llm.api.latency", "provider" => "gemini", "model" => config.model.clone())
        .record(latency);

    if !status.is_success() {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        return Err(classify_error(status, &body, retry_after));
    }

    let body: GenerateResponse = response
        .json()
        .await
        .map_err(|e| LlmError::Parse(format!("Failed to parse Gemini response: {}", e)))?;

    let llm_response = from_wire_response(body);

    metrics::counter!("llm.api.input_tokens", "provider" => "gemini")
        .increment(llm_response.usage.input_tokens);
    metrics::counter!("llm.api.output_tokens", "provider" => "gemini")
        .increment(llm_response.usage.output_tokens);

    Ok(llm_response)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_function_call_response() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "Searching now."},
                        {"functionCall": {"name": "web_search", "args": {"query": "vaccine hoax"}}}
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 15, "totalTokenCount": 135}
        }"#;

        let resp: GenerateResponse = serde_json::from_str(json).unwrap();
        let parsed = from_wire_response(resp);

        assert_eq!(parsed.stop_reason, StopReason::ToolUse);
        assert_eq!(parsed.usage.input_tokens, 120);
        assert_eq!(parsed.usage.output_tokens, 15);
        assert_eq!(parsed.content.len(), 2);
        match &parsed.content[1] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "call_0");
                assert_eq!(name, "web_search");
                assert_eq!(input["query"], "vaccine hoax");
            }
            _ => panic!("Expected tool_use block"),
        }
    }

    #[test]
    fn test_safety_block_maps_to_blocked() {
        let json = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        let parsed = from_wire_response(serde_json::from_str(json).unwrap());
        assert_eq!(parsed.stop_reason, StopReason::Blocked);
        assert!(parsed.content.is_empty());

        let json = r#"{"promptFeedback": {"blockReason": "OTHER"}}"#;
        let parsed = from_wire_response(serde_json::from_str(json).unwrap());
        assert_eq!(parsed.stop_reason, StopReason::Blocked);
    }

    #[test]
    fn test_max_tokens_finish_reason() {
        let json = r#"{"candidates": [{"content": {"parts": [{"text": "{\"query_summary\": "}]}, "finishReason": "MAX_TOKENS"}]}"#;
        let parsed = from_wire_response(serde_json::from_str(json).unwrap());
        assert_eq!(parsed.stop_reason, StopReason::MaxTokens);
    }

    #[test]
    fn test_tool_results_become_function_responses() {
        let messages = vec![Message {
            role: Role::User,
            content: vec![
                ContentBlock::ToolResult {
                    tool_use_id: "call_0".into(),
                    name: "web_search".into(),
                    content: r#"{"results": []}"#.into(),
                    is_error: None,
                },
                ContentBlock::ToolResult {
                    tool_use_id: "call_1".into(),
                    name: "scrape_website".into(),
                    content: "plain text body".into(),
                    is_error: None,
                },
            ],
        }];

        let wire = serde_json::to_value(to_wire_contents(&messages)).unwrap();
        let parts = &wire[0]["parts"];
        assert_eq!(wire[0]["role"], "user");
        assert_eq!(parts[0]["functionResponse"]["name"], "web_search");
        assert!(parts[0]["functionResponse"]["response"]["results"].is_array());
        assert_eq!(
            parts[1]["functionResponse"]["response"]["content"],
            "plain text body"
        );
    }

    #[test]
    fn test_assistant_role_is_model() {
        let messages = vec![Message {
            role: Role::Assistant,
            content: vec![ContentBlock::Text {
                text: "ok".into(),
            }],
        }];
        let wire = serde_json::to_value(to_wire_contents(&messages)).unwrap();
        assert_eq!(wire[0]["role"], "model");
    }

    #[test]
    fn test_error_classification() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            classify_error(reqwest::StatusCode::BAD_REQUEST, body, None),
            LlmError::Auth(_)
        ));

        let body = r#"{"error": {"code": 404, "message": "models/nope is not found", "status": "NOT_FOUND"}}"#;
        assert!(matches!(
            classify_error(reqwest::StatusCode::NOT_FOUND, body, None),
            LlmError::ModelNotFound(_)
        ));

        assert!(matches!(
            classify_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "", Some(7)),
            LlmError::RateLimited { retry_after: Some(7) }
        ));

        let body = r#"{"error": {"code": 400, "message": "The input token count exceeds the maximum", "status": "INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            classify_error(reqwest::StatusCode::BAD_REQUEST, body, None),
            LlmError::ContextWindowExceeded(_)
        ));
    }
}
