//! End-to-end runs of pipeline, normalization and export against the
//! repository's `config/` directory, with a scripted LLM and no network.
//!
//! The `#[ignore]` test talks to a live backend: `cargo test -- --ignored`.
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use verifai_common::types::Report;

use verifai_engine::circuit_breaker::CircuitBreakerRegistry;
use verifai_engine::config::{self, Credentials, EngineConfig};
use verifai_engine::llm::{
    ChatOptions, ContentBlock, LlmCaller, LlmError, LlmResponse, Message, StopReason, TokenUsage,
    ToolDefinition,
};
use verifai_engine::normalize::{normalize, NormalizeOptions, Strategy};
use verifai_engine::pipeline::{AnalysisRequest, Pipeline, Termination};
use verifai_engine::render::export_report;
use verifai_engine::tools::build_research_registry;

const QUERY: &str = "election fraud claims";

fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config")
}

fn load() -> EngineConfig {
    config::load_config(&config_dir()).expect("repository config should load")
}

/// Replays canned responses and records what each call was offered.
struct ScriptedLlm {
    responses: Mutex<Vec<LlmResponse>>,
    delay_after: Option<usize>,
    calls: Mutex<Vec<CallRecord>>,
}

struct CallRecord {
    tool_names: Vec<String>,
    json_output: bool,
    last_message: Message,
}

impl ScriptedLlm {
    fn new(mut responses: Vec<LlmResponse>) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            delay_after: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Stall every call after the first `n`.
    fn stalling_after(mut self, n: usize) -> Self {
        self.delay_after = Some(n);
        self
    }
}

impl LlmCaller for ScriptedLlm {
    fn chat<'a>(
        &'a self,
        _system: &'a str,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
        options: ChatOptions,
    ) -> Pin<Box<dyn Future<Output = Result<LlmResponse, LlmError>> + Send + 'a>> {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(CallRecord {
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
                json_output: options.json_output,
                last_message: messages.last().cloned().unwrap(),
            });
            calls.len()
        };
        let stall = self.delay_after.is_some_and(|n| call_index > n);
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| text("out of script"));
        Box::pin(async move {
            if stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(response)
        })
    }
}

fn text(t: &str) -> LlmResponse {
    LlmResponse {
        content: vec![ContentBlock::Text { text: t.into() }],
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage {
            input_tokens: 100,
            output_tokens: 40,
        },
    }
}

fn search_call() -> LlmResponse {
    LlmResponse {
        content: vec![ContentBlock::ToolUse {
            id: "call_0".into(),
            name: "web_search".into(),
            input: json!({"query": QUERY}),
        }],
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage::default(),
    }
}

fn script(final_answer: &str) -> Vec<LlmResponse> {
    vec![
        search_call(),
        text("- Article 1: Audit finds no irregularities from State Wire - https://wire.example/audit"),
        text("Key Findings: audits found no fraud."),
        text("Top Hashtags: #StopTheSteal, #Audit"),
        text("Topic Categories: audits, lawsuits"),
        text("Credibility Score: 7"),
        text(final_answer),
    ]
}

fn pipeline(config: &EngineConfig, llm: Arc<ScriptedLlm>) -> Pipeline {
    let registry = build_research_registry(
        config,
        Credentials::default(),
        Arc::new(CircuitBreakerRegistry::new()),
    )
    .expect("registry should build from repository schemas");
    Pipeline::new(llm, registry, config)
}

fn request() -> AnalysisRequest {
    AnalysisRequest::new(
        QUERY,
        vec![],
        vec!["#Audit".into()],
        vec!["ballots".into()],
        3,
    )
    .unwrap()
}

#[tokio::test]
async fn test_full_run_with_structured_answer() {
    let config = load();
    let final_json = serde_json::to_string(&Report::example()).unwrap();
    let llm = Arc::new(ScriptedLlm::new(script(&final_json)));

    let result = pipeline(&config, llm.clone()).run(&request()).await.unwrap();
    assert_eq!(result.termination, Termination::Completed);

    let normalized = normalize(QUERY, &result, &NormalizeOptions::from(&config.system.report));
    assert_eq!(normalized.strategy, Strategy::Typed);
    assert_eq!(normalized.report, Report::example());

    let calls = llm.calls.lock().unwrap();
    // Stage one used a tool: two calls, the second carrying the tool result.
    assert_eq!(calls.len(), 7);
    let tool_result = calls[1]
        .last_message
        .content
        .iter()
        .find_map(|b| match b {
            ContentBlock::ToolResult { content, is_error, .. } => Some((content.clone(), *is_error)),
            _ => None,
        })
        .expect("second call should carry the tool result");
    assert_eq!(tool_result.1, Some(true));
    assert!(tool_result.0.contains("SERPER_API_KEY"));

    assert_eq!(
        calls[0].tool_names,
        vec!["scrape_website", "search_website", "web_search"]
    );
    // Organizer and compiler get no tools; only the compiler asks for JSON.
    assert!(calls[4].tool_names.is_empty());
    assert!(calls[6].tool_names.is_empty());
    assert!(calls[6].json_output);
    assert!(!calls[5].json_output);

    let tmp = tempfile::tempdir().unwrap();
    let now = chrono::NaiveDate::from_ymd_opt(2025, 1, 2)
        .unwrap()
        .and_hms_opt(3, 4, 5)
        .unwrap();
    let path = export_report(&normalized.report, tmp.path(), now).unwrap();
    assert!(path.ends_with("news_analysis_report_20250102_030405.md"));
    let markdown = std::fs::read_to_string(path).unwrap();
    assert!(markdown.contains("## Propaganda and Misinformation Analysis"));
}

#[tokio::test]
async fn test_fenced_answer_is_extracted() {
    let config = load();
    let fenced = format!(
        "Here is the report.\n```json\n{}\n```",
        serde_json::to_string_pretty(&Report::example()).unwrap()
    );
    let llm = Arc::new(ScriptedLlm::new(script(&fenced)));

    let result = pipeline(&config, llm).run(&request()).await.unwrap();
    assert!(result.typed.is_none());

    let normalized = normalize(QUERY, &result, &NormalizeOptions::from(&config.system.report));
    assert_eq!(normalized.strategy, Strategy::ExtractedJson);
    assert_eq!(normalized.report, Report::example());
}

#[tokio::test]
async fn test_truncated_answer_falls_back() {
    let config = load();
    let truncated = "```json\n{\"query_summary\": \"Claims of fraud\", \"related_articles\": [{\"title\": \"Aud";
    let llm = Arc::new(ScriptedLlm::new(script(truncated)));

    let result = pipeline(&config, llm).run(&request()).await.unwrap();
    let normalized = normalize(QUERY, &result, &NormalizeOptions::from(&config.system.report));

    assert_eq!(normalized.strategy, Strategy::Fallback);
    let report = normalized.report;
    assert_eq!(report.query_summary, QUERY);
    assert_eq!(report.related_words, vec!["election", "fraud", "claims"]);
    assert!(report.is_fallback());
    assert!(report.key_findings.contains("Claims of fraud"));

    let tmp = tempfile::tempdir().unwrap();
    let path = export_report(&report, tmp.path(), chrono::Local::now().naive_local()).unwrap();
    let markdown = std::fs::read_to_string(path).unwrap();
    assert!(markdown.contains("> **Notice:**"));
}

#[tokio::test]
async fn test_timeout_recovers_into_fallback() {
    let config = load();
    // Stage one (tool call + answer) and stage two finish; stage three stalls.
    let llm = Arc::new(ScriptedLlm::new(script("{}")).stalling_after(3));

    let result = pipeline(&config, llm)
        .with_budget(Duration::from_millis(300))
        .run(&request())
        .await
        .unwrap();
    assert_eq!(
        result.termination,
        Termination::TimedOut {
            completed_stages: 2
        }
    );

    let normalized = normalize(QUERY, &result, &NormalizeOptions::from(&config.system.report));
    assert_eq!(normalized.strategy, Strategy::Fallback);
    assert!(normalized
        .report
        .key_findings
        .contains("Key Findings: audits found no fraud."));
}

#[tokio::test]
#[ignore]
async fn test_live_backend_health() {
    let config = load();
    let client = verifai_engine::llm::LlmClient::new(
        config.system.llm.clone(),
        config.system.retry.llm_api.clone(),
        &Credentials::from_env(),
    )
    .expect("client should build");
    verifai_engine::llm::check_backend(&client)
        .await
        .expect("backend should be reachable with the configured model installed");
}
