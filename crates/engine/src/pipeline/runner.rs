use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use verifai_common::config::TimeoutPolicy;
use verifai_common::ids::RunId;
use verifai_common::types::Report;

use super::plan::{AnalysisRequest, TaskPlan};
use super::stages::{roster, OutputContract, StageDescriptor};
use super::PipelineError;
use crate::config::EngineConfig;
use crate::llm::session::{run_session, SessionConfig, SessionResult, SessionStats};
use crate::llm::types::{ChatOptions, ToolDefinition};
use crate::llm::LlmCaller;
use crate::normalize::decode_report;
use crate::tools::ToolRegistry;

/// Progress notifications emitted while a run advances.
#[derive(Clone, Debug, PartialEq)]
pub enum StageEvent {
    StageStarted {
        index: usize,
        total: usize,
        role: &'static str,
    },
    StageFinished {
        index: usize,
        total: usize,
        role: &'static str,
        outcome: &'static str,
        elapsed: Duration,
    },
}

pub type StageObserver = Box<dyn Fn(&StageEvent) + Send + Sync>;

/// Text a stage handed on, with how its session ended.
#[derive(Clone, Debug)]
pub struct StageOutput {
    pub key: &'static str,
    pub role: &'static str,
    pub text: String,
    pub outcome: &'static str,
    pub stats: SessionStats,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    Completed,
    /// The wall-clock budget elapsed and the run was recovered.
    TimedOut { completed_stages: usize },
}

/// Everything a run produced, consumed by normalization.
#[derive(Clone, Debug)]
pub struct PipelineResult {
    pub run_id: RunId,
    /// Set when the final answer was already a valid report document.
    pub typed: Option<Report>,
    /// The latest non-empty stage output.
    pub raw: Option<String>,
    pub stage_outputs: Vec<StageOutput>,
    pub termination: Termination,
}

/// Sequential runner for the analysis stages.
pub struct Pipeline {
    llm: Arc<dyn LlmCaller>,
    registry: ToolRegistry,
    roster: Vec<StageDescriptor>,
    overrides: HashMap<String, String>,
    budget: Duration,
    timeout_policy: TimeoutPolicy,
    max_turns: u32,
    max_consecutive_malformed: u32,
    observer: Option<StageObserver>,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn LlmCaller>, registry: ToolRegistry, config: &EngineConfig) -> Self {
        let pipeline = &config.system.pipeline;
        Self {
            llm,
            registry,
            roster: roster(),
            overrides: config.prompts.clone(),
            budget: Duration::from_secs(pipeline.max_execution_seconds),
            timeout_policy: pipeline.timeout_policy,
            max_turns: pipeline.max_turns_per_stage,
            max_consecutive_malformed: pipeline.max_consecutive_malformed_tool_calls,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replace the wall-clock budget from config.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Run every stage in order and collect their outputs.
    pub async fn run(&self, request: &AnalysisRequest) -> Result<PipelineResult, PipelineError> {
        let run_id = RunId::new();
        let start = Instant::now();
        let plan = TaskPlan::build(request, &self.roster, &self.overrides);

        tracing::info!(
            run_id = %run_id,
            query = %request.query,
            stages = plan.len(),
            budget_s = self.budget.as_secs(),
            "Pipeline run started"
        );

        let mut outputs: Vec<StageOutput> = Vec::new();
        let run = tokio::time::timeout(self.budget, self.run_stages(&plan, &mut outputs)).await;

        let result = match run {
            Ok(Ok(())) => {
                let raw = latest_output(&outputs);
                let typed = match plan.tasks.last() {
                    Some(task) if task.stage.output == OutputContract::ReportJson => {
                        raw.as_deref().and_then(decode_report)
                    }
                    _ => None,
                };
                PipelineResult {
                    run_id,
                    typed,
                    raw,
                    stage_outputs: outputs,
                    termination: Termination::Completed,
                }
            }
            Ok(Err(e)) => {
                metrics::counter!("pipeline.run.outcome", "outcome" => "failed").increment(1);
                tracing::error!(run_id = %run_id, error = %e, "Pipeline run failed");
                return Err(e);
            }
            Err(_) => {
                let completed_stages = outputs.len();
                tracing::warn!(
                    run_id = %run_id,
                    completed_stages,
                    policy = ?self.timeout_policy,
                    "Pipeline exceeded its execution budget"
                );
                if self.timeout_policy == TimeoutPolicy::Abort {
                    metrics::counter!("pipeline.run.outcome", "outcome" => "timeout_abort")
                        .increment(1);
                    return Err(PipelineError::Timeout {
                        seconds: self.budget.as_secs(),
                        completed_stages,
                    });
                }
                PipelineResult {
                    run_id,
                    typed: None,
                    raw: latest_output(&outputs),
                    stage_outputs: outputs,
                    termination: Termination::TimedOut { completed_stages },
                }
            }
        };

        let outcome = match result.termination {
            Termination::Completed => "completed",
            Termination::TimedOut { .. } => "timeout_recovered",
        };
        let duration = start.elapsed().as_secs_f64();
        metrics::counter!("pipeline.run.outcome", "outcome" => outcome).increment(1);
        metrics::histogram!("pipeline.run.duration").record(duration);
        tracing::info!(
            run_id = %run_id,
            outcome,
            duration_s = duration,
            typed = result.typed.is_some(),
            "Pipeline run finished"
        );

        Ok(result)
    }

    async fn run_stages(
        &self,
        plan: &TaskPlan,
        outputs: &mut Vec<StageOutput>,
    ) -> Result<(), PipelineError> {
        let executor = self.registry.as_executor();
        let breaker = &self.registry.context().breakers.llm_api;
        let total = plan.len();

        for (index, task) in plan.tasks.iter().enumerate() {
            let stage = &task.stage;
            if !breaker.allow() {
                return Err(PipelineError::CircuitOpen {
                    stage: stage.key.to_string(),
                });
            }

            self.notify(StageEvent::StageStarted {
                index,
                total,
                role: stage.role,
            });
            tracing::info!(stage = stage.key, index, total, "Stage started");

            let started = Instant::now();
            let user_message = compose_user_message(&task.description, outputs);
            let tools: &[ToolDefinition] = if stage.uses_tools {
                self.registry.definitions()
            } else {
                &[]
            };
            let session_config = SessionConfig {
                max_turns: self.max_turns,
                max_consecutive_malformed: self.max_consecutive_malformed,
                options: ChatOptions {
                    json_output: stage.output == OutputContract::ReportJson,
                },
            };

            let session = run_session(
                self.llm.as_ref(),
                &stage.system_prompt(),
                &user_message,
                tools,
                &executor,
                &session_config,
            )
            .await;

            let outcome = session.outcome();
            let stats = session.stats().clone();
            let text = match session {
                SessionResult::Completed { final_text, .. } => {
                    breaker.record_success();
                    final_text
                }
                SessionResult::MaxTurnsReached { partial_text, .. }
                | SessionResult::MalformedToolCallLimit { partial_text, .. } => {
                    breaker.record_success();
                    tracing::warn!(
                        stage = stage.key,
                        outcome,
                        has_partial = partial_text.is_some(),
                        "Stage stopped early, continuing with partial output"
                    );
                    partial_text.unwrap_or_default()
                }
                SessionResult::Failed { error, .. } => {
                    breaker.record_failure();
                    return Err(PipelineError::Stage {
                        stage: stage.key.to_string(),
                        error,
                    });
                }
            };

            let elapsed = started.elapsed();
            metrics::histogram!("pipeline.stage.duration", "stage" => stage.key)
                .record(elapsed.as_secs_f64());
            tracing::info!(
                stage = stage.key,
                outcome,
                turns = stats.turns,
                tool_calls = stats.tool_calls,
                input_tokens = stats.total_input_tokens,
                output_tokens = stats.total_output_tokens,
                output_chars = text.len(),
                "Stage finished"
            );

            outputs.push(StageOutput {
                key: stage.key,
                role: stage.role,
                text,
                outcome,
                stats,
            });
            self.notify(StageEvent::StageFinished {
                index,
                total,
                role: stage.role,
                outcome,
                elapsed,
            });
        }

        Ok(())
    }

    fn notify(&self, event: StageEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }
}

/// Task description followed by every earlier non-empty stage output.
fn compose_user_message(description: &str, previous: &[StageOutput]) -> String {
    let mut message = description.to_string();
    let context: Vec<&StageOutput> = previous
        .iter()
        .filter(|o| !o.text.trim().is_empty())
        .collect();
    if !context.is_empty() {
        message.push_str("\n\n## Context from earlier stages\n");
        for output in context {
            message.push_str(&format!("\n### {}\n{}\n", output.role, output.text.trim()));
        }
    }
    message
}

fn latest_output(outputs: &[StageOutput]) -> Option<String> {
    outputs
        .iter()
        .rev()
        .find(|o| !o.text.trim().is_empty())
        .map(|o| o.text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerRegistry;
    use crate::config::Credentials;
    use crate::llm::types::{ContentBlock, LlmResponse, Message, StopReason, TokenUsage};
    use crate::llm::LlmError;
    use crate::tools::test_support::system_config;
    use crate::tools::ToolHandlerContext;
    use std::future::Future;
    use std::path::PathBuf;
    use std::pin::Pin;
    use std::sync::Mutex;

    enum Step {
        Reply(Result<LlmResponse, LlmError>),
        Stall,
    }

    /// Scripted backend recording each call's user message and JSON flag.
    struct ScriptedLlm {
        steps: Mutex<Vec<Step>>,
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl ScriptedLlm {
        fn new(mut steps: Vec<Step>) -> Arc<Self> {
            steps.reverse();
            Arc::new(Self {
                steps: Mutex::new(steps),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl LlmCaller for ScriptedLlm {
        fn chat<'a>(
            &'a self,
            _system: &'a str,
            messages: &'a [Message],
            _tools: &'a [ToolDefinition],
            options: ChatOptions,
        ) -> Pin<Box<dyn Future<Output = Result<LlmResponse, LlmError>> + Send + 'a>> {
            let first = messages
                .first()
                .map(|m| {
                    m.content
                        .iter()
                        .filter_map(|b| match b {
                            ContentBlock::Text { text } => Some(text.as_str()),
                            _ => None,
                        })
                        .collect::<String>()
                })
                .unwrap_or_default();
            self.calls.lock().unwrap().push((first, options.json_output));
            let step = self
                .steps
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Step::Reply(Ok(text("unscripted"))));
            Box::pin(async move {
                match step {
                    Step::Reply(r) => r,
                    Step::Stall => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(text("too late"))
                    }
                }
            })
        }
    }

    fn text(t: &str) -> LlmResponse {
        LlmResponse {
            content: vec![ContentBlock::Text { text: t.into() }],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }

    fn engine_config(policy: TimeoutPolicy) -> EngineConfig {
        let mut system = system_config();
        system.pipeline.timeout_policy = policy;
        EngineConfig {
            system,
            tool_schemas: HashMap::new(),
            prompts: HashMap::new(),
            config_dir: PathBuf::from("config"),
        }
    }

    fn pipeline(llm: Arc<ScriptedLlm>, policy: TimeoutPolicy) -> Pipeline {
        let config = engine_config(policy);
        let context = ToolHandlerContext::new(
            &config.system,
            Credentials::default(),
            Arc::new(CircuitBreakerRegistry::new()),
        )
        .unwrap();
        Pipeline::new(llm, ToolRegistry::new(context), &config)
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new("flooded subway video", vec![], vec![], vec![], 3).unwrap()
    }

    fn five_notes() -> Vec<Step> {
        (1..=5)
            .map(|i| Step::Reply(Ok(text(&format!("notes from stage {}", i)))))
            .collect()
    }

    #[tokio::test]
    async fn test_runs_stages_in_order_with_context() {
        let mut steps = five_notes();
        let report = serde_json::to_string(&Report::example()).unwrap();
        steps.push(Step::Reply(Ok(text(&report))));
        let llm = ScriptedLlm::new(steps);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let pipeline = pipeline(llm.clone(), TimeoutPolicy::Recover)
            .with_observer(Box::new(move |e| sink.lock().unwrap().push(e.clone())));

        let result = pipeline.run(&request()).await.unwrap();

        assert_eq!(result.termination, Termination::Completed);
        assert_eq!(result.stage_outputs.len(), 6);
        assert_eq!(result.typed, Some(Report::example()));
        assert_eq!(result.raw.as_deref(), Some(report.as_str()));

        let calls = llm.calls.lock().unwrap();
        assert_eq!(calls.len(), 6);
        assert!(!calls[0].0.contains("Context from earlier stages"));
        assert!(calls[2].0.contains("### Web Crawler\nnotes from stage 1"));
        assert!(calls[2].0.contains("### News Content Analyst\nnotes from stage 2"));
        let json_flags: Vec<bool> = calls.iter().map(|c| c.1).collect();
        assert_eq!(json_flags, vec![false, false, false, false, false, true]);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 12);
        assert_eq!(
            events[0],
            StageEvent::StageStarted {
                index: 0,
                total: 6,
                role: "Web Crawler"
            }
        );
    }

    #[tokio::test]
    async fn test_fenced_final_answer_is_not_typed() {
        let mut steps = five_notes();
        steps.push(Step::Reply(Ok(text("```json\n{\"query_summary\": \"x\"}\n```"))));
        let result = pipeline(ScriptedLlm::new(steps), TimeoutPolicy::Recover)
            .run(&request())
            .await
            .unwrap();
        assert!(result.typed.is_none());
        assert!(result.raw.unwrap().starts_with("```json"));
    }

    #[tokio::test]
    async fn test_out_of_range_final_answer_is_not_typed() {
        let mut steps = five_notes();
        steps.push(Step::Reply(Ok(text(
            r#"{"propaganda_analysis": {"overall_reliability_score": 140}}"#,
        ))));
        let result = pipeline(ScriptedLlm::new(steps), TimeoutPolicy::Recover)
            .run(&request())
            .await
            .unwrap();
        assert!(result.typed.is_none());
        assert!(result.raw.is_some());
    }

    #[tokio::test]
    async fn test_unrelated_json_final_answer_is_not_typed() {
        let mut steps = five_notes();
        steps.push(Step::Reply(Ok(text(r#"{"status": "ok"}"#))));
        let result = pipeline(ScriptedLlm::new(steps), TimeoutPolicy::Recover)
            .run(&request())
            .await
            .unwrap();
        assert!(result.typed.is_none());
        assert_eq!(result.raw.as_deref(), Some(r#"{"status": "ok"}"#));
    }

    #[tokio::test]
    async fn test_stage_failure_aborts_run() {
        let steps = vec![
            Step::Reply(Ok(text("articles"))),
            Step::Reply(Err(LlmError::Api("overloaded".into()))),
        ];
        let llm = ScriptedLlm::new(steps);
        let err = pipeline(llm.clone(), TimeoutPolicy::Recover)
            .run(&request())
            .await
            .unwrap_err();
        match err {
            PipelineError::Stage { stage, .. } => assert_eq!(stage, "content_analyst"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(llm.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_recovers_partial_output() {
        let steps = vec![
            Step::Reply(Ok(text("articles"))),
            Step::Reply(Ok(text("themes"))),
            Step::Stall,
        ];
        let result = pipeline(ScriptedLlm::new(steps), TimeoutPolicy::Recover)
            .with_budget(Duration::from_millis(200))
            .run(&request())
            .await
            .unwrap();
        assert_eq!(
            result.termination,
            Termination::TimedOut {
                completed_stages: 2
            }
        );
        assert_eq!(result.raw.as_deref(), Some("themes"));
        assert!(result.typed.is_none());
    }

    #[tokio::test]
    async fn test_timeout_aborts_under_abort_policy() {
        let steps = vec![Step::Reply(Ok(text("articles"))), Step::Stall];
        let err = pipeline(ScriptedLlm::new(steps), TimeoutPolicy::Abort)
            .with_budget(Duration::from_millis(200))
            .run(&request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Timeout {
                completed_stages: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_open_llm_circuit_stops_before_stage() {
        let llm = ScriptedLlm::new(vec![]);
        let p = pipeline(llm.clone(), TimeoutPolicy::Recover);
        for _ in 0..3 {
            p.registry.context().breakers.llm_api.record_failure();
        }
        let err = p.run(&request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::CircuitOpen { .. }));
        assert!(llm.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_latest_output_skips_blank() {
        let out = |text: &str| StageOutput {
            key: "k",
            role: "r",
            text: text.into(),
            outcome: "completed",
            stats: SessionStats::default(),
        };
        assert_eq!(
            latest_output(&[out("first"), out("  ")]).as_deref(),
            Some("first")
        );
        assert_eq!(latest_output(&[]), None);
    }
}
