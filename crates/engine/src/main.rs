use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use verifai_common::config::TelemetryConfig;
use verifai_common::VerifaiError;

use verifai_engine::circuit_breaker::CircuitBreakerRegistry;
use verifai_engine::config::{self, Credentials, EngineConfig};
use verifai_engine::llm::{check_backend, LlmClient};
use verifai_engine::normalize::{normalize, NormalizeOptions};
use verifai_engine::pipeline::{split_list, AnalysisRequest, Pipeline, StageEvent, Termination};
use verifai_engine::reddit;
use verifai_engine::render::{export_report, render_summary};
use verifai_engine::{telemetry, tools};

/// Keywords kept from a Reddit post.
const REDDIT_KEYWORD_LIMIT: usize = 20;

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Ask a y/n question; when answered "y", read a comma-separated list.
fn gated_list(question: &str, label: &str) -> io::Result<Vec<String>> {
    if prompt(question)?.eq_ignore_ascii_case("y") {
        Ok(split_list(&prompt(label)?))
    } else {
        Ok(Vec::new())
    }
}

/// Read the topic (or Reddit link) and optional lists from stdin.
async fn read_request(config: &EngineConfig) -> Result<AnalysisRequest, VerifaiError> {
    let topic = prompt("Enter news topic (or a Reddit post URL) to analyze: ")?;

    let (query, mut keywords) = if reddit::is_reddit_url(&topic) {
        let http = reqwest::Client::builder()
            .user_agent(config.system.fetch.user_agent.clone())
            .timeout(Duration::from_secs(config.system.fetch.timeout_seconds))
            .build()
            .map_err(|e| VerifaiError::Fetch(e.to_string()))?;
        let post = reddit::fetch_post(&http, &topic).await?;
        let keywords = reddit::extract_keywords(&post, REDDIT_KEYWORD_LIMIT);
        if keywords.is_empty() {
            return Err(VerifaiError::Validation(
                "no keywords could be extracted from the Reddit post".into(),
            ));
        }
        println!("Reddit post: {} (r/{}, {} comments)", post.title, post.subreddit, post.num_comments);
        (
            reddit::query_from_keywords(&keywords),
            keywords.into_iter().map(|k| k.text).collect::<Vec<_>>(),
        )
    } else {
        (topic, Vec::new())
    };

    let urls = gated_list(
        "Include specific news URLs? (y/n): ",
        "Enter news URLs (comma-separated): ",
    )?;
    let hashtags = gated_list(
        "Track specific hashtags? (y/n): ",
        "Enter hashtags to track (comma-separated): ",
    )?;
    keywords.extend(gated_list(
        "Include additional keywords? (y/n): ",
        "Enter additional keywords (comma-separated): ",
    )?);

    let request = AnalysisRequest::new(
        &query,
        urls,
        hashtags,
        keywords,
        config.system.pipeline.min_query_chars,
    )?;
    Ok(request)
}

fn print_progress(event: &StageEvent) {
    match event {
        StageEvent::StageStarted { index, total, role } => {
            println!("[{}/{}] {} working...", index + 1, total, role);
        }
        StageEvent::StageFinished {
            index,
            total,
            role,
            outcome,
            elapsed,
        } => {
            println!(
                "[{}/{}] {} finished ({}, {:.1}s)",
                index + 1,
                total,
                role,
                outcome,
                elapsed.as_secs_f64()
            );
        }
    }
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; the environment may already hold the keys.
    let _ = dotenvy::dotenv();

    let config_dir = std::env::var("VERIFAI_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));

    let engine_config = match config::load_config(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            telemetry::init_tracing(&TelemetryConfig::default());
            tracing::error!(error = %e, "Failed to load configuration, refusing to start");
            fail(&format!("Configuration error: {}", e));
        }
    };

    telemetry::init_tracing(&engine_config.system.telemetry);
    tracing::info!(
        config_dir = %config_dir.display(),
        provider = %engine_config.system.llm.provider,
        model = %engine_config.system.llm.model,
        "verifai starting"
    );

    if let Err(e) = telemetry::install_metrics_exporter(&engine_config.system.telemetry) {
        tracing::error!(error = %e, "Metrics exporter failed");
        fail(&e.to_string());
    }

    let credentials = Credentials::from_env();
    if let Err(e) = credentials.require_serper() {
        tracing::error!(error = %e, "Missing search credentials");
        fail(&format!("Configuration error: {}", e));
    }

    let llm = match LlmClient::new(
        engine_config.system.llm.clone(),
        engine_config.system.retry.llm_api.clone(),
        &credentials,
    ) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create LLM client");
            fail(&format!("Configuration error: {}", e));
        }
    };

    println!("Checking {} backend ({})...", llm.provider(), llm.model());
    if let Err(e) = check_backend(&llm).await {
        tracing::error!(error = %e, "LLM backend check failed");
        fail(&format!("LLM backend unavailable: {}", e));
    }

    let request = match read_request(&engine_config).await {
        Ok(request) => request,
        Err(e) => fail(&format!("Cannot start analysis: {}", e)),
    };

    let breakers = Arc::new(CircuitBreakerRegistry::new());
    let registry = match tools::build_research_registry(
        &engine_config,
        credentials,
        Arc::clone(&breakers),
    ) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build tool registry");
            fail(&format!("Configuration error: {}", e));
        }
    };

    let pipeline = Pipeline::new(Arc::new(llm), registry, &engine_config)
        .with_observer(Box::new(print_progress));

    println!("Analyzing: {}", request.query);
    let result = match pipeline.run(&request).await {
        Ok(result) => result,
        Err(e) => {
            breakers.report_metrics();
            fail(&format!("Failed to generate report: {}", e));
        }
    };
    breakers.report_metrics();

    if let Termination::TimedOut { completed_stages } = result.termination {
        println!(
            "Warning: the analysis ran out of time after {} stages; the report may be incomplete.",
            completed_stages
        );
    }

    let options = NormalizeOptions::from(&engine_config.system.report);
    let normalized = normalize(&request.query, &result, &options);

    let output_dir = Path::new(&engine_config.system.report.output_dir);
    let now = chrono::Local::now().naive_local();
    match export_report(&normalized.report, output_dir, now) {
        Ok(path) => {
            println!("Report saved to {}", path.display());
            println!("{}", render_summary(&normalized.report));
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to save report");
            fail(&format!("Failed to save report: {}", e));
        }
    }
}
