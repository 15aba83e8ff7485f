use verifai_common::config::RetryConfig;

use super::loader::{ConfigError, EngineConfig};
use crate::pipeline::stages::stage_keys;

const KNOWN_PROVIDERS: &[&str] = &["ollama", "gemini"];
const KNOWN_SEARCH_PROVIDERS: &[&str] = &["serper"];
const KNOWN_LOG_FORMATS: &[&str] = &["json", "pretty"];
const FALLBACK_EXCERPT_RANGE: std::ops::RangeInclusive<usize> = 100..=10_000;

/// Validate the complete engine configuration.
///
/// Collects every violation so one run of the binary reports all of them.
pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_llm(config, &mut errors);
    validate_pipeline(config, &mut errors);
    validate_retry(config, &mut errors);
    validate_tools(config, &mut errors);
    validate_report(config, &mut errors);
    validate_telemetry(config, &mut errors);
    validate_prompts(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors.join("; ")))
    }
}

fn validate_llm(config: &EngineConfig, errors: &mut Vec<String>) {
    let llm = &config.system.llm;

    if llm.provider.is_empty() {
        errors.push("llm.provider must not be empty".into());
    } else if !KNOWN_PROVIDERS.contains(&llm.provider.as_str()) {
        errors.push(format!(
            "llm.provider '{}' is not one of {}",
            llm.provider,
            KNOWN_PROVIDERS.join(", ")
        ));
    }
    if llm.model.is_empty() {
        errors.push("llm.model must not be empty".into());
    }
    if llm.max_tokens == 0 {
        errors.push("llm.max_tokens must be > 0".into());
    }
    if let Some(temp) = llm.temperature {
        if !(0.0..=2.0).contains(&temp) {
            errors.push("llm.temperature must be between 0.0 and 2.0".into());
        }
    }
    if llm.request_timeout_seconds == 0 {
        errors.push("llm.request_timeout_seconds must be > 0".into());
    }
}

fn validate_pipeline(config: &EngineConfig, errors: &mut Vec<String>) {
    let p = &config.system.pipeline;

    if p.max_execution_seconds == 0 {
        errors.push("pipeline.max_execution_seconds must be > 0".into());
    }
    if p.max_turns_per_stage == 0 {
        errors.push("pipeline.max_turns_per_stage must be > 0".into());
    }
    if p.max_consecutive_malformed_tool_calls == 0 {
        errors.push("pipeline.max_consecutive_malformed_tool_calls must be > 0".into());
    }
    if p.min_query_chars == 0 {
        errors.push("pipeline.min_query_chars must be > 0".into());
    }
}

fn validate_retry(config: &EngineConfig, errors: &mut Vec<String>) {
    let validate_one = |rc: &RetryConfig, name: &str, errors: &mut Vec<String>| {
        if rc.max_attempts == 0 {
            errors.push(format!("retry.{}.max_attempts must be > 0", name));
        }
        if rc.initial_backoff_ms == 0 {
            errors.push(format!("retry.{}.initial_backoff_ms must be > 0", name));
        }
        if rc.max_backoff_ms < rc.initial_backoff_ms {
            errors.push(format!(
                "retry.{}.max_backoff_ms must be >= initial_backoff_ms",
                name
            ));
        }
        if rc.backoff_multiplier < 1.0 {
            errors.push(format!("retry.{}.backoff_multiplier must be >= 1.0", name));
        }
    };

    validate_one(&config.system.retry.llm_api, "llm_api", errors);
    validate_one(
        &config.system.retry.external_modules,
        "external_modules",
        errors,
    );
}

fn validate_tools(config: &EngineConfig, errors: &mut Vec<String>) {
    let s = &config.system.search;
    if !KNOWN_SEARCH_PROVIDERS.contains(&s.provider.as_str()) {
        errors.push(format!("search.provider '{}' is not supported", s.provider));
    }
    if s.endpoint.is_empty() {
        errors.push("search.endpoint must not be empty".into());
    }
    if s.max_results == 0 {
        errors.push("search.max_results must be > 0".into());
    }

    let f = &config.system.fetch;
    if f.timeout_seconds == 0 {
        errors.push("fetch.timeout_seconds must be > 0".into());
    }
    if f.cache_ttl_seconds == 0 {
        errors.push("fetch.cache_ttl_seconds must be > 0".into());
    }
    if f.rate_limit_per_second.is_nan() || f.rate_limit_per_second <= 0.0 {
        errors.push("fetch.rate_limit_per_second must be > 0".into());
    }

    let t = &config.system.tool_results;
    if t.max_search_results == 0 {
        errors.push("tool_results.max_search_results must be > 0".into());
    }
    if t.max_page_chars == 0 {
        errors.push("tool_results.max_page_chars must be > 0".into());
    }
    if t.max_passages == 0 {
        errors.push("tool_results.max_passages must be > 0".into());
    }
}

fn validate_report(config: &EngineConfig, errors: &mut Vec<String>) {
    let r = &config.system.report;
    if r.output_dir.trim().is_empty() {
        errors.push("report.output_dir must not be empty".into());
    }
    if !FALLBACK_EXCERPT_RANGE.contains(&r.fallback_excerpt_chars) {
        errors.push(format!(
            "report.fallback_excerpt_chars must be between {} and {}",
            FALLBACK_EXCERPT_RANGE.start(),
            FALLBACK_EXCERPT_RANGE.end()
        ));
    }
}

fn validate_telemetry(config: &EngineConfig, errors: &mut Vec<String>) {
    let t = &config.system.telemetry;
    if !KNOWN_LOG_FORMATS.contains(&t.log_format.as_str()) {
        errors.push(format!(
            "telemetry.log_format '{}' must be one of {}",
            t.log_format,
            KNOWN_LOG_FORMATS.join(", ")
        ));
    }
    if let Some(addr) = &t.metrics_listen {
        if addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "telemetry.metrics_listen '{}' is not a socket address",
                addr
            ));
        }
    }
}

fn validate_prompts(config: &EngineConfig, errors: &mut Vec<String>) {
    let known = stage_keys();
    let mut names: Vec<&String> = config.prompts.keys().collect();
    names.sort();
    for name in names {
        if !known.contains(&name.as_str()) {
            errors.push(format!(
                "prompts/{}.md does not match a stage (expected one of {})",
                name,
                known.join(", ")
            ));
        } else if !config.prompts[name].contains("{query}") {
            errors.push(format!("prompts/{}.md must reference {{query}}", name));
        }
    }
}
