//! Turn whatever a pipeline run produced into exactly one `Report`.
//!
//! Strategies run in order and each failure falls through to the next:
//! the typed payload, strict decoding of the extracted JSON object, lenient
//! coercion, and finally a degraded report built from the raw text.
//! Nothing here returns an error.

pub mod extract;
pub mod fallback;
pub mod lenient;

use std::fmt;

use verifai_common::config::ReportConfig;
use verifai_common::types::Report;

pub use extract::json_object_spans;
pub use fallback::{fallback_report, FALLBACK_NOTE};
pub use lenient::{coerce_report, lenient_report};

use crate::pipeline::PipelineResult;

/// Which step produced the report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Typed,
    ExtractedJson,
    LenientJson,
    Fallback,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Typed => "typed",
            Self::ExtractedJson => "extracted_json",
            Self::LenientJson => "lenient_json",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct NormalizeOptions {
    /// Character cap on the raw-text excerpt in a fallback report.
    pub fallback_excerpt_chars: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            fallback_excerpt_chars: 1000,
        }
    }
}

impl From<&ReportConfig> for NormalizeOptions {
    fn from(config: &ReportConfig) -> Self {
        Self {
            fallback_excerpt_chars: config.fallback_excerpt_chars,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Normalized {
    pub report: Report,
    pub strategy: Strategy,
}

/// Normalize a finished (or recovered) pipeline run.
pub fn normalize(query: &str, result: &PipelineResult, options: &NormalizeOptions) -> Normalized {
    let normalized = match &result.typed {
        Some(report) => Normalized {
            report: report.clone(),
            strategy: Strategy::Typed,
        },
        None => resolve(query, result.raw.as_deref().unwrap_or_default(), options),
    };
    record(&normalized);
    normalized
}

/// Normalize raw model text directly.
pub fn normalize_text(query: &str, raw: &str, options: &NormalizeOptions) -> Normalized {
    let normalized = resolve(query, raw, options);
    record(&normalized);
    normalized
}

/// Strictly decode one JSON document as a report.
///
/// The document must carry at least one report key and pass `validate()`.
pub fn decode_report(text: &str) -> Option<Report> {
    let value: serde_json::Value = serde_json::from_str(text.trim()).ok()?;
    if !Report::is_report_shaped(&value) {
        tracing::debug!("JSON object carries no report fields");
        return None;
    }
    let report: Report = match serde_json::from_value(value) {
        Ok(report) => report,
        Err(e) => {
            tracing::debug!(error = %e, "JSON did not decode as a report");
            return None;
        }
    };
    match report.validate() {
        Ok(()) => Some(report),
        Err(violations) => {
            tracing::debug!(?violations, "Decoded report out of range");
            None
        }
    }
}

fn resolve(query: &str, raw: &str, options: &NormalizeOptions) -> Normalized {
    let spans = json_object_spans(raw);

    if let Some(report) = spans.iter().find_map(|span| decode_report(span)) {
        return Normalized {
            report,
            strategy: Strategy::ExtractedJson,
        };
    }

    let lenient = spans
        .iter()
        .find_map(|span| lenient_report(span).filter(|r| r.validate().is_ok()));
    if let Some(report) = lenient {
        return Normalized {
            report,
            strategy: Strategy::LenientJson,
        };
    }

    Normalized {
        report: fallback_report(query, raw, options.fallback_excerpt_chars),
        strategy: Strategy::Fallback,
    }
}

fn record(normalized: &Normalized) {
    metrics::counter!("normalize.strategy", "strategy" => normalized.strategy.as_str())
        .increment(1);
    tracing::info!(
        strategy = %normalized.strategy,
        fallback = normalized.report.is_fallback(),
        articles = normalized.report.related_articles.len(),
        "Report normalized"
    );
}
