pub mod markdown;

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use verifai_common::types::Report;
use verifai_common::VerifaiError;

pub use markdown::{escape_cell, ratio_percent, render_markdown};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to create report directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<ExportError> for VerifaiError {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::CreateDir { source, .. } | ExportError::Write { source, .. } => {
                VerifaiError::Io(source)
            }
        }
    }
}

/// `news_analysis_report_<YYYYMMDD_HHMMSS>.md`
pub fn report_filename(now: NaiveDateTime) -> String {
    format!("news_analysis_report_{}.md", now.format("%Y%m%d_%H%M%S"))
}

/// Write the Markdown report into `dir`, creating it if needed.
pub fn export_report(report: &Report, dir: &Path, now: NaiveDateTime) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(report_filename(now));
    let markdown = render_markdown(report);
    std::fs::write(&path, &markdown).map_err(|source| ExportError::Write {
        path: path.clone(),
        source,
    })?;

    metrics::counter!("report.exported", "fallback" => report.is_fallback().to_string())
        .increment(1);
    tracing::info!(
        path = %path.display(),
        bytes = markdown.len(),
        fallback = report.is_fallback(),
        "Report exported"
    );

    Ok(path)
}

/// Short console summary printed after export.
pub fn render_summary(report: &Report) -> String {
    let pa = &report.propaganda_analysis;
    let mut lines = vec![format!("Query: {}", report.query_summary)];
    if report.is_fallback() {
        lines.push("Structured analysis unavailable; a minimal report was written.".to_string());
    }
    lines.push(format!(
        "Articles: {}  Sources: {}  Hashtags: {}  Topic clusters: {}",
        report.related_articles.len(),
        report.top_sources.len(),
        report.top_hashtags.len(),
        report.topic_clusters.len()
    ));
    lines.push(format!(
        "Reliability score: {:.1}/100  Techniques: {}  Misinformation indicators: {}",
        pa.overall_reliability_score,
        pa.propaganda_techniques.len(),
        pa.misinformation_indicators.len()
    ));
    if !report.related_words.is_empty() {
        let words: Vec<&str> = report.related_words.iter().take(8).map(String::as_str).collect();
        lines.push(format!("Keywords: {}", words.join(", ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap()
    }

    #[test]
    fn test_report_filename() {
        assert_eq!(report_filename(at()), "news_analysis_report_20250309_140507.md");
    }

    #[test]
    fn test_export_creates_dir_and_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("reports/nested");
        let path = export_report(&Report::example(), &dir, at()).unwrap();

        assert_eq!(path, dir.join("news_analysis_report_20250309_140507.md"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# News Analysis Report: Brief summary of the query"));
    }

    #[test]
    fn test_export_into_file_path_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();
        let err = export_report(&Report::example(), &blocker, at()).unwrap_err();
        assert!(matches!(err, ExportError::CreateDir { .. }));
        let converted: VerifaiError = err.into();
        assert!(matches!(converted, VerifaiError::Io(_)));
    }

    #[test]
    fn test_summary() {
        let summary = render_summary(&Report::example());
        assert!(summary.contains("Articles: 1"));
        assert!(summary.contains("Reliability score: 75.0/100"));
        assert!(summary.contains("Keywords: keyword1, keyword2, keyword3"));
        assert!(!summary.contains("minimal report"));
    }
}
