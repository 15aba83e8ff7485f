use verifai_common::types::{Report, TopicCluster};

use crate::tools::truncation::truncate_chars;

/// Topic of the single cluster on a degraded report.
pub const FALLBACK_TOPIC: &str = "General Analysis";

/// Notice attached to every degraded report.
pub const FALLBACK_NOTE: &str = "The analysis output could not be parsed into a structured \
report. Key findings hold an excerpt of the raw output; every metric is zero and every \
list is empty.";

/// Minimal report built from the query and raw model text.
///
/// Numeric fields are zero and lists are empty, apart from `related_words`
/// (the query's whitespace tokens) and one synthetic topic cluster.
pub fn fallback_report(query: &str, raw: &str, excerpt_chars: usize) -> Report {
    let query = query.trim();
    let raw = raw.trim();

    let mut key_findings = format!("Analysis completed for: {}", query);
    if !raw.is_empty() {
        let (excerpt, cut) = truncate_chars(raw, excerpt_chars);
        key_findings.push_str("\n\n");
        key_findings.push_str(excerpt);
        if cut {
            key_findings.push_str("...");
        }
    }

    Report {
        query_summary: query.to_string(),
        key_findings,
        related_words: query.split_whitespace().map(str::to_string).collect(),
        topic_clusters: vec![TopicCluster {
            topic: FALLBACK_TOPIC.to_string(),
            size: 0,
            related_narratives: Vec::new(),
        }],
        analysis_note: Some(FALLBACK_NOTE.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_shape() {
        let report = fallback_report(" vaccine microchip rumor ", "The model rambled.", 100);
        assert_eq!(report.query_summary, "vaccine microchip rumor");
        assert_eq!(report.related_words, vec!["vaccine", "microchip", "rumor"]);
        assert_eq!(report.topic_clusters.len(), 1);
        assert_eq!(report.topic_clusters[0].topic, FALLBACK_TOPIC);
        assert_eq!(report.topic_clusters[0].size, 0);
        assert!(report.key_findings.starts_with("Analysis completed for: vaccine microchip rumor"));
        assert!(report.key_findings.ends_with("The model rambled."));
        assert!(report.is_fallback());

        assert!(report.related_articles.is_empty());
        assert!(report.top_sources.is_empty());
        assert_eq!(report.content_analysis.language_percentage, 0.0);
        assert_eq!(report.propaganda_analysis.overall_reliability_score, 0.0);
        assert_eq!(report.propaganda_analysis.bot_activity_metrics.bot_likelihood_score, 0.0);
        assert!(report.propaganda_analysis.narrative_fingerprint.is_empty());
        assert!(report.validate().is_ok());
    }

    #[test]
    fn test_excerpt_is_capped() {
        let raw = "é".repeat(2_000);
        let report = fallback_report("query text", &raw, 1_000);
        let excerpt = report.key_findings.rsplit("\n\n").next().unwrap();
        assert_eq!(excerpt.chars().count(), 1_003);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_empty_raw_has_no_excerpt() {
        let report = fallback_report("query text", "   ", 1_000);
        assert_eq!(report.key_findings, "Analysis completed for: query text");
    }
}
