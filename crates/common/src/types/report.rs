use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::labels::{FactualRating, Sentiment};
use super::propaganda::{
    BotActivityMetrics, CoordinationPattern, FlaggedSite, MisinformationIndicator,
    PropagandaAnalysis, PropagandaTechnique,
};

/// Inclusive range for ratios: confidence, strength, likelihood, narrative weight.
pub const RATIO_RANGE: (f64, f64) = (0.0, 1.0);
/// Inclusive range for technique severity.
pub const SEVERITY_RANGE: (f64, f64) = (0.0, 10.0);
/// Inclusive range for the reliability score and every percentage field.
pub const PERCENT_RANGE: (f64, f64) = (0.0, 100.0);

/// The news analysis report produced once per pipeline run.
///
/// Every field defaults, so partially populated model output still decodes.
/// A report is built once (parsed or fallback) and never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Report {
    pub query_summary: String,
    pub key_findings: String,
    pub related_articles: Vec<Article>,
    /// Keywords, weighted for a word cloud by order.
    pub related_words: Vec<String>,
    pub topic_clusters: Vec<TopicCluster>,
    pub top_sources: Vec<SourceReliability>,
    pub top_hashtags: Vec<HashtagMetrics>,
    pub similar_posts_time_series: Vec<TimeSeriesPoint>,
    pub fake_news_sites: Vec<SharedSite>,
    pub content_analysis: ContentAnalysis,
    pub propaganda_analysis: PropagandaAnalysis,
    pub platform_facts: Vec<String>,
    pub cross_source_facts: Vec<String>,
    /// Set only on degraded reports built from unparsable model output.
    /// Never read from input, so a parsed report cannot claim to be degraded.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub analysis_note: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Article {
    pub title: String,
    pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicCluster {
    pub topic: String,
    pub size: u32,
    pub related_narratives: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceReliability {
    pub domain: String,
    pub factual_rating: FactualRating,
    pub articles_count: u64,
    pub engagement: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashtagMetrics {
    pub hashtag: String,
    /// Percentage, 0–100.
    pub engagement_rate: f64,
    pub reach: u64,
    pub sentiment: Sentiment,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesPoint {
    pub date: String,
    pub count: u64,
}

/// A widely shared low-reliability site (top-level summary list).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedSite {
    pub site: String,
    pub shares: u64,
}

/// Share of analysed content showing each signal, as percentages.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentAnalysis {
    pub language_percentage: f64,
    pub coordination_percentage: f64,
    pub source_percentage: f64,
    pub bot_like_activity_percentage: f64,
}

/// Top-level keys of a serialized report.
pub const REPORT_KEYS: &[&str] = &[
    "query_summary",
    "key_findings",
    "related_articles",
    "related_words",
    "topic_clusters",
    "top_sources",
    "top_hashtags",
    "similar_posts_time_series",
    "fake_news_sites",
    "content_analysis",
    "propaganda_analysis",
    "platform_facts",
    "cross_source_facts",
];

impl Report {
    /// Whether `value` is an object carrying at least one report key.
    ///
    /// Every field defaults, so any other object would decode as an empty report.
    pub fn is_report_shaped(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|map| REPORT_KEYS.iter().any(|key| map.contains_key(*key)))
    }

    pub fn is_fallback(&self) -> bool {
        self.analysis_note.is_some()
    }

    /// Check every bounded numeric field. Returns all violations.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut check = |path: String, value: f64, (lo, hi): (f64, f64)| {
            if !value.is_finite() {
                errors.push(format!("{} is not a finite number", path));
            } else if value < lo || value > hi {
                errors.push(format!("{} = {} outside [{}, {}]", path, value, lo, hi));
            }
        };

        for (i, h) in self.top_hashtags.iter().enumerate() {
            check(
                format!("top_hashtags[{}].engagement_rate", i),
                h.engagement_rate,
                PERCENT_RANGE,
            );
        }

        let ca = &self.content_analysis;
        check(
            "content_analysis.language_percentage".into(),
            ca.language_percentage,
            PERCENT_RANGE,
        );
        check(
            "content_analysis.coordination_percentage".into(),
            ca.coordination_percentage,
            PERCENT_RANGE,
        );
        check(
            "content_analysis.source_percentage".into(),
            ca.source_percentage,
            PERCENT_RANGE,
        );
        check(
            "content_analysis.bot_like_activity_percentage".into(),
            ca.bot_like_activity_percentage,
            PERCENT_RANGE,
        );

        let pa = &self.propaganda_analysis;
        check(
            "propaganda_analysis.overall_reliability_score".into(),
            pa.overall_reliability_score,
            PERCENT_RANGE,
        );
        for (i, t) in pa.propaganda_techniques.iter().enumerate() {
            check(
                format!("propaganda_analysis.propaganda_techniques[{}].severity", i),
                t.severity,
                SEVERITY_RANGE,
            );
        }
        for (i, m) in pa.misinformation_indicators.iter().enumerate() {
            check(
                format!(
                    "propaganda_analysis.misinformation_indicators[{}].confidence",
                    i
                ),
                m.confidence,
                RATIO_RANGE,
            );
        }
        for (i, c) in pa.coordination_patterns.iter().enumerate() {
            check(
                format!("propaganda_analysis.coordination_patterns[{}].strength", i),
                c.strength,
                RATIO_RANGE,
            );
        }
        check(
            "propaganda_analysis.bot_activity_metrics.bot_likelihood_score".into(),
            pa.bot_activity_metrics.bot_likelihood_score,
            RATIO_RANGE,
        );
        for (name, weight) in &pa.narrative_fingerprint {
            check(
                format!("propaganda_analysis.narrative_fingerprint[{}]", name),
                *weight,
                RATIO_RANGE,
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Clamp every bounded numeric field into its range. Non-finite values become 0.
    pub fn clamp_bounds(&mut self) {
        fn clamp(value: &mut f64, (lo, hi): (f64, f64)) {
            *value = if value.is_finite() {
                value.clamp(lo, hi)
            } else {
                0.0
            };
        }

        for h in &mut self.top_hashtags {
            clamp(&mut h.engagement_rate, PERCENT_RANGE);
        }

        let ca = &mut self.content_analysis;
        clamp(&mut ca.language_percentage, PERCENT_RANGE);
        clamp(&mut ca.coordination_percentage, PERCENT_RANGE);
        clamp(&mut ca.source_percentage, PERCENT_RANGE);
        clamp(&mut ca.bot_like_activity_percentage, PERCENT_RANGE);

        let pa = &mut self.propaganda_analysis;
        clamp(&mut pa.overall_reliability_score, PERCENT_RANGE);
        for t in &mut pa.propaganda_techniques {
            clamp(&mut t.severity, SEVERITY_RANGE);
        }
        for m in &mut pa.misinformation_indicators {
            clamp(&mut m.confidence, RATIO_RANGE);
        }
        for c in &mut pa.coordination_patterns {
            clamp(&mut c.strength, RATIO_RANGE);
        }
        clamp(
            &mut pa.bot_activity_metrics.bot_likelihood_score,
            RATIO_RANGE,
        );
        for weight in pa.narrative_fingerprint.values_mut() {
            clamp(weight, RATIO_RANGE);
        }
    }

    /// A fully populated sample, used as the schema template in the
    /// report-compiler prompt.
    pub fn example() -> Self {
        Self {
            query_summary: "Brief summary of the query".into(),
            key_findings: "Main findings from the analysis".into(),
            related_articles: vec![Article {
                title: "Article Title".into(),
                url: "https://example.com".into(),
            }],
            related_words: vec!["keyword1".into(), "keyword2".into(), "keyword3".into()],
            topic_clusters: vec![TopicCluster {
                topic: "Main Topic".into(),
                size: 10,
                related_narratives: vec!["narrative1".into(), "narrative2".into()],
            }],
            top_sources: vec![SourceReliability {
                domain: "example.com".into(),
                factual_rating: FactualRating::High,
                articles_count: 5,
                engagement: 1000,
            }],
            top_hashtags: vec![HashtagMetrics {
                hashtag: "#example".into(),
                engagement_rate: 15.5,
                reach: 50_000,
                sentiment: Sentiment::Positive,
            }],
            similar_posts_time_series: vec![TimeSeriesPoint {
                date: "2024-01-01".into(),
                count: 25,
            }],
            fake_news_sites: vec![SharedSite {
                site: "fakename.com".into(),
                shares: 100,
            }],
            content_analysis: ContentAnalysis {
                language_percentage: 85.0,
                coordination_percentage: 15.0,
                source_percentage: 75.0,
                bot_like_activity_percentage: 10.0,
            },
            propaganda_analysis: PropagandaAnalysis {
                overall_reliability_score: 75.0,
                propaganda_techniques: vec![PropagandaTechnique {
                    technique_name: "Appeal to emotion".into(),
                    frequency: 3,
                    severity: 6.0,
                    example: "Example text".into(),
                    explanation: "Explanation of technique".into(),
                }],
                misinformation_indicators: vec![MisinformationIndicator {
                    indicator_type: "Factual error".into(),
                    confidence: 0.8,
                    correction: "Corrected information".into(),
                    source_verification: vec!["source1.com".into(), "source2.com".into()],
                }],
                coordination_patterns: vec![CoordinationPattern {
                    pattern_type: "Synchronized publishing".into(),
                    strength: 0.7,
                    entities_involved: vec!["site1.com".into(), "site2.com".into()],
                    timeline: "Within 2 hours".into(),
                }],
                bot_activity_metrics: BotActivityMetrics {
                    bot_likelihood_score: 0.3,
                    account_creation_patterns: "Normal distribution".into(),
                    behavioral_indicators: vec![
                        "Regular posting".into(),
                        "Human-like engagement".into(),
                    ],
                    network_analysis: "No suspicious clustering".into(),
                },
                fake_news_sites: vec![FlaggedSite {
                    domain: "fake-news.com".into(),
                    shares: 500,
                    engagement: 2000,
                    known_false_stories: 3,
                    verification_failures: vec!["Failed fact-check 1".into()],
                    deceptive_practices: vec!["Misleading headlines".into()],
                    network_connections: vec!["connected-site.com".into()],
                }],
                manipulation_timeline: vec![json!({
                    "date": "2024-01-01T10:00:00",
                    "event": "Initial post",
                    "manipulation_type": "None detected"
                })
                .as_object()
                .cloned()
                .unwrap_or_default()],
                narrative_fingerprint: [
                    ("main_narrative".to_string(), 0.8),
                    ("counter_narrative".to_string(), 0.2),
                ]
                .into_iter()
                .collect(),
                cross_verification_results: [
                    ("verified_claims".to_string(), json!(5)),
                    ("disputed_claims".to_string(), json!(2)),
                    ("unverified_claims".to_string(), json!(1)),
                ]
                .into_iter()
                .collect(),
                recommended_verification_steps: vec![
                    "Check multiple sources".into(),
                    "Verify with fact-checking sites".into(),
                    "Look for original sources".into(),
                ],
            },
            platform_facts: vec![
                "Fact 1 about the platform".into(),
                "Fact 2 about the platform".into(),
            ],
            cross_source_facts: vec![
                "Cross-verified fact 1".into(),
                "Cross-verified fact 2".into(),
            ],
            analysis_note: None,
        }
    }
}
