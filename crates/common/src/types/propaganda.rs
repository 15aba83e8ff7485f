use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Propaganda and misinformation sub-report.
///
/// Scales differ by field: `overall_reliability_score` is 0–100, technique
/// `severity` is 0–10, and every confidence/strength/likelihood is 0–1.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagandaAnalysis {
    pub overall_reliability_score: f64,
    pub propaganda_techniques: Vec<PropagandaTechnique>,
    pub misinformation_indicators: Vec<MisinformationIndicator>,
    pub coordination_patterns: Vec<CoordinationPattern>,
    pub bot_activity_metrics: BotActivityMetrics,
    pub fake_news_sites: Vec<FlaggedSite>,
    /// Free-form timeline events, e.g. `{"date": ..., "event": ...}`.
    pub manipulation_timeline: Vec<Map<String, Value>>,
    /// Narrative name → relative weight (0–1).
    pub narrative_fingerprint: BTreeMap<String, f64>,
    pub cross_verification_results: BTreeMap<String, Value>,
    pub recommended_verification_steps: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagandaTechnique {
    /// e.g. "Appeal to fear", "False equivalence".
    pub technique_name: String,
    /// Instances detected.
    pub frequency: u32,
    /// 0–10.
    pub severity: f64,
    pub example: String,
    /// Why this counts as propaganda.
    pub explanation: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MisinformationIndicator {
    /// e.g. "Factual error", "Missing context".
    pub indicator_type: String,
    /// 0–1.
    pub confidence: f64,
    pub correction: String,
    /// Sources that verify or contradict the claim.
    pub source_verification: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationPattern {
    /// e.g. "Synchronized publishing".
    pub pattern_type: String,
    /// 0–1.
    pub strength: f64,
    pub entities_involved: Vec<String>,
    pub timeline: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotActivityMetrics {
    /// 0–1.
    pub bot_likelihood_score: f64,
    pub account_creation_patterns: String,
    pub behavioral_indicators: Vec<String>,
    pub network_analysis: String,
}

/// A low-reliability site flagged by the reliability assessment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlaggedSite {
    pub domain: String,
    pub shares: u64,
    pub engagement: u64,
    pub known_false_stories: u32,
    pub verification_failures: Vec<String>,
    pub deceptive_practices: Vec<String>,
    pub network_connections: Vec<String>,
}
