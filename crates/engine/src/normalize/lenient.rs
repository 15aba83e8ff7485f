//! Field-by-field coercion of loosely shaped model output into a `Report`.
//!
//! Strict decoding rejects a whole document over one wrong type. Here every
//! field is read on its own: numbers may arrive as strings or percentages,
//! single objects stand in for lists, and labels are matched fuzzily.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use verifai_common::types::{
    Article, BotActivityMetrics, ContentAnalysis, CoordinationPattern, FactualRating,
    FlaggedSite, HashtagMetrics, MisinformationIndicator, PropagandaAnalysis,
    PropagandaTechnique, Report, Sentiment, SharedSite, SourceReliability, TimeSeriesPoint,
    TopicCluster,
};

/// First present, non-null value under any of `keys`.
///
/// Keys match case-insensitively, with spaces and hyphens read as underscores.
fn field<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let map = obj.as_object()?;
    for key in keys {
        if let Some(v) = map.get(*key).filter(|v| !v.is_null()) {
            return Some(v);
        }
    }
    map.iter()
        .find(|(k, v)| !v.is_null() && keys.contains(&loose_key(k).as_str()))
        .map(|(_, v)| v)
}

fn loose_key(key: &str) -> String {
    key.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Top-level keys `coerce_report` reads, aliases included.
const TOP_LEVEL_KEYS: &[&str] = &[
    "query_summary",
    "summary",
    "key_findings",
    "findings",
    "related_articles",
    "articles",
    "related_words",
    "keywords",
    "topic_clusters",
    "topics",
    "top_sources",
    "sources",
    "top_hashtags",
    "hashtags",
    "similar_posts_time_series",
    "time_series",
    "fake_news_sites",
    "content_analysis",
    "propaganda_analysis",
    "platform_facts",
    "cross_source_facts",
];

fn has_report_key(value: &Value) -> bool {
    value.as_object().is_some_and(|map| {
        map.iter()
            .any(|(k, v)| !v.is_null() && TOP_LEVEL_KEYS.contains(&loose_key(k).as_str()))
    })
}

/// Parse "85", "85%", "1,200", "7/10" or "~0.4" into a number.
fn number_from_str(raw: &str) -> Option<(f64, bool)> {
    let s = raw.trim().trim_start_matches(['~', '≈']).trim();
    let (s, percent) = match s.strip_suffix('%') {
        Some(rest) => (rest.trim(), true),
        None => (s, false),
    };
    let s = s.split('/').next().unwrap_or(s).trim();
    let cleaned: String = s.chars().filter(|c| *c != ',' && *c != '_').collect();
    cleaned.parse::<f64>().ok().map(|n| (n, percent))
}

fn float(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => number_from_str(s).map(|(n, _)| n).unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

/// A 0–1 ratio; "80%" reads as 0.8.
fn ratio(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::String(s)) => match number_from_str(s) {
            Some((n, true)) => n / 100.0,
            Some((n, false)) => n,
            None => 0.0,
        },
        other => float(other),
    }
}

fn count(v: Option<&Value>) -> u64 {
    let n = float(v);
    if n.is_finite() && n > 0.0 {
        n.round().min(u64::MAX as f64) as u64
    } else {
        0
    }
}

fn small_count(v: Option<&Value>) -> u32 {
    count(v).min(u64::from(u32::MAX)) as u32
}

fn text(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|i| text(Some(i)))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Some(obj @ Value::Object(_)) => obj.to_string(),
        _ => String::new(),
    }
}

/// A list of strings from an array, or a comma/newline separated string.
fn strings(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Array(items)) => items
            .iter()
            .map(|i| text(Some(i)))
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split([',', '\n'])
            .map(|p| p.trim().trim_start_matches(['-', '*', '•']).trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        Some(other @ (Value::Number(_) | Value::Bool(_))) => vec![text(Some(other))],
        _ => Vec::new(),
    }
}

/// Items of a list; a lone object or string counts as a one-element list.
fn items(v: Option<&Value>) -> Vec<&Value> {
    match v {
        Some(Value::Array(items)) => items.iter().filter(|i| !i.is_null()).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single],
    }
}

fn articles(v: Option<&Value>) -> Vec<Article> {
    // Older output maps titles straight to URLs.
    if let Some(Value::Object(map)) = v {
        if !map.contains_key("title") && !map.contains_key("url") {
            return map
                .iter()
                .map(|(title, url)| Article {
                    title: title.trim().to_string(),
                    url: text(Some(url)),
                })
                .collect();
        }
    }
    items(v)
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Article {
                title: s.trim().to_string(),
                url: if s.trim().starts_with("http") {
                    s.trim().to_string()
                } else {
                    String::new()
                },
            },
            obj => Article {
                title: text(field(obj, &["title", "headline", "name"])),
                url: text(field(obj, &["url", "link", "href"])),
            },
        })
        .collect()
}

fn topic_clusters(v: Option<&Value>) -> Vec<TopicCluster> {
    items(v)
        .into_iter()
        .map(|item| match item {
            Value::String(s) => TopicCluster {
                topic: s.trim().to_string(),
                ..Default::default()
            },
            obj => TopicCluster {
                topic: text(field(obj, &["topic", "name", "theme", "cluster"])),
                size: small_count(field(obj, &["size", "count", "articles"])),
                related_narratives: strings(field(obj, &["related_narratives", "narratives"])),
            },
        })
        .collect()
}

fn top_sources(v: Option<&Value>) -> Vec<SourceReliability> {
    items(v)
        .into_iter()
        .map(|item| match item {
            Value::String(s) => SourceReliability {
                domain: s.trim().to_string(),
                ..Default::default()
            },
            obj => SourceReliability {
                domain: text(field(obj, &["domain", "source", "site", "name"])),
                factual_rating: FactualRating::from_label(&text(field(
                    obj,
                    &["factual_rating", "rating", "reliability"],
                ))),
                articles_count: count(field(obj, &["articles_count", "article_count", "articles"])),
                engagement: count(field(obj, &["engagement"])),
            },
        })
        .collect()
}

fn top_hashtags(v: Option<&Value>) -> Vec<HashtagMetrics> {
    items(v)
        .into_iter()
        .map(|item| match item {
            Value::String(s) => HashtagMetrics {
                hashtag: s.trim().to_string(),
                ..Default::default()
            },
            obj => HashtagMetrics {
                hashtag: text(field(obj, &["hashtag", "tag", "name"])),
                engagement_rate: float(field(obj, &["engagement_rate", "engagement"])),
                reach: count(field(obj, &["reach"])),
                sentiment: Sentiment::from_label(&text(field(obj, &["sentiment"]))),
            },
        })
        .collect()
}

fn time_series(v: Option<&Value>) -> Vec<TimeSeriesPoint> {
    if let Some(Value::Object(map)) = v {
        if !map.contains_key("date") {
            return map
                .iter()
                .map(|(date, n)| TimeSeriesPoint {
                    date: date.clone(),
                    count: count(Some(n)),
                })
                .collect();
        }
    }
    items(v)
        .into_iter()
        .filter(|item| item.is_object())
        .map(|obj| TimeSeriesPoint {
            date: text(field(obj, &["date", "day", "timestamp"])),
            count: count(field(obj, &["count", "posts", "value"])),
        })
        .collect()
}

fn shared_sites(v: Option<&Value>) -> Vec<SharedSite> {
    items(v)
        .into_iter()
        .map(|item| match item {
            Value::String(s) => SharedSite {
                site: s.trim().to_string(),
                shares: 0,
            },
            obj => SharedSite {
                site: text(field(obj, &["site", "domain", "name"])),
                shares: count(field(obj, &["shares"])),
            },
        })
        .collect()
}

fn content_analysis(v: Option<&Value>) -> ContentAnalysis {
    let Some(obj) = v else {
        return ContentAnalysis::default();
    };
    ContentAnalysis {
        language_percentage: float(field(obj, &["language_percentage", "language"])),
        coordination_percentage: float(field(obj, &["coordination_percentage", "coordination"])),
        source_percentage: float(field(obj, &["source_percentage", "source"])),
        bot_like_activity_percentage: float(field(
            obj,
            &["bot_like_activity_percentage", "bot_like_activity", "bot_activity"],
        )),
    }
}

fn techniques(v: Option<&Value>) -> Vec<PropagandaTechnique> {
    items(v)
        .into_iter()
        .map(|item| match item {
            Value::String(s) => PropagandaTechnique {
                technique_name: s.trim().to_string(),
                ..Default::default()
            },
            obj => PropagandaTechnique {
                technique_name: text(field(obj, &["technique_name", "technique", "name"])),
                frequency: small_count(field(obj, &["frequency", "count"])),
                severity: float(field(obj, &["severity"])),
                example: text(field(obj, &["example", "examples"])),
                explanation: text(field(obj, &["explanation", "rationale", "description"])),
            },
        })
        .collect()
}

fn indicators(v: Option<&Value>) -> Vec<MisinformationIndicator> {
    items(v)
        .into_iter()
        .map(|item| match item {
            Value::String(s) => MisinformationIndicator {
                indicator_type: s.trim().to_string(),
                ..Default::default()
            },
            obj => MisinformationIndicator {
                indicator_type: text(field(obj, &["indicator_type", "type", "indicator"])),
                confidence: ratio(field(obj, &["confidence"])),
                correction: text(field(obj, &["correction"])),
                source_verification: strings(field(
                    obj,
                    &["source_verification", "sources", "verifying_sources"],
                )),
            },
        })
        .collect()
}

fn coordination(v: Option<&Value>) -> Vec<CoordinationPattern> {
    items(v)
        .into_iter()
        .map(|item| match item {
            Value::String(s) => CoordinationPattern {
                pattern_type: s.trim().to_string(),
                ..Default::default()
            },
            obj => CoordinationPattern {
                pattern_type: text(field(obj, &["pattern_type", "type", "pattern"])),
                strength: ratio(field(obj, &["strength"])),
                entities_involved: strings(field(obj, &["entities_involved", "entities"])),
                timeline: text(field(obj, &["timeline"])),
            },
        })
        .collect()
}

fn bot_metrics(v: Option<&Value>) -> BotActivityMetrics {
    let Some(obj) = v.filter(|v| v.is_object()) else {
        return BotActivityMetrics::default();
    };
    BotActivityMetrics {
        bot_likelihood_score: ratio(field(obj, &["bot_likelihood_score", "bot_likelihood"])),
        account_creation_patterns: text(field(obj, &["account_creation_patterns"])),
        behavioral_indicators: strings(field(obj, &["behavioral_indicators", "indicators"])),
        network_analysis: text(field(obj, &["network_analysis"])),
    }
}

fn flagged_sites(v: Option<&Value>) -> Vec<FlaggedSite> {
    items(v)
        .into_iter()
        .map(|item| match item {
            Value::String(s) => FlaggedSite {
                domain: s.trim().to_string(),
                ..Default::default()
            },
            obj => FlaggedSite {
                domain: text(field(obj, &["domain", "site", "name"])),
                shares: count(field(obj, &["shares"])),
                engagement: count(field(obj, &["engagement"])),
                known_false_stories: small_count(field(obj, &["known_false_stories"])),
                verification_failures: strings(field(obj, &["verification_failures"])),
                deceptive_practices: strings(field(obj, &["deceptive_practices"])),
                network_connections: strings(field(obj, &["network_connections"])),
            },
        })
        .collect()
}

fn timeline(v: Option<&Value>) -> Vec<Map<String, Value>> {
    items(v)
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("event".into(), Value::String(text(Some(other))));
                map
            }
        })
        .collect()
}

fn fingerprint(v: Option<&Value>) -> BTreeMap<String, f64> {
    match v {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, weight)| (name.clone(), ratio(Some(weight))))
            .collect(),
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(|entry| {
                let name = text(field(entry, &["narrative", "name"]));
                (!name.is_empty()).then(|| (name, ratio(field(entry, &["weight", "score"]))))
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn propaganda(v: Option<&Value>) -> PropagandaAnalysis {
    let Some(obj) = v.filter(|v| v.is_object()) else {
        return PropagandaAnalysis::default();
    };
    PropagandaAnalysis {
        overall_reliability_score: float(field(
            obj,
            &["overall_reliability_score", "reliability_score", "credibility_score"],
        )),
        propaganda_techniques: techniques(field(obj, &["propaganda_techniques", "techniques"])),
        misinformation_indicators: indicators(field(obj, &["misinformation_indicators"])),
        coordination_patterns: coordination(field(obj, &["coordination_patterns"])),
        bot_activity_metrics: bot_metrics(field(obj, &["bot_activity_metrics"])),
        fake_news_sites: flagged_sites(field(obj, &["fake_news_sites"])),
        manipulation_timeline: timeline(field(obj, &["manipulation_timeline"])),
        narrative_fingerprint: fingerprint(field(obj, &["narrative_fingerprint"])),
        cross_verification_results: match field(obj, &["cross_verification_results"]) {
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            _ => BTreeMap::new(),
        },
        recommended_verification_steps: strings(field(
            obj,
            &["recommended_verification_steps", "verification_steps"],
        )),
    }
}

/// Coerce a decoded JSON document into a report, clamping bounded fields.
///
/// Returns `None` unless the document is an object with at least one
/// report field.
pub fn coerce_report(value: &Value) -> Option<Report> {
    if !has_report_key(value) {
        return None;
    }
    let mut report = Report {
        query_summary: text(field(value, &["query_summary", "summary"])),
        key_findings: text(field(value, &["key_findings", "findings"])),
        related_articles: articles(field(value, &["related_articles", "articles"])),
        related_words: strings(field(value, &["related_words", "keywords"])),
        topic_clusters: topic_clusters(field(value, &["topic_clusters", "topics"])),
        top_sources: top_sources(field(value, &["top_sources", "sources"])),
        top_hashtags: top_hashtags(field(value, &["top_hashtags", "hashtags"])),
        similar_posts_time_series: time_series(field(
            value,
            &["similar_posts_time_series", "time_series"],
        )),
        fake_news_sites: shared_sites(field(value, &["fake_news_sites"])),
        content_analysis: content_analysis(field(value, &["content_analysis"])),
        propaganda_analysis: propaganda(field(value, &["propaganda_analysis"])),
        platform_facts: strings(field(value, &["platform_facts"])),
        cross_source_facts: strings(field(value, &["cross_source_facts"])),
        analysis_note: None,
    };
    report.clamp_bounds();
    Some(report)
}

/// Decode `text` as JSON and coerce it.
pub fn lenient_report(text: &str) -> Option<Report> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    coerce_report(&value)
}
