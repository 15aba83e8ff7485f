use verifai_common::types::Report;

/// Make text safe inside a Markdown table cell.
pub fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}

/// Collapse text onto one line for a heading.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Format a 0–1 ratio as a percentage with one decimal.
pub fn ratio_percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

fn push_bullets<'a>(out: &mut String, items: impl IntoIterator<Item = &'a String>) {
    for item in items {
        push_line(out, &format!("- {}", item));
    }
}

fn push_row(out: &mut String, cells: &[String]) {
    let escaped: Vec<String> = cells.iter().map(|c| escape_cell(c)).collect();
    push_line(out, &format!("| {} |", escaped.join(" | ")));
}

fn push_table_head(out: &mut String, headers: &[&str]) {
    push_line(out, &format!("| {} |", headers.join(" | ")));
    let rule: Vec<String> = headers.iter().map(|h| "-".repeat(h.len().max(3))).collect();
    push_line(out, &format!("|{}|", rule.join("|")));
}

/// Render the full report as Markdown, sections in fixed order.
pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();

    let title = format!("# News Analysis Report: {}", single_line(&report.query_summary));
    push_line(&mut out, &title);
    out.push('\n');
    if let Some(note) = &report.analysis_note {
        push_line(&mut out, &format!("> **Notice:** {}", note));
        out.push('\n');
    }

    push_line(&mut out, "## Key Findings & Summary\n");
    push_line(&mut out, &report.key_findings);
    out.push('\n');

    push_line(&mut out, "## Related Articles\n");
    for article in &report.related_articles {
        if article.url.is_empty() {
            push_line(&mut out, &format!("- {}", article.title));
        } else {
            push_line(&mut out, &format!("- [{}]({})", article.title, article.url));
        }
    }
    out.push('\n');

    push_line(&mut out, "## Related Words\n");
    push_line(&mut out, &report.related_words.join(", "));
    out.push('\n');

    push_line(&mut out, "## Related Topic Clusters\n");
    for cluster in &report.topic_clusters {
        push_line(&mut out, &format!("- **{}** (Size: {})", cluster.topic, cluster.size));
        if !cluster.related_narratives.is_empty() {
            push_line(
                &mut out,
                &format!("  - Related narratives: {}", cluster.related_narratives.join(", ")),
            );
        }
    }
    out.push('\n');

    push_line(&mut out, "## List of Top Sources\n");
    push_table_head(&mut out, &["Domain", "Factual", "Articles", "Engagement"]);
    for source in &report.top_sources {
        push_row(
            &mut out,
            &[
                source.domain.clone(),
                source.factual_rating.to_string(),
                source.articles_count.to_string(),
                source.engagement.to_string(),
            ],
        );
    }
    out.push('\n');

    push_line(&mut out, "## Top Hashtags\n");
    push_table_head(&mut out, &["Hashtag", "Engagement Rate (%)", "Reach", "Sentiment"]);
    for tag in &report.top_hashtags {
        push_row(
            &mut out,
            &[
                tag.hashtag.clone(),
                format!("{:.1}", tag.engagement_rate),
                tag.reach.to_string(),
                tag.sentiment.to_string(),
            ],
        );
    }
    out.push('\n');

    push_line(&mut out, "## Similar Posts Spread Over Time\n");
    for point in &report.similar_posts_time_series {
        push_line(&mut out, &format!("- {}: {} posts", point.date, point.count));
    }
    out.push('\n');

    push_line(&mut out, "## Most Shared Fake News Sites\n");
    for site in &report.fake_news_sites {
        push_line(&mut out, &format!("- {}: {} shares", site.site, site.shares));
    }
    out.push('\n');

    let ca = &report.content_analysis;
    push_line(&mut out, "## Content Analysis Metrics\n");
    push_line(&mut out, &format!("- Language: {:.1}%", ca.language_percentage));
    push_line(&mut out, &format!("- Coordination: {:.1}%", ca.coordination_percentage));
    push_line(&mut out, &format!("- Source: {:.1}%", ca.source_percentage));
    push_line(&mut out, &format!("- Bot-like activity: {:.1}%", ca.bot_like_activity_percentage));
    out.push('\n');

    render_propaganda(&mut out, report);

    push_line(&mut out, "## Facts Gathered from Platform\n");
    push_bullets(&mut out, &report.platform_facts);
    out.push('\n');

    push_line(&mut out, "## Facts Gathered from Relevant Sources\n");
    push_bullets(&mut out, &report.cross_source_facts);

    out
}

fn render_propaganda(out: &mut String, report: &Report) {
    let pa = &report.propaganda_analysis;

    push_line(out, "## Propaganda and Misinformation Analysis\n");
    push_line(
        out,
        &format!("### Overall Reliability Score: {:.1}/100\n", pa.overall_reliability_score),
    );

    push_line(out, "### Propaganda Techniques Detected\n");
    push_table_head(out, &["Technique", "Frequency", "Severity (0-10)", "Example"]);
    for t in &pa.propaganda_techniques {
        push_row(
            out,
            &[
                format!("**{}**", t.technique_name),
                t.frequency.to_string(),
                format!("{:.1}", t.severity),
                t.example.clone(),
            ],
        );
    }
    if !pa.propaganda_techniques.is_empty() {
        push_line(out, "\n*Explanation of techniques:*\n");
        for t in &pa.propaganda_techniques {
            push_line(out, &format!("- **{}**: {}", t.technique_name, t.explanation));
        }
    }
    out.push('\n');

    push_line(out, "### Misinformation Indicators\n");
    push_table_head(out, &["Type", "Confidence", "Correction", "Verification Sources"]);
    for m in &pa.misinformation_indicators {
        push_row(
            out,
            &[
                m.indicator_type.clone(),
                ratio_percent(m.confidence),
                m.correction.clone(),
                m.source_verification.join(", "),
            ],
        );
    }
    out.push('\n');

    push_line(out, "### Coordination Patterns\n");
    for c in &pa.coordination_patterns {
        push_line(
            out,
            &format!("**{}** (Strength: {})", c.pattern_type, ratio_percent(c.strength)),
        );
        push_line(out, &format!("- Entities involved: {}", c.entities_involved.join(", ")));
        push_line(out, &format!("- Timeline: {}\n", c.timeline));
    }

    let bot = &pa.bot_activity_metrics;
    push_line(out, "### Bot Activity Metrics\n");
    push_line(
        out,
        &format!("**Bot Likelihood Score: {}**\n", ratio_percent(bot.bot_likelihood_score)),
    );
    push_line(
        out,
        &format!("Account Creation Patterns: {}\n", bot.account_creation_patterns),
    );
    push_line(out, "Behavioral Indicators:");
    push_bullets(out, &bot.behavioral_indicators);
    push_line(out, &format!("\nNetwork Analysis: {}\n", bot.network_analysis));

    push_line(out, "### Flagged Fake News Sites\n");
    push_table_head(
        out,
        &["Domain", "Shares", "Engagement", "Known False Stories", "Verification Failures"],
    );
    for site in &pa.fake_news_sites {
        let mut failures = site
            .verification_failures
            .iter()
            .take(2)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if site.verification_failures.len() > 2 {
            failures.push_str(", ...");
        }
        push_row(
            out,
            &[
                site.domain.clone(),
                site.shares.to_string(),
                site.engagement.to_string(),
                site.known_false_stories.to_string(),
                failures,
            ],
        );
    }
    out.push('\n');

    push_line(out, "### Deceptive Practices by Domain\n");
    for site in pa.fake_news_sites.iter().filter(|s| !s.deceptive_practices.is_empty()) {
        push_line(out, &format!("**{}**:", site.domain));
        push_bullets(out, &site.deceptive_practices);
        out.push('\n');
    }

    push_line(out, "### Information Manipulation Timeline\n");
    for entry in &pa.manipulation_timeline {
        let when = ["date", "timestamp", "time"]
            .iter()
            .find_map(|k| entry.get(*k))
            .map(value_text)
            .unwrap_or_else(|| "N/A".to_string());
        let event = entry
            .get("event")
            .map(value_text)
            .unwrap_or_else(|| "N/A".to_string());
        push_line(out, &format!("- **{}**: {}", when, event));
    }
    out.push('\n');

    push_line(out, "### Narrative Fingerprint\n");
    for (narrative, weight) in &pa.narrative_fingerprint {
        push_line(out, &format!("- **{}**: {}", narrative, ratio_percent(*weight)));
    }
    out.push('\n');

    push_line(out, "### How to Verify This Information\n");
    for (i, step) in pa.recommended_verification_steps.iter().enumerate() {
        push_line(out, &format!("{}. {}", i + 1, step));
    }
    out.push('\n');
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::fallback_report;

    #[test]
    fn test_sections_in_order() {
        let md = render_markdown(&Report::example());
        let headings = [
            "# News Analysis Report: Brief summary of the query",
            "## Key Findings & Summary",
            "## Related Articles",
            "## Related Words",
            "## Related Topic Clusters",
            "## List of Top Sources",
            "## Top Hashtags",
            "## Similar Posts Spread Over Time",
            "## Most Shared Fake News Sites",
            "## Content Analysis Metrics",
            "## Propaganda and Misinformation Analysis",
            "### Overall Reliability Score: 75.0/100",
            "### Propaganda Techniques Detected",
            "### Misinformation Indicators",
            "### Coordination Patterns",
            "### Bot Activity Metrics",
            "### Flagged Fake News Sites",
            "### Deceptive Practices by Domain",
            "### Information Manipulation Timeline",
            "### Narrative Fingerprint",
            "### How to Verify This Information",
            "## Facts Gathered from Platform",
            "## Facts Gathered from Relevant Sources",
        ];
        let mut last = 0;
        for heading in headings {
            let pos = md[last..]
                .find(heading)
                .unwrap_or_else(|| panic!("missing or out of order: {}", heading));
            last += pos + heading.len();
        }
    }

    #[test]
    fn test_ratios_and_rows() {
        let md = render_markdown(&Report::example());
        assert!(md.contains("| Factual error | 80.0% | Corrected information | source1.com, source2.com |"));
        assert!(md.contains("**Synchronized publishing** (Strength: 70.0%)"));
        assert!(md.contains("**Bot Likelihood Score: 30.0%**"));
        assert!(md.contains("- **main_narrative**: 80.0%"));
        assert!(md.contains("- [Article Title](https://example.com)"));
        assert!(md.contains("| example.com | High | 5 | 1000 |"));
        assert!(md.contains("- **2024-01-01T10:00:00**: Initial post"));
        assert!(md.contains("1. Check multiple sources"));
    }

    #[test]
    fn test_cells_escaped() {
        assert_eq!(escape_cell("a|b\nc"), "a\\|b c");
        let mut report = Report::example();
        report.top_sources[0].domain = "pipe|site.com".into();
        let md = render_markdown(&report);
        assert!(md.contains("| pipe\\|site.com | High |"));
    }

    #[test]
    fn test_multiline_summary_keeps_title_on_one_line() {
        let mut report = Report::example();
        report.query_summary = "Dam failure\nvideo  claims\r\n".into();
        let md = render_markdown(&report);
        assert_eq!(md.lines().next(), Some("# News Analysis Report: Dam failure video claims"));
        assert!(md.lines().nth(2).is_some_and(|l| l.starts_with("## ")));
    }

    #[test]
    fn test_fallback_notice_under_title() {
        let md = render_markdown(&fallback_report("storm hoax", "raw", 100));
        let title_end = md.find('\n').unwrap();
        assert!(md[title_end..].trim_start().starts_with("> **Notice:**"));
        assert!(md.contains("- **General Analysis** (Size: 0)"));
        assert!(!render_markdown(&Report::example()).contains("**Notice:**"));
    }
}
