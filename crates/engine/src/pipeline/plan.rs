use std::collections::HashMap;

use verifai_common::types::Report;

use super::stages::{OutputContract, StageDescriptor};
use super::PipelineError;

/// Placeholder text for an empty user-supplied list.
pub const NONE_PROVIDED: &str = "None provided";

/// What the user asked to analyse.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisRequest {
    pub query: String,
    pub urls: Vec<String>,
    pub hashtags: Vec<String>,
    pub keywords: Vec<String>,
}

impl AnalysisRequest {
    /// Build a request, trimming the query and cleaning the lists.
    ///
    /// Queries shorter than `min_query_chars` characters are rejected.
    pub fn new(
        query: &str,
        urls: Vec<String>,
        hashtags: Vec<String>,
        keywords: Vec<String>,
        min_query_chars: usize,
    ) -> Result<Self, PipelineError> {
        let query = query.trim();
        let len = query.chars().count();
        if len < min_query_chars {
            return Err(PipelineError::InvalidRequest(format!(
                "query must be at least {} characters (got {})",
                min_query_chars, len
            )));
        }

        Ok(Self {
            query: query.to_string(),
            urls: clean_list(urls),
            hashtags: clean_list(hashtags),
            keywords: clean_list(keywords),
        })
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split a comma-separated line into trimmed, non-empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    clean_list(raw.split(',').map(str::to_string).collect())
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        NONE_PROVIDED.to_string()
    } else {
        items.join(", ")
    }
}

/// Substitute `{query}`, `{urls}`, `{hashtags}` and `{keywords}` in one pass.
///
/// Unknown braces are copied through, and substituted values are never rescanned.
fn render_template(template: &str, request: &AnalysisRequest) -> String {
    let urls = join_or_none(&request.urls);
    let hashtags = join_or_none(&request.hashtags);
    let keywords = join_or_none(&request.keywords);

    let mut out = String::with_capacity(template.len() + request.query.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = ["query", "urls", "hashtags", "keywords"]
            .into_iter()
            .find(|name| {
                tail[1..].starts_with(name) && tail[1 + name.len()..].starts_with('}')
            });
        match value {
            Some(name) => {
                out.push_str(match name {
                    "query" => &request.query,
                    "urls" => &urls,
                    "hashtags" => &hashtags,
                    _ => &keywords,
                });
                rest = &tail[name.len() + 2..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Pretty-printed sample report shown to the compiler stage.
pub fn report_schema_template() -> String {
    serde_json::to_string_pretty(&Report::example()).unwrap_or_default()
}

/// One stage bound to its rendered task.
#[derive(Clone, Debug)]
pub struct PlannedTask {
    pub stage: StageDescriptor,
    pub description: String,
}

/// The ordered tasks for one run.
#[derive(Clone, Debug)]
pub struct TaskPlan {
    pub tasks: Vec<PlannedTask>,
}

impl TaskPlan {
    /// Render every stage's task for `request`.
    ///
    /// `overrides` maps a stage key to replacement instructions.
    pub fn build(
        request: &AnalysisRequest,
        roster: &[StageDescriptor],
        overrides: &HashMap<String, String>,
    ) -> Self {
        let tasks = roster
            .iter()
            .map(|stage| {
                let template = overrides
                    .get(stage.key)
                    .map(String::as_str)
                    .unwrap_or(stage.instructions);
                let mut description = render_template(template, request);

                if stage.output == OutputContract::ReportJson {
                    description.push_str(
                        "\n\nOutput MUST be a single valid JSON object following this schema:\n",
                    );
                    description.push_str(&report_schema_template());
                }
                description.push_str("\n\nExpected output: ");
                description.push_str(stage.expected_output);

                PlannedTask {
                    stage: *stage,
                    description,
                }
            })
            .collect();

        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::roster;

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(
            "  election fraud claims ",
            vec!["https://example.org/a".into(), "  ".into()],
            vec![],
            vec!["ballots".into(), " audit ".into()],
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_request_cleaning() {
        let req = request();
        assert_eq!(req.query, "election fraud claims");
        assert_eq!(req.urls, vec!["https://example.org/a"]);
        assert!(req.hashtags.is_empty());
        assert_eq!(req.keywords, vec!["ballots", "audit"]);
    }

    #[test]
    fn test_short_query_rejected() {
        let err = AnalysisRequest::new(" ab ", vec![], vec![], vec![], 3).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
        assert!(AnalysisRequest::new("abc", vec![], vec![], vec![], 3).is_ok());
        // Characters, not bytes.
        assert!(AnalysisRequest::new("éé", vec![], vec![], vec![], 3).is_err());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" #a, ,#b ,"), vec!["#a", "#b"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_render_template_single_pass() {
        let req = AnalysisRequest::new("who said {urls}?", vec![], vec![], vec![], 3).unwrap();
        let out = render_template("Q: {query} U: {urls} {unknown} {", &req);
        assert_eq!(out, "Q: who said {urls}? U: None provided {unknown} {");
    }

    #[test]
    fn test_plan_renders_every_stage() {
        let plan = TaskPlan::build(&request(), &roster(), &HashMap::new());
        assert_eq!(plan.len(), 6);
        for task in &plan.tasks {
            assert!(task.description.contains("election fraud claims"));
            assert!(!task.description.contains("{query}"));
            assert!(task.description.contains("Expected output:"));
        }

        let compiler = &plan.tasks[5].description;
        assert!(compiler.contains("- URLs: https://example.org/a"));
        assert!(compiler.contains("- Hashtags: None provided"));
        assert!(compiler.contains("- Keywords: ballots, audit"));
        assert!(compiler.contains("\"propaganda_analysis\""));
        assert!(compiler.contains("\"narrative_fingerprint\""));
        assert!(!plan.tasks[0].description.contains("\"propaganda_analysis\""));
    }

    #[test]
    fn test_override_replaces_instructions() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "web_crawler".to_string(),
            "Find three articles on {query}. Hashtags: {hashtags}".to_string(),
        );
        let plan = TaskPlan::build(&request(), &roster(), &overrides);
        assert!(plan.tasks[0]
            .description
            .starts_with("Find three articles on election fraud claims. Hashtags: None provided"));
        assert!(plan.tasks[1].description.starts_with("Analyze the content"));
    }

    #[test]
    fn test_schema_template_parses_as_report() {
        let parsed: Report = serde_json::from_str(&report_schema_template()).unwrap();
        assert_eq!(parsed, Report::example());
    }
}
