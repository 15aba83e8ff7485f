pub mod cache;
pub mod fetch;
pub mod handlers;
pub mod passages;
pub mod rate_limit;
pub mod registry;
pub mod truncation;

use std::sync::Arc;

pub use registry::{ToolCounters, ToolHandler, ToolHandlerContext, ToolRegistry};

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::config::{Credentials, EngineConfig};

/// Schema directory under `config/tools/` for the research tools.
pub const RESEARCH_ROLE: &str = "research";

/// Build the registry handed to tool-using stages.
pub fn build_research_registry(
    config: &EngineConfig,
    credentials: Credentials,
    breakers: Arc<CircuitBreakerRegistry>,
) -> Result<ToolRegistry, String> {
    let context = ToolHandlerContext::new(&config.system, credentials, breakers)?;
    let mut registry = ToolRegistry::new(context);
    handlers::register_research_tools(&mut registry);
    registry.load_definitions(&config.tool_schemas, RESEARCH_ROLE)?;
    Ok(registry)
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn engine_config(schemas: HashMap<String, serde_json::Value>) -> EngineConfig {
        EngineConfig {
            system: test_support::system_config(),
            tool_schemas: schemas,
            prompts: HashMap::new(),
            config_dir: PathBuf::from("config"),
        }
    }

    fn schema(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "description": format!("{} tool", name),
            "input_schema": {"type": "object"}
        })
    }

    #[test]
    fn test_build_registry_loads_role_schemas_sorted() {
        let mut schemas = HashMap::new();
        schemas.insert("research/web_search".to_string(), schema("web_search"));
        schemas.insert("research/scrape_website".to_string(), schema("scrape_website"));
        schemas.insert("other/web_search".to_string(), schema("web_search"));

        let registry = build_research_registry(
            &engine_config(schemas),
            Credentials::default(),
            Arc::new(CircuitBreakerRegistry::new()),
        )
        .unwrap();

        let names: Vec<&str> = registry.definitions().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["scrape_website", "web_search"]);
    }

    #[test]
    fn test_schema_without_handler_rejected() {
        let mut schemas = HashMap::new();
        schemas.insert("research/translate".to_string(), schema("translate"));
        let err = build_research_registry(
            &engine_config(schemas),
            Credentials::default(),
            Arc::new(CircuitBreakerRegistry::new()),
        )
        .err()
        .unwrap();
        assert!(err.contains("no handler"));
    }

    #[test]
    fn test_schema_missing_field_rejected() {
        let mut schemas = HashMap::new();
        schemas.insert(
            "research/web_search".to_string(),
            json!({"name": "web_search", "input_schema": {}}),
        );
        let err = build_research_registry(
            &engine_config(schemas),
            Credentials::default(),
            Arc::new(CircuitBreakerRegistry::new()),
        )
        .err()
        .unwrap();
        assert!(err.contains("description"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_malformed() {
        let registry = build_research_registry(
            &engine_config(HashMap::new()),
            Credentials::default(),
            Arc::new(CircuitBreakerRegistry::new()),
        )
        .unwrap();

        let result = registry.execute("delete_everything", json!({})).await;
        assert!(result.is_error);
        assert!(result.is_malformed);
        assert!(result.content.contains("web_search"));

        let executor = registry.as_executor();
        let result = executor("scrape_website".into(), json!({"link": "x"})).await;
        assert!(result.is_error);
        assert!(result.is_malformed);
    }

    #[tokio::test]
    async fn test_soft_failures_are_not_malformed() {
        let registry = build_research_registry(
            &engine_config(HashMap::new()),
            Credentials::default(),
            Arc::new(CircuitBreakerRegistry::new()),
        )
        .unwrap();

        let result = registry
            .execute("web_search", json!({"query": "storm rumor"}))
            .await;
        assert!(result.is_error);
        assert!(!result.is_malformed);
        assert!(result.content.contains("SERPER_API_KEY"));
    }
}
