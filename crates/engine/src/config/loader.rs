use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use verifai_common::config::SystemConfig;

use super::validation;

/// Complete engine configuration loaded from the config directory.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Parsed system.toml.
    pub system: SystemConfig,
    /// Tool schemas keyed by "{role}/{tool_name}" (e.g. "research/web_search").
    pub tool_schemas: HashMap<String, Value>,
    /// Stage instruction overrides keyed by filename stem (e.g. "web_crawler").
    pub prompts: HashMap<String, String>,
    pub config_dir: PathBuf,
}

/// Load all configuration from the given config directory.
///
/// Fails loudly if anything is misconfigured; the binary refuses to start.
pub fn load_config(config_dir: &Path) -> Result<EngineConfig, ConfigError> {
    tracing::info!(config_dir = %config_dir.display(), "Loading configuration");

    let system = load_system_config(&config_dir.join("system.toml"))?;
    let tool_schemas = load_tool_schemas(&config_dir.join("tools"))?;
    let prompts = load_prompts(&config_dir.join("prompts"))?;

    let config = EngineConfig {
        system,
        tool_schemas,
        prompts,
        config_dir: config_dir.to_path_buf(),
    };

    validation::validate(&config)?;

    tracing::info!(
        provider = %config.system.llm.provider,
        model = %config.system.llm.model,
        tool_schemas = config.tool_schemas.len(),
        prompt_overrides = config.prompts.len(),
        "Configuration loaded"
    );

    Ok(config)
}

fn load_system_config(path: &Path) -> Result<SystemConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    SystemConfig::from_toml_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn read_dir(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        paths.push(entry.path());
    }
    // Directory order is platform dependent.
    paths.sort();
    Ok(paths)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

fn load_tool_schemas(tools_dir: &Path) -> Result<HashMap<String, Value>, ConfigError> {
    let mut schemas = HashMap::new();

    if !tools_dir.exists() {
        tracing::warn!(
            path = %tools_dir.display(),
            "Tools directory does not exist, no tool schemas loaded"
        );
        return Ok(schemas);
    }

    for role_path in read_dir(tools_dir)? {
        if !role_path.is_dir() {
            continue;
        }
        let role_name = file_stem(&role_path);

        for file_path in read_dir(&role_path)? {
            if !file_path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }

            let content =
                std::fs::read_to_string(&file_path).map_err(|e| ConfigError::FileRead {
                    path: file_path.clone(),
                    source: e,
                })?;

            let schema: Value = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: file_path.clone(),
                detail: e.to_string(),
            })?;

            let key = format!("{}/{}", role_name, file_stem(&file_path));
            tracing::debug!(tool = %key, "Loaded tool schema");
            schemas.insert(key, schema);
        }
    }

    Ok(schemas)
}

fn load_prompts(prompts_dir: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let mut prompts = HashMap::new();

    if !prompts_dir.exists() {
        tracing::debug!(
            path = %prompts_dir.display(),
            "Prompts directory does not exist, using built-in stage instructions"
        );
        return Ok(prompts);
    }

    for path in read_dir(prompts_dir)? {
        if !path
            .extension()
            .is_some_and(|ext| ext == "md" || ext == "txt")
        {
            continue;
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
            path: path.clone(),
            source: e,
        })?;

        let name = file_stem(&path);
        tracing::debug!(prompt = %name, "Loaded stage instruction override");
        prompts.insert(name, content);
    }

    Ok(prompts)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Missing credential: set {0} in the environment or .env")]
    MissingCredential(String),
}

impl From<ConfigError> for verifai_common::VerifaiError {
    fn from(e: ConfigError) -> Self {
        verifai_common::VerifaiError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEM_TOML: &str = r#"
[llm]
provider = "ollama"
model = "mistral"
max_tokens = 2048
temperature = 0.3

[pipeline]
max_execution_seconds = 1800
timeout_policy = "recover"
max_turns_per_stage = 8
max_consecutive_malformed_tool_calls = 3

[retry.llm_api]
max_attempts = 3
initial_backoff_ms = 1000
max_backoff_ms = 8000
backoff_multiplier = 2.0
jitter = true

[retry.external_modules]
max_attempts = 3
initial_backoff_ms = 500
max_backoff_ms = 4000
backoff_multiplier = 2.0
jitter = false

[search]
provider = "serper"
endpoint = "https://google.serper.dev/search"
max_results = 10

[fetch]
user_agent = "verifai/0.1"
timeout_seconds = 20
cache_ttl_seconds = 900
rate_limit_per_second = 1.0

[tool_results]
max_search_results = 10
max_page_chars = 6000
max_passages = 5

[report]
output_dir = "reports"
fallback_excerpt_chars = 1000
"#;

    fn write_config_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("system.toml"), SYSTEM_TOML).unwrap();

        let research = dir.path().join("tools").join("research");
        std::fs::create_dir_all(&research).unwrap();
        std::fs::write(
            research.join("web_search.json"),
            r#"{"name": "web_search", "description": "Search", "input_schema": {"type": "object"}}"#,
        )
        .unwrap();
        std::fs::write(research.join("README.txt"), "ignored").unwrap();

        let prompts = dir.path().join("prompts");
        std::fs::create_dir_all(&prompts).unwrap();
        std::fs::write(prompts.join("web_crawler.md"), "Find {query} coverage.").unwrap();
        dir
    }

    #[test]
    fn test_load_full_config_dir() {
        let dir = write_config_dir();
        let config = load_config(dir.path()).unwrap();

        assert_eq!(config.system.llm.provider, "ollama");
        assert!(config.tool_schemas.contains_key("research/web_search"));
        assert_eq!(config.tool_schemas.len(), 1);
        assert_eq!(config.prompts["web_crawler"], "Find {query} coverage.");
    }

    #[test]
    fn test_missing_system_toml_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_invalid_tool_schema_is_parse_error() {
        let dir = write_config_dir();
        std::fs::write(
            dir.path().join("tools").join("research").join("broken.json"),
            "{not json",
        )
        .unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validation_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let bad = SYSTEM_TOML.replace("max_tokens = 2048", "max_tokens = 0");
        std::fs::write(dir.path().join("system.toml"), bad).unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(err.to_string().contains("llm.max_tokens"));
    }
}
