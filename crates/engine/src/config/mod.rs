mod loader;
mod validation;

pub use loader::{load_config, ConfigError, EngineConfig};
pub use validation::validate;

/// Secrets read once from the process environment.
///
/// `.env` is loaded into the environment by the binary before this is built;
/// nothing here writes back to the environment.
#[derive(Clone, Default)]
pub struct Credentials {
    pub serper_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            serper_api_key: non_empty_var("SERPER_API_KEY"),
            gemini_api_key: non_empty_var("GEMINI_API_KEY"),
        }
    }

    /// The Serper key, or a configuration error naming the variable.
    pub fn require_serper(&self) -> Result<&str, ConfigError> {
        self.serper_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingCredential("SERPER_API_KEY".into()))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("serper_api_key", &self.serper_api_key.as_ref().map(|_| "<set>"))
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<set>"))
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials {
            serper_api_key: Some("super-secret".into()),
            gemini_api_key: None,
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<set>"));
    }

    #[test]
    fn test_require_serper_missing() {
        let err = Credentials::default().require_serper().unwrap_err();
        assert!(err.to_string().contains("SERPER_API_KEY"));
    }
}
