use thiserror::Error;

/// Top-level error type for verifai operations.
#[derive(Debug, Error)]
pub enum VerifaiError {
    // --- Configuration errors (pipeline never starts) ---
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM API error: {0}")]
    LlmApi(String),

    // --- Soft dependency errors (agents adapt) ---
    #[error("Search error: {0}")]
    Search(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    // --- Operational errors ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Circuit breaker open for {0}")]
    CircuitOpen(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl VerifaiError {
    /// Whether this error means the pipeline must not be started at all.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Whether this error is from a soft dependency (the agent can work around it).
    pub fn is_soft_dependency(&self) -> bool {
        matches!(self, Self::Search(_) | Self::Fetch(_))
    }
}

/// Result type alias for verifai operations.
pub type Result<T> = std::result::Result<T, VerifaiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(VerifaiError::Config("missing key".into()).is_configuration());
        assert!(!VerifaiError::LlmApi("boom".into()).is_configuration());
        assert!(VerifaiError::Search("serper down".into()).is_soft_dependency());
        assert!(VerifaiError::Fetch("403".into()).is_soft_dependency());
        assert!(!VerifaiError::Timeout("budget".into()).is_soft_dependency());
    }

    #[test]
    fn test_serde_error_converts() {
        let err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let converted: VerifaiError = err.into();
        assert!(converted.to_string().starts_with("Serialization error"));
    }
}
