use super::types::{ChatOptions, Message};
use super::{LlmClient, LlmError};

const PROBE_SYSTEM: &str = "You are a connectivity probe. Answer in one word.";
const PROBE_USER: &str = "Reply with OK.";

/// Verify the configured backend is reachable and serves the configured model.
///
/// Ollama: the model must appear in `/api/tags`, then a one-line completion
/// must succeed. Gemini: a one-line completion must succeed (the key was
/// already required at client construction).
pub async fn check_backend(client: &LlmClient) -> Result<(), LlmError> {
    if client.provider() == "ollama" {
        let installed = client.list_models().await?;
        if !model_installed(client.model(), &installed) {
            return Err(LlmError::ModelNotFound(format!(
                "model '{}' is not installed (available: {}); run `ollama pull {}`",
                client.model(),
                if installed.is_empty() {
                    "none".to_string()
                } else {
                    installed.join(", ")
                },
                client.model()
            )));
        }
    }

    let probe = client
        .chat(
            PROBE_SYSTEM,
            &[Message::user_text(PROBE_USER)],
            &[],
            ChatOptions::default(),
        )
        .await?;

    tracing::info!(
        provider = client.provider(),
        model = client.model(),
        probe_tokens = probe.usage.output_tokens,
        "LLM backend healthy"
    );
    Ok(())
}

/// Tag-tolerant model match: an untagged name matches its `:latest` tag and
/// vice versa.
pub fn model_installed(configured: &str, installed: &[String]) -> bool {
    let wanted = normalize_tag(configured);
    installed.iter().any(|name| normalize_tag(name) == wanted)
}

fn normalize_tag(name: &str) -> String {
    let name = name.trim();
    if name.contains(':') {
        name.to_string()
    } else {
        format!("{}:latest", name)
    }
}
