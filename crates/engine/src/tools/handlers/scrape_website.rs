use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use super::fetch_with_breaker;
use crate::tools::registry::{parse_args, ToolHandler, ToolHandlerContext};
use crate::tools::truncation::truncate_page_text;

#[derive(Deserialize)]
struct Args {
    url: String,
}

pub fn handler() -> ToolHandler {
    Arc::new(|args: Value, ctx: Arc<ToolHandlerContext>| {
        Box::pin(async move {
            let args: Args = parse_args(args)?;
            let page = fetch_with_breaker(&ctx, &args.url).await?;

            let total_chars = page.text.chars().count();
            Ok(json!({
                "url": page.url,
                "status_code": page.status_code,
                "content_type": page.content_type,
                "cached": page.cached,
                "total_chars": total_chars,
                "content": truncate_page_text(&page.text, &ctx.limits),
            }))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerRegistry;
    use crate::config::Credentials;
    use crate::tools::registry::INVALID_ARGUMENTS;
    use crate::tools::test_support::context;

    #[tokio::test]
    async fn test_missing_url_is_malformed() {
        let ctx = context(Credentials::default(), Arc::new(CircuitBreakerRegistry::new()));
        let err = handler()(json!({}), ctx).await.unwrap_err();
        assert!(err.starts_with(INVALID_ARGUMENTS));
    }

    #[tokio::test]
    async fn test_non_http_url_rejected_without_tripping_circuit() {
        let breakers = Arc::new(CircuitBreakerRegistry::new());
        let ctx = context(Credentials::default(), Arc::clone(&breakers));
        for _ in 0..10 {
            let err = handler()(json!({"url": "file:///etc/passwd"}), Arc::clone(&ctx))
                .await
                .unwrap_err();
            assert!(err.contains("Invalid URL"));
        }
        assert!(breakers.fetch.allow());
    }
}
