use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use super::fetch_with_breaker;
use crate::tools::passages::top_passages;
use crate::tools::registry::{parse_args, ToolHandler, ToolHandlerContext, INVALID_ARGUMENTS};

#[derive(Deserialize)]
struct Args {
    url: String,
    query: String,
}

pub fn handler() -> ToolHandler {
    Arc::new(|args: Value, ctx: Arc<ToolHandlerContext>| {
        Box::pin(async move {
            let args: Args = parse_args(args)?;
            if args.query.trim().is_empty() {
                return Err(format!("{}: query must not be empty", INVALID_ARGUMENTS));
            }

            let page = fetch_with_breaker(&ctx, &args.url).await?;
            let passages = top_passages(&page.text, &args.query, ctx.limits.max_passages as usize);

            let note = if passages.is_empty() {
                Some("No passage on this page mentions the query terms.")
            } else {
                None
            };

            Ok(json!({
                "url": page.url,
                "query": args.query,
                "cached": page.cached,
                "passages": passages,
                "note": note,
            }))
        })
    })
}
