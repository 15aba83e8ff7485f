use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use verifai_common::api::search::{SerperRequest, SerperResponse};

use crate::retry::retry_async;
use crate::tools::registry::{parse_args, ToolHandler, ToolHandlerContext, INVALID_ARGUMENTS};
use crate::tools::truncation::truncate_search_results;

#[derive(Deserialize)]
struct Args {
    query: String,
    #[serde(default)]
    num_results: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
enum SerperError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unparseable response: {0}")]
    Parse(String),
}

impl SerperError {
    fn is_retryable(&self) -> bool {
        match self {
            SerperError::Http(_) => true,
            SerperError::Status { status, .. } => *status == 429 || *status >= 500,
            SerperError::Parse(_) => false,
        }
    }
}

async fn serper_search(
    ctx: &ToolHandlerContext,
    api_key: &str,
    request: &SerperRequest,
) -> Result<SerperResponse, SerperError> {
    let response = ctx
        .http
        .post(&ctx.search.endpoint)
        .header("X-API-KEY", api_key)
        .json(request)
        .send()
        .await
        .map_err(|e| SerperError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SerperError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| SerperError::Parse(e.to_string()))
}

pub fn handler() -> ToolHandler {
    Arc::new(|args: Value, ctx: Arc<ToolHandlerContext>| {
        Box::pin(async move {
            let args: Args = parse_args(args)?;

            let query = args.query.trim().to_string();
            if query.is_empty() {
                return Err(format!("{}: query must not be empty", INVALID_ARGUMENTS));
            }

            let api_key = ctx
                .credentials
                .serper_api_key
                .clone()
                .ok_or_else(|| "Web search unavailable: SERPER_API_KEY is not configured".to_string())?;

            let breaker = &ctx.breakers.search;
            if !breaker.allow() {
                return Err("Web search temporarily unavailable (circuit open); \
                            work with the information already gathered"
                    .to_string());
            }

            let num = args
                .num_results
                .unwrap_or(ctx.search.max_results)
                .clamp(1, ctx.search.max_results);
            let request = SerperRequest {
                q: query.clone(),
                num: Some(num),
            };

            ctx.counters.searches.fetch_add(1, Ordering::Relaxed);
            let response = retry_async(
                &ctx.retry,
                "serper",
                SerperError::is_retryable,
                || serper_search(&ctx, &api_key, &request),
            )
            .await;

            let response = match response {
                Ok(r) => {
                    breaker.record_success();
                    r
                }
                Err(e) => {
                    breaker.record_failure();
                    return Err(format!("Search {}", e));
                }
            };

            let hits = response.into_hits();
            let count = hits.len();
            let mut result = json!({
                "query": query,
                "results": hits,
                "count": count,
            });
            truncate_search_results(&mut result, &ctx.limits);
            Ok(result)
        })
    })
}
