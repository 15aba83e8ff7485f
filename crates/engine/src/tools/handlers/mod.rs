mod scrape_website;
mod search_website;
mod web_search;

use std::sync::atomic::Ordering;

use super::fetch::FetchedPage;
use super::registry::{ToolHandlerContext, ToolRegistry};

/// Register the research tools shared by every tool-using stage.
pub fn register_research_tools(registry: &mut ToolRegistry) {
    registry.register("web_search", web_search::handler());
    registry.register("scrape_website", scrape_website::handler());
    registry.register("search_website", search_website::handler());
}

/// Fetch through the shared fetcher, guarded by the fetch circuit.
///
/// Target-side failures (bad URL, 404, PDFs) do not count against the circuit.
async fn fetch_with_breaker(ctx: &ToolHandlerContext, url: &str) -> Result<FetchedPage, String> {
    let breaker = &ctx.breakers.fetch;
    if !breaker.allow() {
        return Err("Page fetching temporarily unavailable (circuit open); \
                    rely on search snippets instead"
            .to_string());
    }

    match ctx.fetcher.fetch(url).await {
        Ok(page) => {
            breaker.record_success();
            if page.cached {
                ctx.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            } else {
                ctx.counters.pages_fetched.fetch_add(1, Ordering::Relaxed);
            }
            Ok(page)
        }
        Err(e) => {
            if !e.is_target_error() {
                breaker.record_failure();
            }
            Err(e.to_string())
        }
    }
}
