use std::time::Duration;

use scraper::{Html, Selector};
use tokio::sync::Mutex;
use verifai_common::config::FetchConfig;

use super::cache::{CachedPage, PageCache};
use super::rate_limit::DomainRateLimiter;

/// Elements whose text never belongs to the readable body.
const REMOVED_ELEMENTS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "noscript", "svg", "form", "iframe",
];

/// A fetched page reduced to readable text.
#[derive(Clone, Debug)]
pub struct FetchedPage {
    pub url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub text: String,
    pub cached: bool,
}

/// Fetches pages for the scrape tools: URL checks, per-domain rate limiting,
/// a TTL cache, and HTML to text extraction.
pub struct PageFetcher {
    http: reqwest::Client,
    cache: Mutex<PageCache>,
    limiter: DomainRateLimiter,
    timeout: Duration,
}

impl PageFetcher {
    pub fn new(http: reqwest::Client, config: &FetchConfig) -> Self {
        Self {
            http,
            cache: Mutex::new(PageCache::new(Duration::from_secs(config.cache_ttl_seconds))),
            limiter: DomainRateLimiter::new(config.rate_limit_per_second),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = parse_http_url(url)?;
        let domain = parsed.host_str().unwrap_or("unknown").to_string();

        if let Some(hit) = self.cache.lock().await.get(url) {
            tracing::debug!(url = %url, "Page cache hit");
            return Ok(FetchedPage {
                url: hit.final_url,
                status_code: hit.status_code,
                content_type: hit.content_type,
                text: hit.text,
                cached: true,
            });
        }

        self.limiter
            .acquire(&domain, self.timeout)
            .await
            .map_err(|_| FetchError::RateLimited(domain.clone()))?;

        let start = std::time::Instant::now();
        let response = self
            .http
            .get(parsed)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(ct) = &content_type {
            if !is_textual(ct) {
                return Err(FetchError::UnsupportedContent(ct.clone()));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        metrics::histogram!("fetch.request.latency", "domain" => domain)
            .record(start.elapsed().as_secs_f64());

        let is_html = content_type
            .as_deref()
            .map(|ct| ct.contains("html"))
            .unwrap_or_else(|| body.trim_start().starts_with('<'));
        let text = if is_html {
            extract_html_content(&body)
        } else {
            collapse_whitespace(&body)
        };

        let page = CachedPage {
            final_url: final_url.clone(),
            status_code: status.as_u16(),
            content_type: content_type.clone(),
            text: text.clone(),
        };
        self.cache.lock().await.insert(url.to_string(), page);

        Ok(FetchedPage {
            url: final_url,
            status_code: status.as_u16(),
            content_type,
            text,
            cached: false,
        })
    }
}

fn parse_http_url(url: &str) -> Result<reqwest::Url, FetchError> {
    let parsed =
        reqwest::Url::parse(url.trim()).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(FetchError::InvalidUrl(format!(
            "{}: only absolute http(s) URLs can be fetched",
            url
        ))),
    }
}

fn is_textual(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.starts_with("text/") || ct.contains("html") || ct.contains("xml") || ct.contains("json")
}

/// Extract readable text from HTML, skipping boilerplate elements.
pub fn extract_html_content(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut skip_ids = std::collections::HashSet::new();
    for sel_str in REMOVED_ELEMENTS {
        if let Ok(selector) = Selector::parse(sel_str) {
            for element in document.select(&selector) {
                skip_ids.insert(element.id());
            }
        }
    }

    let mut text_parts = Vec::new();

    for node in document.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skipped = node.ancestors().any(|a| skip_ids.contains(&a.id()));
        if skipped {
            continue;
        }
        let trimmed = text.text.trim();
        if !trimmed.is_empty() {
            text_parts.push(trimmed.to_string());
        }
    }

    collapse_whitespace(&text_parts.join(" "))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Rate limit wait too long for domain: {0}")]
    RateLimited(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContent(String),
}

impl FetchError {
    /// Errors caused by the target rather than by our connectivity; they
    /// should not count against the fetch circuit.
    pub fn is_target_error(&self) -> bool {
        matches!(
            self,
            FetchError::InvalidUrl(_)
                | FetchError::Status { .. }
                | FetchError::UnsupportedContent(_)
        )
    }
}

impl From<FetchError> for verifai_common::VerifaiError {
    fn from(e: FetchError) -> Self {
        verifai_common::VerifaiError::Fetch(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_html_drops_boilerplate() {
        let html = r#"
            <html>
            <head><title>Fact check</title><style>p { color: red }</style></head>
            <body>
                <header>Site banner</header>
                <nav>Home | World | Politics</nav>
                <main>
                    <h1>Claim about ballots rated false</h1>
                    <p>Officials found no evidence of the alleged fraud.</p>
                    <p>Three audits   reached the same
                       conclusion.</p>
                </main>
                <footer>Copyright</footer>
                <script>trackVisitor();</script>
            </body>
            </html>
        "#;

        let text = extract_html_content(html);
        assert!(text.contains("Claim about ballots rated false"));
        assert!(text.contains("Three audits reached the same conclusion."));
        assert!(!text.contains("Site banner"));
        assert!(!text.contains("Home | World"));
        assert!(!text.contains("Copyright"));
        assert!(!text.contains("trackVisitor"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("hello   world"), "hello world");
        assert_eq!(collapse_whitespace("  hello\n\n  world  "), "hello world");
    }

    #[test]
    fn test_url_checks() {
        assert!(parse_http_url("https://news.example/a").is_ok());
        assert!(matches!(
            parse_http_url("ftp://files.example/a"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_http_url("not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_textual_content_types() {
        assert!(is_textual("text/html; charset=utf-8"));
        assert!(is_textual("application/xhtml+xml"));
        assert!(is_textual("application/json"));
        assert!(!is_textual("application/pdf"));
        assert!(!is_textual("image/png"));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_network() {
        let config = FetchConfig {
            user_agent: "test".into(),
            timeout_seconds: 1,
            cache_ttl_seconds: 60,
            rate_limit_per_second: 1.0,
        };
        let fetcher = PageFetcher::new(reqwest::Client::new(), &config);
        let err = fetcher.fetch("javascript:alert(1)").await.unwrap_err();
        assert!(err.is_target_error());
    }
}
