use std::collections::HashMap;
use std::time::{Duration, Instant};

/// In-memory page cache with TTL-based expiration, keyed by requested URL.
///
/// Stores extracted text rather than raw HTML; repeated scrapes of the same
/// page within a run are common (crawler, analyst and assessor stages).
pub struct PageCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CachedPage {
    pub final_url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub text: String,
}

struct CacheEntry {
    page: CachedPage,
    inserted_at: Instant,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, url: &str) -> Option<CachedPage> {
        if let Some(entry) = self.entries.get(url) {
            if entry.inserted_at.elapsed() < self.ttl {
                metrics::counter!("fetch.cache.hit").increment(1);
                return Some(entry.page.clone());
            }
        }
        metrics::counter!("fetch.cache.miss").increment(1);
        None
    }

    /// Insert a page, evicting expired entries first.
    pub fn insert(&mut self, url: String, page: CachedPage) {
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);

        self.entries.insert(
            url,
            CacheEntry {
                page,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str) -> CachedPage {
        CachedPage {
            final_url: "https://news.example/story".into(),
            status_code: 200,
            content_type: Some("text/html".into()),
            text: text.into(),
        }
    }

    #[test]
    fn test_cache_hit_miss() {
        let mut cache = PageCache::new(Duration::from_secs(3600));
        assert!(cache.get("https://news.example/story").is_none());

        cache.insert("https://news.example/story".into(), page("body"));

        let hit = cache.get("https://news.example/story").unwrap();
        assert_eq!(hit.text, "body");
        assert_eq!(hit.status_code, 200);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_expiry_and_eviction() {
        let mut cache = PageCache::new(Duration::from_millis(1));
        cache.insert("https://a.example".into(), page("old"));

        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("https://a.example").is_none());

        cache.insert("https://b.example".into(), page("new"));
        assert_eq!(cache.len(), 1);
    }
}
