//! Reddit post intake: fetch a post through its public JSON view and derive
//! an analysis query from the words it uses most.

use std::collections::HashMap;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use verifai_common::VerifaiError;

const REDDIT_HOSTS: &[&str] = &["reddit.com", "www.reddit.com", "old.reddit.com", "redd.it"];

/// Words too common to say anything about a post.
const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "and", "any", "are", "aren",
    "because", "been", "before", "being", "below", "between", "both", "but", "can", "could",
    "did", "didn", "does", "doesn", "doing", "don", "down", "during", "each", "even", "few",
    "for", "from", "further", "get", "got", "had", "has", "have", "having", "her", "here",
    "hers", "him", "his", "how", "into", "isn", "its", "itself", "just", "like", "more", "most",
    "much", "not", "now", "off", "once", "one", "only", "other", "our", "ours", "out", "over",
    "own", "people", "really", "same", "she", "should", "some", "such", "than", "that", "the",
    "their", "theirs", "them", "then", "there", "these", "they", "thing", "think", "this",
    "those", "through", "too", "under", "until", "very", "was", "wasn", "way", "were", "what",
    "when", "where", "which", "while", "who", "whom", "why", "will", "with", "won", "would",
    "yes", "you", "your", "yours", "deleted", "removed", "http", "https", "www", "com",
];

#[derive(Debug, thiserror::Error)]
pub enum RedditError {
    #[error("Not a Reddit post URL: {0}")]
    InvalidUrl(String),

    #[error("Reddit request failed: {0}")]
    Http(String),

    #[error("Reddit returned HTTP {status}")]
    Status { status: u16 },

    #[error("Unexpected Reddit response: {0}")]
    Parse(String),
}

impl From<RedditError> for VerifaiError {
    fn from(e: RedditError) -> Self {
        match e {
            RedditError::InvalidUrl(_) => VerifaiError::Validation(e.to_string()),
            other => VerifaiError::Fetch(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RedditPost {
    pub title: String,
    pub subreddit: String,
    pub author: String,
    pub score: i64,
    pub upvote_ratio: f64,
    pub num_comments: u64,
    pub selftext: String,
    /// Top-level comment bodies, in listing order.
    pub comments: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Keyword {
    pub text: String,
    pub frequency: u32,
}

/// Whether `input` is an http(s) link to a Reddit post or short link.
pub fn is_reddit_url(input: &str) -> bool {
    let Ok(url) = Url::parse(input.trim()) else {
        return false;
    };
    matches!(url.scheme(), "http" | "https")
        && url
            .host_str()
            .is_some_and(|h| REDDIT_HOSTS.contains(&h.to_lowercase().as_str()))
        && !url.path().trim_matches('/').is_empty()
}

/// The `.json` listing URL for a post link.
pub fn json_url(input: &str) -> Result<Url, RedditError> {
    if !is_reddit_url(input) {
        return Err(RedditError::InvalidUrl(input.to_string()));
    }
    let url = Url::parse(input.trim()).map_err(|e| RedditError::InvalidUrl(e.to_string()))?;
    let path = url.path().trim_end_matches('/');

    let listing = if url.host_str() == Some("redd.it") {
        format!("https://www.reddit.com/comments{}.json", path)
    } else if path.ends_with(".json") {
        format!("https://www.reddit.com{}", path)
    } else {
        format!("https://www.reddit.com{}.json", path)
    };
    Url::parse(&listing).map_err(|e| RedditError::InvalidUrl(e.to_string()))
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Deserialize)]
struct Thing {
    kind: String,
    data: Value,
}

fn str_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Decode the two-listing response Reddit serves for a post.
pub fn parse_post(body: &Value) -> Result<RedditPost, RedditError> {
    let listings: Vec<Listing> =
        serde_json::from_value(body.clone()).map_err(|e| RedditError::Parse(e.to_string()))?;
    let mut listings = listings.into_iter();

    let post = listings
        .next()
        .and_then(|l| l.data.children.into_iter().find(|t| t.kind == "t3"))
        .ok_or_else(|| RedditError::Parse("no post in listing".to_string()))?
        .data;

    let comments = listings
        .next()
        .map(|l| {
            l.data
                .children
                .into_iter()
                .filter(|t| t.kind == "t1")
                .map(|t| str_field(&t.data, "body"))
                .filter(|b| !b.trim().is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(RedditPost {
        title: str_field(&post, "title"),
        subreddit: str_field(&post, "subreddit"),
        author: str_field(&post, "author"),
        score: post.get("score").and_then(Value::as_i64).unwrap_or(0),
        upvote_ratio: post.get("upvote_ratio").and_then(Value::as_f64).unwrap_or(0.0),
        num_comments: post.get("num_comments").and_then(Value::as_u64).unwrap_or(0),
        selftext: str_field(&post, "selftext"),
        comments,
    })
}

/// Fetch a post and its top-level comments.
pub async fn fetch_post(http: &reqwest::Client, url: &str) -> Result<RedditPost, RedditError> {
    let listing_url = json_url(url)?;
    tracing::info!(url = %listing_url, "Fetching Reddit post");

    let response = http
        .get(listing_url)
        .query(&[("raw_json", "1")])
        .send()
        .await
        .map_err(|e| RedditError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RedditError::Status {
            status: status.as_u16(),
        });
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| RedditError::Parse(e.to_string()))?;
    let post = parse_post(&body)?;

    tracing::info!(
        subreddit = %post.subreddit,
        comments = post.comments.len(),
        "Reddit post fetched"
    );
    Ok(post)
}

fn count_words(text: &str, weight: u32, counts: &mut HashMap<String, u32>) {
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.chars().count() < 3
            || word.chars().all(|c| c.is_ascii_digit())
            || STOPWORDS.contains(&word.as_str())
        {
            continue;
        }
        *counts.entry(word).or_insert(0) += weight;
    }
}

/// Most frequent content words of a post; title words count double.
///
/// Ties are broken alphabetically.
pub fn extract_keywords(post: &RedditPost, limit: usize) -> Vec<Keyword> {
    let mut counts = HashMap::new();
    count_words(&post.title, 2, &mut counts);
    count_words(&post.selftext, 1, &mut counts);
    for comment in &post.comments {
        count_words(comment, 1, &mut counts);
    }

    let mut keywords: Vec<Keyword> = counts
        .into_iter()
        .map(|(text, frequency)| Keyword { text, frequency })
        .collect();
    keywords.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.text.cmp(&b.text)));
    keywords.truncate(limit);
    keywords
}

/// Analysis query built from the top five keywords.
pub fn query_from_keywords(keywords: &[Keyword]) -> String {
    let top: Vec<&str> = keywords.iter().take(5).map(|k| k.text.as_str()).collect();
    format!("News analysis for: {}", top.join(", "))
}
