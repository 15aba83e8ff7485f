use serde::{Deserialize, Serialize};

/// POST request body for a Serper search (`/search` or `/news`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerperRequest {
    pub q: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num: Option<usize>,
}

/// Serper search response. Only the sections the research tools read are modelled.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SerperResponse {
    #[serde(default)]
    pub organic: Vec<SerperOrganicResult>,
    #[serde(default)]
    pub news: Vec<SerperNewsResult>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerperOrganicResult {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerperNewsResult {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A search hit normalised across the organic and news sections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SerperResponse {
    /// News results first (they carry dates and outlet names), then organic
    /// results whose link was not already seen.
    pub fn into_hits(self) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .news
            .into_iter()
            .map(|n| SearchHit {
                url: n.link,
                title: n.title,
                snippet: n.snippet,
                date: n.date,
                source: n.source,
            })
            .collect();

        for o in self.organic {
            if hits.iter().any(|h| h.url == o.link) {
                continue;
            }
            hits.push(SearchHit {
                url: o.link,
                title: o.title,
                snippet: o.snippet,
                date: o.date,
                source: None,
            });
        }

        hits
    }
}
