// src/llm/web_search.rs
// Web search is an out-of-scope external collaborator (design doc §1)
// used only by the Research specialist's `web_search`/`web_extract` tools
// (§4.3).

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct WebSearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct WebExtractResult {
    pub url: String,
    pub text: String,
}

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> CoreResult<Vec<WebSearchHit>>;
    async fn extract(&self, url: &str) -> CoreResult<WebExtractResult>;
}

#[derive(Debug, Deserialize)]
struct SearchResultEntry {
    title: String,
    url: String,
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResultEntry>,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    text: String,
}

pub struct HttpWebSearchProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl HttpWebSearchProvider {
    pub fn new(api_base: String, api_key: String) -> Self {
        Self { client: reqwest::Client::new(), api_base, api_key }
    }
}

#[async_trait]
impl WebSearchProvider for HttpWebSearchProvider {
    async fn search(&self, query: &str, top_k: usize) -> CoreResult<Vec<WebSearchHit>> {
        let response = self
            .client
            .get(format!("{}/search", self.api_base))
            .bearer_auth(&self.api_key)
            .query(&[("q", query), ("top_k", &top_k.to_string())])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::RateLimited { retry_after_secs: 30 });
        }
        if !response.status().is_success() {
            return Err(CoreError::UpstreamPermanent(format!("web search responded {}", response.status())));
        }

        let parsed: SearchResponse = response.json().await?;
        Ok(parsed
            .results
            .into_iter()
            .take(top_k)
            .map(|r| WebSearchHit { title: r.title, url: r.url, snippet: r.snippet })
            .collect())
    }

    async fn extract(&self, url: &str) -> CoreResult<WebExtractResult> {
        let response = self
            .client
            .get(format!("{}/extract", self.api_base))
            .bearer_auth(&self.api_key)
            .query(&[("url", url)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CoreError::UpstreamPermanent(format!("web extract responded {}", response.status())));
        }

        let parsed: ExtractResponse = response.json().await?;
        Ok(WebExtractResult { url: url.to_string(), text: parsed.text })
    }
}
