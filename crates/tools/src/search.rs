//! Search backend seam and the Tavily HTTP implementation.
//!
//! `searchWeb` and `extractWebContent` talk to a [`SearchBackend`]; the
//! payload they return is opaque to the rest of the system apart from the
//! `url` fields the progress view counts as sources.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracefold_config::SearchConfig;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("search request failed: {0}")]
    Network(String),

    #[error("unreadable search response: {0}")]
    Decode(String),
}

// ── Requests ────────────────────────────────────────────────────────────

/// Serialized as-is into the backend request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u32,
    pub search_depth: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_answer: Option<bool>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_domains: Vec<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, max_results: u32, search_depth: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results,
            search_depth: search_depth.into(),
            topic: None,
            time_range: None,
            days: None,
            include_answer: None,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractRequest {
    pub urls: Vec<String>,
    pub extract_depth: String,
    pub format: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_images: Option<bool>,
}

// ── Responses ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    #[serde(default)]
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractResponse {
    #[serde(default)]
    pub results: Vec<ExtractedPage>,

    #[serde(default, alias = "failed_results")]
    pub failed: Vec<FailedExtraction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ExtractedPage {
    /// Best available text of the page.
    pub fn text(&self) -> &str {
        self.raw_content
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.content.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or("No content extracted")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedExtraction {
    pub url: String,
    #[serde(default)]
    pub error: String,
}

// ── Backend ─────────────────────────────────────────────────────────────

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError>;

    async fn extract(&self, request: &ExtractRequest) -> Result<ExtractResponse, SearchError>;
}

/// Tavily search API (`POST /search`, `POST /extract`).
pub struct TavilyBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl TavilyBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Backend for the configured key, if there is one.
    pub fn from_config(config: &SearchConfig) -> Option<Arc<dyn SearchBackend>> {
        let key = config.api_key.as_deref().filter(|k| !k.is_empty())?;
        Some(Arc::new(Self::new(&config.api_url, key)))
    }

    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R, SearchError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(%url, "Sending search backend request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "Search backend returned error");
            return Err(SearchError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SearchBackend for TavilyBackend {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        self.post("search", request).await
    }

    async fn extract(&self, request: &ExtractRequest) -> Result<ExtractResponse, SearchError> {
        self.post("extract", request).await
    }
}
