//! Tavily Search API: the advanced, credentialed provider.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{ProviderKind, Query, Recency, SearchProvider, SearchResult, Topic};
use crate::error::SearchError;
use crate::retry::{RetryPolicy, Retryable};

const ENDPOINT: &str = "https://api.tavily.com/search";

impl Retryable for SearchError {
    fn is_retryable(&self) -> bool {
        match self {
            SearchError::Request { .. } => true,
            SearchError::Status { status, .. } => *status == 429 || *status >= 500,
            SearchError::Parse { .. } => false,
        }
    }
}

pub struct TavilyProvider {
    api_key: Option<String>,
    client: Client,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct TavilySearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_range: Option<&'a str>,
}

#[derive(Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilyProvider {
    pub fn new(
        api_key: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Request {
                provider: ProviderKind::Tavily.to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
            retry,
        })
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn search_once(
        &self,
        api_key: &str,
        request: &TavilySearchRequest<'_>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let provider = self.kind().to_string();
        let response = self
            .client
            .post(ENDPOINT)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .map_err(|e| SearchError::Request {
                provider: provider.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                provider,
                status: status.as_u16(),
            });
        }

        let body: TavilySearchResponse = response.json().map_err(|e| SearchError::Parse {
            provider,
            message: e.to_string(),
        })?;

        Ok(body
            .results
            .into_iter()
            .filter(|r| !r.url.trim().is_empty())
            .map(|r| SearchResult::new(r.title, r.url).with_snippet(r.content))
            .collect())
    }
}

impl SearchProvider for TavilyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tavily
    }

    fn search(
        &self,
        query: &Query,
        max_results: usize,
        recency: Option<Recency>,
        topic: Topic,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(query = %query, "Tavily API key not configured, returning no results");
            return Ok(Vec::new());
        };

        let request = TavilySearchRequest {
            query: query.as_str(),
            max_results,
            search_depth: "advanced",
            topic: topic.as_str(),
            time_range: recency.map(|r| r.tavily_range()),
        };

        let mut results = self
            .retry
            .run("tavily.search", || self.search_once(api_key, &request))?;
        results.truncate(max_results);
        Ok(results)
    }
}
