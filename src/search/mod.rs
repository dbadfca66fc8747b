//! Search provider abstraction.
//!
//! Two backends: DuckDuckGo's HTML endpoint (default, no credential) and
//! Tavily (advanced, credentialed). [`ProviderGateway`] batches queries
//! against them with dedupe and fallback.

pub mod duckduckgo;
pub mod gateway;
pub mod tavily;

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SearchError;

pub use duckduckgo::DuckDuckGoProvider;
pub use gateway::ProviderGateway;
pub use tavily::TavilyProvider;

/// Which backend a query batch should prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Default provider; needs no credential.
    #[serde(alias = "ddg")]
    DuckDuckGo,
    /// Advanced provider; needs an API key.
    Tavily,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DuckDuckGo => "ddg",
            Self::Tavily => "tavily",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ddg" | "duckduckgo" => Ok(Self::DuckDuckGo),
            "tavily" => Ok(Self::Tavily),
            other => Err(format!("unknown search provider: {other}")),
        }
    }
}

/// Provider-side recency filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recency {
    Day,
    Week,
    Month,
    Year,
}

impl Recency {
    /// DuckDuckGo `df` parameter value.
    pub fn ddg_code(&self) -> &'static str {
        match self {
            Self::Day => "d",
            Self::Week => "w",
            Self::Month => "m",
            Self::Year => "y",
        }
    }

    /// Tavily `time_range` value.
    pub fn tavily_range(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    #[default]
    General,
    News,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::News => "news",
        }
    }
}

/// A sanitized, non-empty search string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query(String);

impl Query {
    /// Collapse all whitespace runs (newlines included) to single spaces.
    /// Returns `None` when nothing is left.
    pub fn new(raw: &str) -> Option<Self> {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            None
        } else {
            Some(Self(collapsed))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build every non-empty query from raw strings, dropping blanks.
    pub fn batch<I, S>(raw: I) -> Vec<Query>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter().filter_map(|q| Query::new(q.as_ref())).collect()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One ranked web result. Identity is [`SearchResult::key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub source_domain: String,
    /// Provider-supplied excerpt, when the provider returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl SearchResult {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            title: title.into(),
            source_domain: domain_of(&url),
            url,
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        let snippet = snippet.into();
        if !snippet.trim().is_empty() {
            self.snippet = Some(snippet);
        }
        self
    }

    /// Dedupe key: the normalized URL.
    pub fn key(&self) -> String {
        normalize_url(&self.url)
    }
}

/// A search backend.
///
/// Implementations return `Ok(vec![])` rather than an error when they lack a
/// credential, so a misconfigured provider degrades to "no results".
pub trait SearchProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn search(
        &self,
        query: &Query,
        max_results: usize,
        recency: Option<Recency>,
        topic: Topic,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

/// Fragment dropped, host lower-cased, trailing slash removed from non-root paths.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            let path = url.path().to_string();
            if path.len() > 1 && path.ends_with('/') {
                url.set_path(path.trim_end_matches('/'));
            }
            let mut out = url.to_string();
            if url.path() == "/" && url.query().is_none() && out.ends_with('/') {
                out.pop();
            }
            out
        }
        Err(_) => trimmed.trim_end_matches('/').to_string(),
    }
}

/// Host of `raw`, or an empty string for unparseable input.
pub fn domain_of(raw: &str) -> String {
    Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}
