//! In-memory collaborators for pipeline tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use brandscope_core::brain::ResearchBrain;
use brandscope_core::config::ResearchConfig;
use brandscope_core::error::{FetchError, ListingsError, SearchError, SynthesisError};
use brandscope_core::fetcher::{FetchedPage, PageFetcher};
use brandscope_core::orchestrator::Collaborators;
use brandscope_core::search::{normalize_url, ProviderKind, Query, Recency, SearchProvider, SearchResult, Topic};
use brandscope_core::shopping::{BlockingListings, ListingsSource, ProductRecord};

/// Answers every query containing a registered needle; anything else gets nothing.
#[derive(Default)]
pub struct FakeProvider {
    rules: Vec<(String, Vec<SearchResult>)>,
    panic_on: Option<String>,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, results: Vec<SearchResult>) -> Self {
        self.rules.push((needle.to_string(), results));
        self
    }

    pub fn panic_on(mut self, needle: &str) -> Self {
        self.panic_on = Some(needle.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SearchProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DuckDuckGo
    }

    fn search(
        &self,
        query: &Query,
        max_results: usize,
        _recency: Option<Recency>,
        _topic: Topic,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(needle) = &self.panic_on {
            if query.as_str().contains(needle.as_str()) {
                panic!("provider blew up on {needle}");
            }
        }
        Ok(self
            .rules
            .iter()
            .filter(|(needle, _)| query.as_str().contains(needle.as_str()))
            .flat_map(|(_, results)| results.iter().cloned())
            .take(max_results)
            .collect())
    }
}

/// Serves canned HTML by normalized URL; unknown URLs are 404s.
#[derive(Default)]
pub struct SiteFetcher {
    pages: HashMap<String, String>,
    fetched: std::sync::Mutex<Vec<String>>,
}

impl SiteFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(normalize_url(url), html.into());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl PageFetcher for SiteFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(url.to_string());
        }
        match self.pages.get(&normalize_url(url)) {
            Some(html) => Ok(FetchedPage {
                url: url.to_string(),
                html: html.clone(),
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Picks a canned answer by the first marker the prompt contains.
pub struct KeywordBrain {
    configured: bool,
    answers: Vec<(String, String)>,
    prompts: std::sync::Mutex<Vec<String>>,
}

impl KeywordBrain {
    pub fn new() -> Self {
        Self {
            configured: true,
            answers: Vec::new(),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn answer(mut self, marker: &str, reply: impl Into<String>) -> Self {
        self.answers.push((marker.to_string(), reply.into()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl ResearchBrain for KeywordBrain {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn complete_text(&self, prompt: &str) -> Result<String, SynthesisError> {
        if !self.configured {
            return Err(SynthesisError::NotConfigured);
        }
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.answers
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
            .map(|(_, reply)| reply.clone())
            .ok_or(SynthesisError::Empty)
    }
}

pub struct FakeListings {
    pub records: Result<Vec<ProductRecord>, String>,
    pub queries: std::sync::Mutex<HashSet<String>>,
}

impl FakeListings {
    pub fn ok(records: Vec<ProductRecord>) -> Self {
        Self {
            records: Ok(records),
            queries: std::sync::Mutex::new(HashSet::new()),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            records: Err(error.to_string()),
            queries: std::sync::Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl ListingsSource for FakeListings {
    fn name(&self) -> &str {
        "fake"
    }

    async fn search_listings(&self, query: &str, top_n: usize) -> Result<Vec<ProductRecord>, ListingsError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.insert(query.to_string());
        }
        match &self.records {
            Ok(records) => Ok(records.iter().take(top_n).cloned().collect()),
            Err(e) => Err(ListingsError::Request(e.clone())),
        }
    }
}

pub fn listing(title: &str, brand: &str, price: u64, rank: usize) -> ProductRecord {
    ProductRecord {
        title: title.to_string(),
        price: Some(price),
        brand: Some(brand.to_string()),
        url: format!("https://shop.example/item/{rank}"),
        rank: Some(rank),
        ..ProductRecord::default()
    }
}

/// Fast, quiet configuration writing into `out`.
pub fn test_config(out: &Path) -> ResearchConfig {
    let mut config = ResearchConfig::default();
    config.output_dir = out.to_path_buf();
    config.search.query_delay_ms = 0;
    config.search.preferred_provider = ProviderKind::DuckDuckGo;
    config.crawl.delay_ms = 0;
    config
}

pub fn collaborators(
    provider: Arc<FakeProvider>,
    fetcher: Arc<SiteFetcher>,
    brain: Arc<KeywordBrain>,
    listings: Option<Arc<dyn ListingsSource>>,
) -> Collaborators {
    Collaborators {
        default_provider: provider,
        advanced_provider: None,
        fetcher,
        brain,
        listings: listings
            .map(|source| BlockingListings::new(source).map(Arc::new))
            .transpose()
            .expect("listing runtime"),
    }
}

/// A page body comfortably above the per-document floor.
pub fn article_html(title: &str, sentence: &str, repeat: usize) -> String {
    format!(
        "<html><head><title>{title}</title></head><body><nav>메뉴</nav><article><h1>{title}</h1><p>{}</p></article></body></html>",
        vec![sentence; repeat].join(" ")
    )
}
