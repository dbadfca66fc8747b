//! DuckDuckGo HTML search: the default, credential-free provider.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::Client;
use scraper::{Html, Selector};

use super::{Query, Recency, SearchProvider, SearchResult, Topic, ProviderKind};
use crate::error::SearchError;
use crate::fetcher::random_user_agent;

const ENDPOINT: &str = "https://html.duckduckgo.com/html/";

pub struct DuckDuckGoProvider {
    client: Client,
    region: String,
}

impl DuckDuckGoProvider {
    pub fn new(region: impl Into<String>, timeout: Duration) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Request {
                provider: ProviderKind::DuckDuckGo.to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            region: region.into(),
        })
    }
}

impl SearchProvider for DuckDuckGoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DuckDuckGo
    }

    fn search(
        &self,
        query: &Query,
        max_results: usize,
        recency: Option<Recency>,
        _topic: Topic,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let provider = self.kind().to_string();
        let mut form = vec![("q", query.as_str()), ("kl", self.region.as_str())];
        if let Some(recency) = recency {
            form.push(("df", recency.ddg_code()));
        }

        let response = self
            .client
            .post(ENDPOINT)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .header(reqwest::header::ACCEPT, "text/html")
            .form(&form)
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

        let body = response.text().map_err(|e| SearchError::Parse {
            provider,
            message: e.to_string(),
        })?;
        Ok(parse_results(&body, max_results))
    }
}

struct ResultSelectors {
    block: Selector,
    link: Selector,
    snippet: Selector,
}

fn selectors() -> &'static ResultSelectors {
    static SELECTORS: OnceLock<ResultSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| ResultSelectors {
        block: Selector::parse(".result").expect("valid result selector"),
        link: Selector::parse("a.result__a").expect("valid result link selector"),
        snippet: Selector::parse(".result__snippet").expect("valid snippet selector"),
    })
}

/// Pull `(title, url, snippet)` triples out of the HTML result page.
pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let doc = Html::parse_document(html);
    let sel = selectors();

    let mut results = Vec::new();
    for block in doc.select(&sel.block) {
        if results.len() >= max_results {
            break;
        }
        let Some(link) = block.select(&sel.link).next() else {
            continue;
        };
        let title = link.text().collect::<String>().trim().to_string();
        let href = link.value().attr("href").unwrap_or_default();
        let url = unwrap_redirect(href);
        if title.is_empty() || !url.starts_with("http") {
            continue;
        }
        let snippet = block
            .select(&sel.snippet)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        results.push(SearchResult::new(title, url).with_snippet(snippet));
    }
    results
}

/// Result links come wrapped as `//duckduckgo.com/l/?uddg=<encoded>&rut=...`.
fn unwrap_redirect(href: &str) -> String {
    if let Some(pos) = href.find("uddg=") {
        let start = pos + "uddg=".len();
        let end = href[start..]
            .find('&')
            .map(|i| start + i)
            .unwrap_or(href.len());
        if let Ok(decoded) = urlencoding::decode(&href[start..end]) {
            return decoded.into_owned();
        }
    }
    href.to_string()
}
