//! E-commerce listing snapshots.
//!
//! Listing sources are async; the pipeline is not. [`BlockingListings`] is the
//! synchronous façade: it owns a private runtime and parks the calling thread
//! until the whole scrape has finished. Never call it from inside an async
//! context.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::config::ShoppingConfig;
use crate::error::ListingsError;
use crate::fetcher::random_user_agent;
use crate::progress::Progress;

/// One product card from a listing page. Failed scrapes are a single record
/// with `error` set and everything else empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(default)]
    pub title: String,
    pub price: Option<u64>,
    pub brand: Option<String>,
    pub review_count: Option<u64>,
    #[serde(default)]
    pub url: String,
    pub image_url: Option<String>,
    pub rank: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProductRecord {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[async_trait]
pub trait ListingsSource: Send + Sync {
    fn name(&self) -> &str;

    async fn search_listings(
        &self,
        query: &str,
        top_n: usize,
    ) -> Result<Vec<ProductRecord>, ListingsError>;
}

/// Blocking façade over an async [`ListingsSource`].
pub struct BlockingListings {
    source: Arc<dyn ListingsSource>,
    runtime: tokio::runtime::Runtime,
}

impl BlockingListings {
    pub fn new(source: Arc<dyn ListingsSource>) -> Result<Self, ListingsError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ListingsError::Runtime(e.to_string()))?;
        Ok(Self { source, runtime })
    }

    /// Top `top_n` listings for `query`. A failure becomes one error record.
    pub fn search_listings(&self, query: &str, top_n: usize, progress: &Progress) -> Vec<ProductRecord> {
        progress.emit(
            "shopping_agent:start",
            json!({"target": self.source.name(), "product": query}),
        );
        let records = match self
            .runtime
            .block_on(self.source.search_listings(query, top_n))
        {
            Ok(mut records) => {
                records.truncate(top_n);
                records
            }
            Err(e) => {
                tracing::warn!(source = self.source.name(), query, error = %e, "listing scrape failed");
                progress.emit("shopping_agent:error", json!({"product": query, "error": e.to_string()}));
                vec![ProductRecord::failed(e.to_string())]
            }
        };
        progress.emit(
            "shopping_agent:done",
            json!({"product": query, "results_count": records.len()}),
        );
        records
    }
}

/// Listing count per brand, most frequent first, ties by name.
pub fn brand_counts(records: &[ProductRecord]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in records.iter().filter(|r| !r.is_error()) {
        if let Some(brand) = record.brand.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            *counts.entry(brand.to_string()).or_default() += 1;
        }
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

/// SSG.COM search results, fetched over HTTP and parsed from the card markup.
pub struct SsgListings {
    client: reqwest::Client,
    search_url: String,
}

impl SsgListings {
    pub fn new(config: &ShoppingConfig) -> Result<Self, ListingsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ListingsError::Request(e.to_string()))?;
        Ok(Self {
            client,
            search_url: config.search_url.clone(),
        })
    }
}

#[async_trait]
impl ListingsSource for SsgListings {
    fn name(&self) -> &str {
        "SSG.COM"
    }

    async fn search_listings(
        &self,
        query: &str,
        top_n: usize,
    ) -> Result<Vec<ProductRecord>, ListingsError> {
        let url = self
            .search_url
            .replace("{query}", &urlencoding::encode(query));
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .header(reqwest::header::ACCEPT_LANGUAGE, "ko-KR,ko;q=0.9")
            .send()
            .await
            .map_err(|e| ListingsError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ListingsError::Status(status.as_u16()));
        }
        let html = response
            .text()
            .await
            .map_err(|e| ListingsError::Request(e.to_string()))?;
        Ok(parse_listings(&html, &url, top_n))
    }
}

struct CardSelectors {
    card: Selector,
    link: Selector,
    title: Selector,
    title_fallback: Selector,
    price: Selector,
    brand: Selector,
    reviews: Selector,
    image: Selector,
}

fn card_selectors() -> &'static CardSelectors {
    static SELECTORS: OnceLock<CardSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let sel = |s: &str| Selector::parse(s).expect("valid listing selector");
        CardSelectors {
            card: sel("li.cunit_prod"),
            link: sel("a.cunit_prod_link"),
            title: sel(".cunit_info .cunit_tit .tx_ko"),
            title_fallback: sel(".cunit_info .cunit_tit"),
            price: sel(".cunit_price .ssg_price"),
            brand: sel(".cunit_info .cunit_brand"),
            reviews: sel(".cunit_app .rating_tx .tx_num"),
            image: sel(".cunit_prod_thumb img"),
        }
    })
}

fn text_of(card: ElementRef<'_>, selector: &Selector) -> String {
    card.select(selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

/// First integer in `text`, ignoring thousands separators.
fn parse_number(text: &str) -> Option<u64> {
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();
    let digits: String = cleaned
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Product cards from an SSG search page. Cards without a title, a price or
/// a link are dropped; duplicate links are kept once.
pub fn parse_listings(html: &str, page_url: &str, top_n: usize) -> Vec<ProductRecord> {
    let sel = card_selectors();
    let doc = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    let resolve = |href: &str| match &base {
        Some(base) => base.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for card in doc.select(&sel.card) {
        if out.len() >= top_n {
            break;
        }
        let Some(href) = card
            .select(&sel.link)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let url = resolve(href.trim());
        if !seen.insert(url.clone()) {
            continue;
        }

        let mut title = text_of(card, &sel.title);
        if title.is_empty() {
            title = text_of(card, &sel.title_fallback);
        }
        let price = parse_number(&text_of(card, &sel.price));
        if title.is_empty() || price.is_none() {
            continue;
        }

        let brand = Some(text_of(card, &sel.brand)).filter(|b| !b.is_empty());
        let review_count = parse_number(&text_of(card, &sel.reviews));
        let image_url = card.select(&sel.image).next().and_then(|img| {
            img.value()
                .attr("src")
                .or_else(|| img.value().attr("data-src"))
                .map(|src| resolve(src.trim()))
        });

        out.push(ProductRecord {
            title,
            price,
            brand,
            review_count,
            url,
            image_url,
            rank: Some(out.len() + 1),
            error: None,
        });
    }
    out
}
