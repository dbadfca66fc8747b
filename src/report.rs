//! The research report and the entities it aggregates.
//!
//! Every section that depends on network or model I/O has an explicit failed
//! shape, so a report is always complete and serializable no matter which
//! stage broke.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, SynthesisError};
use crate::pricing::PriceRange;
use crate::shopping::ProductRecord;

/// Sentinel for competitor fields that no stage could fill.
pub const UNKNOWN: &str = "unknown";

/// Fetched-and-cleaned text from one URL. `content` is empty whenever `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceDocument {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvidenceDocument {
    pub fn ok(url: impl Into<String>, title: Option<String>, content: String) -> Self {
        Self {
            url: url.into(),
            title,
            content,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, title: Option<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title,
            content: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.error.is_none() && !self.content.is_empty()
    }
}

/// One visited page of a crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlPage {
    pub url: String,
    pub text: String,
    #[serde(skip)]
    pub raw_html: String,
    /// Price mentions found in `text`.
    #[serde(default)]
    pub prices: Vec<u64>,
}

/// A first-found social account link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialProfile {
    pub url: String,
    pub handle: String,
}

/// Identity of one research subject, synthesized from its crawled pages.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BrandProfile {
    pub brand: String,
    #[serde(default)]
    pub products_services: Vec<String>,
    #[serde(default)]
    pub key_messages: Vec<String>,
    #[serde(default)]
    pub audience_clues: Vec<String>,
    #[serde(default)]
    pub estimated_price_range: Option<PriceRange>,
    #[serde(default)]
    pub social_profiles: BTreeMap<String, SocialProfile>,
    #[serde(default)]
    pub site_url: Option<String>,
    #[serde(default)]
    pub pages_crawled: usize,
}

impl BrandProfile {
    pub fn primary_product(&self) -> Option<&str> {
        self.products_services
            .iter()
            .map(|p| p.trim())
            .find(|p| !p.is_empty())
    }

    pub fn price_label(&self) -> String {
        self.estimated_price_range
            .as_ref()
            .map(PriceRange::label)
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

/// How many optional enrichment stages succeeded for a competitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    #[default]
    Minimal,
    Partial,
    Good,
}

impl DataQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Partial => "partial",
            Self::Good => "good",
        }
    }
}

/// Reduced profile used for competitors and for the comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorProfile {
    pub brand: String,
    pub brand_position: String,
    pub price_range: String,
    pub key_products: Vec<String>,
    pub key_features: String,
    pub market_awareness: String,
    pub consumer_image: String,
    #[serde(default)]
    pub site_url: Option<String>,
    pub data_quality: DataQuality,
}

impl CompetitorProfile {
    /// The default shell: every field at its sentinel.
    pub fn shell(name: &str) -> Self {
        Self {
            brand: name.to_string(),
            brand_position: UNKNOWN.to_string(),
            price_range: UNKNOWN.to_string(),
            key_products: vec!["-".to_string()],
            key_features: UNKNOWN.to_string(),
            market_awareness: UNKNOWN.to_string(),
            consumer_image: UNKNOWN.to_string(),
            site_url: None,
            data_quality: DataQuality::Minimal,
        }
    }

    /// Overlay site-derived fields from a synthesized profile.
    pub fn apply_site_profile(&mut self, profile: &BrandProfile) {
        if !profile.brand.trim().is_empty() {
            self.brand = profile.brand.clone();
        }
        if let Some(first) = profile.key_messages.first() {
            self.brand_position = first.clone();
        }
        if let Some(last) = profile.key_messages.last() {
            self.key_features = last.clone();
        }
        if !profile.products_services.is_empty() {
            self.key_products = profile.products_services.clone();
        }
        self.price_range = profile.price_label();
        self.site_url = profile.site_url.clone();
    }

    /// Raise the quality tag after an optional enrichment succeeded.
    pub fn mark_enriched(&mut self) {
        if self.data_quality == DataQuality::Minimal {
            self.data_quality = DataQuality::Partial;
        }
    }
}

/// One claim backed by a quote from a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub insight: String,
    #[serde(default)]
    pub quote: String,
    #[serde(default)]
    pub source_url: String,
}

/// Result of news/sentiment insight extraction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NewsAnalysis {
    #[default]
    Pending,
    Insights {
        insights: Vec<Insight>,
        #[serde(default)]
        summary_bullets: Vec<String>,
    },
    /// Evidence fell below the aggregate quality gate.
    InsufficientData {
        message: String,
        /// Always exactly one sentinel entry.
        insights: Vec<Insight>,
        collected_sources: Vec<String>,
    },
    Failed {
        error: String,
        insights: Vec<Insight>,
    },
}

impl NewsAnalysis {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
            insights: Vec::new(),
        }
    }

    pub fn insights(&self) -> &[Insight] {
        match self {
            Self::Pending => &[],
            Self::Insights { insights, .. }
            | Self::InsufficientData { insights, .. }
            | Self::Failed { insights, .. } => insights,
        }
    }

    /// First real insight text; sentinel and error shapes yield `None`.
    pub fn headline(&self) -> Option<&str> {
        match self {
            Self::Insights {
                insights,
                summary_bullets,
            } => insights
                .iter()
                .map(|i| i.insight.as_str())
                .chain(summary_bullets.iter().map(String::as_str))
                .find(|s| !s.trim().is_empty()),
            _ => None,
        }
    }
}

/// Topic vocabulary for the research subject.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Ontology {
    pub vocab: Vec<String>,
    pub synonyms: Vec<String>,
    pub entities: Vec<String>,
    pub questions: Vec<String>,
    pub competitor_corporate_and_brand_name: Vec<String>,
}

/// E-commerce listing snapshot for the primary product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingData {
    pub product_name: String,
    pub top_results: Vec<ProductRecord>,
    /// Listing count per brand, most frequent first.
    pub brand_counts: Vec<(String, usize)>,
}

/// Why a section has no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl From<&ResearchError> for Failure {
    fn from(err: &ResearchError) -> Self {
        let raw_response = match err {
            ResearchError::Synthesis(e) => e.raw_response().map(str::to_string),
            _ => None,
        };
        Self {
            error: err.to_string(),
            raw_response,
        }
    }
}

impl From<&SynthesisError> for Failure {
    fn from(err: &SynthesisError) -> Self {
        Self {
            error: err.to_string(),
            raw_response: err.raw_response().map(str::to_string),
        }
    }
}

/// Outcome of one pipeline stage, embedded in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Stage<T> {
    Pending,
    Done(T),
    Skipped(String),
    Failed(Failure),
}

impl<T> Default for Stage<T> {
    fn default() -> Self {
        Self::Pending
    }
}

impl<T> Stage<T> {
    pub fn from_result(result: Result<T, ResearchError>) -> Self {
        match result {
            Ok(value) => Self::Done(value),
            Err(e) => Self::Failed(Failure::from(&e)),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Done(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done(_) => "done",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunMeta {
    pub brand_hint: Option<String>,
    pub outdir: Option<String>,
    pub seed_url: Option<String>,
    pub industry: String,
    pub audience: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set when the run aborted on the fatal precondition.
    pub fatal_error: Option<String>,
}

/// Root aggregate of one run. Starts with every section pending.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResearchReport {
    pub brand_profile: Stage<BrandProfile>,
    pub ontology: Stage<Ontology>,
    pub news_analysis: NewsAnalysis,
    pub raw_news_docs: Vec<EvidenceDocument>,
    pub shopping_data: Stage<ShoppingData>,
    pub competitor_profiles: Vec<CompetitorProfile>,
    pub comparison_table: Stage<String>,
    pub run_meta: RunMeta,
}

impl ResearchReport {
    pub fn new() -> Self {
        Self::default()
    }
}
