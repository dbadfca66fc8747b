//! Error types for the research pipeline.
//!
//! Each external boundary gets its own enum so callers can decide what is
//! transient (retry), what degrades a single report section, and what is fatal.

use std::path::PathBuf;

/// Errors from retrieving a single page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Errors from a search provider call. The gateway logs these per query and moves on.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("{provider} returned HTTP {status}")]
    Status { provider: String, status: u16 },

    #[error("{provider} response could not be parsed: {message}")]
    Parse { provider: String, message: String },
}

/// Errors from the language-model collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SynthesisError {
    #[error("LLM API key not configured")]
    NotConfigured,

    #[error("LLM request failed: {message}")]
    Connection { message: String },

    #[error("LLM rate limited")]
    RateLimited,

    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM service error (HTTP {status})")]
    Server { status: u16 },

    #[error("LLM request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("empty response from LLM")]
    Empty,

    #[error("malformed LLM response: {reason}")]
    Malformed {
        reason: String,
        raw_response: String,
    },
}

impl SynthesisError {
    /// Raw model output attached to parse failures, for diagnosis.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::Malformed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// Errors from the e-commerce listings capability.
#[derive(Debug, thiserror::Error)]
pub enum ListingsError {
    #[error("listing request failed: {0}")]
    Request(String),

    #[error("listing page returned HTTP {0}")]
    Status(u16),

    #[error("listing runtime unavailable: {0}")]
    Runtime(String),
}

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

/// Errors raised by the orchestrator and its stages.
///
/// Only `MissingSeed` and `SeedNotFound` abort a run; every other variant is
/// recorded into the report section it belongs to.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("a seed URL or at least one keyword is required")]
    MissingSeed,

    #[error("no website could be resolved from keywords: {keywords}")]
    SeedNotFound { keywords: String },

    #[error("invalid query: {0:?}")]
    InvalidQuery(String),

    #[error("invalid seed url {url}: {reason}")]
    InvalidSeed { url: String, reason: String },

    #[error("crawl of {seed} returned no pages")]
    EmptyCrawl { seed: String },

    #[error("no relevant documents found for {topic}")]
    NoEvidence { topic: String },

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("unexpected fault: {0}")]
    Panicked(String),

    #[error("failed to initialise {component}: {message}")]
    Setup {
        component: &'static str,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),
}

impl ResearchError {
    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingSeed | Self::SeedNotFound { .. })
    }
}
