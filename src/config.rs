//! Runtime configuration for a research run.
//!
//! Uses `figment` for layered configuration: defaults -> `brandscope.toml` ->
//! `BRANDSCOPE_*` environment -> explicit overrides. The resulting
//! [`ResearchConfig`] is handed to every constructor; nothing reads the
//! environment after load.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::search::ProviderKind;

pub const DEFAULT_CONFIG_FILE: &str = "brandscope.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub search: SearchConfig,
    pub fetch: FetchConfig,
    pub crawl: CrawlConfig,
    pub llm: LlmConfig,
    pub shopping: ShoppingConfig,
    /// Reports land in `<output_dir>/<brand_hint>/`.
    pub output_dir: PathBuf,
    /// Competitor pipelines run on this many workers; 1 keeps the batch sequential.
    pub competitor_workers: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            fetch: FetchConfig::default(),
            crawl: CrawlConfig::default(),
            llm: LlmConfig::default(),
            shopping: ShoppingConfig::default(),
            output_dir: PathBuf::from("out"),
            competitor_workers: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub preferred_provider: ProviderKind,
    /// Results kept per query.
    pub per_query_cap: usize,
    /// Below this many results the advanced provider falls back to the default one.
    pub min_keep_threshold: usize,
    /// Pause between consecutive queries against one provider.
    pub query_delay_ms: u64,
    pub region: String,
    pub timeout_secs: u64,
    pub tavily_api_key: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            preferred_provider: ProviderKind::Tavily,
            per_query_cap: 5,
            min_keep_threshold: 3,
            query_delay_ms: 100,
            region: "kr-kr".to_string(),
            timeout_secs: 15,
            tavily_api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub min_evidence_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 25,
            min_evidence_chars: crate::quality::MIN_DOCUMENT_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub max_pages: usize,
    pub competitor_max_pages: usize,
    /// Links enqueued per visited page.
    pub fan_out: usize,
    pub delay_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: 30,
            competitor_max_pages: 10,
            fan_out: 10,
            delay_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash-lite".to_string(),
            temperature: 0.1,
            max_output_tokens: 2048,
            timeout_secs: 60,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShoppingConfig {
    pub enabled: bool,
    pub top_n: usize,
    /// Listing search URL; `{query}` is replaced with the encoded product name.
    pub search_url: String,
    pub timeout_secs: u64,
}

impl Default for ShoppingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_n: 10,
            search_url: "https://www.ssg.com/search.ssg?target=all&query={query}".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ResearchConfig {
    /// Fill unset credentials from the conventional `GEMINI_API_KEY` /
    /// `TAVILY_API_KEY` variables.
    pub fn with_env_credentials(mut self) -> Self {
        if self.llm.api_key.as_deref().map_or(true, str::is_empty) {
            self.llm.api_key = non_empty_env("GEMINI_API_KEY");
        }
        if self.search.tavily_api_key.as_deref().map_or(true, str::is_empty) {
            self.search.tavily_api_key = non_empty_env("TAVILY_API_KEY");
        }
        self
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`BRANDSCOPE_SEARCH__PER_QUERY_CAP`, ...)
/// 2. The explicit config file, or `brandscope.toml` in the working directory
/// 3. Built-in defaults
///
/// An explicitly named file must exist; the implicit one is optional.
pub fn load_config(path: Option<&Path>) -> Result<ResearchConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ResearchConfig::default()));

    match path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            let local = Path::new(DEFAULT_CONFIG_FILE);
            if local.exists() {
                figment = figment.merge(Toml::file(local));
            }
        }
    }

    figment = figment.merge(Env::prefixed("BRANDSCOPE_").split("__"));

    let config: ResearchConfig = figment.extract().map_err(Box::new)?;
    Ok(config.with_env_credentials())
}
