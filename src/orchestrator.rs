//! The research pipeline.
//!
//! `resolve_seed -> crawl+profile -> news -> shopping -> competitors ->
//! comparison -> persist`. Every stage after seed resolution is isolated: its
//! failure lands in the report section it owns and the run moves on. The
//! report is persisted on every path, including the fatal one.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::analyst::AnalystEngine;
use crate::brain::{GeminiBrain, ResearchBrain};
use crate::config::ResearchConfig;
use crate::crawler::{harvest_socials, SiteCrawler};
use crate::discovery::SeedDiscovery;
use crate::error::ResearchError;
use crate::fetcher::{EvidenceFetcher, HttpFetcher, PageFetcher};
use crate::pricing::price_range;
use crate::progress::Progress;
use crate::quality::QualityGate;
use crate::report::{
    BrandProfile, CompetitorProfile, DataQuality, Failure, NewsAnalysis, Ontology, ResearchReport,
    ShoppingData, Stage, UNKNOWN,
};
use crate::reporter::Reporter;
use crate::scout::{MarketScout, ScoutSettings};
use crate::search::{DuckDuckGoProvider, ProviderGateway, Query, SearchProvider, TavilyProvider};
use crate::shopping::{brand_counts, BlockingListings, SsgListings};

/// Words requested per ontology list.
const ONTOLOGY_TERMS: usize = 20;

/// What to research.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    /// Official site URL. A bare brand name here is treated as the first keyword.
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub audience: String,
    /// Brand names tried in order when no seed URL is given.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Used when the ontology yields no competitor names.
    #[serde(default)]
    pub competitors: Vec<String>,
}

/// Outcome of a completed (non-fatal) run.
#[derive(Debug)]
pub struct ResearchRun {
    pub report: ResearchReport,
    /// `None` when persisting failed; the failure is logged and emitted.
    pub output_path: Option<PathBuf>,
}

/// External capabilities the pipeline talks to.
pub struct Collaborators {
    pub default_provider: Arc<dyn SearchProvider>,
    pub advanced_provider: Option<Arc<dyn SearchProvider>>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub brain: Arc<dyn ResearchBrain>,
    pub listings: Option<Arc<BlockingListings>>,
}

impl Collaborators {
    /// Production HTTP clients built from configuration.
    pub fn from_config(config: &ResearchConfig) -> Result<Self, ResearchError> {
        let search_timeout = Duration::from_secs(config.search.timeout_secs);

        let ddg = DuckDuckGoProvider::new(config.search.region.clone(), search_timeout)
            .map_err(|e| setup_error("duckduckgo", e))?;
        let tavily = TavilyProvider::new(
            config.search.tavily_api_key.clone(),
            search_timeout,
            config.llm.retry.clone(),
        )
        .map_err(|e| setup_error("tavily", e))?;
        let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch.timeout_secs))
            .map_err(|e| setup_error("fetcher", e))?;
        let brain = GeminiBrain::new(&config.llm).map_err(|e| setup_error("gemini", e))?;

        let listings = if config.shopping.enabled {
            let source = SsgListings::new(&config.shopping).map_err(|e| setup_error("listings", e))?;
            let blocking =
                BlockingListings::new(Arc::new(source)).map_err(|e| setup_error("listings", e))?;
            Some(Arc::new(blocking))
        } else {
            None
        };

        Ok(Self {
            default_provider: Arc::new(ddg),
            advanced_provider: Some(Arc::new(tavily)),
            fetcher: Arc::new(fetcher),
            brain: Arc::new(brain),
            listings,
        })
    }
}

pub struct ResearchOrchestrator {
    config: ResearchConfig,
    analyst: Arc<AnalystEngine>,
    discovery: SeedDiscovery,
    crawler: SiteCrawler,
    scout: MarketScout,
    listings: Option<Arc<BlockingListings>>,
}

impl ResearchOrchestrator {
    pub fn new(config: ResearchConfig, collaborators: Collaborators) -> Self {
        let gateway = Arc::new(ProviderGateway::new(
            collaborators.default_provider,
            collaborators.advanced_provider,
            Duration::from_millis(config.search.query_delay_ms),
        ));
        let evidence = EvidenceFetcher::new(
            Arc::clone(&collaborators.fetcher),
            QualityGate::new(config.fetch.min_evidence_chars),
        );
        let analyst = Arc::new(AnalystEngine::new(collaborators.brain));
        let discovery = SeedDiscovery::new(Arc::clone(&gateway), evidence.clone(), Arc::clone(&analyst));
        let crawler = SiteCrawler::new(
            collaborators.fetcher,
            config.crawl.fan_out,
            Duration::from_millis(config.crawl.delay_ms),
        );
        let scout = MarketScout::new(
            gateway,
            evidence,
            Arc::clone(&analyst),
            ScoutSettings {
                per_query_cap: config.search.per_query_cap,
                preferred: config.search.preferred_provider,
                min_keep_threshold: config.search.min_keep_threshold,
            },
        );

        Self {
            config,
            analyst,
            discovery,
            crawler,
            scout,
            listings: collaborators.listings,
        }
    }

    pub fn from_config(config: ResearchConfig) -> Result<Self, ResearchError> {
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::new(config, collaborators))
    }

    /// Run the whole pipeline.
    ///
    /// Returns `Err` only when seed resolution fails (no seed, no keyword that
    /// resolves to one, or a fault while resolving); the report is persisted
    /// before returning either way.
    pub fn run_research(
        &self,
        request: &ResearchRequest,
        progress: &Progress,
    ) -> Result<ResearchRun, ResearchError> {
        let mut report = ResearchReport::new();
        report.run_meta.industry = request.industry.clone();
        report.run_meta.audience = request.audience.clone();
        report.run_meta.started_at = Some(Utc::now());
        progress.emit(
            "stage:start",
            json!({"seed_url": request.seed, "industry": request.industry, "audience": request.audience}),
        );

        let seed = match catch_fault(|| self.resolve_seed(request, progress)) {
            Ok(seed) => seed,
            Err(e) => {
                tracing::error!(error = %e, "research aborted");
                progress.emit("pipeline:fatal_error", json!({"error": e.to_string()}));
                report.run_meta.fatal_error = Some(e.to_string());
                self.finish(&mut report, progress);
                return Err(e);
            }
        };

        let brand_hint = brand_hint_of(&seed);
        report.run_meta.seed_url = Some(seed.clone());
        report.run_meta.outdir = brand_hint.as_deref().map(|hint| {
            self.config.output_dir.join(hint).to_string_lossy().into_owned()
        });
        report.run_meta.brand_hint = brand_hint.clone();
        let brand_hint = brand_hint.unwrap_or_else(|| seed.clone());

        self.profile_stage(&mut report, &brand_hint, &seed, request, progress);
        let brand_name = report
            .brand_profile
            .value()
            .map(|p| p.brand.clone())
            .unwrap_or_else(|| brand_hint.clone());

        self.news_stage(&mut report, &brand_name, request, progress);
        self.shopping_stage(&mut report, progress);
        self.competitor_stage(&mut report, &brand_name, request, progress);

        let output_path = self.finish(&mut report, progress);
        Ok(ResearchRun {
            report,
            output_path,
        })
    }

    /// Seed URL from the request, or discovered from each keyword in turn.
    fn resolve_seed(&self, request: &ResearchRequest, progress: &Progress) -> Result<String, ResearchError> {
        let mut keywords: Vec<String> = Vec::new();
        if let Some(raw) = request.seed.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            match seed_url_from(raw) {
                Some(url) => return Ok(url),
                None => keywords.push(raw.to_string()),
            }
        }
        keywords.extend(
            request
                .keywords
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
        );
        if keywords.is_empty() {
            return Err(ResearchError::MissingSeed);
        }

        for keyword in &keywords {
            if let Some(url) = self.discovery.discover_seed_url(
                keyword,
                &request.industry,
                self.config.search.per_query_cap,
                self.config.search.preferred_provider,
                progress,
            ) {
                tracing::info!(keyword = %keyword, url = %url, "seed resolved from keyword");
                return Ok(url);
            }
            tracing::warn!(keyword = %keyword, "no site found for keyword");
        }
        Err(ResearchError::SeedNotFound {
            keywords: keywords.join(" "),
        })
    }

    /// Crawl one site and synthesize its profile.
    fn site_profile(
        &self,
        brand_hint: &str,
        seed: &str,
        industry: &str,
        audience: &str,
        max_pages: usize,
        progress: &Progress,
    ) -> Result<BrandProfile, ResearchError> {
        let pages = self.crawler.crawl(seed, industry, max_pages, progress)?;
        if pages.is_empty() {
            return Err(ResearchError::EmptyCrawl {
                seed: seed.to_string(),
            });
        }
        let mut profile = self
            .analyst
            .brand_profile_from_pages(brand_hint, &pages, industry, audience)?;
        profile.estimated_price_range = price_range(&pages);
        profile.social_profiles = harvest_socials(&pages);
        profile.site_url = Some(seed.to_string());
        Ok(profile)
    }

    fn profile_stage(
        &self,
        report: &mut ResearchReport,
        brand_hint: &str,
        seed: &str,
        request: &ResearchRequest,
        progress: &Progress,
    ) {
        let profile = isolate("profile", progress, || {
            self.site_profile(
                brand_hint,
                seed,
                &request.industry,
                &request.audience,
                self.config.crawl.max_pages,
                progress,
            )
        });

        match &profile {
            Ok(p) => {
                progress.emit("profile:done", json!({"brand": p.brand, "pages": p.pages_crawled}));
                let product = p.primary_product().unwrap_or("-").to_string();
                report.ontology = Stage::from_result(isolate("ontology", progress, || {
                    Ok(self
                        .analyst
                        .ontology_for(&request.industry, &request.audience, &product, ONTOLOGY_TERMS)?)
                }));
            }
            Err(_) => {
                report.ontology = Stage::Skipped("brand profile unavailable".to_string());
            }
        }
        report.brand_profile = Stage::from_result(profile);
    }

    fn news_stage(
        &self,
        report: &mut ResearchReport,
        brand_name: &str,
        request: &ResearchRequest,
        progress: &Progress,
    ) {
        let gathered = isolate("news", progress, || {
            Ok(self
                .scout
                .market_awareness(brand_name, &request.industry, &request.audience, progress))
        });
        match gathered {
            Ok((analysis, docs)) => {
                if let NewsAnalysis::Failed { error, .. } = &analysis {
                    progress.emit("news:error", json!({"error": error}));
                }
                report.news_analysis = analysis;
                report.raw_news_docs = docs;
            }
            Err(e) => report.news_analysis = NewsAnalysis::failed(e.to_string()),
        }
    }

    fn shopping_stage(&self, report: &mut ResearchReport, progress: &Progress) {
        if !self.config.shopping.enabled {
            report.shopping_data = Stage::Skipped("shopping enrichment disabled".to_string());
            return;
        }
        let Some(listings) = &self.listings else {
            report.shopping_data = Stage::Skipped("no listings source configured".to_string());
            return;
        };
        let Some(product) = report
            .brand_profile
            .value()
            .and_then(BrandProfile::primary_product)
            .map(str::to_string)
        else {
            report.shopping_data = Stage::Skipped("no product to search".to_string());
            return;
        };

        let top_n = self.config.shopping.top_n;
        let records = isolate("shopping", progress, || {
            Ok(listings.search_listings(&product, top_n, progress))
        });
        report.shopping_data = match records {
            Ok(records) => match records.iter().find_map(|r| r.error.clone()) {
                Some(error) if records.len() == 1 => {
                    progress.emit("shopping:error", json!({"error": error}));
                    Stage::Failed(Failure {
                        error,
                        raw_response: None,
                    })
                }
                _ => Stage::Done(ShoppingData {
                    product_name: product,
                    brand_counts: brand_counts(&records),
                    top_results: records,
                }),
            },
            Err(e) => Stage::from_result(Err(e)),
        };
    }

    fn competitor_stage(
        &self,
        report: &mut ResearchReport,
        brand_name: &str,
        request: &ResearchRequest,
        progress: &Progress,
    ) {
        let names = competitor_names(report.ontology.value(), &request.competitors);
        if names.is_empty() {
            progress.emit("competitor:skip", json!({"reason": "no competitor names available"}));
            report.comparison_table = Stage::Skipped("no competitor names available".to_string());
            return;
        }

        progress.emit("competitor:start_batch", json!({"count": names.len(), "names": names}));
        let profiles = self.competitor_batch(&names, request, progress);
        tracing::info!(attempted = names.len(), succeeded = profiles.len(), "competitor batch finished");
        report.competitor_profiles = profiles;

        if report.competitor_profiles.is_empty() {
            progress.emit("competitor:no_data", json!({"attempted": names.len(), "successful": 0}));
            report.comparison_table = Stage::Skipped(format!(
                "competitor data collection failed for all {} names",
                names.len()
            ));
            return;
        }

        let table = isolate("comparison", progress, || {
            let main = self.main_brand_row(report, brand_name, request, progress);
            Ok(self.analyst.generate_comparison_table(
                &main,
                &report.competitor_profiles,
                &request.industry,
                &request.audience,
            )?)
        });
        if table.is_ok() {
            progress.emit(
                "competitor:comparison_done",
                json!({"competitor_count": report.competitor_profiles.len()}),
            );
        }
        report.comparison_table = Stage::from_result(table);
    }

    /// One profile per name that did not fail, in name order.
    fn competitor_batch(
        &self,
        names: &[String],
        request: &ResearchRequest,
        progress: &Progress,
    ) -> Vec<CompetitorProfile> {
        let run_one = |name: &String| {
            let outcome = catch_fault(|| self.competitor_profile(name, request, progress));
            if let Err(e) = &outcome {
                tracing::warn!(competitor = %name, error = %e, "competitor skipped");
                progress.emit("competitor:individual_error", json!({"name": name, "error": e.to_string()}));
            }
            outcome.ok()
        };

        let workers = self.config.competitor_workers;
        if workers > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => {
                    return pool.install(|| {
                        names
                            .par_iter()
                            .map(&run_one)
                            .collect::<Vec<_>>()
                            .into_iter()
                            .flatten()
                            .collect()
                    })
                }
                Err(e) => tracing::warn!(error = %e, "worker pool unavailable, running competitors sequentially"),
            }
        }
        names.iter().filter_map(&run_one).collect()
    }

    /// Reduced pipeline for one competitor: site, awareness, consumer image.
    fn competitor_profile(
        &self,
        name: &str,
        request: &ResearchRequest,
        progress: &Progress,
    ) -> Result<CompetitorProfile, ResearchError> {
        let name = Query::new(name)
            .ok_or_else(|| ResearchError::InvalidQuery(name.to_string()))?
            .to_string();
        progress.emit("competitor:start", json!({"name": name}));
        let mut profile = CompetitorProfile::shell(&name);

        match self.discovery.discover_seed_url(
            &name,
            &request.industry,
            self.config.search.per_query_cap,
            self.config.search.preferred_provider,
            progress,
        ) {
            Some(url) => {
                progress.emit("competitor:url_found", json!({"name": name, "url": url}));
                match self.site_profile(
                    &name,
                    &url,
                    &request.industry,
                    &request.audience,
                    self.config.crawl.competitor_max_pages,
                    progress,
                ) {
                    Ok(site) => {
                        profile.apply_site_profile(&site);
                        profile.data_quality = DataQuality::Good;
                        progress.emit(
                            "competitor:site_analyzed",
                            json!({"name": name, "pages": site.pages_crawled}),
                        );
                    }
                    Err(e) => progress.emit(
                        "competitor:site_analysis_failed",
                        json!({"name": name, "error": e.to_string()}),
                    ),
                }
            }
            None => progress.emit("competitor:no_url", json!({"name": name})),
        }

        let (awareness, _) =
            self.scout
                .market_awareness(&name, &request.industry, &request.audience, progress);
        if let Some(headline) = awareness.headline() {
            profile.market_awareness = headline.to_string();
            profile.mark_enriched();
        }

        if let Some(image) =
            self.scout
                .consumer_image(&name, &request.industry, &request.audience, progress)
        {
            profile.consumer_image = image;
            profile.mark_enriched();
        }

        progress.emit(
            "competitor:done",
            json!({"name": name, "data_quality": profile.data_quality.as_str()}),
        );
        Ok(profile)
    }

    /// The main brand reshaped as a comparison row.
    fn main_brand_row(
        &self,
        report: &ResearchReport,
        brand_name: &str,
        request: &ResearchRequest,
        progress: &Progress,
    ) -> CompetitorProfile {
        let mut row = CompetitorProfile::shell(brand_name);
        if let Some(profile) = report.brand_profile.value() {
            row.apply_site_profile(profile);
            row.data_quality = DataQuality::Good;
        }
        if let Some(headline) = report.news_analysis.headline() {
            row.market_awareness = headline.to_string();
        }
        row.consumer_image = self
            .scout
            .consumer_image(brand_name, &request.industry, &request.audience, progress)
            .unwrap_or_else(|| UNKNOWN.to_string());
        row
    }

    /// Stamp, persist, announce. Persistence failure is reported, not raised.
    fn finish(&self, report: &mut ResearchReport, progress: &Progress) -> Option<PathBuf> {
        report.run_meta.finished_at = Some(Utc::now());
        match Reporter::persist_report(report, &self.config.output_dir) {
            Ok(path) => {
                progress.emit("stage:done", json!({"outdir": path.parent().map(|p| p.display().to_string())}));
                Some(path)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to persist report");
                progress.emit("persist:error", json!({"error": e.to_string()}));
                None
            }
        }
    }
}

/// Competitor names from the ontology when it has any, else the user list.
/// Duplicates (case-insensitive) are dropped; blank names are kept so the
/// batch reports them as skipped.
pub fn competitor_names(ontology: Option<&Ontology>, user: &[String]) -> Vec<String> {
    let source = match ontology {
        Some(o) if !o.competitor_corporate_and_brand_name.is_empty() => {
            &o.competitor_corporate_and_brand_name
        }
        _ => user,
    };
    let mut seen = std::collections::HashSet::new();
    source
        .iter()
        .filter(|name| name.trim().is_empty() || seen.insert(name.trim().to_lowercase()))
        .cloned()
        .collect()
}

/// A URL-shaped seed normalized to an absolute URL; `None` for bare names.
pub fn seed_url_from(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.chars().any(char::is_whitespace) {
        return None;
    }
    let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else if raw.contains('.') {
        format!("https://{raw}")
    } else {
        return None;
    };
    let url = Url::parse(&candidate).ok()?;
    url.host_str()?;
    Some(candidate.trim_end_matches('/').to_string())
}

/// First DNS label of the seed host, without `www.`.
pub fn brand_hint_of(seed: &str) -> Option<String> {
    let url = Url::parse(seed).ok()?;
    let host = url.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    host.split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}

fn setup_error(component: &'static str, err: impl std::fmt::Display) -> ResearchError {
    ResearchError::Setup {
        component,
        message: err.to_string(),
    }
}

/// Run a stage, turning a panic into [`ResearchError::Panicked`] and
/// reporting any failure as `<stage>:error`.
fn isolate<T>(
    stage: &str,
    progress: &Progress,
    f: impl FnOnce() -> Result<T, ResearchError>,
) -> Result<T, ResearchError> {
    let result = catch_fault(f);
    if let Err(e) = &result {
        tracing::warn!(stage, error = %e, "stage failed");
        progress.emit(&format!("{stage}:error"), json!({"error": e.to_string()}));
    }
    result
}

fn catch_fault<T>(f: impl FnOnce() -> Result<T, ResearchError>) -> Result<T, ResearchError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(ResearchError::Panicked(panic_message(payload))))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
