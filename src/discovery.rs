//! Brand name to official-site URL.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::json;
use url::Url;

use crate::analyst::AnalystEngine;
use crate::fetcher::EvidenceFetcher;
use crate::progress::Progress;
use crate::search::gateway::SearchPlan;
use crate::search::{ProviderGateway, ProviderKind, Query, SearchResult};

/// Host fragments of sites that are never a brand's own homepage.
pub const NON_OFFICIAL_FRAGMENTS: &[&str] = &[
    "news", "recruit", "blog", "community", "wiki", "gov", "go.kr", "instagram", "facebook",
    "youtube",
];

const DISCOVERY_CAP: usize = 10;
const DISCOVERY_MIN_KEEP: usize = 5;
const VERIFY_TOP: usize = 3;

/// A search result annotated with its heuristic score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub result: SearchResult,
    pub score: f64,
}

fn brand_token_regex() -> &'static Regex {
    static TOKENS: OnceLock<Regex> = OnceLock::new();
    TOKENS.get_or_init(|| Regex::new(r"[a-zA-Z가-힣0-9]+").expect("valid brand token regex"))
}

/// Alphanumeric and Hangul runs of the brand name, lower-cased.
pub fn brand_tokens(brand: &str) -> Vec<String> {
    brand_token_regex()
        .find_iter(brand)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// How much `result` looks like the brand's official site.
pub fn score_candidate(result: &SearchResult, brand: &str) -> f64 {
    let url = result.url.to_lowercase();
    let title = result.title.to_lowercase();
    let parsed = Url::parse(&url).ok();
    let domain = parsed
        .as_ref()
        .and_then(|u| u.host_str())
        .unwrap_or_default()
        .replace("www.", "");

    let mut score = 0.0;
    if NON_OFFICIAL_FRAGMENTS.iter().any(|f| domain.contains(f)) {
        score -= 5.0;
    }
    if brand_tokens(brand).iter().any(|t| domain.contains(t.as_str())) {
        score += 5.0;
    }
    if title.contains("공식") || title.contains("official") {
        score += 2.0;
    }

    let depth = parsed
        .as_ref()
        .map(|u| u.path().split('/').filter(|s| !s.is_empty()).count())
        .unwrap_or(0);
    if depth <= 1 {
        score += 1.0;
    } else {
        score -= 0.5 * depth as f64;
    }
    score
}

/// Score every result and sort descending. Ties keep discovery order.
pub fn rank_candidates(results: Vec<SearchResult>, brand: &str) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = results
        .into_iter()
        .map(|result| {
            let score = score_candidate(&result, brand);
            ScoredCandidate { result, score }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

pub struct SeedDiscovery {
    gateway: Arc<ProviderGateway>,
    evidence: EvidenceFetcher,
    analyst: Arc<AnalystEngine>,
}

impl SeedDiscovery {
    pub fn new(
        gateway: Arc<ProviderGateway>,
        evidence: EvidenceFetcher,
        analyst: Arc<AnalystEngine>,
    ) -> Self {
        Self {
            gateway,
            evidence,
            analyst,
        }
    }

    /// Resolve `brand` to a verified homepage URL.
    ///
    /// The top three non-negative candidates are fetched and verified in
    /// order; the first verified one wins. Failing that, the best candidate
    /// is returned only if its score is strictly positive.
    pub fn discover_seed_url(
        &self,
        brand: &str,
        industry: &str,
        per_query_cap: usize,
        preferred: ProviderKind,
        progress: &Progress,
    ) -> Option<String> {
        progress.emit("discover:start", json!({"brand_name": brand}));
        let brand = brand.trim();
        if brand.is_empty() {
            progress.emit("discover:fail", json!({"reason": "empty brand name"}));
            return None;
        }

        let queries = Query::batch([
            format!("{brand} 공식 홈페이지 {industry}"),
            format!("{brand} 공식 사이트"),
            format!("{brand} 브랜드"),
        ]);
        let plan = SearchPlan::new(preferred, queries)
            .cap(per_query_cap.max(DISCOVERY_CAP))
            .min_keep(DISCOVERY_MIN_KEEP);
        let results = self.gateway.collect(&plan, progress);
        if results.is_empty() {
            progress.emit("discover:fail", json!({"reason": "no search results"}));
            return None;
        }

        let ranked = rank_candidates(results, brand);
        for candidate in ranked.iter().take(VERIFY_TOP) {
            if candidate.score < 0.0 {
                continue;
            }
            let url = &candidate.result.url;
            progress.emit(
                "discover:verify",
                json!({"candidate_url": url, "score": candidate.score}),
            );
            let doc = self.evidence.fetch_url(url, None);
            if doc.is_usable() && self.analyst.verify_official_site(&doc.content, brand) {
                tracing::info!(brand, url = %url, "official site verified");
                progress.emit(
                    "discover:done",
                    json!({"brand_name": brand, "found_url": url, "source": "verified"}),
                );
                return Some(url.clone());
            }
        }

        progress.emit("discover:fail", json!({"reason": "no candidate passed verification"}));
        match ranked.first() {
            Some(best) if best.score > 0.0 => {
                tracing::info!(brand, url = %best.result.url, score = best.score, "using best unverified candidate");
                progress.emit("discover:fallback", json!({"fallback_url": best.result.url}));
                Some(best.result.url.clone())
            }
            _ => None,
        }
    }
}
