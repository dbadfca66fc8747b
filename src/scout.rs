// src/scout.rs
//! News and social evidence gathering for one brand.

use std::sync::Arc;

use serde_json::json;

use crate::analyst::AnalystEngine;
use crate::error::ResearchError;
use crate::fetcher::EvidenceFetcher;
use crate::progress::Progress;
use crate::report::{EvidenceDocument, NewsAnalysis};
use crate::search::gateway::SearchPlan;
use crate::search::{ProviderGateway, ProviderKind, Query, Recency, Topic};

/// Minimum kept results before the social batch tops up from the default provider.
const SOCIAL_MIN_KEEP: usize = 3;

/// Knobs shared by every scout batch of a run.
#[derive(Debug, Clone, Copy)]
pub struct ScoutSettings {
    pub per_query_cap: usize,
    pub preferred: ProviderKind,
    pub min_keep_threshold: usize,
}

pub struct MarketScout {
    gateway: Arc<ProviderGateway>,
    evidence: EvidenceFetcher,
    analyst: Arc<AnalystEngine>,
    settings: ScoutSettings,
}

impl MarketScout {
    pub fn new(
        gateway: Arc<ProviderGateway>,
        evidence: EvidenceFetcher,
        analyst: Arc<AnalystEngine>,
        settings: ScoutSettings,
    ) -> Self {
        Self {
            gateway,
            evidence,
            analyst,
            settings,
        }
    }

    /// Market awareness from the past year of news, plus the documents it was built on.
    pub fn market_awareness(
        &self,
        brand: &str,
        industry: &str,
        audience: &str,
        progress: &Progress,
    ) -> (NewsAnalysis, Vec<EvidenceDocument>) {
        progress.emit("news_agent:start", json!({"brand": brand}));
        let queries = Query::batch([
            format!("\"{brand}\" 시장 점유율 최신 뉴스"),
            format!("\"{brand}\" {industry} 산업 동향 네이버 뉴스"),
            format!("\"{brand}\" {audience} 타겟 분석 기사"),
        ]);
        let plan = SearchPlan::new(self.settings.preferred, queries)
            .cap(self.settings.per_query_cap)
            .min_keep(self.settings.min_keep_threshold)
            .recency(Recency::Year)
            .topic(Topic::News);

        let results = self.gateway.collect(&plan, progress);
        if results.is_empty() {
            let err = ResearchError::NoEvidence {
                topic: format!("{brand} news"),
            };
            tracing::warn!(brand, "no news results");
            return (NewsAnalysis::failed(err.to_string()), Vec::new());
        }

        let docs = self.evidence.fetch_all(&results);
        let usable = docs.iter().filter(|d| d.is_usable()).count();
        tracing::info!(brand, fetched = docs.len(), usable, "news evidence gathered");
        let analysis = self.analyst.summarize_and_extract_insights(
            &docs,
            &format!("{brand}의 시장 인지도"),
            industry,
            audience,
        );
        progress.emit(
            "news_agent:done",
            json!({"brand": brand, "documents": docs.len(), "insights": analysis.insights().len()}),
        );
        (analysis, docs)
    }

    /// One-line consumer image from social posts, or `None` when nothing usable came back.
    ///
    /// Always searches through the default provider: `site:` operators are
    /// only honoured there.
    pub fn consumer_image(
        &self,
        brand: &str,
        industry: &str,
        audience: &str,
        progress: &Progress,
    ) -> Option<String> {
        progress.emit("sns_agent:start", json!({"brand": brand}));
        let queries = Query::batch([
            format!("site:instagram.com {brand} 후기"),
            format!("site:x.com {brand} 반응"),
            format!("{brand} 소비자 인식"),
        ]);
        let plan = SearchPlan::new(ProviderKind::DuckDuckGo, queries)
            .cap(self.settings.per_query_cap)
            .min_keep(SOCIAL_MIN_KEEP);

        let results = self.gateway.collect(&plan, progress);
        if results.is_empty() {
            return None;
        }
        let docs = self.evidence.fetch_all(&results);
        let analysis = self.analyst.summarize_and_extract_insights(
            &docs,
            &format!("{brand}에 대한 소비자 이미지"),
            industry,
            audience,
        );
        analysis.headline().map(str::to_string)
    }
}
