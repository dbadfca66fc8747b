//! Batch search with URL dedupe and provider fallback.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::json;

use super::{ProviderKind, Query, Recency, SearchProvider, SearchResult, Topic};
use crate::progress::Progress;

/// Parameters of one gateway collection.
#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub preferred: ProviderKind,
    pub queries: Vec<Query>,
    pub per_query_cap: usize,
    /// When the advanced provider yields fewer results, the default provider tops up.
    pub min_keep_threshold: usize,
    pub recency: Option<Recency>,
    pub topic: Topic,
}

impl SearchPlan {
    pub fn new(preferred: ProviderKind, queries: Vec<Query>) -> Self {
        Self {
            preferred,
            queries,
            per_query_cap: 5,
            min_keep_threshold: 3,
            recency: None,
            topic: Topic::General,
        }
    }

    pub fn cap(mut self, per_query_cap: usize) -> Self {
        self.per_query_cap = per_query_cap;
        self
    }

    pub fn min_keep(mut self, min_keep_threshold: usize) -> Self {
        self.min_keep_threshold = min_keep_threshold;
        self
    }

    pub fn recency(mut self, recency: Recency) -> Self {
        self.recency = Some(recency);
        self
    }

    pub fn topic(mut self, topic: Topic) -> Self {
        self.topic = topic;
        self
    }
}

pub struct ProviderGateway {
    default: Arc<dyn SearchProvider>,
    advanced: Option<Arc<dyn SearchProvider>>,
    query_delay: Duration,
}

impl ProviderGateway {
    pub fn new(
        default: Arc<dyn SearchProvider>,
        advanced: Option<Arc<dyn SearchProvider>>,
        query_delay: Duration,
    ) -> Self {
        Self {
            default,
            advanced,
            query_delay,
        }
    }

    /// Run the plan's queries and return unique results.
    ///
    /// Never fails: failing queries are reported on `progress` and skipped, so
    /// the worst case is an empty list.
    pub fn collect(&self, plan: &SearchPlan, progress: &Progress) -> Vec<SearchResult> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        match (plan.preferred, &self.advanced) {
            (ProviderKind::Tavily, Some(advanced)) => {
                self.run_batch(advanced.as_ref(), plan, &mut seen, &mut results, progress);
                if results.len() < plan.min_keep_threshold {
                    progress.emit(
                        "provider:fallback",
                        json!({
                            "from": advanced.kind().name(),
                            "to": self.default.kind().name(),
                            "kept": results.len(),
                            "min_keep_threshold": plan.min_keep_threshold,
                        }),
                    );
                    self.run_batch(self.default.as_ref(), plan, &mut seen, &mut results, progress);
                }
            }
            _ => {
                self.run_batch(self.default.as_ref(), plan, &mut seen, &mut results, progress);
            }
        }

        tracing::debug!(
            preferred = %plan.preferred,
            queries = plan.queries.len(),
            results = results.len(),
            "search batch collected"
        );
        results
    }

    fn run_batch(
        &self,
        provider: &dyn SearchProvider,
        plan: &SearchPlan,
        seen: &mut HashSet<String>,
        out: &mut Vec<SearchResult>,
        progress: &Progress,
    ) {
        let name = provider.kind().name();
        for (i, query) in plan.queries.iter().enumerate() {
            if i > 0 && !self.query_delay.is_zero() {
                thread::sleep(self.query_delay);
            }
            progress.emit(
                &format!("{name}:query"),
                json!({"query": query.as_str(), "topic": plan.topic.as_str()}),
            );
            match provider.search(query, plan.per_query_cap, plan.recency, plan.topic) {
                Ok(found) => {
                    for result in found.into_iter().take(plan.per_query_cap) {
                        if seen.insert(result.key()) {
                            out.push(result);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(provider = name, query = %query, error = %e, "search query failed");
                    progress.emit(
                        &format!("{name}:error"),
                        json!({"query": query.as_str(), "error": e.to_string()}),
                    );
                }
            }
        }
    }
}
