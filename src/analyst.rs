// src/analyst.rs
//! Prompt construction and schema-checked parsing for every synthesis step.
//!
//! The analyst never hands back half-parsed model output: each step returns
//! either its typed value or a [`SynthesisError`] carrying the raw answer.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::brain::ResearchBrain;
use crate::error::SynthesisError;
use crate::quality::{total_chars, QualityGate};
use crate::report::{BrandProfile, CompetitorProfile, CrawlPage, EvidenceDocument, Insight, NewsAnalysis, Ontology};

/// Text of the single entry an `InsufficientData` analysis carries.
pub const INSUFFICIENT_INSIGHT: &str = "데이터 부족으로 분석 불가";

const PROFILE_PAGES: usize = 10;
const PROFILE_PAGE_CHARS: usize = 1000;
const VERIFY_CHARS: usize = 2500;
const INSIGHT_DOCS: usize = 20;
const INSIGHT_DOC_CHARS: usize = 500;

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Deserialize a model object into `T`, keeping the raw JSON on mismatch.
fn decode<T: DeserializeOwned>(value: Value) -> Result<T, SynthesisError> {
    if let Some(reason) = value.get("error").and_then(Value::as_str) {
        return Err(SynthesisError::Malformed {
            reason: reason.to_string(),
            raw_response: value.to_string(),
        });
    }
    let raw = value.to_string();
    serde_json::from_value(value).map_err(|e| SynthesisError::Malformed {
        reason: format!("response does not match schema: {e}"),
        raw_response: raw,
    })
}

#[derive(Deserialize)]
struct SiteProfileDraft {
    #[serde(default)]
    brand: String,
    #[serde(default)]
    products_services: Vec<String>,
    #[serde(default)]
    key_messages: Vec<String>,
    #[serde(default)]
    audience_clues: Vec<String>,
}

#[derive(Deserialize)]
struct InsightDraft {
    #[serde(default)]
    insights: Vec<Insight>,
    #[serde(default)]
    summary_bullets: Vec<String>,
}

#[derive(Deserialize)]
struct Verdict {
    #[serde(default)]
    is_official: Option<bool>,
    #[serde(default)]
    reason: String,
}

pub struct AnalystEngine {
    brain: Arc<dyn ResearchBrain>,
}

impl AnalystEngine {
    pub fn new(brain: Arc<dyn ResearchBrain>) -> Self {
        Self { brain }
    }

    pub fn is_configured(&self) -> bool {
        self.brain.is_configured()
    }

    /// Brand identity from up to ten crawled pages.
    pub fn brand_profile_from_pages(
        &self,
        brand_hint: &str,
        pages: &[CrawlPage],
        industry: &str,
        audience: &str,
    ) -> Result<BrandProfile, SynthesisError> {
        let context = pages
            .iter()
            .take(PROFILE_PAGES)
            .map(|p| format!("URL: {}\nTEXT: {}", p.url, clip(&p.text, PROFILE_PAGE_CHARS)))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "역할: 당신은 주어진 웹사이트 콘텐츠를 분석하여 브랜드의 정체성을 파악하는 전문 브랜드 분석가입니다.\n\n\
             [분석 정보]\n\
             - 분석 대상 브랜드 힌트: '{brand_hint}'\n\
             - 산업: '{industry}'\n\
             - 타겟 고객: '{audience}'\n\n\
             [작업 지시]\n\
             아래 '입력 콘텐츠'를 바탕으로 브랜드의 핵심 정체성을 추출하여, 지정된 JSON 형식으로만 답변해주세요.\n\n\
             [입력 콘텐츠]\n{context}\n\n\
             [출력 JSON 형식]\n\
             {{\n  \"brand\": \"감지된 최종 브랜드 이름\",\n  \"products_services\": [\"주요 제품 및 서비스\"],\n  \
             \"key_messages\": [\"핵심 마케팅 메시지 또는 슬로건\"],\n  \"audience_clues\": [\"타겟 고객에 대한 단서\"]\n}}"
        );

        let draft: SiteProfileDraft = decode(self.brain.complete_json(&prompt)?)?;
        let brand = if draft.brand.trim().is_empty() {
            brand_hint.to_string()
        } else {
            draft.brand.trim().to_string()
        };
        Ok(BrandProfile {
            brand,
            products_services: draft.products_services,
            key_messages: draft.key_messages,
            audience_clues: draft.audience_clues,
            pages_crawled: pages.len(),
            ..BrandProfile::default()
        })
    }

    /// Whether `content` reads like the official site of `brand`.
    ///
    /// Only an explicit `"is_official": true` verifies. Without a model
    /// credential every candidate is accepted and the heuristic score decides.
    pub fn verify_official_site(&self, content: &str, brand: &str) -> bool {
        if !self.brain.is_configured() {
            return true;
        }
        let prompt = format!(
            "[CONTEXT]\n{}\n\n[TASK]\n\
             Analyze the CONTEXT provided above. Does it seem to be from the official homepage for the brand '{brand}'?\n\
             Consider elements like copyright notices, official product listings, company information, etc.\n\
             Respond in JSON format with two keys: \"is_official\" (boolean) and \"reason\" (a brief explanation in Korean).",
            clip(content, VERIFY_CHARS)
        );
        match self.brain.complete_json(&prompt).and_then(decode::<Verdict>) {
            Ok(verdict) => {
                tracing::debug!(brand, official = ?verdict.is_official, reason = %verdict.reason, "site verification");
                verdict.is_official == Some(true)
            }
            Err(e) => {
                tracing::warn!(brand, error = %e, "site verification failed");
                false
            }
        }
    }

    /// Quote-backed insights about `topic` from gathered evidence.
    ///
    /// Below the aggregate floor this short-circuits to `InsufficientData`
    /// without calling the model.
    pub fn summarize_and_extract_insights(
        &self,
        docs: &[EvidenceDocument],
        topic: &str,
        industry: &str,
        audience: &str,
    ) -> NewsAnalysis {
        let gate = QualityGate::aggregate();
        let total = total_chars(docs.iter().map(|d| d.content.as_str()));
        if !gate.accept_all(docs.iter().map(|d| d.content.as_str())) {
            return NewsAnalysis::InsufficientData {
                message: format!(
                    "분석에 필요한 최소한의 데이터({}자)를 수집하지 못했습니다. (현재 {total}자)",
                    gate.min_chars()
                ),
                insights: vec![Insight {
                    insight: INSUFFICIENT_INSIGHT.to_string(),
                    quote: "수집된 문서의 양이 너무 적어 유의미한 인사이트를 도출할 수 없습니다.".to_string(),
                    source_url: String::new(),
                }],
                collected_sources: docs.iter().map(|d| d.url.clone()).collect(),
            };
        }

        let mut context = String::new();
        for (i, doc) in docs.iter().filter(|d| d.is_usable()).take(INSIGHT_DOCS).enumerate() {
            context.push_str(&format!(
                "[문서 {}] (URL: {})\n- 제목: {}\n- 내용: {}\n\n",
                i + 1,
                doc.url,
                doc.title.as_deref().unwrap_or_default(),
                clip(&doc.content, INSIGHT_DOC_CHARS)
            ));
        }

        let prompt = format!(
            "역할: 당신은 사실 기반(Fact-based) 분석가입니다. 주어진 여러 문서에서 주장을 뒷받침하는 '정확한 인용구'를 찾아내는 것이 당신의 핵심 임무입니다.\n\n\
             [분석 정보]\n- 조사 주제: {topic}\n- 산업: {industry}\n- 타겟 고객: {audience}\n\n\
             [입력 자료]\n{context}\n\
             [작업 지시]\n\
             입력 자료를 바탕으로, {topic}에 대한 중요한 인사이트를 2~3개 추출하세요.\n\
             각 인사이트는 반드시 입력 자료에 나온 정확한 문장(인용구)과 해당 문장의 출처 URL을 근거로 제시해야 합니다.\n\n\
             [출력 JSON 형식]\n\
             {{\n  \"insights\": [\n    {{\"insight\": \"인사이트 요약\", \"quote\": \"원문 문장\", \"source_url\": \"출처 URL\"}}\n  ],\n  \
             \"summary_bullets\": [\"한 줄 요약\"]\n}}"
        );

        match self
            .brain
            .complete_json(&prompt)
            .and_then(decode::<InsightDraft>)
        {
            Ok(draft) => NewsAnalysis::Insights {
                insights: draft.insights,
                summary_bullets: draft.summary_bullets,
            },
            Err(e) => {
                tracing::warn!(topic, error = %e, "insight extraction failed");
                NewsAnalysis::failed(e.to_string())
            }
        }
    }

    /// Markdown comparison table: one column per brand, main brand first.
    pub fn generate_comparison_table(
        &self,
        main: &CompetitorProfile,
        competitors: &[CompetitorProfile],
        industry: &str,
        audience: &str,
    ) -> Result<String, SynthesisError> {
        let all: Vec<&CompetitorProfile> = std::iter::once(main).chain(competitors).collect();
        let profiles = serde_json::to_string_pretty(&all).map_err(|e| SynthesisError::Malformed {
            reason: format!("profiles not serializable: {e}"),
            raw_response: String::new(),
        })?;

        let prompt = format!(
            "역할: 당신은 전문 시장 분석가입니다. 주어진 여러 브랜드의 구조화된 프로필 데이터를 바탕으로 최종 비교 분석표를 Markdown 형식으로 작성합니다.\n\
             - 산업: {industry}\n- 타겟 고객: {audience}\n\n\
             [분석 대상 프로필 데이터 (JSON)]\n{profiles}\n\n\
             [작업 지시]\n\
             - 브랜드 포지션: 'brand_position' 값을 사용하세요.\n\
             - 가격대: 'price_range' 값을 사용하세요.\n\
             - 주요 제품군: 'key_products' 리스트를 보기 좋게 요약하세요.\n\
             - 주요 기능/USP: 'key_features' 값을 사용하세요.\n\
             - 시장 인지도: 'market_awareness' 값을 간결하게 요약하세요.\n\
             - 소비자 이미지: 'consumer_image' 값을 간결하게 요약하세요.\n\
             - 표의 첫 번째 열은 반드시 '구분'이어야 하고, 각 브랜드는 열을 차지해야 합니다."
        );

        let table = self.brain.complete_text(&prompt)?;
        if table.trim().is_empty() {
            return Err(SynthesisError::Empty);
        }
        Ok(table)
    }

    /// Topic vocabulary and competitor names for the product category.
    pub fn ontology_for(
        &self,
        industry: &str,
        audience: &str,
        product_industry: &str,
        per_key: usize,
    ) -> Result<Ontology, SynthesisError> {
        let prompt = format!(
            "역할: 당신은 '{industry}' 산업의 전문 온톨로지 설계자입니다.\n\
             타겟 고객: '{audience}'\n핵심 제품군: '{product_industry}'\n\
             [작업 지시]\n위 정보를 바탕으로, 아래 각 항목에 대해 연관성이 높은 한국어 단어를 추출해주세요.\n\
             - 'competitor_corporate_and_brand_name' 항목에는 '{product_industry}' 제품군 내의 주요 경쟁사 브랜드 이름을 5~7개 추출해주세요.\n\
             - 나머지 항목은 {per_key}개씩 추출해주세요.\n\
             [출력 JSON 형식]\n\
             {{\n  \"vocab\": [\"업계 전문 용어\"],\n  \"synonyms\": [\"동의어\"],\n  \"entities\": [\"주요 인물, 회사, 이벤트\"],\n  \
             \"questions\": [\"타겟 고객이 가질만한 질문\"],\n  \"competitor_corporate_and_brand_name\": [\"경쟁사 브랜드명\"]\n}}"
        );
        decode(self.brain.complete_json(&prompt)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers prompts in order and records them.
    struct ScriptedBrain {
        configured: bool,
        answers: Mutex<Vec<Result<String, SynthesisError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBrain {
        fn new(answers: Vec<Result<&str, SynthesisError>>) -> Arc<Self> {
            Arc::new(Self {
                configured: true,
                answers: Mutex::new(answers.into_iter().rev().map(|a| a.map(str::to_string)).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn unconfigured() -> Arc<Self> {
            Arc::new(Self {
                configured: false,
                answers: Mutex::new(Vec::new()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    impl ResearchBrain for ScriptedBrain {
        fn is_configured(&self) -> bool {
            self.configured
        }

        fn complete_text(&self, prompt: &str) -> Result<String, SynthesisError> {
            if !self.configured {
                return Err(SynthesisError::NotConfigured);
            }
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answers.lock().unwrap().pop().unwrap_or(Err(SynthesisError::Empty))
        }
    }

    fn doc(url: &str, chars: usize) -> EvidenceDocument {
        EvidenceDocument::ok(url, Some("t".into()), "가".repeat(chars))
    }

    #[test]
    fn profile_falls_back_to_hint_brand() {
        let brain = ScriptedBrain::new(vec![Ok(
            r#"{"brand": "", "products_services": ["Dryer"], "key_messages": ["Quiet"]}"#,
        )]);
        let pages = vec![CrawlPage {
            url: "https://acme.com".into(),
            text: "Acme dryer".into(),
            raw_html: String::new(),
            prices: vec![],
        }];
        let profile = AnalystEngine::new(brain)
            .brand_profile_from_pages("acme", &pages, "beauty", "20s")
            .unwrap();
        assert_eq!(profile.brand, "acme");
        assert_eq!(profile.products_services, vec!["Dryer"]);
        assert!(profile.audience_clues.is_empty());
        assert_eq!(profile.pages_crawled, 1);
    }

    #[test]
    fn verification_needs_explicit_true() {
        let brain = ScriptedBrain::new(vec![
            Ok(r#"{"is_official": "yes"}"#),
            Ok(r#"{"is_official": true, "reason": "저작권 표기"}"#),
            Err(SynthesisError::Timeout),
        ]);
        let analyst = AnalystEngine::new(brain);
        assert!(!analyst.verify_official_site("content", "Acme"));
        assert!(analyst.verify_official_site("content", "Acme"));
        assert!(!analyst.verify_official_site("content", "Acme"));
    }

    #[test]
    fn verification_without_model_accepts() {
        assert!(AnalystEngine::new(ScriptedBrain::unconfigured()).verify_official_site("x", "Acme"));
    }

    #[test]
    fn thin_evidence_short_circuits_without_model_call() {
        let brain = ScriptedBrain::new(vec![]);
        let docs = vec![doc("https://a.com", 1000), doc("https://b.com", 500)];
        let analysis = AnalystEngine::new(brain.clone()).summarize_and_extract_insights(&docs, "t", "i", "a");
        match analysis {
            NewsAnalysis::InsufficientData {
                insights,
                collected_sources,
                ..
            } => {
                assert_eq!(insights.len(), 1);
                assert_eq!(insights[0].insight, INSUFFICIENT_INSIGHT);
                assert_eq!(collected_sources, vec!["https://a.com", "https://b.com"]);
            }
            other => panic!("expected InsufficientData, got {other:?}"),
        }
        assert!(brain.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn insights_parse_and_failures_are_explicit() {
        let brain = ScriptedBrain::new(vec![
            Ok(r#"{"insights": [{"insight": "1위 점유율", "quote": "점유율 1위", "source_url": "https://a.com"}]}"#),
            Ok("no json here"),
        ]);
        let analyst = AnalystEngine::new(brain);
        let docs = vec![doc("https://a.com", 2000)];

        let ok = analyst.summarize_and_extract_insights(&docs, "t", "i", "a");
        assert_eq!(ok.insights().len(), 1);
        assert_eq!(ok.headline(), Some("1위 점유율"));

        let failed = analyst.summarize_and_extract_insights(&docs, "t", "i", "a");
        assert!(matches!(failed, NewsAnalysis::Failed { ref insights, .. } if insights.is_empty()));
    }

    #[test]
    fn ontology_defaults_missing_keys() {
        let brain = ScriptedBrain::new(vec![Ok(
            r#"{"vocab": ["모발"], "competitor_corporate_and_brand_name": ["Vodana", "Unix"],}"#,
        )]);
        let ontology = AnalystEngine::new(brain).ontology_for("beauty", "20s", "dryer", 20).unwrap();
        assert_eq!(ontology.vocab, vec!["모발"]);
        assert!(ontology.synonyms.is_empty());
        assert_eq!(ontology.competitor_corporate_and_brand_name, vec!["Vodana", "Unix"]);
    }

    #[test]
    fn error_objects_become_malformed() {
        let brain = ScriptedBrain::new(vec![Ok(r#"{"error": "quota exceeded"}"#)]);
        let err = AnalystEngine::new(brain).ontology_for("i", "a", "p", 5).unwrap_err();
        assert!(matches!(err, SynthesisError::Malformed { ref reason, .. } if reason == "quota exceeded"));
    }

    #[test]
    fn comparison_table_includes_main_brand_first() {
        let brain = ScriptedBrain::new(vec![Ok("| 구분 | Acme | Vodana |")]);
        let analyst = AnalystEngine::new(brain.clone());
        let table = analyst
            .generate_comparison_table(
                &CompetitorProfile::shell("Acme"),
                &[CompetitorProfile::shell("Vodana")],
                "beauty",
                "20s",
            )
            .unwrap();
        assert!(table.starts_with("| 구분"));
        let prompt = brain.prompts.lock().unwrap()[0].clone();
        assert!(prompt.find("Acme").unwrap() < prompt.find("Vodana").unwrap());
    }
}
