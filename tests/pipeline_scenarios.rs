mod support;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use brandscope_core::error::ResearchError;
use brandscope_core::orchestrator::{ResearchOrchestrator, ResearchRequest};
use brandscope_core::progress::{Progress, RecordingSink};
use brandscope_core::report::{DataQuality, NewsAnalysis, Stage};
use brandscope_core::reporter::{Reporter, DEFAULT_BRAND_DIR, REPORT_FILE};
use brandscope_core::search::SearchResult;
use brandscope_core::shopping::ListingsSource;

use support::*;

const HOME: &str = "https://www.jmw.co.kr";
const VODANA: &str = "https://www.vodana.co.kr";
const NEWS: [&str; 3] = [
    "https://news.example/a",
    "https://news.example/b",
    "https://news.example/c",
];

fn home_html() -> String {
    let body = vec!["전문가를 위한 가벼운 헤어 드라이어를 만듭니다."; 8].join(" ");
    format!(
        "<html><head><title>JMW 공식몰</title></head><body><main>\
         <h1>JMW 프로페셔널</h1><p>{body}</p><p>대표 모델 15,000원 할인 쿠폰, 배송비 3,000원</p>\
         <a href=\"/product/dryer\">드라이어</a>\
         <a href=\"/about\">브랜드 스토리</a>\
         <a href=\"https://external.example/partner\">파트너</a>\
         <a href=\"https://www.instagram.com/jmw_official\">인스타그램</a>\
         </main></body></html>"
    )
}

fn product_html() -> String {
    article_html("항공모터 드라이어", "항공모터 드라이어 정가 89,000원, 회원가 ₩49,000 입니다.", 6)
}

fn about_html() -> String {
    article_html("브랜드 스토리", "미용실에서 시작한 헤어 전문 브랜드입니다.", 8)
}

fn site() -> SiteFetcher {
    SiteFetcher::new()
        .page(HOME, home_html())
        .page(&format!("{HOME}/product/dryer"), product_html())
        .page(&format!("{HOME}/about"), about_html())
}

fn with_news(fetcher: SiteFetcher, repeat: usize) -> SiteFetcher {
    NEWS.iter().fold(fetcher, |f, url| {
        f.page(url, article_html("드라이어 시장", "뉴스본문입니다테스트", repeat))
    })
}

fn news_results() -> Vec<SearchResult> {
    NEWS.iter()
        .map(|u| SearchResult::new("드라이어 시장 기사", *u))
        .collect()
}

fn jmw_provider() -> FakeProvider {
    FakeProvider::new()
        .on("JMW 공식", vec![SearchResult::new("JMW 공식 홈페이지", HOME)])
        .on("\"JMW\" 시장 점유율", news_results())
        .on("JMW 후기", news_results())
}

fn jmw_brain(competitors: &str) -> KeywordBrain {
    jmw_answers(KeywordBrain::new(), competitors)
}

/// Scripted answers for the JMW run, after any answers already on `brain`.
fn jmw_answers(brain: KeywordBrain, competitors: &str) -> KeywordBrain {
    brain
        .answer("비교 분석표", "| 구분 | JMW | Vodana |\n|---|---|---|\n| 가격대 | 15,000 ~ 89,000 | unknown |")
        .answer("is_official", r#"{"is_official": true, "reason": "공식 쇼핑몰"}"#)
        .answer(
            "브랜드의 정체성",
            r#"```json
{"brand": "JMW", "products_services": ["항공모터 드라이어", "고데기"], "key_messages": ["프로페셔널", "가벼운 무게"], "audience_clues": ["미용인"],}
```"#,
        )
        .answer(
            "온톨로지",
            format!(
                r#"{{"vocab": ["드라이어"], "synonyms": [], "entities": [], "questions": [], "competitor_corporate_and_brand_name": [{competitors}]}}"#
            ),
        )
        .answer(
            "인용구",
            r#"{"insights": [{"insight": "JMW 드라이어 점유율 상승", "quote": "뉴스본문입니다테스트", "source_url": "https://news.example/a"}], "summary_bullets": ["성장세"]}"#,
        )
}

fn request() -> ResearchRequest {
    ResearchRequest {
        seed: None,
        industry: "헤어/드라이어".into(),
        audience: "20대 여성".into(),
        keywords: vec!["JMW".into()],
        competitors: Vec::new(),
    }
}

struct World {
    provider: Arc<FakeProvider>,
    fetcher: Arc<SiteFetcher>,
    brain: Arc<KeywordBrain>,
    orchestrator: ResearchOrchestrator,
    out: tempfile::TempDir,
}

fn world(provider: FakeProvider, fetcher: SiteFetcher, brain: KeywordBrain, listings: Option<Arc<dyn ListingsSource>>) -> World {
    let out = tempfile::tempdir().unwrap();
    let provider = Arc::new(provider);
    let fetcher = Arc::new(fetcher);
    let brain = Arc::new(brain);
    let orchestrator = ResearchOrchestrator::new(
        test_config(out.path()),
        collaborators(Arc::clone(&provider), Arc::clone(&fetcher), Arc::clone(&brain), listings),
    );
    World {
        provider,
        fetcher,
        brain,
        orchestrator,
        out,
    }
}

fn recording() -> (Arc<RecordingSink>, Progress) {
    let sink = Arc::new(RecordingSink::new());
    let progress = Progress::new(sink.clone());
    (sink, progress)
}

#[test]
fn full_run_fills_every_section() {
    let listings: Arc<dyn ListingsSource> = Arc::new(FakeListings::ok(vec![
        listing("JMW 드라이어 MS6020", "JMW", 89_000, 1),
        listing("보다나 드라이어", "Vodana", 39_000, 2),
        listing("JMW 드라이어 MG1800", "JMW", 59_000, 3),
    ]));
    let w = world(
        jmw_provider().panic_on("PanicBrand"),
        with_news(site(), 100),
        jmw_brain(r#""Vodana", "Unix", "Dyson", "PanicBrand""#),
        Some(listings),
    );
    let (sink, progress) = recording();

    let run = w.orchestrator.run_research(&request(), &progress).unwrap();
    let report = &run.report;

    assert_eq!(report.run_meta.seed_url.as_deref(), Some(HOME));
    assert_eq!(report.run_meta.brand_hint.as_deref(), Some("jmw"));
    assert!(report.run_meta.fatal_error.is_none());
    assert!(report.run_meta.finished_at >= report.run_meta.started_at);

    let profile = report.brand_profile.value().expect("profile");
    assert_eq!(profile.brand, "JMW");
    assert_eq!(profile.pages_crawled, 3);
    assert_eq!(profile.price_label(), "15,000 ~ 89,000");
    assert_eq!(profile.social_profiles["instagram"].handle, "jmw_official");
    assert_eq!(profile.site_url.as_deref(), Some(HOME));
    assert!(!w.fetcher.fetched().iter().any(|u| u.contains("external.example")));

    let ontology = report.ontology.value().expect("ontology");
    assert_eq!(ontology.competitor_corporate_and_brand_name.len(), 4);

    match &report.news_analysis {
        NewsAnalysis::Insights { insights, .. } => assert_eq!(insights[0].insight, "JMW 드라이어 점유율 상승"),
        other => panic!("unexpected news analysis: {other:?}"),
    }
    assert_eq!(report.raw_news_docs.len(), 3);
    assert!(report.raw_news_docs.iter().all(|d| d.is_usable()));

    let shopping = report.shopping_data.value().expect("shopping");
    assert_eq!(shopping.product_name, "항공모터 드라이어");
    assert_eq!(shopping.top_results.len(), 3);
    assert_eq!(shopping.brand_counts[0], ("JMW".to_string(), 2));

    let names: Vec<_> = report.competitor_profiles.iter().map(|c| c.brand.as_str()).collect();
    assert_eq!(names, vec!["Vodana", "Unix", "Dyson"]);
    assert!(report
        .competitor_profiles
        .iter()
        .all(|c| c.data_quality == DataQuality::Minimal));

    let failures = sink.find("competitor:individual_error");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].payload["name"], "PanicBrand");

    let table = report.comparison_table.value().expect("comparison");
    assert!(table.starts_with("| 구분 | JMW"));
    let comparison_prompt = w
        .brain
        .prompts()
        .into_iter()
        .find(|p| p.contains("비교 분석표"))
        .unwrap();
    // main brand row comes first and carries its own enrichment
    let jmw_at = comparison_prompt.find("\"JMW\"").unwrap();
    let vodana_at = comparison_prompt.find("\"Vodana\"").unwrap();
    assert!(jmw_at < vodana_at);
    assert!(comparison_prompt.contains("JMW 드라이어 점유율 상승"));

    let path = run.output_path.expect("persisted");
    assert_eq!(path, w.out.path().join("jmw").join(REPORT_FILE));
    assert_eq!(&Reporter::load_report(&path).unwrap(), report);
    assert!(w.out.path().join("jmw").join("competitors.csv").exists());

    let events = sink.names();
    assert_eq!(events.first().map(String::as_str), Some("stage:start"));
    assert_eq!(events.last().map(String::as_str), Some("stage:done"));
}

#[test]
fn competitor_quality_tracks_what_was_found() {
    let provider = jmw_provider()
        .on("Vodana 공식", vec![SearchResult::new("보다나 공식몰", VODANA)])
        .on("\"Unix\" 시장 점유율", news_results());
    let fetcher = with_news(site(), 100).page(
        VODANA,
        article_html("보다나", "트렌디한 고데기와 스타일러를 만드는 보다나입니다.", 20),
    );
    let brain = jmw_answers(
        KeywordBrain::new().answer(
            "브랜드 힌트: 'Vodana'",
            r#"{"brand": "Vodana", "products_services": ["보다나 고데기"], "key_messages": ["트렌디"]}"#,
        ),
        r#""Vodana", "Unix", "Dyson""#,
    );
    let w = world(provider, fetcher, brain, None);

    let run = w.orchestrator.run_research(&request(), &Progress::default()).unwrap();
    let competitors = &run.report.competitor_profiles;

    let qualities: Vec<_> = competitors.iter().map(|c| c.data_quality).collect();
    assert_eq!(
        qualities,
        vec![DataQuality::Good, DataQuality::Partial, DataQuality::Minimal]
    );
    assert_eq!(competitors[0].site_url.as_deref(), Some(VODANA));
    assert_eq!(competitors[0].key_products, vec!["보다나 고데기".to_string()]);
    assert_eq!(competitors[1].site_url, None);
    assert_eq!(competitors[1].market_awareness, "JMW 드라이어 점유율 상승");
    assert_eq!(competitors[2].market_awareness, "unknown");
}

#[test]
fn panic_during_seed_resolution_is_fatal_but_persisted() {
    let w = world(FakeProvider::new().panic_on("Ghost"), SiteFetcher::new(), KeywordBrain::new(), None);
    let (sink, progress) = recording();
    let req = ResearchRequest {
        keywords: vec!["Ghost".into()],
        ..request()
    };

    let err = w.orchestrator.run_research(&req, &progress).unwrap_err();
    assert!(matches!(err, ResearchError::Panicked(ref msg) if msg.contains("Ghost")));
    assert_eq!(sink.find("pipeline:fatal_error").len(), 1);
    assert_eq!(sink.names().last().map(String::as_str), Some("stage:done"));

    let saved = Reporter::load_report(&w.out.path().join(DEFAULT_BRAND_DIR).join(REPORT_FILE)).unwrap();
    assert!(saved.run_meta.fatal_error.unwrap().contains("Ghost"));
    assert!(saved.run_meta.finished_at.is_some());
}

#[test]
fn unresolvable_keywords_abort_but_still_persist() {
    let w = world(FakeProvider::new(), SiteFetcher::new(), KeywordBrain::new(), None);
    let (sink, progress) = recording();
    let req = ResearchRequest {
        keywords: vec!["Ghost".into(), "Phantom".into()],
        ..request()
    };

    let err = w.orchestrator.run_research(&req, &progress).unwrap_err();
    assert!(matches!(err, ResearchError::SeedNotFound { ref keywords } if keywords == "Ghost Phantom"));
    assert!(err.is_fatal());
    assert_eq!(sink.find("pipeline:fatal_error").len(), 1);
    assert_eq!(sink.find("discover:start").len(), 2);

    let saved = Reporter::load_report(&w.out.path().join(DEFAULT_BRAND_DIR).join(REPORT_FILE)).unwrap();
    assert!(saved.run_meta.fatal_error.unwrap().contains("Ghost Phantom"));
    assert_eq!(saved.brand_profile, Stage::Pending);
    assert!(saved.competitor_profiles.is_empty());
}

#[test]
fn missing_seed_and_keywords_is_fatal() {
    let w = world(FakeProvider::new(), SiteFetcher::new(), KeywordBrain::new(), None);
    let req = ResearchRequest {
        keywords: vec!["   ".into()],
        ..request()
    };
    let err = w.orchestrator.run_research(&req, &Progress::default()).unwrap_err();
    assert!(matches!(err, ResearchError::MissingSeed));
    assert_eq!(w.provider.calls(), 0);
}

#[test]
fn later_keyword_can_rescue_the_run() {
    let w = world(jmw_provider(), with_news(site(), 100), jmw_brain(""), None);
    let req = ResearchRequest {
        keywords: vec!["Ghost".into(), "JMW".into()],
        ..request()
    };
    let run = w.orchestrator.run_research(&req, &Progress::default()).unwrap();
    assert_eq!(run.report.run_meta.seed_url.as_deref(), Some(HOME));
}

#[test]
fn explicit_seed_skips_discovery() {
    let w = world(FakeProvider::new(), with_news(site(), 100), jmw_brain(""), None);
    let (sink, progress) = recording();
    let req = ResearchRequest {
        seed: Some("www.jmw.co.kr".into()),
        keywords: Vec::new(),
        ..request()
    };
    let run = w.orchestrator.run_research(&req, &progress).unwrap();
    assert_eq!(run.report.run_meta.seed_url.as_deref(), Some(HOME));
    assert!(sink.find("discover:start").is_empty());
    assert!(run.report.brand_profile.is_done());
}

#[test]
fn thin_news_yields_insufficient_data_sentinel() {
    // ~1,500 characters across one article: above the per-document floor,
    // below the aggregate one.
    let provider = FakeProvider::new()
        .on("JMW 공식", vec![SearchResult::new("JMW 공식 홈페이지", HOME)])
        .on("\"JMW\" 시장 점유율", vec![SearchResult::new("기사", NEWS[0])]);
    let fetcher = site().page(NEWS[0], article_html("기사", "뉴스본문입니다테스트", 136));
    let w = world(provider, fetcher, jmw_brain(""), None);

    let run = w.orchestrator.run_research(&request(), &Progress::default()).unwrap();
    match &run.report.news_analysis {
        NewsAnalysis::InsufficientData {
            insights,
            collected_sources,
            ..
        } => {
            assert_eq!(insights.len(), 1);
            assert_eq!(insights[0].insight, "데이터 부족으로 분석 불가");
            assert_eq!(collected_sources, &vec![NEWS[0].to_string()]);
        }
        other => panic!("expected insufficient data, got {other:?}"),
    }
    assert!(!w.brain.prompts().iter().any(|p| p.contains("인용구")));
}

#[test]
fn user_competitors_fill_in_and_blank_names_are_skipped() {
    let w = world(jmw_provider(), with_news(site(), 100), jmw_brain(""), None);
    let (sink, progress) = recording();
    let req = ResearchRequest {
        competitors: vec!["Vodana".into(), "   ".into(), "vodana".into()],
        ..request()
    };

    let run = w.orchestrator.run_research(&req, &progress).unwrap();
    let names: Vec<_> = run.report.competitor_profiles.iter().map(|c| c.brand.clone()).collect();
    assert_eq!(names, vec!["Vodana"]);
    assert_eq!(sink.find("competitor:individual_error").len(), 1);
    assert!(run.report.comparison_table.is_done());
}

#[test]
fn no_competitors_skips_comparison() {
    let w = world(jmw_provider(), with_news(site(), 100), jmw_brain(""), None);
    let run = w.orchestrator.run_research(&request(), &Progress::default()).unwrap();
    assert!(run.report.competitor_profiles.is_empty());
    assert!(matches!(run.report.comparison_table, Stage::Skipped(_)));
    assert!(!w.brain.prompts().iter().any(|p| p.contains("비교 분석표")));
}

#[test]
fn shopping_failure_is_contained() {
    let listings: Arc<dyn ListingsSource> = Arc::new(FakeListings::failing("blocked"));
    let w = world(jmw_provider(), with_news(site(), 100), jmw_brain(""), Some(listings));
    let run = w.orchestrator.run_research(&request(), &Progress::default()).unwrap();
    match &run.report.shopping_data {
        Stage::Failed(failure) => assert!(failure.error.contains("blocked")),
        other => panic!("expected failed shopping stage, got {other:?}"),
    }
    assert!(run.report.brand_profile.is_done());
}

#[test]
fn unconfigured_model_degrades_sections_without_aborting() {
    let w = world(jmw_provider(), with_news(site(), 100), KeywordBrain::unconfigured(), None);
    let run = w.orchestrator.run_research(&request(), &Progress::default()).unwrap();

    // discovery accepts the top candidate without a model
    assert_eq!(run.report.run_meta.seed_url.as_deref(), Some(HOME));
    assert!(matches!(run.report.brand_profile, Stage::Failed(_)));
    assert!(matches!(run.report.ontology, Stage::Skipped(_)));
    assert!(matches!(run.report.news_analysis, NewsAnalysis::Failed { .. }));
    assert!(run.output_path.is_some());
}

#[test]
fn parallel_competitor_batch_keeps_name_order() {
    let out = tempfile::tempdir().unwrap();
    let mut config = test_config(out.path());
    config.competitor_workers = 4;
    let orchestrator = ResearchOrchestrator::new(
        config,
        collaborators(
            Arc::new(jmw_provider()),
            Arc::new(with_news(site(), 100)),
            Arc::new(jmw_brain(r#""A", "B", "C", "D", "E""#)),
            None,
        ),
    );
    let run = orchestrator.run_research(&request(), &Progress::default()).unwrap();
    let names: Vec<_> = run.report.competitor_profiles.iter().map(|c| c.brand.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C", "D", "E"]);
}
