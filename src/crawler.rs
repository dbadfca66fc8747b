//! Bounded same-origin crawl of a brand site.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::json;
use url::Url;

use crate::error::ResearchError;
use crate::extract::{extract_text, normalize_whitespace};
use crate::fetcher::PageFetcher;
use crate::pricing::extract_prices;
use crate::progress::Progress;
use crate::report::{CrawlPage, SocialProfile};
use crate::search::normalize_url;

/// Hosts whose links are worth following first.
pub const SNS_DOMAINS: &[&str] = &[
    "instagram.com",
    "facebook.com",
    "youtube.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "blog.naver.com",
    "pf.kakao.com",
];

const COMMON_ALLOW: &[&str] = &[
    "about", "brand", "company", "story", "intro", "product", "goods", "item", "shop", "store",
    "collection", "catalog", "category", "faq", "contact", "notice", "news", "event",
];

const COMMON_BLOCK: &[&str] = &[
    "login", "logout", "join", "signup", "register", "cart", "order", "checkout", "mypage",
    "member", "privacy", "terms", "policy", "agreement", "search", "download", "print", ".pdf",
    ".jpg", ".png", ".zip",
];

/// Extra allow keywords keyed by the first `/`-segment of the industry.
fn industry_allow(industry: &str) -> &'static [&'static str] {
    let key = industry.split('/').next().unwrap_or_default().trim();
    match key.to_lowercase().as_str() {
        "뷰티" | "화장품" | "beauty" | "cosmetics" => {
            &["skincare", "makeup", "cosmetic", "beauty", "ingredient", "review"]
        }
        "가전" | "전자" | "electronics" | "appliance" => {
            &["spec", "support", "manual", "feature", "technology", "series"]
        }
        "패션" | "의류" | "fashion" | "apparel" => {
            &["men", "women", "new", "season", "lookbook", "size"]
        }
        "식품" | "음료" | "food" | "beverage" => &["menu", "recipe", "nutrition", "origin"],
        "헤어" | "hair" => &["hair", "dryer", "styler", "care", "salon"],
        _ => &[],
    }
}

/// Relevance of a same-origin link. Higher is crawled first.
pub fn score_link(url: &Url, industry: &str) -> f64 {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    if SNS_DOMAINS.iter().any(|d| host.contains(d)) {
        return 3.0;
    }
    let path = url.path().to_lowercase();
    let mut score = 0.0;
    if COMMON_BLOCK.iter().any(|b| path.contains(b)) {
        score -= 1.0;
    }
    if COMMON_ALLOW
        .iter()
        .chain(industry_allow(industry))
        .any(|a| path.contains(a))
    {
        score += 1.2;
    }
    score
}

fn link_selector() -> &'static Selector {
    static LINKS: OnceLock<Selector> = OnceLock::new();
    LINKS.get_or_init(|| Selector::parse("a[href]").expect("valid link selector"))
}

/// Fragment-free absolute URLs of every anchor on the page.
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);
    doc.select(link_selector())
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|mut u| {
            u.set_fragment(None);
            u
        })
        .collect()
}

pub struct SiteCrawler {
    fetcher: Arc<dyn PageFetcher>,
    fan_out: usize,
    delay: Duration,
}

impl SiteCrawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, fan_out: usize, delay: Duration) -> Self {
        Self {
            fetcher,
            fan_out,
            delay,
        }
    }

    /// Breadth-first crawl of the seed's origin, at most `max_pages` pages.
    ///
    /// Per-page failures are reported on `progress` and skipped. Only an
    /// unparseable seed is an error.
    pub fn crawl(
        &self,
        seed: &str,
        industry: &str,
        max_pages: usize,
        progress: &Progress,
    ) -> Result<Vec<CrawlPage>, ResearchError> {
        let seed = seed.trim().trim_end_matches('/');
        let seed_url = Url::parse(seed).map_err(|e| ResearchError::InvalidSeed {
            url: seed.to_string(),
            reason: e.to_string(),
        })?;
        let origin = seed_url.origin();
        if !origin.is_tuple() {
            return Err(ResearchError::InvalidSeed {
                url: seed.to_string(),
                reason: "seed has no http origin".to_string(),
            });
        }

        let mut queue = VecDeque::from([normalize_url(seed_url.as_str())]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut pages: Vec<CrawlPage> = Vec::new();
        let mut attempted = false;

        while pages.len() < max_pages {
            let Some(current) = queue.pop_front() else {
                break;
            };
            if !visited.insert(current.clone()) {
                continue;
            }
            let Ok(current_url) = Url::parse(&current) else {
                continue;
            };
            if current_url.origin() != origin {
                continue;
            }

            if attempted && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            attempted = true;

            let page = match self.fetcher.fetch(&current) {
                Ok(page) => page,
                Err(e) => {
                    tracing::debug!(url = %current, error = %e, "crawl fetch failed");
                    progress.emit("crawl:error", json!({"url": current, "error": e.to_string()}));
                    continue;
                }
            };

            let text = normalize_whitespace(&extract_text(&page.html));
            let prices = extract_prices(&text);
            let links = extract_links(&page.html, &current_url);
            pages.push(CrawlPage {
                url: current.clone(),
                text,
                raw_html: page.html,
                prices,
            });
            progress.emit("crawl:page", json!({"url": current, "pages_found": pages.len()}));

            let mut candidates: Vec<(String, f64)> = Vec::new();
            let mut offered: HashSet<String> = HashSet::new();
            for link in links {
                if link.origin() != origin {
                    continue;
                }
                let key = normalize_url(link.as_str());
                if visited.contains(&key) || !offered.insert(key.clone()) {
                    continue;
                }
                let score = score_link(&link, industry);
                candidates.push((key, score));
            }
            // stable: equal scores keep document order
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
            queue.extend(
                candidates
                    .into_iter()
                    .take(self.fan_out)
                    .map(|(u, _)| u),
            );
        }

        tracing::info!(seed, pages = pages.len(), "crawl finished");
        progress.emit("crawl:done", json!({"seed": seed, "count": pages.len()}));
        Ok(pages)
    }
}

struct SocialPattern {
    platform: &'static str,
    regex: Regex,
}

fn social_patterns() -> &'static [SocialPattern] {
    static PATTERNS: OnceLock<Vec<SocialPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("instagram", r"(?i)instagram\.com/([A-Za-z0-9_.]+)"),
            ("facebook", r"(?i)facebook\.com/([A-Za-z0-9_.\-]+)"),
            ("youtube", r"(?i)youtube\.com/(?:c/|channel/|user/)?(@?[A-Za-z0-9_.\-]+)"),
            ("x", r"(?i)(?:^|[/.])(?:twitter|x)\.com/([A-Za-z0-9_]+)"),
            ("tiktok", r"(?i)tiktok\.com/(@[A-Za-z0-9_.]+)"),
            ("naver_blog", r"(?i)blog\.naver\.com/([A-Za-z0-9_\-]+)"),
        ]
        .into_iter()
        .map(|(platform, rx)| SocialPattern {
            platform,
            regex: Regex::new(rx).expect("valid social regex"),
        })
        .collect()
    })
}

/// Path segments that are share widgets or site sections, not accounts.
const NON_HANDLES: &[&str] = &[
    "sharer", "share", "intent", "home", "watch", "p", "explore", "plugins", "dialog", "embed",
    "PostList.naver", "tr",
];

/// First account link per platform found in `html`.
pub fn extract_socials(html: &str) -> BTreeMap<String, SocialProfile> {
    let doc = Html::parse_document(html);
    let mut found = BTreeMap::new();
    for href in doc.select(link_selector()).filter_map(|a| a.value().attr("href")) {
        for pattern in social_patterns() {
            if found.contains_key(pattern.platform) {
                continue;
            }
            let Some(caps) = pattern.regex.captures(href) else {
                continue;
            };
            let handle = caps[1].trim_end_matches('.');
            if handle.is_empty() || NON_HANDLES.iter().any(|n| n.eq_ignore_ascii_case(handle)) {
                continue;
            }
            found.insert(
                pattern.platform.to_string(),
                SocialProfile {
                    url: href.to_string(),
                    handle: handle.to_string(),
                },
            );
        }
    }
    found
}

/// Socials across a crawl; earlier pages win.
pub fn harvest_socials(pages: &[CrawlPage]) -> BTreeMap<String, SocialProfile> {
    let mut all = BTreeMap::new();
    for page in pages {
        for (platform, profile) in extract_socials(&page.raw_html) {
            all.entry(platform).or_insert(profile);
        }
    }
    all
}
