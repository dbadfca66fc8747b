//! Page retrieval and evidence building.
//!
//! [`PageFetcher`] is the raw HTTP seam (the crawler uses it directly);
//! [`EvidenceFetcher`] layers extraction and the quality gate on top and never
//! fails: every problem becomes an [`EvidenceDocument`] with `error` set.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use encoding_rs::{Encoding, EUC_KR, UTF_8};
use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};

use crate::error::FetchError;
use crate::extract::{extract_text, normalize_whitespace, page_title};
use crate::quality::QualityGate;
use crate::report::EvidenceDocument;
use crate::search::SearchResult;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// Error tag for documents rejected by the quality gate.
pub const SHORT_CONTENT: &str = "short";

/// A browser identity picked at random per request.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// A retrieved HTML document.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// The URL that was requested.
    pub url: String,
    pub html: String,
}

pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Blocking HTTP fetcher: random user agent, up to 10 redirects, charset repair.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let response = self
            .client
            .get(parsed)
            .header(USER_AGENT, random_user_agent())
            .header(ACCEPT_LANGUAGE, "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7")
            .send()
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().map_err(|e| request_error(url, e))?;

        Ok(FetchedPage {
            url: url.to_string(),
            html: decode_body(&bytes, content_type.as_deref()),
        })
    }
}

fn request_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

fn meta_charset() -> &'static Regex {
    static META: OnceLock<Regex> = OnceLock::new();
    META.get_or_init(|| {
        Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_\-]+)"#).expect("valid charset regex")
    })
}

/// Decode a response body.
///
/// A declared charset is trusted unless it is the Latin-1 default servers
/// send when they know nothing. Otherwise the `<meta>` declaration is used,
/// then strict UTF-8, then EUC-KR (the usual legacy encoding of Korean sites).
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let declared = content_type
        .and_then(|ct| {
            ct.split(';')
                .map(str::trim)
                .find_map(|part| part.strip_prefix("charset="))
        })
        .and_then(|label| Encoding::for_label(label.trim_matches('"').as_bytes()))
        .filter(|enc| *enc != encoding_rs::WINDOWS_1252);

    let sniffed = || {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(2048)]).into_owned();
        meta_charset()
            .captures(&head)
            .and_then(|caps| Encoding::for_label(caps[1].as_bytes()))
    };

    match declared.or_else(sniffed) {
        Some(encoding) => encoding.decode(bytes).0.into_owned(),
        None => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => {
                let (text, _, had_errors) = EUC_KR.decode(bytes);
                if had_errors {
                    UTF_8.decode(bytes).0.into_owned()
                } else {
                    text.into_owned()
                }
            }
        },
    }
}

/// Turns URLs into gated evidence documents.
#[derive(Clone)]
pub struct EvidenceFetcher {
    fetcher: Arc<dyn PageFetcher>,
    gate: QualityGate,
}

impl EvidenceFetcher {
    pub fn new(fetcher: Arc<dyn PageFetcher>, gate: QualityGate) -> Self {
        Self { fetcher, gate }
    }

    pub fn fetch_evidence(&self, result: &SearchResult) -> EvidenceDocument {
        let title = Some(result.title.clone()).filter(|t| !t.trim().is_empty());
        self.fetch_url(&result.url, title)
    }

    pub fn fetch_url(&self, url: &str, title: Option<String>) -> EvidenceDocument {
        let page = match self.fetcher.fetch(url) {
            Ok(page) => page,
            Err(e) => {
                tracing::debug!(url, error = %e, "evidence fetch failed");
                return EvidenceDocument::failed(url, title, e.to_string());
            }
        };

        let title = title.or_else(|| page_title(&page.html));
        let content = normalize_whitespace(&extract_text(&page.html));
        if !self.gate.accept(&content) {
            tracing::debug!(url, chars = content.chars().count(), "evidence below quality floor");
            return EvidenceDocument::failed(url, title, SHORT_CONTENT);
        }
        EvidenceDocument::ok(url, title, content)
    }

    /// One document per result, in order.
    pub fn fetch_all(&self, results: &[SearchResult]) -> Vec<EvidenceDocument> {
        results.iter().map(|r| self.fetch_evidence(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapFetcher(HashMap<String, String>);

    impl PageFetcher for MapFetcher {
        fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            match self.0.get(url) {
                Some(html) => Ok(FetchedPage {
                    url: url.to_string(),
                    html: html.clone(),
                }),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    fn fetcher(pages: &[(&str, &str)]) -> EvidenceFetcher {
        EvidenceFetcher::new(
            Arc::new(MapFetcher(
                pages
                    .iter()
                    .map(|(u, h)| (u.to_string(), h.to_string()))
                    .collect(),
            )),
            QualityGate::document(),
        )
    }

    #[test]
    fn long_pages_become_usable_evidence() {
        let html = format!(
            "<html><head><title>Acme news</title></head><body><article>{}</article></body></html>",
            "Acme leads the Korean dryer market.   ".repeat(8)
        );
        let doc = fetcher(&[("https://news.example/a", html.as_str())])
            .fetch_url("https://news.example/a", None);
        assert!(doc.is_usable());
        assert_eq!(doc.title.as_deref(), Some("Acme news"));
        assert!(!doc.content.contains("  "));
    }

    #[test]
    fn short_pages_are_tagged_short() {
        let doc = fetcher(&[("https://a.example", "<p>tiny</p>")]).fetch_evidence(
            &SearchResult::new("A", "https://a.example"),
        );
        assert_eq!(doc.error.as_deref(), Some(SHORT_CONTENT));
        assert!(doc.content.is_empty());
        assert_eq!(doc.title.as_deref(), Some("A"));
    }

    #[test]
    fn fetch_errors_are_captured() {
        let doc = fetcher(&[]).fetch_url("https://missing.example", None);
        assert_eq!(doc.error.as_deref(), Some("https://missing.example returned HTTP 404"));
        assert!(doc.content.is_empty());
    }

    #[test]
    fn decodes_euc_kr_without_declaration() {
        let (bytes, _, _) = EUC_KR.encode("<p>공식 홈페이지</p>");
        assert_eq!(decode_body(&bytes, None), "<p>공식 홈페이지</p>");
        assert_eq!(
            decode_body(&bytes, Some("text/html; charset=ISO-8859-1")),
            "<p>공식 홈페이지</p>"
        );
    }

    #[test]
    fn honours_meta_charset() {
        let mut body = b"<html><head><meta charset=\"euc-kr\"></head><body>".to_vec();
        body.extend_from_slice(&EUC_KR.encode("브랜드").0);
        body.extend_from_slice(b"</body></html>");
        assert!(decode_body(&body, Some("text/html")).contains("브랜드"));
    }

    #[test]
    fn user_agent_is_from_pool() {
        assert!(USER_AGENTS.contains(&random_user_agent()));
    }
}
