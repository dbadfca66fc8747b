//! HTML to readable text.
//!
//! Recall-favoring: take the main content region when it carries enough
//! text, otherwise strip the whole document down to its visible text.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

/// Main-region text shorter than this falls through to the full-page strip.
pub const MIN_EXTRACTED_CHARS: usize = 150;

const CONTENT_SELECTORS: &[&str] = &["article", "main", "[role=\"main\"]", "#content", ".content"];

/// Subtrees that never hold body copy.
const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "nav", "header", "footer", "aside", "form",
    "iframe", "button",
];

/// Only scripts and styles are dropped in the fallback path.
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Extract readable text from `html`. May return an empty string.
pub fn extract_text(html: &str) -> String {
    let doc = Html::parse_document(html);

    for sel in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        let mut best = String::new();
        for region in doc.select(&selector) {
            let text = normalize_whitespace(&text_without(region, NOISE_TAGS));
            if text.chars().count() > best.chars().count() {
                best = text;
            }
        }
        if best.chars().count() > MIN_EXTRACTED_CHARS {
            return best;
        }
    }

    normalize_whitespace(&text_without(doc.root_element(), INVISIBLE_TAGS))
}

/// Collapse every whitespace run to one space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of the `<title>` element, if any.
pub fn page_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = doc.select(&selector).next()?.text().collect::<String>();
    let title = normalize_whitespace(&title);
    (!title.is_empty()).then_some(title)
}

fn text_without(el: ElementRef<'_>, skip: &[&str]) -> String {
    let mut buf = String::new();
    collect_text(el, skip, &mut buf);
    buf
}

fn collect_text(el: ElementRef<'_>, skip: &[&str], buf: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                buf.push_str(text);
                buf.push(' ');
            }
            Node::Element(element) => {
                if skip.contains(&element.name()) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, skip, buf);
                }
            }
            _ => {}
        }
    }
}
