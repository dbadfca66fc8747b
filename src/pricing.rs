//! Price mentions on crawled pages and the range derived from them.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::report::CrawlPage;

/// Prices at or below this are treated as noise (shipping fees, points).
pub const MIN_PLAUSIBLE_PRICE: u64 = 10_000;
/// Prices at or above this are treated as noise (phone numbers, totals).
pub const MAX_PLAUSIBLE_PRICE: u64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: u64,
    pub max: u64,
}

impl PriceRange {
    /// `"15,000 ~ 89,000"`.
    pub fn label(&self) -> String {
        format!("{} ~ {}", group_thousands(self.min), group_thousands(self.max))
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

fn price_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // 15,000원 / 15000 원
            Regex::new(r"(\d{1,3}(?:,\d{3})+|\d+)\s*원").expect("valid price regex"),
            // ₩15,000 / KRW 15,000
            Regex::new(r"(?:₩|KRW)\s*(\d{1,3}(?:,\d{3})+|\d+)").expect("valid price regex"),
        ]
    })
}

/// Every currency amount written in `text`, in order of appearance per pattern.
pub fn extract_prices(text: &str) -> Vec<u64> {
    let mut prices = Vec::new();
    for pattern in price_patterns() {
        for caps in pattern.captures_iter(text) {
            let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
            if let Ok(value) = digits.parse::<u64>() {
                prices.push(value);
            }
        }
    }
    prices
}

pub fn is_plausible(price: u64) -> bool {
    price > MIN_PLAUSIBLE_PRICE && price < MAX_PLAUSIBLE_PRICE
}

/// Min/max over all plausible prices found on the pages, or `None`.
pub fn price_range(pages: &[CrawlPage]) -> Option<PriceRange> {
    let mut plausible = pages
        .iter()
        .flat_map(|p| p.prices.iter().copied())
        .filter(|p| is_plausible(*p));
    let first = plausible.next()?;
    let (min, max) = plausible.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
    Some(PriceRange { min, max })
}

/// `1234567` -> `"1,234,567"`.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
