//! Minimum-information gates applied before anything reaches the model.

/// Minimum characters for one evidence document.
pub const MIN_DOCUMENT_CHARS: usize = 150;

/// Minimum characters across a document set before insight extraction runs.
pub const MIN_AGGREGATE_CHARS: usize = 2000;

/// Rejects text below a fixed character floor. Lengths are counted in
/// Unicode scalar values so Hangul and ASCII are gated alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityGate {
    min_chars: usize,
}

impl QualityGate {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    pub fn document() -> Self {
        Self::new(MIN_DOCUMENT_CHARS)
    }

    pub fn aggregate() -> Self {
        Self::new(MIN_AGGREGATE_CHARS)
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    pub fn accept(&self, text: &str) -> bool {
        !text.is_empty() && text.chars().count() >= self.min_chars
    }

    /// Gate a set of texts by their combined length.
    pub fn accept_all<'a, I>(&self, texts: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        total_chars(texts) >= self.min_chars
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::document()
    }
}

pub fn total_chars<'a, I>(texts: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    texts.into_iter().map(|t| t.chars().count()).sum()
}
