use serde::{Deserialize, Serialize};

/// Content-addressed segment ID (truncated blake3 hex).
pub type SegmentId = String;

/// One page of cleaned text. Produced by the external normalizer; the core
/// does not re-sanitize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub index: usize,
    pub text: String,
}

/// An ingested document. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub pages: Vec<Page>,
    pub ingested_at: i64,
}

impl Document {
    pub fn new(name: impl Into<String>, pages: Vec<Page>) -> Self {
        Self {
            name: name.into(),
            pages,
            ingested_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Build a document from bare page texts, indexed in order.
    pub fn from_pages(name: impl Into<String>, pages: Vec<String>) -> Self {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(index, text)| Page { index, text })
            .collect();
        Self::new(name, pages)
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

/// A bounded span of normalized text with provenance. Created once by the
/// packer; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    /// Source page index.
    pub page: usize,
    /// Char offset range within the source page. For a truncated segment the
    /// span still covers the whole oversized sentence; `text` holds less.
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Cached token estimate for `text`.
    pub tokens: usize,
    /// True when the unit was cut to fit the budget (text carries a
    /// `[truncated]` marker so downstream citation is honest).
    pub truncated: bool,
}

impl Segment {
    /// Same content at the same place = same ID.
    pub(crate) fn derive_id(page: usize, start: usize, end: usize, text: &str) -> SegmentId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&page.to_le_bytes());
        hasher.update(&start.to_le_bytes());
        hasher.update(&end.to_le_bytes());
        hasher.update(text.as_bytes());
        hasher.finalize().to_hex()[..16].to_string()
    }

    /// Leading slice of the segment text, used as citation excerpts.
    pub fn excerpt(&self, max_chars: usize) -> String {
        self.text.chars().take(max_chars).collect()
    }
}

/// One inference request against a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Full-document executive brief; no user text.
    Summary,
    /// Free-form user question.
    Question(String),
}

/// A link from an output claim back to the segment it was grounded in.
/// Only ever references segments that were actually in the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub segment_id: SegmentId,
    pub page: usize,
    pub excerpt: String,
}
