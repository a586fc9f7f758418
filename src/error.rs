use thiserror::Error;

use crate::llm::BackendFailure;

/// Failures the core surfaces to its caller.
///
/// Transient backend trouble is absorbed by the resolver's fallback and never
/// appears here; what does appear is either structural (bad configuration,
/// content that cannot fit) or terminal (no candidate left to try).
#[derive(Debug, Error)]
pub enum EngineError {
    /// A single sentence alone exceeds the segment token budget and
    /// truncation is disabled.
    #[error("oversized unit on page {page}: {tokens} tokens exceeds max_tokens={max_tokens}")]
    OversizedUnit {
        page: usize,
        tokens: usize,
        max_tokens: usize,
    },

    /// Every candidate has been exhausted (or a fatal auth error ended the
    /// session early). No retry will be attempted.
    #[error("no backend candidates available")]
    NoCandidatesAvailable,

    /// The assembled prompt does not fit the active candidate's window.
    #[error("assembled prompt of {required} tokens exceeds context window of {window}")]
    ContextOverflow { required: usize, window: usize },

    /// The model output could not be parsed into the three-section brief,
    /// even after the corrective re-prompt.
    #[error("malformed executive brief: {detail}")]
    MalformedBrief { detail: String },

    /// A fatal backend failure, surfaced as-is.
    #[error(transparent)]
    Backend(#[from] BackendFailure),
}
