//! Context-fitting and model-resolution core for LLM-backed document
//! insight extraction.
//!
//! The crate takes an already-normalized [`Document`], packs it into
//! token-budgeted, provenance-tracked [`Segment`]s, ranks those segments
//! against a query, assembles a bounded prompt, calls whichever backend the
//! [`engine::resolver::ModelResolver`] currently designates (falling forward
//! through candidates on rate limits and transient errors), and maps model
//! output back to source passages as [`Citation`]s.
//!
//! PDF parsing, console rendering, and credential loading are external
//! collaborators: callers hand in a [`Document`], an [`EngineConfig`], and a
//! [`llm::Backend`], and get back an [`engine::respond::ExecutiveBrief`] or
//! a cited [`engine::respond::Answer`].

pub mod config;
pub mod doc;
pub mod engine;
pub mod error;
pub mod llm;

pub use config::{CapabilityTier, EngineConfig, ModelCandidate, PackConfig, RankConfig, ResolverPolicy};
pub use doc::{approx_tokens, pack, Citation, Document, Page, Query, Segment, SegmentId};
pub use engine::rank::{rank, RankedSegment};
pub use engine::resolver::ModelResolver;
pub use engine::respond::{parse_response, Answer, ExecutiveBrief, Parsed, ParseFailure};
pub use engine::Session;
pub use error::EngineError;
pub use llm::{Backend, BackendFailure, FailureKind, HttpBackend};
