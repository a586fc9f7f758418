//! Response mapper: parses raw model output into the three-part executive
//! brief or a citation-backed answer.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::doc::types::{Citation, Query, Segment};
use crate::engine::prompts::BRIEF_SECTIONS;

/// Chars of segment text carried into each citation excerpt.
const EXCERPT_CHARS: usize = 160;

/// The three-category structured summary output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutiveBrief {
    pub financial_highlights: String,
    pub operational_risks: String,
    pub strategic_outlook: String,
}

/// A free-form answer with citations into the session's segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// Why a brief could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// One or more of the required headings was not found.
    MissingSections(Vec<String>),
    /// The model returned nothing usable.
    EmptyResponse,
}

/// Explicit tagged parse result; failure paths are handled exhaustively
/// instead of sniffing the output shape at runtime.
#[derive(Debug, Clone)]
pub enum Parsed {
    Brief(ExecutiveBrief),
    Answer(Answer),
    Failure(ParseFailure),
}

/// Map raw model output for a query. `in_context` must be exactly the
/// segment set that was assembled into the prompt, so citations can only
/// reference segments the model actually saw.
pub fn parse_response(raw: &str, query: &Query, in_context: &[Segment]) -> Parsed {
    if raw.trim().is_empty() {
        return Parsed::Failure(ParseFailure::EmptyResponse);
    }
    match query {
        Query::Summary => match parse_brief(raw) {
            Ok(brief) => Parsed::Brief(brief),
            Err(failure) => Parsed::Failure(failure),
        },
        Query::Question(_) => Parsed::Answer(parse_answer(raw, in_context)),
    }
}

/// Byte offset of the first ASCII-case-insensitive occurrence of `needle`.
/// The needle is ASCII, so the returned offset is a valid char boundary.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// Locate the three required headings (case-insensitive, tolerant of
/// `##`/numbering prefixes since the match is by phrase, not by line).
fn parse_brief(raw: &str) -> Result<ExecutiveBrief, ParseFailure> {
    let mut found: Vec<(usize, usize, &str)> = Vec::new(); // (start, end_of_heading, name)
    let mut missing = Vec::new();
    for heading in BRIEF_SECTIONS {
        match find_ignore_ascii_case(raw, heading) {
            Some(pos) => found.push((pos, pos + heading.len(), heading)),
            None => missing.push(heading.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(ParseFailure::MissingSections(missing));
    }

    found.sort_by_key(|&(pos, _, _)| pos);

    let mut sections: HashMap<&str, String> = HashMap::new();
    for (i, &(_, body_start, name)) in found.iter().enumerate() {
        let body_end = found.get(i + 1).map_or(raw.len(), |&(next, _, _)| next);
        let body = raw[body_start..body_end]
            .trim_matches(|c: char| c == ':' || c == '*' || c == '#' || c.is_whitespace())
            .to_string();
        sections.insert(name, body);
    }

    Ok(ExecutiveBrief {
        financial_highlights: sections.remove(BRIEF_SECTIONS[0]).unwrap_or_default(),
        operational_risks: sections.remove(BRIEF_SECTIONS[1]).unwrap_or_default(),
        strategic_outlook: sections.remove(BRIEF_SECTIONS[2]).unwrap_or_default(),
    })
}

/// Resolve inline `[S:<id>]` markers against the in-context segment set.
/// Unknown ids are dropped, never fabricated; each drop is logged as an
/// anomaly. Citations are deduplicated in first-occurrence order.
fn parse_answer(raw: &str, in_context: &[Segment]) -> Answer {
    let by_id: HashMap<&str, &Segment> =
        in_context.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut citations = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut rest = raw;
    while let Some(start) = rest.find("[S:") {
        let after = &rest[start + 3..];
        let Some(close) = after.find(']') else {
            break;
        };
        // Tolerate markers echoed with their page suffix: "[S:<id> | page N]"
        let id = after[..close]
            .split(|c: char| c == '|' || c.is_whitespace())
            .next()
            .unwrap_or("")
            .trim();

        match by_id.get(id) {
            Some(seg) => {
                if seen.insert(seg.id.clone()) {
                    citations.push(Citation {
                        segment_id: seg.id.clone(),
                        page: seg.page,
                        excerpt: seg.excerpt(EXCERPT_CHARS),
                    });
                }
            }
            None => {
                warn!(marker = id, "model cited a segment that was not in context, dropping");
            }
        }
        rest = &after[close + 1..];
    }

    Answer {
        text: raw.trim().to_string(),
        citations,
    }
}
