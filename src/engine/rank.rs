//! Relevance ranker: scores packed segments against a query and selects the
//! subset that fits the active candidate's token budget.

use tracing::{debug, warn};

use crate::config::RankConfig;
use crate::doc::pack::{approx_tokens, TRUNCATION_MARKER};
use crate::doc::types::{Query, Segment};

const STOP_WORDS: &[&str] = &[
    "what", "which", "where", "when", "does", "have", "with", "that", "this", "from", "about",
    "some", "there", "their", "they", "your", "been", "were", "how", "could", "would", "should",
    "shall", "will", "into", "also", "just", "like", "make", "using", "used", "need", "want",
    "find", "know", "tell", "many", "much", "very", "really", "please", "help", "more", "most",
    "only",
];

const MAX_KEYWORDS: usize = 8;

/// A segment paired with its relevance score.
#[derive(Debug, Clone)]
pub struct RankedSegment {
    pub segment: Segment,
    pub score: f32,
}

/// Extract search terms from a question — handles hyphenated phrases and
/// filters stop words.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let mut keywords = Vec::new();

    for word in question.split_whitespace() {
        let clean: String = word
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if clean.is_empty() {
            continue;
        }

        // Keep hyphenated terms as-is (e.g., "supply-chain")
        if clean.contains('-') || clean.contains('_') {
            keywords.push(clean.to_lowercase());
            for part in clean.split(|c: char| c == '-' || c == '_') {
                if part.len() > 2 && !STOP_WORDS.contains(&part.to_lowercase().as_str()) {
                    keywords.push(part.to_lowercase());
                }
            }
        } else if clean.len() > 2 && !STOP_WORDS.contains(&clean.to_lowercase().as_str()) {
            keywords.push(clean.to_lowercase());
        }
    }

    // Deduplicate while preserving order
    let mut seen = std::collections::HashSet::new();
    keywords.retain(|k| seen.insert(k.clone()));
    keywords.truncate(MAX_KEYWORDS);
    keywords
}

/// Distinct matched keywords dominate; repeated occurrences add a small
/// bonus. Monotonic in shared salient terms.
fn score_segment(text_lower: &str, keywords: &[String]) -> f32 {
    let mut distinct = 0usize;
    let mut occurrences = 0usize;
    for kw in keywords {
        let count = text_lower.matches(kw.as_str()).count();
        if count > 0 {
            distinct += 1;
            occurrences += count.min(10);
        }
    }
    distinct as f32 + occurrences as f32 * 0.05
}

/// Rank segments against a query, descending score, trimmed to
/// `budget_tokens`.
///
/// Summaries keep every segment in document order (position-based scores);
/// questions keep the best-scoring segments, ties broken by document order.
/// A non-empty document never yields an empty selection: all-zero scores
/// degrade to the most recent segments that fit, and when no whole segment
/// fits the budget the best candidate is trimmed down to it.
pub fn rank(
    segments: &[Segment],
    query: &Query,
    budget_tokens: usize,
    config: &RankConfig,
) -> Vec<RankedSegment> {
    match query {
        Query::Summary => rank_summary(segments, budget_tokens),
        Query::Question(text) => rank_question(segments, text, budget_tokens, config),
    }
}

/// Cut a segment's text down to `budget_tokens`, marked the same way the
/// packer marks an oversized sentence. Span and id stay those of the source
/// segment so prompt citations still resolve.
fn trim_to_budget(seg: &Segment, budget_tokens: usize) -> Segment {
    let marker_tokens = approx_tokens(TRUNCATION_MARKER);
    let keep_tokens = budget_tokens.saturating_sub(marker_tokens).max(1);
    let mut cut = (keep_tokens * 4).min(seg.text.len());
    while !seg.text.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut text = seg.text[..cut].to_string();
    text.push_str(TRUNCATION_MARKER);
    let tokens = approx_tokens(&text);
    Segment {
        text,
        tokens,
        truncated: true,
        ..seg.clone()
    }
}

fn rank_summary(segments: &[Segment], budget_tokens: usize) -> Vec<RankedSegment> {
    // A full-document brief needs full coverage; scores encode position so
    // descending score equals document order.
    let n = segments.len();
    let mut spent = 0usize;
    let mut selected = Vec::new();
    for (i, seg) in segments.iter().enumerate() {
        if spent + seg.tokens > budget_tokens {
            warn!(
                included = selected.len(),
                total = n,
                "summary budget exhausted before full coverage"
            );
            break;
        }
        spent += seg.tokens;
        selected.push(RankedSegment {
            segment: seg.clone(),
            score: (n - i) as f32,
        });
    }
    if selected.is_empty() {
        if let Some(first) = segments.first() {
            warn!("no segment fits the budget, trimming the lead segment");
            selected.push(RankedSegment {
                segment: trim_to_budget(first, budget_tokens),
                score: n as f32,
            });
        }
    }
    selected
}

fn rank_question(
    segments: &[Segment],
    question: &str,
    budget_tokens: usize,
    config: &RankConfig,
) -> Vec<RankedSegment> {
    let keywords = extract_keywords(question);
    debug!(?keywords, segment_count = segments.len(), "ranking question");

    let mut scored: Vec<(usize, f32)> = segments
        .iter()
        .enumerate()
        .map(|(i, seg)| (i, score_segment(&seg.text.to_lowercase(), &keywords)))
        .collect();

    let all_zero = scored.iter().all(|(_, s)| *s == 0.0);
    if all_zero && !segments.is_empty() {
        // Scoring found nothing; fall back to the most recent segments
        // rather than an empty context.
        warn!("no keyword overlap, degrading to most recent segments");
        let mut spent = 0usize;
        let mut selected = Vec::new();
        for seg in segments.iter().rev() {
            if selected.len() >= config.max_selected || spent + seg.tokens > budget_tokens {
                break;
            }
            spent += seg.tokens;
            selected.push(RankedSegment {
                segment: seg.clone(),
                score: 0.0,
            });
        }
        selected.reverse();
        if selected.is_empty() {
            if let Some(last) = segments.last() {
                warn!("no segment fits the budget, trimming the most recent segment");
                selected.push(RankedSegment {
                    segment: trim_to_budget(last, budget_tokens),
                    score: 0.0,
                });
            }
        }
        return selected;
    }

    // Descending score, ties by original document order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));

    let mut spent = 0usize;
    let mut selected = Vec::new();
    for &(i, score) in &scored {
        if selected.len() >= config.max_selected {
            break;
        }
        if score == 0.0 {
            break;
        }
        let seg = &segments[i];
        if spent + seg.tokens > budget_tokens {
            continue;
        }
        spent += seg.tokens;
        selected.push(RankedSegment {
            segment: seg.clone(),
            score,
        });
    }
    if selected.is_empty() {
        if let Some(&(i, score)) = scored.first() {
            warn!("no segment fits the budget, trimming the best match");
            selected.push(RankedSegment {
                segment: trim_to_budget(&segments[i], budget_tokens),
                score,
            });
        }
    }
    selected
}
