//! Context packer: splits normalized pages into token-budgeted, overlapping
//! segments on sentence boundaries, tracking provenance for citation.

use tracing::{debug, warn};

use crate::config::PackConfig;
use crate::doc::types::{Document, Page, Segment};
use crate::error::EngineError;

/// Marker appended to the text of a segment whose sentence was cut to fit.
pub const TRUNCATION_MARKER: &str = " [truncated]";

/// Token estimate: ~4 chars per token, rounded up.
pub fn approx_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Partition a page into contiguous sentence spans (char offsets).
///
/// A boundary falls after `.` `!` `?` followed by whitespace, and after a
/// newline. The spans cover every character, so no content is lost between
/// segments.
fn split_sentences(text: &str) -> Vec<(usize, usize)> {
    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();
    let mut start = 0;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let at_end = i + 1 >= chars.len();
        let sentence_end = matches!(c, '.' | '!' | '?')
            && (at_end || chars[i + 1].is_whitespace());
        let line_end = c == '\n';

        if sentence_end || line_end || at_end {
            spans.push((start, i + 1));
            start = i + 1;
        }
        i += 1;
    }

    spans.retain(|(s, e)| e > s);
    spans
}

fn slice(chars: &[char], start: usize, end: usize) -> String {
    chars[start..end].iter().collect()
}

fn make_segment(page: usize, start: usize, end: usize, text: String, truncated: bool) -> Segment {
    let id = Segment::derive_id(page, start, end, &text);
    let tokens = approx_tokens(&text);
    Segment {
        id,
        page,
        start,
        end,
        text,
        tokens,
        truncated,
    }
}

/// Pack one document into segments. Deterministic: the same document and
/// config always yield the same segment sequence.
pub fn pack(document: &Document, config: &PackConfig) -> Result<Vec<Segment>, EngineError> {
    let mut overlap = config.overlap_tokens;
    if overlap > config.max_tokens / 2 {
        warn!(
            overlap_tokens = overlap,
            max_tokens = config.max_tokens,
            "overlap clamped to half the segment budget"
        );
        overlap = config.max_tokens / 2;
    }

    let mut segments = Vec::new();
    for page in &document.pages {
        pack_page(page, config, overlap, &mut segments)?;
    }

    debug!(
        doc = %document.name,
        pages = document.pages.len(),
        segment_count = segments.len(),
        "document packed"
    );
    Ok(segments)
}

fn pack_page(
    page: &Page,
    config: &PackConfig,
    overlap: usize,
    out: &mut Vec<Segment>,
) -> Result<(), EngineError> {
    let chars: Vec<char> = page.text.chars().collect();
    let sentences = split_sentences(&page.text);
    if sentences.is_empty() {
        return Ok(());
    }

    // Per-sentence token estimates; summing ceilings keeps the running
    // budget an upper bound on the real segment size.
    let sent_tokens: Vec<usize> = sentences
        .iter()
        .map(|&(s, e)| approx_tokens(&slice(&chars, s, e)))
        .collect();

    // Current segment: char range, running token bound, and the index of its
    // first own (non-seed) sentence for the overlap walk-back.
    let mut cur: Option<(usize, usize, usize, usize)> = None;

    for (idx, &(s, e)) in sentences.iter().enumerate() {
        let st = sent_tokens[idx];

        if st > config.max_tokens {
            // One atomic unit alone exceeds the budget.
            if let Some((cs, ce, _, _)) = cur.take() {
                out.push(make_segment(page.index, cs, ce, slice(&chars, cs, ce), false));
            }
            if !config.truncate_oversized {
                return Err(EngineError::OversizedUnit {
                    page: page.index,
                    tokens: st,
                    max_tokens: config.max_tokens,
                });
            }
            // Cut at a char boundary and mark; the span still records the
            // whole sentence so provenance stays honest about partial content.
            let keep = (config.max_tokens * 4).min(e - s);
            let mut text = slice(&chars, s, s + keep);
            text.push_str(TRUNCATION_MARKER);
            warn!(page = page.index, start = s, tokens = st, "oversized sentence truncated");
            out.push(make_segment(page.index, s, e, text, true));
            continue;
        }

        match cur {
            None => {
                cur = Some((s, e, st, idx));
            }
            Some((cs, ce, ct, first)) if ct + st > config.max_tokens => {
                out.push(make_segment(page.index, cs, ce, slice(&chars, cs, ce), false));

                // Seed the next segment with whole trailing sentences of the
                // one just emitted, up to the overlap budget.
                let mut seed_start = s;
                let mut seed_tokens = 0;
                for j in (first..idx).rev() {
                    if seed_tokens >= overlap
                        || seed_tokens + sent_tokens[j] + st > config.max_tokens
                    {
                        break;
                    }
                    seed_tokens += sent_tokens[j];
                    seed_start = sentences[j].0;
                }

                cur = Some((seed_start, e, seed_tokens + st, idx));
            }
            Some((cs, _, ct, first)) => {
                cur = Some((cs, e, ct + st, first));
            }
        }
    }

    if let Some((cs, ce, _, _)) = cur {
        out.push(make_segment(page.index, cs, ce, slice(&chars, cs, ce), false));
    }
    Ok(())
}
