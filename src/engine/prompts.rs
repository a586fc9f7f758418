//! Prompt assembler: persona, task directive, tagged segments, and output
//! format instructions, capped to the active candidate's window.

use crate::doc::pack::approx_tokens;
use crate::doc::types::Query;
use crate::engine::rank::RankedSegment;
use crate::error::EngineError;

/// Heading names the brief directive demands and the response mapper locates.
pub const BRIEF_SECTIONS: [&str; 3] =
    ["FINANCIAL HIGHLIGHTS", "OPERATIONAL RISKS", "STRATEGIC OUTLOOK"];

pub const PERSONA: &str = "\
ROLE: You are a senior financial analyst reviewing an ingested report. \
Work ONLY from the source excerpts provided below. Never invent figures; \
if the excerpts are silent on a point, say so.";

const BRIEF_DIRECTIVE: &str = "\
TASK: Synthesize the source excerpts into a structured Executive Brief.

OUTPUT FORMAT — exactly three sections with these headings:
FINANCIAL HIGHLIGHTS
(revenue, margins, growth)
OPERATIONAL RISKS
(operational, supply chain, regulatory)
STRATEGIC OUTLOOK
(future goals, R&D, expansion)";

const BRIEF_DIRECTIVE_STRICT: &str = "\
TASK: Synthesize the source excerpts into a structured Executive Brief.

OUTPUT FORMAT — STRICT. Your reply must contain exactly these three headings, \
uppercase, each on its own line, in this order, with prose under each:
FINANCIAL HIGHLIGHTS
OPERATIONAL RISKS
STRATEGIC OUTLOOK
Do not add any other headings, preamble, or closing remarks.";

const ANSWER_DIRECTIVE: &str = "\
TASK: Answer the user's question using ONLY the source excerpts. Cite \
specific figures where the excerpts contain them.

CITATIONS: every claim drawn from an excerpt must carry its tag inline, \
e.g. [S:3f9a0c1d2b4e5f60]. Only cite tags that appear in the excerpts below.";

/// Assemble the full instruction payload for a query. Pure function of its
/// inputs; fails with `ContextOverflow` instead of silently truncating.
pub fn assemble(
    query: &Query,
    selection: &[RankedSegment],
    window_tokens: usize,
) -> Result<String, EngineError> {
    assemble_inner(query, selection, window_tokens, false)
}

/// Stricter variant used for the single corrective re-prompt after a
/// malformed brief.
pub fn assemble_strict_brief(
    selection: &[RankedSegment],
    window_tokens: usize,
) -> Result<String, EngineError> {
    assemble_inner(&Query::Summary, selection, window_tokens, true)
}

fn assemble_inner(
    query: &Query,
    selection: &[RankedSegment],
    window_tokens: usize,
    strict: bool,
) -> Result<String, EngineError> {
    let mut prompt = String::new();
    prompt.push_str(PERSONA);
    prompt.push_str("\n\n");

    match query {
        Query::Summary if strict => prompt.push_str(BRIEF_DIRECTIVE_STRICT),
        Query::Summary => prompt.push_str(BRIEF_DIRECTIVE),
        Query::Question(_) => prompt.push_str(ANSWER_DIRECTIVE),
    }

    prompt.push_str("\n\nSOURCE EXCERPTS:\n");
    for ranked in selection {
        let seg = &ranked.segment;
        prompt.push_str(&format!("\n[S:{} | page {}]\n{}\n", seg.id, seg.page, seg.text));
    }

    if let Query::Question(text) = query {
        prompt.push_str(&format!("\nQUESTION: {}\n", text));
    }

    // Final defensive check: ranking should already have respected the
    // budget, so tripping this means misconfiguration, not content to drop.
    let required = approx_tokens(&prompt);
    if required > window_tokens {
        return Err(EngineError::ContextOverflow {
            required,
            window: window_tokens,
        });
    }

    Ok(prompt)
}
