use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rough latency/quality class of a candidate. Lower tiers are expected to
/// sit earlier in the priority list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityTier {
    Fast,
    Balanced,
    Robust,
}

/// One selectable backend model. Priority rank is the position in the
/// configured candidate list; the context window is injected configuration
/// and never inferred from the identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCandidate {
    pub identifier: String,
    pub tier: CapabilityTier,
    pub context_window: usize,
}

impl ModelCandidate {
    pub fn new(identifier: impl Into<String>, tier: CapabilityTier, context_window: usize) -> Self {
        Self {
            identifier: identifier.into(),
            tier,
            context_window,
        }
    }
}

/// Packing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackConfig {
    /// Token budget per segment.
    pub max_tokens: usize,
    /// Trailing content carried into the next segment at a cut point.
    pub overlap_tokens: usize,
    /// When true, a sentence exceeding `max_tokens` is cut and marked
    /// `[truncated]`; when false, packing fails with `OversizedUnit`.
    pub truncate_oversized: bool,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            overlap_tokens: 50,
            truncate_oversized: true,
        }
    }
}

/// Ranking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankConfig {
    /// Cap on segments injected into a question prompt.
    pub max_selected: usize,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self { max_selected: 8 }
    }
}

/// Fallback policy for the model resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverPolicy {
    /// Consecutive qualifying failures on one candidate before advancing.
    pub failure_threshold: u32,
    /// First cooldown on a failing candidate; doubles per consecutive failure.
    pub cooldown_base: Duration,
    /// Ceiling for the exponential cooldown.
    pub cooldown_cap: Duration,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 2,
            cooldown_base: Duration::from_millis(500),
            cooldown_cap: Duration::from_secs(8),
        }
    }
}

/// Immutable per-session configuration. Built by the external loader and
/// passed in whole; the core never touches process environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Backend candidates in priority order (index 0 is tried first).
    pub candidates: Vec<ModelCandidate>,
    pub pack: PackConfig,
    pub rank: RankConfig,
    pub resolver: ResolverPolicy,
    /// Hard cap on a single backend attempt. Timeouts count as transient
    /// failures for fallback purposes.
    pub attempt_timeout: Duration,
    /// Tokens reserved for the prompt scaffold when budgeting segments.
    pub scaffold_reserve_tokens: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            candidates: vec![
                ModelCandidate::new("gemini-1.5-flash", CapabilityTier::Fast, 30_000),
                ModelCandidate::new("gemini-2.0-flash", CapabilityTier::Fast, 30_000),
                ModelCandidate::new("gemini-1.5-pro", CapabilityTier::Robust, 120_000),
            ],
            pack: PackConfig::default(),
            rank: RankConfig::default(),
            resolver: ResolverPolicy::default(),
            attempt_timeout: Duration::from_secs(60),
            scaffold_reserve_tokens: 600,
        }
    }
}
