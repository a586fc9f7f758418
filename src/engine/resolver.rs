//! Model resolver: forward-only selection among prioritized backend
//! candidates, with bounded per-candidate backoff before escalating.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{ModelCandidate, ResolverPolicy};
use crate::error::EngineError;
use crate::llm::FailureKind;

pub struct ModelResolver {
    candidates: Vec<ModelCandidate>,
    policy: ResolverPolicy,
    current: usize,
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
    exhausted: bool,
}

impl ModelResolver {
    pub fn new(candidates: Vec<ModelCandidate>, policy: ResolverPolicy) -> Self {
        let exhausted = candidates.is_empty();
        Self {
            candidates,
            policy,
            current: 0,
            consecutive_failures: 0,
            cooldown_until: None,
            exhausted,
        }
    }

    /// The candidate the next attempt should use. During cooldown this is
    /// still the same candidate; callers wait out `cooldown_remaining` first.
    pub fn current(&self) -> Result<&ModelCandidate, EngineError> {
        if self.exhausted {
            return Err(EngineError::NoCandidatesAvailable);
        }
        Ok(&self.candidates[self.current])
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Time left before the current candidate should be retried, if a
    /// cooldown is armed.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let until = self.cooldown_until?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    /// Record a classified failure from the backend. Rate limits and
    /// transient errors count toward the fallback threshold; a fatal auth
    /// error ends the session immediately since no candidate can fix an
    /// invalid credential.
    pub fn report_failure(&mut self, kind: FailureKind) {
        if self.exhausted {
            return;
        }
        match kind {
            FailureKind::FatalAuth => {
                warn!(
                    candidate = %self.candidates[self.current].identifier,
                    "fatal auth failure, resolver exhausted"
                );
                self.exhausted = true;
                self.cooldown_until = None;
            }
            FailureKind::RateLimited | FailureKind::Transient => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.policy.failure_threshold {
                    self.advance();
                } else {
                    // Bounded exponential backoff on the same candidate.
                    let factor = 1u32 << (self.consecutive_failures - 1).min(16);
                    let wait = (self.policy.cooldown_base * factor).min(self.policy.cooldown_cap);
                    self.cooldown_until = Some(Instant::now() + wait);
                    info!(
                        candidate = %self.candidates[self.current].identifier,
                        failures = self.consecutive_failures,
                        cooldown_ms = wait.as_millis() as u64,
                        "backend failure, cooling down"
                    );
                }
            }
        }
    }

    /// Record a successful call. Clears the failure streak but never reverts
    /// the index: a confirmed-working fallback is preferred going forward.
    pub fn report_success(&mut self) {
        self.consecutive_failures = 0;
        self.cooldown_until = None;
    }

    fn advance(&mut self) {
        let from = self.candidates[self.current].identifier.clone();
        self.current += 1;
        self.consecutive_failures = 0;
        self.cooldown_until = None;
        if self.current >= self.candidates.len() {
            self.exhausted = true;
            warn!(last_candidate = %from, "all candidates exhausted");
        } else {
            info!(
                from = %from,
                to = %self.candidates[self.current].identifier,
                "falling back to next candidate"
            );
        }
    }
}
