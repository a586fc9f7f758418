//! Session pipeline: pack once, then rank, assemble, resolve, call, and map
//! per query, with the resolver consulted before every backend attempt.

pub mod prompts;
pub mod rank;
pub mod resolver;
pub mod respond;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::doc::pack::pack;
use crate::doc::types::{Document, Query, Segment};
use crate::error::EngineError;
use crate::llm::{Backend, BackendFailure, FailureKind};
use rank::rank;
use resolver::ModelResolver;
use respond::{parse_response, Answer, ExecutiveBrief, ParseFailure, Parsed};

/// One analysis session over one ingested document. Packs on construction;
/// the segment set is immutable for the session's lifetime. Independent
/// sessions share nothing mutable.
pub struct Session {
    config: EngineConfig,
    segments: Vec<Segment>,
    resolver: ModelResolver,
    backend: Arc<dyn Backend>,
}

impl Session {
    pub fn new(
        document: &Document,
        backend: Arc<dyn Backend>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let segments = pack(document, &config.pack)?;
        let resolver = ModelResolver::new(config.candidates.clone(), config.resolver.clone());
        info!(
            doc = %document.name,
            segment_count = segments.len(),
            candidates = config.candidates.len(),
            "session opened"
        );
        Ok(Self {
            config,
            segments,
            resolver,
            backend,
        })
    }

    /// The packed segment set, for provenance inspection by the caller.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Synthesize the three-part executive brief for the whole document.
    pub async fn executive_brief(&mut self) -> Result<ExecutiveBrief, EngineError> {
        match self.run(Query::Summary).await? {
            Parsed::Brief(brief) => Ok(brief),
            _ => Err(EngineError::MalformedBrief {
                detail: "summary produced a non-brief response".into(),
            }),
        }
    }

    /// Answer a free-form question with citations into the packed segments.
    pub async fn ask(&mut self, question: &str) -> Result<Answer, EngineError> {
        match self.run(Query::Question(question.to_string())).await? {
            Parsed::Answer(answer) => Ok(answer),
            _ => Err(EngineError::MalformedBrief {
                detail: "question produced a non-answer response".into(),
            }),
        }
    }

    async fn run(&mut self, query: Query) -> Result<Parsed, EngineError> {
        // Set after the first malformed brief; exactly one stricter re-prompt
        // runs before the error surfaces.
        let mut strict = false;

        loop {
            let candidate = self.resolver.current()?.clone();
            if let Some(wait) = self.resolver.cooldown_remaining() {
                debug!(cooldown_ms = wait.as_millis() as u64, "waiting out cooldown");
                tokio::time::sleep(wait).await;
            }

            let budget = candidate
                .context_window
                .saturating_sub(self.config.scaffold_reserve_tokens);
            let selection = rank(&self.segments, &query, budget, &self.config.rank);
            let in_context: Vec<Segment> =
                selection.iter().map(|r| r.segment.clone()).collect();

            let prompt = if strict {
                prompts::assemble_strict_brief(&selection, candidate.context_window)?
            } else {
                prompts::assemble(&query, &selection, candidate.context_window)?
            };

            debug!(
                model = %candidate.identifier,
                segments_in_prompt = in_context.len(),
                strict,
                "attempting backend call"
            );

            let raw = match self.attempt(&candidate.identifier, &prompt).await {
                Ok(raw) => raw,
                Err(failure) => {
                    warn!(model = %candidate.identifier, error = %failure, "backend attempt failed");
                    let fatal = failure.kind == FailureKind::FatalAuth;
                    self.resolver.report_failure(failure.kind);
                    if fatal {
                        // No candidate can fix an invalid credential; the
                        // resolver is exhausted and the failure surfaces now.
                        return Err(EngineError::Backend(failure));
                    }
                    // Transient trouble is absorbed by the fallback; an
                    // exhausted resolver errors out of current() above.
                    continue;
                }
            };
            self.resolver.report_success();

            match parse_response(&raw, &query, &in_context) {
                Parsed::Failure(ParseFailure::EmptyResponse) => {
                    // Degenerate output; let the fallback logic bound retries.
                    warn!(model = %candidate.identifier, "empty response from backend");
                    self.resolver.report_failure(FailureKind::Transient);
                }
                Parsed::Failure(failure) if !strict => {
                    warn!(?failure, "malformed brief, issuing one corrective re-prompt");
                    strict = true;
                }
                Parsed::Failure(failure) => {
                    return Err(EngineError::MalformedBrief {
                        detail: format!("{failure:?}"),
                    });
                }
                parsed => return Ok(parsed),
            }
        }
    }

    /// One bounded backend attempt. A timeout counts as a transient failure
    /// so hung calls feed the same fallback path.
    async fn attempt(&self, model: &str, prompt: &str) -> Result<String, BackendFailure> {
        match tokio::time::timeout(
            self.config.attempt_timeout,
            self.backend.generate(model, prompt),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BackendFailure::new(
                FailureKind::Transient,
                format!("attempt timed out after {:?}", self.config.attempt_timeout),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::{CapabilityTier, ModelCandidate, ResolverPolicy};

    const VALID_BRIEF: &str = "\
FINANCIAL HIGHLIGHTS
Revenue grew 12% year over year.

OPERATIONAL RISKS
Supply chain disruption remains the main exposure.

STRATEGIC OUTLOOK
Expansion into adjacent markets continues.";

    /// Backend replaying a fixed script of outcomes, recording the model
    /// used for each call.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<String, BackendFailure>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<String, BackendFailure>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn models_called(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
        }

        fn prompts(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn generate(&self, model: &str, prompt: &str) -> Result<String, BackendFailure> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), prompt.to_string()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendFailure::new(FailureKind::Transient, "script empty")))
        }
    }

    /// Backend that cites the first tagged segment it sees in the prompt.
    struct EchoCitingBackend;

    #[async_trait]
    impl Backend for EchoCitingBackend {
        async fn generate(&self, _model: &str, prompt: &str) -> Result<String, BackendFailure> {
            // Cite the tag of the excerpt that mentions the risk.
            let anchor = prompt
                .find("supply chain disruption")
                .expect("ranked prompt carries the risk excerpt");
            let tag_start = prompt[..anchor].rfind("[S:").expect("excerpt is tagged");
            let id = prompt[tag_start + 3..]
                .split_whitespace()
                .next()
                .unwrap()
                .to_string();
            Ok(format!(
                "The primary risk is supply chain disruption [S:{}].",
                id
            ))
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            candidates: vec![
                ModelCandidate::new("fast", CapabilityTier::Fast, 10_000),
                ModelCandidate::new("robust", CapabilityTier::Robust, 10_000),
            ],
            resolver: ResolverPolicy {
                failure_threshold: 2,
                cooldown_base: Duration::from_millis(1),
                cooldown_cap: Duration::from_millis(4),
            },
            attempt_timeout: Duration::from_millis(200),
            ..EngineConfig::default()
        }
    }

    fn report_doc() -> Document {
        Document::from_pages(
            "annual-report",
            vec![
                "Revenue grew twelve percent year over year. Margins held steady at forty percent."
                    .into(),
                "The main risk is supply chain disruption in Asia. Regulatory pressure also rose."
                    .into(),
                "The board approved expansion into two new markets. R&D spend will double.".into(),
            ],
        )
    }

    #[tokio::test]
    async fn test_brief_happy_path() {
        init_tracing();
        let backend = ScriptedBackend::new(vec![Ok(VALID_BRIEF.to_string())]);
        let mut session = Session::new(&report_doc(), backend.clone(), test_config()).unwrap();

        let brief = session.executive_brief().await.unwrap();
        assert!(brief.financial_highlights.contains("12%"));
        assert_eq!(backend.models_called(), vec!["fast"]);
    }

    #[tokio::test]
    async fn test_rate_limit_falls_back_to_second_candidate() {
        init_tracing();
        let backend = ScriptedBackend::new(vec![
            Err(BackendFailure::new(FailureKind::RateLimited, "429")),
            Err(BackendFailure::new(FailureKind::RateLimited, "429")),
            Ok(VALID_BRIEF.to_string()),
        ]);
        let mut session = Session::new(&report_doc(), backend.clone(), test_config()).unwrap();

        let brief = session.executive_brief().await.unwrap();
        assert!(brief.strategic_outlook.contains("adjacent"));
        assert_eq!(backend.models_called(), vec!["fast", "fast", "robust"]);
    }

    #[tokio::test]
    async fn test_fatal_auth_surfaces_without_fallback() {
        let backend = ScriptedBackend::new(vec![Err(BackendFailure::new(
            FailureKind::FatalAuth,
            "401",
        ))]);
        let mut session = Session::new(&report_doc(), backend.clone(), test_config()).unwrap();

        let err = session.ask("What is the primary risk?").await.unwrap_err();
        match err {
            EngineError::Backend(f) => assert_eq!(f.kind, FailureKind::FatalAuth),
            other => panic!("unexpected error: {other:?}"),
        }
        // robust was still configured but never tried, and the session is done
        assert_eq!(backend.models_called(), vec!["fast"]);
        let err = session.ask("Follow-up?").await.unwrap_err();
        assert!(matches!(err, EngineError::NoCandidatesAvailable));
        assert_eq!(backend.models_called(), vec!["fast"]);
    }

    #[tokio::test]
    async fn test_exhaustion_after_all_candidates_fail() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendFailure::new(FailureKind::Transient, "boom")),
            Err(BackendFailure::new(FailureKind::Transient, "boom")),
            Err(BackendFailure::new(FailureKind::Transient, "boom")),
            Err(BackendFailure::new(FailureKind::Transient, "boom")),
        ]);
        let mut session = Session::new(&report_doc(), backend.clone(), test_config()).unwrap();

        let err = session.executive_brief().await.unwrap_err();
        assert!(matches!(err, EngineError::NoCandidatesAvailable));
        assert_eq!(
            backend.models_called(),
            vec!["fast", "fast", "robust", "robust"]
        );
    }

    #[tokio::test]
    async fn test_malformed_brief_triggers_single_strict_reprompt() {
        let backend = ScriptedBackend::new(vec![
            Ok("I summarized the report but forgot the headings.".to_string()),
            Ok(VALID_BRIEF.to_string()),
        ]);
        let mut session = Session::new(&report_doc(), backend.clone(), test_config()).unwrap();

        let brief = session.executive_brief().await.unwrap();
        assert!(brief.operational_risks.contains("Supply chain"));

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("STRICT"));
        assert!(prompts[1].contains("STRICT"));
    }

    #[tokio::test]
    async fn test_malformed_brief_surfaces_after_strict_retry() {
        let backend = ScriptedBackend::new(vec![
            Ok("no headings here".to_string()),
            Ok("still no headings".to_string()),
        ]);
        let mut session = Session::new(&report_doc(), backend.clone(), test_config()).unwrap();

        let err = session.executive_brief().await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedBrief { .. }));
        assert_eq!(backend.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_question_scenario_cites_matching_segment() {
        let backend = Arc::new(EchoCitingBackend);
        let mut session = Session::new(&report_doc(), backend, test_config()).unwrap();

        let answer = session.ask("What is the primary risk?").await.unwrap();
        assert_eq!(answer.citations.len(), 1);

        let cited = session
            .segments()
            .iter()
            .find(|s| s.id == answer.citations[0].segment_id)
            .expect("citation references a packed segment");
        assert!(cited.text.contains("supply chain disruption"));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient_and_recovers() {
        /// Slow on the first call only, then well-formed.
        struct SlowFirstBackend {
            calls: Mutex<u32>,
        }

        #[async_trait]
        impl Backend for SlowFirstBackend {
            async fn generate(&self, _model: &str, _prompt: &str) -> Result<String, BackendFailure> {
                let first = {
                    let mut calls = self.calls.lock().unwrap();
                    *calls += 1;
                    *calls == 1
                };
                if first {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(VALID_BRIEF.to_string())
            }
        }

        let backend = Arc::new(SlowFirstBackend {
            calls: Mutex::new(0),
        });
        let mut config = test_config();
        config.attempt_timeout = Duration::from_millis(20);
        let mut session = Session::new(&report_doc(), backend, config).unwrap();

        // First attempt hangs past the timeout, is reported transient, and
        // the retry on the same candidate succeeds.
        let brief = session.executive_brief().await.unwrap();
        assert!(brief.financial_highlights.contains("Revenue"));
    }

    #[tokio::test]
    async fn test_empty_response_feeds_fallback() {
        let backend = ScriptedBackend::new(vec![
            Ok("".to_string()),
            Ok(VALID_BRIEF.to_string()),
        ]);
        let mut session = Session::new(&report_doc(), backend.clone(), test_config()).unwrap();

        let brief = session.executive_brief().await.unwrap();
        assert!(brief.strategic_outlook.contains("markets"));
        assert_eq!(backend.models_called(), vec!["fast", "fast"]);
    }
}
