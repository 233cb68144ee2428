//! Generate → validate → check-novelty pipeline
//!
//! Each attempt walks a fixed state machine:
//!
//! ```text
//! DRAFTING → PARSED → NORMALIZED → VALIDATED → NOVEL → ACCEPTED
//!     └──────────┴──────────┴───────────┴────────┴──→ REJECTED ─→ DRAFTING (attempt + 1)
//!                                                         └─────→ EXHAUSTED (bound reached)
//! ```
//!
//! A rejected attempt is recorded with its cause and never raised. When every
//! attempt fails the outcome is [`SynthesisOutcome::Exhausted`] and the
//! caller keeps its current configuration.

use crate::config::HoneypotConfiguration;
use crate::document::{normalize, parse_document};
use crate::embedding::{CorpusIndex, Embedder};
use crate::error::DocumentError;
use crate::novelty::{NoveltyChecker, NoveltyVerdict};
use crate::request::{ConfigSummary, GenerationRequest, GenerativeModel, QueryComposer, RetrievalQuery};
use crate::retriever::VulnerabilityRetriever;
use crate::validator::{ConfigValidator, SchemaViolation};
use mirage_trace::{AttackSequence, TraceHistory};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Default bound on attempts per synthesis
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default number of retrieved vulnerabilities
pub const DEFAULT_TOP_K: usize = 5;

/// Synthesis settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    /// Attempts before giving up
    pub max_attempts: u32,
    /// Vulnerabilities retrieved per synthesis
    pub top_k: usize,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Per-attempt state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptState {
    /// Waiting for model output
    Drafting,
    /// Output parsed into a document
    Parsed,
    /// Identity assigned, plugin rule enforced
    Normalized,
    /// Schema satisfied
    Validated,
    /// Anticipated sequence not seen before
    Novel,
    /// Candidate accepted
    Accepted,
    /// Attempt failed
    Rejected,
    /// Attempt bound reached without acceptance
    Exhausted,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Drafting => "DRAFTING",
            Self::Parsed => "PARSED",
            Self::Normalized => "NORMALIZED",
            Self::Validated => "VALIDATED",
            Self::Novel => "NOVEL",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Exhausted => "EXHAUSTED",
        };
        f.write_str(name)
    }
}

/// Why an attempt was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", content = "detail", rename_all = "snake_case")]
pub enum RejectionCause {
    /// Model call failed
    Generation(String),
    /// Output could not be parsed
    Parse(String),
    /// Document could not be normalised
    Normalize(String),
    /// Schema violations
    Schema(Vec<SchemaViolation>),
    /// Valid document that does not map onto the typed model
    Conversion(String),
    /// Anticipated sequence already observed
    DuplicateSequence(String),
    /// No anticipated sequence could be obtained
    PredictionUnavailable(String),
}

impl fmt::Display for RejectionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation(e) => write!(f, "generation failed: {e}"),
            Self::Parse(e) => write!(f, "parse failed: {e}"),
            Self::Normalize(e) => write!(f, "normalisation failed: {e}"),
            Self::Schema(violations) => {
                write!(f, "{} schema violation(s)", violations.len())?;
                if let Some(first) = violations.first() {
                    write!(f, ", first at {first}")?;
                }
                Ok(())
            }
            Self::Conversion(e) => write!(f, "conversion failed: {e}"),
            Self::DuplicateSequence(sequence) => write!(f, "duplicate sequence: {sequence}"),
            Self::PredictionUnavailable(e) => write!(f, "prediction unavailable: {e}"),
        }
    }
}

impl RejectionCause {
    fn parse(err: &DocumentError) -> Self {
        Self::Parse(err.to_string())
    }

    fn duplicate(sequence: &AttackSequence) -> Self {
        Self::DuplicateSequence(sequence.to_string())
    }
}

/// Audit record of one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    /// One-based attempt number
    pub attempt: u32,
    /// States visited in order
    pub states: Vec<AttemptState>,
    /// Rejection cause, if rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<RejectionCause>,
}

impl AttemptRecord {
    /// Last state reached
    #[must_use]
    pub fn final_state(&self) -> AttemptState {
        self.states.last().copied().unwrap_or(AttemptState::Drafting)
    }
}

/// Result of running the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    /// A replacement configuration was produced
    Accepted {
        /// The new configuration
        config: Box<HoneypotConfiguration>,
        /// Every attempt, the last one accepted
        attempts: Vec<AttemptRecord>,
    },
    /// No replacement available
    Exhausted {
        /// Every rejected attempt
        attempts: Vec<AttemptRecord>,
    },
}

impl SynthesisOutcome {
    /// Attempt records in order
    #[must_use]
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::Accepted { attempts, .. } | Self::Exhausted { attempts } => attempts,
        }
    }

    /// Accepted configuration, if any
    #[must_use]
    pub fn config(&self) -> Option<&HoneypotConfiguration> {
        match self {
            Self::Accepted { config, .. } => Some(config),
            Self::Exhausted { .. } => None,
        }
    }

    /// Terminal state
    #[must_use]
    pub fn state(&self) -> AttemptState {
        match self {
            Self::Accepted { .. } => AttemptState::Accepted,
            Self::Exhausted { .. } => AttemptState::Exhausted,
        }
    }
}

/// Bounded generate-and-verify loop
#[derive(Clone)]
pub struct SynthesisPipeline {
    generator: Arc<dyn GenerativeModel>,
    validator: Arc<ConfigValidator>,
    novelty: NoveltyChecker,
    max_attempts: u32,
}

impl SynthesisPipeline {
    /// Create a pipeline with the default attempt bound
    #[must_use]
    pub fn new(
        generator: Arc<dyn GenerativeModel>,
        validator: Arc<ConfigValidator>,
        novelty: NoveltyChecker,
    ) -> Self {
        Self {
            generator,
            validator,
            novelty,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Set the attempt bound (at least one attempt always runs)
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Attempt bound
    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Schema used for validation and prompting
    #[inline]
    #[must_use]
    pub fn validator(&self) -> &ConfigValidator {
        &self.validator
    }

    /// Run attempts until one is accepted or the bound is reached
    pub async fn run(&self, request: &GenerationRequest<'_>, history: &TraceHistory) -> SynthesisOutcome {
        let prompt = request.render();
        let mut attempts = Vec::new();

        for attempt in 1..=self.max_attempts {
            let mut states = vec![AttemptState::Drafting];
            match self.attempt(&prompt, history, &mut states).await {
                Ok(config) => {
                    states.push(AttemptState::Accepted);
                    tracing::info!(
                        "Synthesis attempt {}/{} accepted configuration {}",
                        attempt,
                        self.max_attempts,
                        config.id
                    );
                    attempts.push(AttemptRecord {
                        attempt,
                        states,
                        cause: None,
                    });
                    return SynthesisOutcome::Accepted {
                        config: Box::new(config),
                        attempts,
                    };
                }
                Err(cause) => {
                    states.push(AttemptState::Rejected);
                    tracing::warn!(
                        "Synthesis attempt {}/{} rejected: {}",
                        attempt,
                        self.max_attempts,
                        cause
                    );
                    attempts.push(AttemptRecord {
                        attempt,
                        states,
                        cause: Some(cause),
                    });
                }
            }
        }

        tracing::warn!(
            "Synthesis exhausted after {} attempts, no replacement available",
            self.max_attempts
        );
        SynthesisOutcome::Exhausted { attempts }
    }

    async fn attempt(
        &self,
        prompt: &str,
        history: &TraceHistory,
        states: &mut Vec<AttemptState>,
    ) -> Result<HoneypotConfiguration, RejectionCause> {
        let raw = self
            .generator
            .generate(prompt)
            .await
            .map_err(|e| RejectionCause::Generation(e.to_string()))?;

        let (document, stage) = parse_document(&raw).map_err(|e| RejectionCause::parse(&e))?;
        tracing::debug!("Parsed generated document ({:?})", stage);
        states.push(AttemptState::Parsed);

        let document = normalize(document).map_err(|e| RejectionCause::Normalize(e.to_string()))?;
        states.push(AttemptState::Normalized);

        let document = Value::Object(document);
        self.validator.validate(&document).map_err(RejectionCause::Schema)?;
        let config = HoneypotConfiguration::from_value(document.clone())
            .map_err(|e| RejectionCause::Conversion(e.to_string()))?;
        states.push(AttemptState::Validated);

        match self.novelty.check_predicted(&document, history).await {
            NoveltyVerdict::Novel(sequence) => {
                tracing::debug!("Predicted sequence is novel: {}", sequence);
            }
            NoveltyVerdict::Duplicate(sequence) => return Err(RejectionCause::duplicate(&sequence)),
            NoveltyVerdict::Unavailable(reason) => {
                return Err(RejectionCause::PredictionUnavailable(reason))
            }
        }
        states.push(AttemptState::Novel);

        Ok(config)
    }
}

impl fmt::Debug for SynthesisPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesisPipeline")
            .field("generator", &self.generator.model_name())
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// Everything that happened during one synthesis, for audit
#[derive(Debug, Clone)]
pub struct SynthesisReport {
    /// Retrieval query used
    pub query: RetrievalQuery,
    /// Ids of the retrieved vulnerabilities
    pub vulnerabilities: Vec<String>,
    /// Retrieval failure, if retrieval could not run
    pub retrieval_error: Option<String>,
    /// Pipeline outcome
    pub outcome: SynthesisOutcome,
}

/// Full retrieve → generate → validate → check-novelty flow
pub struct ConfigSynthesizer {
    composer: QueryComposer,
    embedder: Arc<dyn Embedder>,
    index: Arc<CorpusIndex>,
    pipeline: SynthesisPipeline,
    top_k: usize,
}

impl ConfigSynthesizer {
    /// Create a synthesizer
    #[must_use]
    pub fn new(
        composer: QueryComposer,
        embedder: Arc<dyn Embedder>,
        index: Arc<CorpusIndex>,
        pipeline: SynthesisPipeline,
    ) -> Self {
        Self {
            composer,
            embedder,
            index,
            pipeline,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Apply settings (attempt bound and retrieval size)
    #[must_use]
    pub fn with_settings(mut self, settings: &SynthesisSettings) -> Self {
        self.top_k = settings.top_k;
        self.pipeline = self.pipeline.with_max_attempts(settings.max_attempts);
        self
    }

    /// Number of vulnerabilities retrieved per synthesis
    #[inline]
    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Produce a replacement for `current`, or a bootstrap configuration
    /// when `current` is `None`
    ///
    /// `deployed` lists every configuration deployed so far; their observed
    /// attacks steer the retrieval query. Never fails: retrieval problems
    /// and exhausted attempts are reported in the returned report.
    pub async fn synthesize(
        &self,
        current: Option<&HoneypotConfiguration>,
        deployed: &[HoneypotConfiguration],
        history: &TraceHistory,
    ) -> SynthesisReport {
        let prior: Vec<ConfigSummary> = deployed
            .iter()
            .map(|config| ConfigSummary::from_history(config, history))
            .collect();
        let query = self.composer.compose(&prior, current, self.top_k).await;
        tracing::info!("Retrieval query ({:?}): {}", query.source, query.text);

        let retriever = VulnerabilityRetriever::new(self.embedder.as_ref());
        let vulnerabilities = match retriever.retrieve(&query.text, &self.index, self.top_k).await {
            Ok(vulnerabilities) => vulnerabilities,
            Err(e) => {
                tracing::warn!("Vulnerability retrieval failed: {}", e);
                return SynthesisReport {
                    query,
                    vulnerabilities: Vec::new(),
                    retrieval_error: Some(e.to_string()),
                    outcome: SynthesisOutcome::Exhausted {
                        attempts: Vec::new(),
                    },
                };
            }
        };

        let request = GenerationRequest::new(self.pipeline.validator().schema(), &vulnerabilities)
            .with_seed(current);
        let outcome = self.pipeline.run(&request, history).await;

        SynthesisReport {
            query,
            vulnerabilities: vulnerabilities.into_iter().map(|v| v.id).collect(),
            retrieval_error: None,
            outcome,
        }
    }
}

impl fmt::Debug for ConfigSynthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSynthesizer")
            .field("pipeline", &self.pipeline)
            .field("corpus", &self.index.len())
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use async_trait::async_trait;
    use mirage_trace::{CommandEvent, SessionOutcome, TraceBuilder};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Replays canned outputs in order, repeating the last one
    struct Scripted {
        outputs: Mutex<Vec<Result<String, ModelError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(outputs: Vec<Result<String, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                outputs: Mutex::new(outputs),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl GenerativeModel for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            *self.calls.lock() += 1;
            let mut outputs = self.outputs.lock();
            if outputs.len() > 1 {
                outputs.remove(0)
            } else {
                outputs[0].clone()
            }
        }
    }

    fn valid_output() -> String {
        format!(
            "Here you go:\n{}\nGood luck!",
            json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "description": "ssh box",
                "services": [{
                    "id": "svc-1",
                    "protocol": "ssh",
                    "address": ":22",
                    "description": "OpenSSH 7.4",
                    "cve_tags": ["CVE-2018-15473"],
                    "cve_description": "User enumeration",
                    "commands": [],
                    "passwordRegex": ".*",
                    "deadlineTimeoutSeconds": 60,
                    "serverName": "ubuntu"
                }]
            })
        )
    }

    fn pipeline(generator: Arc<Scripted>, predictor: Arc<Scripted>) -> SynthesisPipeline {
        SynthesisPipeline::new(
            generator,
            Arc::new(ConfigValidator::reference().unwrap()),
            NoveltyChecker::new(predictor),
        )
    }

    fn predicts(tactic: &str, technique: &str) -> Arc<Scripted> {
        Scripted::new(vec![Ok(format!(
            r#"[{{"tactic": "{tactic}", "technique": "{technique}"}}]"#
        ))])
    }

    fn history_with(tactic: &str, technique: &str) -> TraceHistory {
        let mut builder = TraceBuilder::new();
        builder.push(CommandEvent::new("ls ;", tactic, technique));
        let mut history = TraceHistory::new();
        history.append(0, "old", builder.finish(SessionOutcome::IterationCap));
        history
    }

    #[tokio::test]
    async fn always_invalid_generator_exhausts_after_bound() {
        let generator = Scripted::new(vec![Ok("I cannot help with that.".into())]);
        let pipeline = pipeline(generator.clone(), predicts("Discovery", "T1083")).with_max_attempts(3);
        let schema = json!({});

        let outcome = pipeline
            .run(&GenerationRequest::new(&schema, &[]), &TraceHistory::new())
            .await;

        assert_eq!(outcome.state(), AttemptState::Exhausted);
        assert_eq!(outcome.attempts().len(), 3);
        assert_eq!(generator.calls(), 3);
        for record in outcome.attempts() {
            assert_eq!(record.states, vec![AttemptState::Drafting, AttemptState::Rejected]);
            assert!(matches!(record.cause, Some(RejectionCause::Parse(_))));
        }
    }

    #[tokio::test]
    async fn accepts_on_first_valid_novel_candidate() {
        let generator = Scripted::new(vec![
            Ok("{\"services\": []}".into()),
            Err(ModelError::Unavailable("rate limited".into())),
            Ok(valid_output()),
        ]);
        let pipeline = pipeline(generator, predicts("Execution", "T1059"));
        let schema = json!({});

        let outcome = pipeline
            .run(&GenerationRequest::new(&schema, &[]), &history_with("Discovery", "T1083"))
            .await;

        let attempts = outcome.attempts();
        assert_eq!(attempts.len(), 3);
        assert!(matches!(attempts[0].cause, Some(RejectionCause::Schema(_))));
        assert_eq!(attempts[0].final_state(), AttemptState::Rejected);
        assert_eq!(attempts[0].states[..3], [AttemptState::Drafting, AttemptState::Parsed, AttemptState::Normalized]);
        assert!(matches!(attempts[1].cause, Some(RejectionCause::Generation(_))));
        assert_eq!(
            attempts[2].states,
            vec![
                AttemptState::Drafting,
                AttemptState::Parsed,
                AttemptState::Normalized,
                AttemptState::Validated,
                AttemptState::Novel,
                AttemptState::Accepted,
            ]
        );

        let config = outcome.config().unwrap();
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].details.plugin(), None);
    }

    #[tokio::test]
    async fn duplicate_prediction_is_rejected() {
        let generator = Scripted::new(vec![Ok(valid_output())]);
        let pipeline = pipeline(generator, predicts("Discovery", "T1083")).with_max_attempts(2);
        let schema = json!({});

        let outcome = pipeline
            .run(&GenerationRequest::new(&schema, &[]), &history_with("Discovery", "T1083"))
            .await;

        assert_eq!(outcome.state(), AttemptState::Exhausted);
        assert!(outcome
            .attempts()
            .iter()
            .all(|a| matches!(a.cause, Some(RejectionCause::DuplicateSequence(_)))));
    }

    #[tokio::test]
    async fn unusable_prediction_is_rejected() {
        let generator = Scripted::new(vec![Ok(valid_output())]);
        let predictor = Scripted::new(vec![Ok("no idea".into())]);
        let pipeline = pipeline(generator, predictor).with_max_attempts(1);
        let schema = json!({});

        let outcome = pipeline
            .run(&GenerationRequest::new(&schema, &[]), &TraceHistory::new())
            .await;
        assert!(matches!(
            outcome.attempts()[0].cause,
            Some(RejectionCause::PredictionUnavailable(_))
        ));
    }

    #[test]
    fn rejection_cause_display() {
        let cause = RejectionCause::Schema(vec![SchemaViolation {
            path: "/services/0".into(),
            message: "\"plugin\" is a required property".into(),
        }]);
        assert_eq!(
            cause.to_string(),
            "1 schema violation(s), first at /services/0: \"plugin\" is a required property"
        );
        assert_eq!(AttemptState::Exhausted.to_string(), "EXHAUSTED");
    }
}
