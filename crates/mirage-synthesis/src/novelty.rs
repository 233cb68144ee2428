//! Attack-sequence novelty
//!
//! Two distinct checks against the experiment's full trace history:
//! - [`NoveltyChecker::check_predicted`]: a candidate that was never deployed
//!   is judged by the sequence a model predicts it would attract
//! - [`NoveltyChecker::check_observed`]: a deployed configuration is judged
//!   by the sequence actually observed against it
//!
//! A sequence is novel if and only if no earlier session in any epoch
//! produced exactly the same ordered sequence.

use crate::request::GenerativeModel;
use mirage_trace::{clean_label, extract_array_block, AttackSequence, AttackStep, TraceHistory};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Result of a novelty check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoveltyVerdict {
    /// Sequence never observed before
    Novel(AttackSequence),
    /// Sequence already in the history
    Duplicate(AttackSequence),
    /// No sequence could be obtained for the candidate
    Unavailable(String),
}

impl NoveltyVerdict {
    /// Whether the candidate may be accepted
    #[inline]
    #[must_use]
    pub fn is_novel(&self) -> bool {
        matches!(self, Self::Novel(_))
    }
}

#[derive(Debug, Deserialize)]
struct PredictedStep {
    tactic: String,
    technique: String,
}

/// Parse a model's predicted attack pattern
///
/// Takes the first `[...]` block and reads it as a list of
/// `{tactic, technique}` objects; extra keys are ignored. Labels are cleaned
/// the same way agent-reported labels are.
///
/// # Errors
/// Returns a description of the failure if no list is found, it does not
/// parse, or it is empty.
pub fn parse_predicted_sequence(raw: &str) -> Result<AttackSequence, String> {
    let block = extract_array_block(raw).ok_or_else(|| "no list in prediction".to_string())?;
    let steps: Vec<PredictedStep> =
        serde_json::from_str(block).map_err(|e| format!("unparseable prediction: {e}"))?;
    if steps.is_empty() {
        return Err("empty prediction".to_string());
    }
    Ok(AttackSequence::from_steps(steps.into_iter().map(|step| {
        AttackStep::new(clean_label(&step.tactic), clean_label(&step.technique))
    })))
}

/// Prompt asking a model which techniques a configuration would attract
#[must_use]
pub fn prediction_prompt(candidate: &Value) -> String {
    let rendered = serde_json::to_string_pretty(candidate).unwrap_or_else(|_| candidate.to_string());
    format!(
        "Given the following honeypot configuration, list in order the MITRE ATT&CK tactics and \
         techniques an attacker would most likely use against it. Output only a JSON array of \
         objects, each with 'tactic', 'technique' and 'technique_id'.\n\nCONFIGURATION:\n{rendered}"
    )
}

/// Novelty checks over the trace history
#[derive(Clone)]
pub struct NoveltyChecker {
    predictor: Arc<dyn GenerativeModel>,
}

impl NoveltyChecker {
    /// Create a checker using `predictor` for bootstrap-time predictions
    #[inline]
    #[must_use]
    pub fn new(predictor: Arc<dyn GenerativeModel>) -> Self {
        Self { predictor }
    }

    /// Judge an undeployed candidate by its predicted sequence
    pub async fn check_predicted(&self, candidate: &Value, history: &TraceHistory) -> NoveltyVerdict {
        let raw = match self.predictor.generate(&prediction_prompt(candidate)).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Attack pattern prediction failed: {}", e);
                return NoveltyVerdict::Unavailable(e.to_string());
            }
        };

        match parse_predicted_sequence(&raw) {
            Ok(sequence) => Self::check_observed(sequence, history),
            Err(reason) => {
                tracing::warn!("Attack pattern prediction unusable: {}", reason);
                NoveltyVerdict::Unavailable(reason)
            }
        }
    }

    /// Judge an observed sequence
    ///
    /// The first sequence ever seen is always novel.
    #[must_use]
    pub fn check_observed(sequence: AttackSequence, history: &TraceHistory) -> NoveltyVerdict {
        if history.contains_sequence(&sequence) {
            tracing::debug!("Sequence already observed: {}", sequence);
            NoveltyVerdict::Duplicate(sequence)
        } else {
            NoveltyVerdict::Novel(sequence)
        }
    }
}

impl std::fmt::Debug for NoveltyChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoveltyChecker")
            .field("predictor", &self.predictor.model_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use async_trait::async_trait;
    use mirage_trace::{CommandEvent, SessionOutcome, TraceBuilder};
    use serde_json::json;

    struct Canned(Result<String, ModelError>);

    #[async_trait]
    impl GenerativeModel for Canned {
        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            self.0.clone()
        }
    }

    fn history_with(steps: &[(&str, &str)]) -> TraceHistory {
        let mut builder = TraceBuilder::new();
        for (tactic, technique) in steps {
            builder.push(CommandEvent::new("cmd ;", *tactic, *technique));
        }
        let mut history = TraceHistory::new();
        history.append(0, "cfg", builder.finish(SessionOutcome::IterationCap));
        history
    }

    #[test]
    fn parse_prediction_with_commentary() {
        let raw = r#"Likely:
[{"tactic": "TA0007:Discovery", "technique": "T1083", "technique_id": "T1083"},
 {"tactic": "Discovery", "technique": "T1083"},
 {"tactic": "Impact", "technique": "T1485"}]"#;
        let sequence = parse_predicted_sequence(raw).unwrap();
        assert_eq!(sequence.to_string(), "Discovery:T1083 -> Impact:T1485");
    }

    #[test]
    fn parse_prediction_failures() {
        assert!(parse_predicted_sequence("nothing here").is_err());
        assert!(parse_predicted_sequence("[1, 2]").is_err());
        assert!(parse_predicted_sequence("[]").is_err());
    }

    #[test]
    fn first_sequence_is_always_novel() {
        let sequence = AttackSequence::from_steps([AttackStep::new("Discovery", "T1083")]);
        assert!(NoveltyChecker::check_observed(sequence, &TraceHistory::new()).is_novel());
    }

    #[test]
    fn recorded_sequence_is_duplicate() {
        let history = history_with(&[("Discovery", "T1083"), ("Impact", "T1485")]);
        let sequence = AttackSequence::from_steps([
            AttackStep::new("Discovery", "T1083"),
            AttackStep::new("Impact", "T1485"),
        ]);
        assert!(matches!(
            NoveltyChecker::check_observed(sequence, &history),
            NoveltyVerdict::Duplicate(_)
        ));
    }

    #[tokio::test]
    async fn predicted_check_uses_model_output() {
        let history = history_with(&[("Discovery", "T1083")]);
        let candidate = json!({"services": []});

        let duplicate = NoveltyChecker::new(Arc::new(Canned(Ok(
            r#"[{"tactic": "Discovery", "technique": "T1083"}]"#.into(),
        ))));
        assert!(matches!(
            duplicate.check_predicted(&candidate, &history).await,
            NoveltyVerdict::Duplicate(_)
        ));

        let novel = NoveltyChecker::new(Arc::new(Canned(Ok(
            r#"[{"tactic": "Execution", "technique": "T1059"}]"#.into(),
        ))));
        assert!(novel.check_predicted(&candidate, &history).await.is_novel());

        let down = NoveltyChecker::new(Arc::new(Canned(Err(ModelError::Unavailable("503".into())))));
        assert!(matches!(
            down.check_predicted(&candidate, &history).await,
            NoveltyVerdict::Unavailable(_)
        ));
    }
}
