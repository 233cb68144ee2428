//! Experiment-wide trace history
//!
//! Append-only: traces are recorded with the epoch and configuration they
//! were observed under and are never modified afterwards. Readers only get
//! shared slices.

use crate::trace::{AttackSequence, SessionTrace};
use serde::{Deserialize, Serialize};

/// A trace together with the epoch it was observed in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedTrace {
    /// Zero-based epoch index
    pub epoch: u32,
    /// Id of the configuration that was live
    pub config_id: String,
    /// The frozen trace
    pub trace: SessionTrace,
}

/// Append-only list of every trace in an experiment
#[derive(Debug, Clone, Default)]
pub struct TraceHistory {
    records: Vec<RecordedTrace>,
}

impl TraceHistory {
    /// Empty history
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trace
    pub fn append(&mut self, epoch: u32, config_id: impl Into<String>, trace: SessionTrace) {
        self.records.push(RecordedTrace {
            epoch,
            config_id: config_id.into(),
            trace,
        });
    }

    /// All records in observation order
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[RecordedTrace] {
        &self.records
    }

    /// Records of one epoch
    pub fn epoch(&self, epoch: u32) -> impl Iterator<Item = &RecordedTrace> {
        self.records.iter().filter(move |record| record.epoch == epoch)
    }

    /// Number of recorded traces
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was recorded yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Attack sequences of every non-empty trace, across all epochs
    pub fn sequences(&self) -> impl Iterator<Item = AttackSequence> + '_ {
        self.records
            .iter()
            .map(|record| record.trace.attack_sequence())
            .filter(|sequence| !sequence.is_empty())
    }

    /// Whether `sequence` was already observed in any epoch
    #[must_use]
    pub fn contains_sequence(&self, sequence: &AttackSequence) -> bool {
        self.sequences().any(|known| &known == sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CommandEvent;
    use crate::trace::{AttackStep, SessionOutcome, TraceBuilder};

    fn trace(steps: &[(&str, &str)]) -> SessionTrace {
        let mut builder = TraceBuilder::new();
        for (tactic, technique) in steps {
            builder.push(CommandEvent::new("cmd ;", *tactic, *technique));
        }
        builder.finish(SessionOutcome::IterationCap)
    }

    #[test]
    fn contains_sequence_across_epochs() {
        let mut history = TraceHistory::new();
        history.append(0, "cfg-a", trace(&[("Discovery", "T1083"), ("Impact", "T1485")]));
        history.append(1, "cfg-b", trace(&[("Execution", "T1059")]));

        let old = AttackSequence::from_steps([
            AttackStep::new("Discovery", "T1083"),
            AttackStep::new("Impact", "T1485"),
        ]);
        assert!(history.contains_sequence(&old));

        let new = AttackSequence::from_steps([AttackStep::new("Impact", "T1485")]);
        assert!(!history.contains_sequence(&new));

        assert_eq!(history.epoch(1).count(), 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn empty_traces_have_no_sequence() {
        let mut history = TraceHistory::new();
        history.append(0, "cfg-a", trace(&[]));
        assert_eq!(history.sequences().count(), 0);
        assert!(!history.contains_sequence(&AttackSequence::default()));
    }
}
