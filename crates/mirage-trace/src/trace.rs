//! Session traces
//!
//! A [`SessionTrace`] is built incrementally through a [`TraceBuilder`] while
//! a session runs and frozen when it ends. Derived fields (session text, RLE
//! label sequences, event count) are computed once at freeze time so the
//! persisted record is always consistent with its events.

use crate::event::CommandEvent;
use crate::labels::{expand, run_length_encode};
use crate::LabelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Sortable session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Ulid);

impl SessionId {
    /// Generate a new session id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Underlying ULID
    #[inline]
    #[must_use]
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session_{}", self.0)
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Agent called `terminate`
    Terminated {
        /// Self-reported success
        success: bool,
    },
    /// Iteration cap reached
    IterationCap,
    /// Agent could not be reached; the trace holds what was gathered so far
    AgentUnavailable,
}

impl SessionOutcome {
    /// Whether the agent ended the session itself
    #[inline]
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated { .. })
    }
}

/// One (tactic, technique) step of an attack
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackStep {
    /// Cleaned tactic label
    pub tactic: String,
    /// Cleaned technique label
    pub technique: String,
}

impl AttackStep {
    /// Create a step
    #[must_use]
    pub fn new(tactic: impl Into<String>, technique: impl Into<String>) -> Self {
        Self {
            tactic: tactic.into(),
            technique: technique.into(),
        }
    }
}

/// Ordered tactic/technique sequence of an attack
///
/// Consecutive identical steps are collapsed, so a sequence describes the
/// order in which techniques were used rather than how many statements each
/// one took. Two sequences are the same attack if and only if they are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttackSequence(Vec<AttackStep>);

impl AttackSequence {
    /// Build a sequence, collapsing consecutive duplicates
    #[must_use]
    pub fn from_steps(steps: impl IntoIterator<Item = AttackStep>) -> Self {
        let mut collapsed: Vec<AttackStep> = Vec::new();
        for step in steps {
            if collapsed.last() != Some(&step) {
                collapsed.push(step);
            }
        }
        Self(collapsed)
    }

    /// Sequence of a list of command events
    #[must_use]
    pub fn from_events(events: &[CommandEvent]) -> Self {
        Self::from_steps(
            events
                .iter()
                .map(|event| AttackStep::new(event.tactic(), event.technique())),
        )
    }

    /// Steps in order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[AttackStep] {
        &self.0
    }

    /// Number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the sequence has no steps
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AttackSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}:{}", step.tactic, step.technique)?;
        }
        Ok(())
    }
}

/// Frozen record of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTrace {
    id: SessionId,
    /// Statements joined by single spaces
    session: String,
    tactics: String,
    techniques: String,
    length: usize,
    iterations: u32,
    outcome: SessionOutcome,
    full_session: Vec<CommandEvent>,
}

impl SessionTrace {
    /// Session id
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Concatenated statement text
    #[inline]
    #[must_use]
    pub fn session_text(&self) -> &str {
        &self.session
    }

    /// RLE tactic sequence
    #[inline]
    #[must_use]
    pub fn tactics(&self) -> &str {
        &self.tactics
    }

    /// RLE technique sequence
    #[inline]
    #[must_use]
    pub fn techniques(&self) -> &str {
        &self.techniques
    }

    /// Number of events
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether no events were recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Agent iterations consumed
    #[inline]
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// How the session ended
    #[inline]
    #[must_use]
    pub fn outcome(&self) -> SessionOutcome {
        self.outcome
    }

    /// Events in order
    #[inline]
    #[must_use]
    pub fn events(&self) -> &[CommandEvent] {
        &self.full_session
    }

    /// Expanded per-event technique labels
    ///
    /// # Errors
    /// Returns [`LabelError`] if the stored sequence is corrupt (only
    /// possible for traces deserialized from edited files).
    pub fn technique_labels(&self) -> Result<Vec<String>, LabelError> {
        expand(&self.techniques)
    }

    /// Expanded per-event tactic labels
    ///
    /// # Errors
    /// See [`SessionTrace::technique_labels`].
    pub fn tactic_labels(&self) -> Result<Vec<String>, LabelError> {
        expand(&self.tactics)
    }

    /// Collapsed attack sequence of this session
    #[must_use]
    pub fn attack_sequence(&self) -> AttackSequence {
        AttackSequence::from_events(&self.full_session)
    }
}

/// Incremental builder for a [`SessionTrace`]
#[derive(Debug, Clone, Default)]
pub struct TraceBuilder {
    id: SessionId,
    events: Vec<CommandEvent>,
    iterations: u32,
}

impl TraceBuilder {
    /// Builder for a fresh session id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific session id
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = id;
        self
    }

    /// Record the number of iterations consumed
    #[inline]
    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Append an event
    #[inline]
    pub fn push(&mut self, event: CommandEvent) {
        self.events.push(event);
    }

    /// Number of events so far
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events were pushed yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Freeze into a trace
    #[must_use]
    pub fn finish(self, outcome: SessionOutcome) -> SessionTrace {
        let tactics: Vec<&str> = self.events.iter().map(CommandEvent::tactic).collect();
        let techniques: Vec<&str> = self.events.iter().map(CommandEvent::technique).collect();
        let session = self
            .events
            .iter()
            .map(CommandEvent::command)
            .collect::<Vec<_>>()
            .join(" ");

        SessionTrace {
            id: self.id,
            session,
            tactics: run_length_encode(&tactics),
            techniques: run_length_encode(&techniques),
            length: self.events.len(),
            iterations: self.iterations,
            outcome,
            full_session: self.events,
        }
    }
}

impl Extend<CommandEvent> for TraceBuilder {
    fn extend<T: IntoIterator<Item = CommandEvent>>(&mut self, iter: T) {
        self.events.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn scenario() -> SessionTrace {
        let mut builder = TraceBuilder::new().with_iterations(4);
        builder.push(CommandEvent::new("ls", "Discovery", "T1083"));
        builder.push(CommandEvent::new("whoami", "Discovery", "T1033"));
        builder.push(CommandEvent::new("rm -rf /", "Impact", "T1485"));
        builder.finish(SessionOutcome::Terminated { success: true })
    }

    #[test]
    fn frozen_trace_derives_rle_sequences() {
        let trace = scenario();
        assert_eq!(trace.tactics(), "Discovery - 1 -- Impact - 2");
        assert_eq!(trace.techniques(), "T1083 - 0 -- T1033 - 1 -- T1485 - 2");
        assert_eq!(trace.session_text(), "ls whoami rm -rf /");
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.iterations(), 4);
    }

    #[test]
    fn attack_sequence_collapses_repeats() {
        let mut builder = TraceBuilder::new();
        builder.extend([
            CommandEvent::new("ls ;", "Discovery", "T1083"),
            CommandEvent::new("ls /tmp ;", "Discovery", "T1083"),
            CommandEvent::new("id ;", "Discovery", "T1033"),
            CommandEvent::new("ls ;", "Discovery", "T1083"),
        ]);
        let sequence = builder.finish(SessionOutcome::IterationCap).attack_sequence();

        assert_eq!(sequence.len(), 3);
        assert_eq!(
            sequence.to_string(),
            "Discovery:T1083 -> Discovery:T1033 -> Discovery:T1083"
        );
    }

    #[test]
    fn empty_trace() {
        let trace = TraceBuilder::new().finish(SessionOutcome::AgentUnavailable);
        assert!(trace.is_empty());
        assert_eq!(trace.tactics(), "");
        assert!(trace.attack_sequence().is_empty());
        assert!(trace.technique_labels().unwrap().is_empty());
    }

    #[test]
    fn trace_serializes_persisted_field_names() {
        let value = serde_json::to_value(scenario()).unwrap();
        for key in ["id", "session", "tactics", "techniques", "length", "outcome", "full_session"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["outcome"]["kind"], "terminated");
    }

    proptest! {
        #[test]
        fn prop_length_matches_expanded_sequences(
            labels in proptest::collection::vec(
                (prop_oneof![Just("Discovery"), Just("Execution"), Just("Impact")],
                 prop_oneof![Just("T1083"), Just("T1059"), Just("T1485"), Just("T1033")]),
                0..50,
            )
        ) {
            let mut builder = TraceBuilder::new();
            for (i, (tactic, technique)) in labels.iter().enumerate() {
                builder.push(CommandEvent::new(format!("cmd{i} ;"), *tactic, *technique));
            }
            let trace = builder.finish(SessionOutcome::IterationCap);

            prop_assert_eq!(trace.len(), labels.len());
            prop_assert_eq!(trace.tactic_labels().unwrap().len(), trace.len());
            prop_assert_eq!(trace.technique_labels().unwrap().len(), trace.len());
        }
    }
}
