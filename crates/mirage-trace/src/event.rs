//! Command events
//!
//! One atomic shell statement observed during a session, tagged with the
//! tactic/technique the attacker reported for the call it came from.

use crate::labels::clean_label;
use serde::{Deserialize, Serialize};

/// A single labelled statement
///
/// Immutable once recorded: fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEvent {
    command: String,
    tactic: String,
    technique: String,
    tactic_raw: String,
    technique_raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    justification: Option<String>,
}

impl CommandEvent {
    /// Create an event from self-reported labels
    ///
    /// Labels are cleaned with [`clean_label`]; the raw values are kept.
    #[must_use]
    pub fn new(
        command: impl Into<String>,
        tactic_raw: impl Into<String>,
        technique_raw: impl Into<String>,
    ) -> Self {
        let tactic_raw = tactic_raw.into();
        let technique_raw = technique_raw.into();
        Self {
            command: command.into(),
            tactic: clean_label(&tactic_raw),
            technique: clean_label(&technique_raw),
            tactic_raw,
            technique_raw,
            justification: None,
        }
    }

    /// Attach the attacker's free-text justification
    #[inline]
    #[must_use]
    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        let justification = justification.into();
        if !justification.trim().is_empty() {
            self.justification = Some(justification);
        }
        self
    }

    /// Statement text
    #[inline]
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Cleaned tactic label
    #[inline]
    #[must_use]
    pub fn tactic(&self) -> &str {
        &self.tactic
    }

    /// Cleaned technique label
    #[inline]
    #[must_use]
    pub fn technique(&self) -> &str {
        &self.technique
    }

    /// Tactic exactly as reported
    #[inline]
    #[must_use]
    pub fn tactic_raw(&self) -> &str {
        &self.tactic_raw
    }

    /// Technique exactly as reported
    #[inline]
    #[must_use]
    pub fn technique_raw(&self) -> &str {
        &self.technique_raw
    }

    /// Free-text justification, if any
    #[inline]
    #[must_use]
    pub fn justification(&self) -> Option<&str> {
        self.justification.as_deref()
    }
}
