//! Criterion dispatch and decisions
//!
//! [`ReconfigCriterion`] is a closed set of strategies dispatched by variant.
//! Each variant owns its accumulator for the lifetime of an epoch; the
//! controller decides when [`ReconfigCriterion::reset`] fires.

use crate::diversity::DiversityPlateau;
use crate::entropy::EntropyPlateau;
use crate::error::CriterionError;
use crate::fixed::{FixedInterval, Never};
use mirage_trace::SessionTrace;
use serde::Serialize;
use std::fmt;

/// Why a criterion did or did not ask for reconfiguration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DecisionReason {
    /// The criterion never reconfigures
    Disabled,
    /// Session count against a fixed interval
    Interval {
        /// Sessions since the last reset
        sessions: u32,
        /// Configured interval
        interval: u32,
    },
    /// Fewer updates than the smoothing window
    InsufficientHistory {
        /// Updates since the last reset
        updates: usize,
        /// Required window
        window: usize,
    },
    /// Mean per-session growth of distinct techniques
    DiversityIncrease {
        /// Observed mean increase over the window
        mean_increase: f64,
        /// Threshold below which the honeypot is stale
        tolerance: f64,
    },
    /// Change between the last two smoothed entropy points
    EntropyChange {
        /// Observed absolute change
        delta: f64,
        /// Threshold below which the honeypot is stale
        tolerance: f64,
    },
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("reconfiguration disabled"),
            Self::Interval { sessions, interval } => {
                write!(f, "{sessions}/{interval} sessions since last reset")
            }
            Self::InsufficientHistory { updates, window } => {
                write!(f, "insufficient history: {updates} of {window} sessions")
            }
            Self::DiversityIncrease {
                mean_increase,
                tolerance,
            } => write!(
                f,
                "mean distinct-technique increase {mean_increase:.4} (tolerance {tolerance})"
            ),
            Self::EntropyChange { delta, tolerance } => {
                write!(f, "smoothed entropy change {delta:.4} (tolerance {tolerance})")
            }
        }
    }
}

/// Outcome of evaluating a criterion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    /// Whether the honeypot should be reconfigured
    pub reconfigure: bool,
    /// Audit reason
    #[serde(flatten)]
    pub reason: DecisionReason,
}

impl Decision {
    /// Ask for reconfiguration
    #[inline]
    #[must_use]
    pub fn reconfigure(reason: DecisionReason) -> Self {
        Self {
            reconfigure: true,
            reason,
        }
    }

    /// Keep the current configuration
    #[inline]
    #[must_use]
    pub fn hold(reason: DecisionReason) -> Self {
        Self {
            reconfigure: false,
            reason,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.reconfigure { "reconfigure" } else { "hold" };
        write!(f, "{verdict}: {}", self.reason)
    }
}

/// A staleness strategy with its accumulator
#[derive(Debug, Clone, PartialEq)]
pub enum ReconfigCriterion {
    /// Always false
    Never(Never),
    /// True once `n` sessions were seen since the last reset
    FixedInterval(FixedInterval),
    /// True when distinct-technique growth flattens
    DiversityPlateau(DiversityPlateau),
    /// True when technique entropy stops changing
    EntropyPlateau(EntropyPlateau),
}

impl ReconfigCriterion {
    /// Short name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Never(_) => "never",
            Self::FixedInterval(_) => "fixed_interval",
            Self::DiversityPlateau(_) => DiversityPlateau::NAME,
            Self::EntropyPlateau(_) => EntropyPlateau::NAME,
        }
    }

    /// Restart the accumulator
    pub fn reset(&mut self) {
        match self {
            Self::Never(_) => {}
            Self::FixedInterval(c) => c.reset(),
            Self::DiversityPlateau(c) => c.reset(),
            Self::EntropyPlateau(c) => c.reset(),
        }
        tracing::debug!("Criterion {} reset", self.name());
    }

    /// Feed one frozen session trace
    pub fn update(&mut self, trace: &SessionTrace) {
        match self {
            Self::Never(_) => {}
            Self::FixedInterval(c) => c.update(),
            Self::DiversityPlateau(c) => c.update(trace),
            Self::EntropyPlateau(c) => c.update(trace),
        }
    }

    /// Evaluate with an audit reason
    #[must_use]
    pub fn evaluate(&self) -> Decision {
        match self {
            Self::Never(c) => c.evaluate(),
            Self::FixedInterval(c) => c.evaluate(),
            Self::DiversityPlateau(c) => c.evaluate(),
            Self::EntropyPlateau(c) => c.evaluate(),
        }
    }

    /// Whether the current configuration is stale
    #[inline]
    #[must_use]
    pub fn should_reconfigure(&self) -> bool {
        self.evaluate().reconfigure
    }
}

impl From<Never> for ReconfigCriterion {
    fn from(c: Never) -> Self {
        Self::Never(c)
    }
}

impl From<FixedInterval> for ReconfigCriterion {
    fn from(c: FixedInterval) -> Self {
        Self::FixedInterval(c)
    }
}

impl From<DiversityPlateau> for ReconfigCriterion {
    fn from(c: DiversityPlateau) -> Self {
        Self::DiversityPlateau(c)
    }
}

impl From<EntropyPlateau> for ReconfigCriterion {
    fn from(c: EntropyPlateau) -> Self {
        Self::EntropyPlateau(c)
    }
}

pub(crate) fn check_params(
    criterion: &'static str,
    tolerance: f64,
    window: usize,
) -> Result<(), CriterionError> {
    if window == 0 {
        return Err(CriterionError::ZeroWindow { criterion });
    }
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(CriterionError::InvalidTolerance {
            criterion,
            tolerance,
        });
    }
    Ok(())
}
