//! Distinct-technique growth criterion
//!
//! Tracks the cumulative number of distinct techniques after every session.
//! The value list starts at `[0]` so that after `n` updates it holds `n + 1`
//! points and the increase over the last `window` sessions is
//! `values[n] - values[n - window]`.

use crate::criterion::{Decision, DecisionReason};
use crate::error::CriterionError;
use indexmap::IndexSet;
use mirage_trace::SessionTrace;

/// Reconfigure once technique discovery slows down
#[derive(Debug, Clone, PartialEq)]
pub struct DiversityPlateau {
    tolerance: f64,
    window: usize,
    reset_techniques: bool,
    seen: IndexSet<String>,
    values: Vec<usize>,
}

impl DiversityPlateau {
    /// Criterion name used in errors and logs
    pub const NAME: &'static str = "diversity_plateau";

    /// Create a criterion
    ///
    /// # Errors
    /// Returns [`CriterionError`] for a zero window or a negative/non-finite
    /// tolerance.
    pub fn new(tolerance: f64, window: usize) -> Result<Self, CriterionError> {
        crate::criterion::check_params(Self::NAME, tolerance, window)?;
        Ok(Self {
            tolerance,
            window,
            reset_techniques: true,
            seen: IndexSet::new(),
            values: vec![0],
        })
    }

    /// Whether [`reset`](Self::reset) also forgets the techniques seen so far
    ///
    /// When false, only the growth history restarts and techniques seen in a
    /// previous epoch do not count as new again.
    #[inline]
    #[must_use]
    pub fn with_reset_techniques(mut self, reset_techniques: bool) -> Self {
        self.reset_techniques = reset_techniques;
        self
    }

    /// Restart the accumulator
    pub fn reset(&mut self) {
        if self.reset_techniques {
            self.seen.clear();
        }
        self.values = vec![self.seen.len()];
    }

    /// Record the techniques of one session
    pub fn update(&mut self, trace: &SessionTrace) {
        for event in trace.events() {
            let technique = event.technique();
            if !technique.is_empty() && !self.seen.contains(technique) {
                self.seen.insert(technique.to_string());
            }
        }
        self.values.push(self.seen.len());
    }

    /// Sessions recorded since the last reset
    #[inline]
    #[must_use]
    pub fn updates(&self) -> usize {
        self.values.len() - 1
    }

    /// Cumulative distinct-technique counts, one per update after the seed
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[usize] {
        &self.values
    }

    /// Distinct techniques currently known
    #[inline]
    #[must_use]
    pub fn distinct(&self) -> usize {
        self.seen.len()
    }

    /// Mean per-session increase over the last window, if enough history exists
    #[must_use]
    pub fn mean_increase(&self) -> Option<f64> {
        let last = self.values.len() - 1;
        if last < self.window {
            return None;
        }
        let increase = self.values[last].saturating_sub(self.values[last - self.window]);
        #[allow(clippy::cast_precision_loss)]
        let mean = increase as f64 / self.window as f64;
        Some(mean)
    }

    /// Compare the recent growth rate against the tolerance
    #[must_use]
    pub fn evaluate(&self) -> Decision {
        let Some(mean_increase) = self.mean_increase() else {
            return Decision::hold(DecisionReason::InsufficientHistory {
                updates: self.updates(),
                window: self.window,
            });
        };

        let reason = DecisionReason::DiversityIncrease {
            mean_increase,
            tolerance: self.tolerance,
        };
        if mean_increase < self.tolerance {
            Decision::reconfigure(reason)
        } else {
            Decision::hold(reason)
        }
    }
}
