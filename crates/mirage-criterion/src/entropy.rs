//! Technique-entropy criterion
//!
//! Keeps a frequency table of technique occurrences for the epoch and the
//! natural-log Shannon entropy of its distribution after every update. The
//! entropy list is seeded with `0.0`. Staleness is declared when the moving
//! average over `window` points moves less than `tolerance` between its last
//! two points.

use crate::criterion::{Decision, DecisionReason};
use crate::error::CriterionError;
use indexmap::IndexMap;
use mirage_trace::SessionTrace;

/// Natural-log Shannon entropy of a frequency table
///
/// Zero counts contribute nothing; an empty table has entropy `0.0`.
#[must_use]
pub fn shannon_entropy<I>(counts: I) -> f64
where
    I: IntoIterator<Item = usize>,
    I::IntoIter: Clone,
{
    let counts = counts.into_iter();
    let total: usize = counts.clone().sum();
    if total == 0 {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let total = total as f64;
    counts
        .filter(|&count| count > 0)
        .map(|count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / total;
            -p * p.ln()
        })
        .sum()
}

/// Simple moving average with `window` points (valid positions only)
///
/// Returns an empty vector when `window` is zero or longer than `values`.
#[must_use]
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || window > values.len() {
        return Vec::new();
    }
    #[allow(clippy::cast_precision_loss)]
    let width = window as f64;
    values
        .windows(window)
        .map(|chunk| chunk.iter().sum::<f64>() / width)
        .collect()
}

/// Reconfigure once the technique distribution stops changing
#[derive(Debug, Clone, PartialEq)]
pub struct EntropyPlateau {
    tolerance: f64,
    window: usize,
    frequencies: IndexMap<String, usize>,
    entropies: Vec<f64>,
}

impl EntropyPlateau {
    /// Criterion name used in errors and logs
    pub const NAME: &'static str = "entropy_plateau";

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
            frequencies: IndexMap::new(),
            entropies: vec![0.0],
        })
    }

    /// Clear the frequency table and entropy history
    pub fn reset(&mut self) {
        self.frequencies.clear();
        self.entropies = vec![0.0];
    }

    /// Count the techniques of one session and record the new entropy
    pub fn update(&mut self, trace: &SessionTrace) {
        for event in trace.events() {
            let technique = event.technique();
            if technique.is_empty() {
                continue;
            }
            *self.frequencies.entry(technique.to_string()).or_insert(0) += 1;
        }
        let entropy = shannon_entropy(self.frequencies.values().copied());
        self.entropies.push(entropy);
    }

    /// Sessions recorded since the last reset
    #[inline]
    #[must_use]
    pub fn updates(&self) -> usize {
        self.entropies.len() - 1
    }

    /// Entropy after each update, preceded by the `0.0` seed
    #[inline]
    #[must_use]
    pub fn entropies(&self) -> &[f64] {
        &self.entropies
    }

    /// Technique frequencies in first-seen order
    #[inline]
    #[must_use]
    pub fn frequencies(&self) -> &IndexMap<String, usize> {
        &self.frequencies
    }

    /// Change between the last two smoothed entropy points
    #[must_use]
    pub fn smoothed_delta(&self) -> Option<f64> {
        if self.updates() < self.window {
            return None;
        }
        let smoothed = moving_average(&self.entropies, self.window);
        match smoothed.as_slice() {
            [.., previous, last] => Some((last - previous).abs()),
            _ => None,
        }
    }

    /// Compare the smoothed entropy change against the tolerance
    #[must_use]
    pub fn evaluate(&self) -> Decision {
        let Some(delta) = self.smoothed_delta() else {
            return Decision::hold(DecisionReason::InsufficientHistory {
                updates: self.updates(),
                window: self.window,
            });
        };

        let reason = DecisionReason::EntropyChange {
            delta,
            tolerance: self.tolerance,
        };
        if delta < self.tolerance {
            Decision::reconfigure(reason)
        } else {
            Decision::hold(reason)
        }
    }
}
