//! Error types for criterion construction

/// Invalid criterion parameters
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CriterionError {
    /// Plateau criteria need at least one session per window
    #[error("{criterion} window must be at least 1")]
    ZeroWindow {
        /// Criterion name
        criterion: &'static str,
    },

    /// Tolerance must be a finite, non-negative number
    #[error("{criterion} tolerance must be finite and non-negative, got {tolerance}")]
    InvalidTolerance {
        /// Criterion name
        criterion: &'static str,
        /// Offending value
        tolerance: f64,
    },
}
