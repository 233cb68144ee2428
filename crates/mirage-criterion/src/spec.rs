//! Serializable criterion settings
//!
//! ```toml
//! [criterion]
//! kind = "entropy_plateau"
//! tolerance = 0.01
//! window = 3
//! ```

use crate::criterion::ReconfigCriterion;
use crate::diversity::DiversityPlateau;
use crate::entropy::EntropyPlateau;
use crate::error::CriterionError;
use crate::fixed::{FixedInterval, Never};
use serde::{Deserialize, Serialize};

fn default_diversity_tolerance() -> f64 {
    0.5
}

fn default_diversity_window() -> usize {
    5
}

fn default_entropy_tolerance() -> f64 {
    1e-2
}

fn default_entropy_window() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Criterion selection as written in experiment configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CriterionSpec {
    /// Never reconfigure
    #[default]
    Never,
    /// Reconfigure every `interval` sessions
    FixedInterval {
        /// Sessions per epoch
        interval: u32,
    },
    /// Reconfigure when distinct-technique growth flattens
    DiversityPlateau {
        /// Mean per-session increase below which the honeypot is stale
        #[serde(default = "default_diversity_tolerance")]
        tolerance: f64,
        /// Sessions averaged over
        #[serde(default = "default_diversity_window")]
        window: usize,
        /// Forget seen techniques on reset
        #[serde(default = "default_true")]
        reset_techniques: bool,
    },
    /// Reconfigure when technique entropy stops changing
    EntropyPlateau {
        /// Smoothed change below which the honeypot is stale
        #[serde(default = "default_entropy_tolerance")]
        tolerance: f64,
        /// Moving-average width
        #[serde(default = "default_entropy_window")]
        window: usize,
    },
}

impl CriterionSpec {
    /// Check parameters without building
    ///
    /// # Errors
    /// Same conditions as [`CriterionSpec::build`].
    pub fn validate(&self) -> Result<(), CriterionError> {
        self.build().map(|_| ())
    }

    /// Build a fresh criterion
    ///
    /// # Errors
    /// Returns [`CriterionError`] for invalid plateau parameters.
    pub fn build(&self) -> Result<ReconfigCriterion, CriterionError> {
        let criterion = match *self {
            Self::Never => Never.into(),
            Self::FixedInterval { interval } => FixedInterval::new(interval).into(),
            Self::DiversityPlateau {
                tolerance,
                window,
                reset_techniques,
            } => DiversityPlateau::new(tolerance, window)?
                .with_reset_techniques(reset_techniques)
                .into(),
            Self::EntropyPlateau { tolerance, window } => {
                EntropyPlateau::new(tolerance, window)?.into()
            }
        };
        Ok(criterion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_from_toml_with_defaults() {
        let spec: CriterionSpec = toml::from_str("kind = \"diversity_plateau\"").unwrap();
        assert_eq!(
            spec,
            CriterionSpec::DiversityPlateau {
                tolerance: 0.5,
                window: 5,
                reset_techniques: true,
            }
        );
        assert_eq!(spec.build().unwrap().name(), "diversity_plateau");
    }

    #[test]
    fn parse_fixed_interval_from_json() {
        let spec: CriterionSpec =
            serde_json::from_str(r#"{"kind": "fixed_interval", "interval": 4}"#).unwrap();
        assert_eq!(spec, CriterionSpec::FixedInterval { interval: 4 });
    }

    #[test]
    fn zero_window_fails_validation() {
        let spec = CriterionSpec::EntropyPlateau {
            tolerance: 0.01,
            window: 0,
        };
        assert_eq!(
            spec.validate(),
            Err(CriterionError::ZeroWindow {
                criterion: "entropy_plateau"
            })
        );
    }
}
