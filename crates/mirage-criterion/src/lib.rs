//! Mirage Criterion - deciding when a honeypot has gone stale
//!
//! Statistical accumulators over the tactic/technique labels of finished
//! sessions:
//! - `Never`: never reconfigure
//! - `FixedInterval(n)`: reconfigure every `n` sessions
//! - `DiversityPlateau(tolerance, window)`: distinct techniques stop growing
//! - `EntropyPlateau(tolerance, window)`: the technique distribution stops changing
//!
//! None of them inspect configuration content. Every evaluation yields a
//! [`Decision`] carrying the reason for audit.
//!
//! # Example
//!
//! ```rust
//! use mirage_criterion::CriterionSpec;
//! use mirage_trace::{SessionOutcome, TraceBuilder};
//!
//! let mut criterion = CriterionSpec::FixedInterval { interval: 1 }.build().unwrap();
//! assert!(!criterion.should_reconfigure());
//!
//! criterion.update(&TraceBuilder::new().finish(SessionOutcome::IterationCap));
//! assert!(criterion.should_reconfigure());
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod criterion;
pub mod diversity;
pub mod entropy;
pub mod error;
pub mod fixed;
pub mod spec;

pub use criterion::{Decision, DecisionReason, ReconfigCriterion};
pub use diversity::DiversityPlateau;
pub use entropy::{moving_average, shannon_entropy, EntropyPlateau};
pub use error::CriterionError;
pub use fixed::{FixedInterval, Never};
pub use spec::CriterionSpec;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with criteria
    pub use crate::{CriterionSpec, Decision, DecisionReason, ReconfigCriterion};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
