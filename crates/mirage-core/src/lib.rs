//! Mirage Core - the closed honeypot reconfiguration loop
//!
//! Runs attacker sessions against a live honeypot configuration and replaces
//! the configuration once it has gone stale:
//! - Attack sessions: agent ↔ guarded terminal, honeypot logs attached
//! - Append-only trace history feeding a pluggable staleness criterion
//! - Synthesis of a validated, novel replacement, deployed on acceptance
//! - Experiment persistence: sessions, decisions, configurations, tokens
//!
//! # Example
//!
//! ```rust
//! use mirage_core::ExperimentConfig;
//! use mirage_criterion::CriterionSpec;
//!
//! let config = ExperimentConfig::new()
//!     .with_name("interval-run")
//!     .with_sessions(20)
//!     .with_criterion(CriterionSpec::FixedInterval { interval: 5 });
//! assert!(config.validate().is_ok());
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod agent;
pub mod config;
pub mod controller;
pub mod error;
pub mod honeypot;
pub mod session;
pub mod store;
pub mod terminal;

pub use agent::{tool_schema, AgentReply, AttackerAgent, RawToolCall, TokenUsage, UsageReport};
pub use config::{ExperimentConfig, TerminalSettings};
pub use controller::{Collaborators, ExperimentSummary, ReconfigurationController};
pub use error::{
    AgentError, ConfigError, CoreError, DeploymentError, LogSourceError, StoreError,
    TerminalError,
};
pub use honeypot::{HoneypotDeployment, HoneypotLogSource, LogPoller, ServiceDirectoryDeployment};
pub use session::{SessionReport, SessionRunner, CONTINUE_NUDGE};
pub use store::{AuditEvent, ExperimentMetadata, ExperimentStore, SessionRecord, TokenLedger};
pub use terminal::{
    truncate_tail, truncation_notice, CommandResult, CommandStatus, GuardedTerminal, Terminal,
    TIMEOUT_SENTINEL,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running experiments
    pub use crate::{
        AttackerAgent, Collaborators, CoreError, ExperimentConfig, ExperimentStore,
        ExperimentSummary, HoneypotDeployment, HoneypotLogSource, ReconfigurationController,
        Terminal,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
