//! Error types for the reconfiguration loop
//!
//! Provides error handling for:
//! - Experiment configuration loading and validation
//! - External collaborators (attacker agent, terminal, honeypot logs, deployment)
//! - Experiment persistence
//!
//! Recoverable failures inside a session or a synthesis are absorbed by the
//! component that sees them; only what stops the experiment reaches
//! [`CoreError`].

use mirage_criterion::CriterionError;
use mirage_synthesis::SynthesisError;

/// Main loop error type
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Invalid experiment configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Criterion could not be built
    #[error("criterion error: {0}")]
    Criterion(#[from] CriterionError),

    /// Synthesis setup failed
    #[error("synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    /// Experiment store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Deployment of the initial configuration failed
    #[error("deployment failed: {0}")]
    Deployment(#[from] DeploymentError),

    /// No initial configuration was supplied and none could be synthesised
    #[error("no initial configuration available")]
    NoInitialConfiguration,
}

impl CoreError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Synthesis(e) => e.is_retryable(),
            Self::Deployment(_) | Self::NoInitialConfiguration => true,
            _ => false,
        }
    }
}

/// Experiment configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A setting has a nonsensical value
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// Setting name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Criterion settings rejected
    #[error("invalid criterion: {0}")]
    Criterion(#[from] CriterionError),

    /// TOML could not be decoded
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// File could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Attacker agent failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// Agent could not be reached
    #[error("agent unavailable: {0}")]
    Unavailable(String),

    /// Agent answered with something unusable
    #[error("invalid agent response: {0}")]
    InvalidResponse(String),

    /// Agent did not answer in time
    #[error("agent timed out after {secs}s")]
    Timeout {
        /// Elapsed seconds
        secs: u64,
    },
}

/// Terminal transport failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TerminalError {
    /// Transport failed
    #[error("terminal transport failed: {0}")]
    Transport(String),

    /// Session closed by the remote end
    #[error("terminal closed")]
    Closed,
}

/// Honeypot log source failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("honeypot log source failed: {0}")]
pub struct LogSourceError(pub String);

/// Deployment failures
#[derive(Debug, thiserror::Error)]
pub enum DeploymentError {
    /// Deployment target rejected the configuration
    #[error("rejected by deployment target: {0}")]
    Rejected(String),

    /// Service file could not be encoded
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_yaml::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Experiment store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Affected path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(CoreError::NoInitialConfiguration.is_retryable());
        assert!(!CoreError::Config(ConfigError::invalid("max_iterations", "must be at least 1"))
            .is_retryable());
    }

    #[test]
    fn messages_name_the_field() {
        let err = ConfigError::invalid("sessions", "must be at least 1");
        assert_eq!(err.to_string(), "invalid `sessions`: must be at least 1");
        assert_eq!(
            LogSourceError("docker logs exited".into()).to_string(),
            "honeypot log source failed: docker logs exited"
        );
    }
}
