//! Experiment configuration
//!
//! Every setting has a default; a TOML file only lists what it changes:
//!
//! ```toml
//! name = "entropy-run"
//! sessions = 50
//! max_iterations = 30
//!
//! [criterion]
//! kind = "entropy_plateau"
//! tolerance = 0.01
//! window = 3
//!
//! [terminal]
//! timeout_secs = 30
//! ```

use crate::error::ConfigError;
use mirage_criterion::CriterionSpec;
use mirage_synthesis::SynthesisSettings;
use mirage_trace::ExtractionMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Terminal guard settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Per-command timeout
    pub timeout_secs: u64,
    /// Output beyond this many characters is cut to its tail
    pub max_output_chars: usize,
    /// Time allowed for the interrupt after a timeout
    pub interrupt_grace_secs: u64,
}

impl TerminalSettings {
    /// Per-command timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Interrupt grace period
    #[inline]
    #[must_use]
    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_secs(self.interrupt_grace_secs)
    }
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_output_chars: 10_000,
            interrupt_grace_secs: 5,
        }
    }
}

/// Experiment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Experiment name, used for the run directory
    pub name: String,
    /// Parent directory of run directories
    pub experiment_dir: PathBuf,
    /// Total attack sessions
    pub sessions: u32,
    /// Iteration cap per session
    pub max_iterations: u32,
    /// Sessions under a configuration before it may be replaced
    pub min_sessions_before_reconfig: u32,
    /// Reset the criterion on every reconfiguration, not only at start
    pub reset_on_reconfigure: bool,
    /// Attach honeypot log lines to tool results
    pub capture_honeypot_logs: bool,
    /// Where extracted statements come from
    pub extraction: ExtractionMode,
    /// Staleness criterion
    pub criterion: CriterionSpec,
    /// Synthesis pipeline
    pub synthesis: SynthesisSettings,
    /// Terminal guard
    pub terminal: TerminalSettings,
}

impl ExperimentConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With experiment name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// With parent directory for run directories
    #[inline]
    #[must_use]
    pub fn with_experiment_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.experiment_dir = dir.into();
        self
    }

    /// With total session count
    #[inline]
    #[must_use]
    pub fn with_sessions(mut self, sessions: u32) -> Self {
        self.sessions = sessions;
        self
    }

    /// With per-session iteration cap
    #[inline]
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// With minimum sessions per configuration
    #[inline]
    #[must_use]
    pub fn with_min_sessions_before_reconfig(mut self, min: u32) -> Self {
        self.min_sessions_before_reconfig = min;
        self
    }

    /// With criterion reset policy
    #[inline]
    #[must_use]
    pub fn with_reset_on_reconfigure(mut self, reset: bool) -> Self {
        self.reset_on_reconfigure = reset;
        self
    }

    /// With honeypot log capture
    #[inline]
    #[must_use]
    pub fn with_log_capture(mut self, capture: bool) -> Self {
        self.capture_honeypot_logs = capture;
        self
    }

    /// With extraction mode
    #[inline]
    #[must_use]
    pub fn with_extraction(mut self, mode: ExtractionMode) -> Self {
        self.extraction = mode;
        self
    }

    /// With criterion
    #[inline]
    #[must_use]
    pub fn with_criterion(mut self, criterion: CriterionSpec) -> Self {
        self.criterion = criterion;
        self
    }

    /// With synthesis settings
    #[inline]
    #[must_use]
    pub fn with_synthesis(mut self, synthesis: SynthesisSettings) -> Self {
        self.synthesis = synthesis;
        self
    }

    /// With terminal settings
    #[inline]
    #[must_use]
    pub fn with_terminal(mut self, terminal: TerminalSettings) -> Self {
        self.terminal = terminal;
        self
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the text does not parse or fails
    /// [`validate`](Self::validate).
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_toml_str(&text)
    }

    /// Reject nonsensical settings
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid("max_iterations", "must be at least 1"));
        }
        if self.synthesis.max_attempts == 0 {
            return Err(ConfigError::invalid("synthesis.max_attempts", "must be at least 1"));
        }
        if self.synthesis.top_k == 0 {
            return Err(ConfigError::invalid("synthesis.top_k", "must be at least 1"));
        }
        if self.terminal.timeout_secs == 0 {
            return Err(ConfigError::invalid("terminal.timeout_secs", "must be at least 1"));
        }
        if self.terminal.max_output_chars == 0 {
            return Err(ConfigError::invalid(
                "terminal.max_output_chars",
                "must be at least 1",
            ));
        }
        if self.extraction == ExtractionMode::HoneypotObserved && !self.capture_honeypot_logs {
            return Err(ConfigError::invalid(
                "capture_honeypot_logs",
                "honeypot_observed extraction needs captured honeypot logs",
            ));
        }
        self.criterion.validate()?;
        Ok(())
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: "mirage".to_string(),
            experiment_dir: PathBuf::from("experiments"),
            sessions: 100,
            max_iterations: 5,
            min_sessions_before_reconfig: 1,
            reset_on_reconfigure: true,
            capture_honeypot_logs: true,
            extraction: ExtractionMode::default(),
            criterion: CriterionSpec::default(),
            synthesis: SynthesisSettings::default(),
            terminal: TerminalSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        let config = ExperimentConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.terminal.timeout(), Duration::from_secs(60));
        assert_eq!(config.terminal.max_output_chars, 10_000);
        assert_eq!(config.synthesis.max_attempts, 3);
        assert_eq!(config.criterion, CriterionSpec::Never);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ExperimentConfig::from_toml_str(
            r#"
            name = "entropy-run"
            sessions = 50
            extraction = "attacker_issued"

            [criterion]
            kind = "entropy_plateau"
            tolerance = 0.05
            window = 3

            [terminal]
            timeout_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "entropy-run");
        assert_eq!(config.sessions, 50);
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.extraction, ExtractionMode::AttackerIssued);
        assert_eq!(
            config.criterion,
            CriterionSpec::EntropyPlateau {
                tolerance: 0.05,
                window: 3
            }
        );
        assert_eq!(config.terminal.timeout_secs, 30);
        assert_eq!(config.terminal.max_output_chars, 10_000);
        assert_eq!(config.synthesis, SynthesisSettings::default());
    }

    #[test]
    fn rejects_nonsense() {
        let err = ExperimentConfig::new().with_max_iterations(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "max_iterations", .. }));

        let err = ExperimentConfig::from_toml_str("[synthesis]\nmax_attempts = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "synthesis.max_attempts", .. }));

        let err = ExperimentConfig::from_toml_str(
            "[criterion]\nkind = \"diversity_plateau\"\nwindow = 0",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Criterion(_)));

        assert!(matches!(
            ExperimentConfig::from_toml_str("sessions = \"many\""),
            Err(ConfigError::Parse(_))
        ));

        let err = ExperimentConfig::new().with_log_capture(false).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "capture_honeypot_logs", .. }));
        assert!(ExperimentConfig::new()
            .with_log_capture(false)
            .with_extraction(ExtractionMode::AttackerIssued)
            .validate()
            .is_ok());
    }

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.toml");
        tokio::fs::write(&path, "name = \"from-file\"\n[criterion]\nkind = \"fixed_interval\"\ninterval = 4\n")
            .await
            .unwrap();

        let config = ExperimentConfig::load(&path).await.unwrap();
        assert_eq!(config.name, "from-file");
        assert_eq!(config.criterion, CriterionSpec::FixedInterval { interval: 4 });

        assert!(matches!(
            ExperimentConfig::load(dir.path().join("missing.toml")).await,
            Err(ConfigError::Io(_))
        ));
    }
}
