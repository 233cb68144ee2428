//! The closed reconfiguration loop
//!
//! For every session:
//! 1. run the attacker against the live configuration
//! 2. freeze and record the trace (append-only history)
//! 3. feed the criterion and evaluate it
//! 4. past the minimum-sessions floor, on a stale verdict, synthesise a
//!    replacement; deploy it on acceptance, keep the stale one otherwise
//!
//! The controller exclusively owns the live configuration, the criterion's
//! accumulator and the trace history. Sessions run strictly one after the
//! other.

use crate::agent::{AttackerAgent, TokenUsage};
use crate::config::ExperimentConfig;
use crate::error::{ConfigError, CoreError, StoreError};
use crate::honeypot::{HoneypotDeployment, HoneypotLogSource, LogPoller};
use crate::session::SessionRunner;
use crate::store::{AuditEvent, ExperimentStore, SessionRecord, TokenLedger};
use crate::terminal::{GuardedTerminal, Terminal};
use mirage_criterion::ReconfigCriterion;
use mirage_synthesis::{
    ConfigSynthesizer, ConfigValidator, CorpusIndex, Embedder, GenerativeModel,
    HoneypotConfiguration, NoveltyChecker, QueryComposer, SynthesisOutcome, SynthesisPipeline,
    SynthesisReport,
};
use mirage_trace::{TraceHistory, Transcript};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// External collaborators of one experiment
#[derive(Clone)]
pub struct Collaborators {
    /// Attacker
    pub agent: Arc<dyn AttackerAgent>,
    /// Attacker-side terminal
    pub terminal: Arc<dyn Terminal>,
    /// Honeypot logs, required for observed-command extraction
    pub log_source: Option<Arc<dyn HoneypotLogSource>>,
    /// Generates configurations and retrieval queries
    pub generator: Arc<dyn GenerativeModel>,
    /// Predicts the attacks a candidate would attract
    pub predictor: Arc<dyn GenerativeModel>,
    /// Embeds retrieval queries
    pub embedder: Arc<dyn Embedder>,
    /// Precomputed vulnerability corpus
    pub corpus: Arc<CorpusIndex>,
    /// Configuration schema
    pub validator: Arc<ConfigValidator>,
    /// Puts configurations live
    pub deployment: Arc<dyn HoneypotDeployment>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("agent", &self.agent.model_name())
            .field("generator", &self.generator.model_name())
            .field("predictor", &self.predictor.model_name())
            .field("embedder", &self.embedder.model_name())
            .field("corpus", &self.corpus.len())
            .field("log_source", &self.log_source.is_some())
            .finish_non_exhaustive()
    }
}

/// Totals of a finished experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentSummary {
    /// Sessions run
    pub sessions: u32,
    /// Configurations deployed, the initial one included
    pub epochs: u32,
    /// Accepted and deployed replacements
    pub reconfigurations: u32,
    /// Syntheses that ended without a replacement
    pub exhausted_syntheses: u32,
    /// Accepted replacements that failed to deploy
    pub failed_deployments: u32,
    /// Sessions whose attack sequence was new to the experiment
    pub novel_sessions: u32,
    /// Agent token usage
    pub tokens: TokenUsage,
    /// Configuration live at the end
    pub final_config_id: String,
}

/// Top-level experiment loop
pub struct ReconfigurationController {
    config: ExperimentConfig,
    runner: SessionRunner,
    synthesizer: ConfigSynthesizer,
    deployment: Arc<dyn HoneypotDeployment>,
    store: Option<ExperimentStore>,
    initial_conversation: Transcript,

    criterion: ReconfigCriterion,
    history: TraceHistory,
    current: Option<HoneypotConfiguration>,
    deployed: Vec<HoneypotConfiguration>,
    tokens: TokenLedger,

    started: bool,
    epoch: u32,
    session_index: u32,
    sessions_in_epoch: u32,
    reconfigurations: u32,
    exhausted_syntheses: u32,
    failed_deployments: u32,
    novel_sessions: u32,
}

impl ReconfigurationController {
    /// Wire an experiment from its settings and collaborators
    ///
    /// Every session starts from `initial_conversation`.
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] for invalid settings, including log
    /// capture without a log source.
    pub fn new(
        config: ExperimentConfig,
        collaborators: Collaborators,
        initial_conversation: Transcript,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let mut criterion = config.criterion.build()?;
        criterion.reset();

        let terminal = GuardedTerminal::new(collaborators.terminal, config.terminal);
        let mut runner = SessionRunner::new(collaborators.agent, terminal)
            .with_extraction(config.extraction)
            .with_max_iterations(config.max_iterations);
        if config.capture_honeypot_logs {
            let source = collaborators.log_source.ok_or_else(|| {
                ConfigError::invalid(
                    "capture_honeypot_logs",
                    "log capture is enabled but no honeypot log source was supplied",
                )
            })?;
            runner = runner.with_log_poller(LogPoller::new(source));
        }

        let pipeline = SynthesisPipeline::new(
            Arc::clone(&collaborators.generator),
            collaborators.validator,
            NoveltyChecker::new(collaborators.predictor),
        );
        let synthesizer = ConfigSynthesizer::new(
            QueryComposer::new(collaborators.generator),
            collaborators.embedder,
            collaborators.corpus,
            pipeline,
        )
        .with_settings(&config.synthesis);

        tracing::info!(
            "Experiment {}: {} sessions, criterion {}, reset on reconfigure: {}",
            config.name,
            config.sessions,
            criterion.name(),
            config.reset_on_reconfigure
        );

        Ok(Self {
            config,
            runner,
            synthesizer,
            deployment: collaborators.deployment,
            store: None,
            initial_conversation,
            criterion,
            history: TraceHistory::new(),
            current: None,
            deployed: Vec::new(),
            tokens: TokenLedger::default(),
            started: false,
            epoch: 0,
            session_index: 0,
            sessions_in_epoch: 0,
            reconfigurations: 0,
            exhausted_syntheses: 0,
            failed_deployments: 0,
            novel_sessions: 0,
        })
    }

    /// Start from a known configuration instead of synthesising one
    #[inline]
    #[must_use]
    pub fn with_initial_configuration(mut self, config: HoneypotConfiguration) -> Self {
        self.current = Some(config);
        self
    }

    /// Persist the run
    #[inline]
    #[must_use]
    pub fn with_store(mut self, store: ExperimentStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Experiment settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Live configuration
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<&HoneypotConfiguration> {
        self.current.as_ref()
    }

    /// Every configuration deployed so far, in order
    #[inline]
    #[must_use]
    pub fn deployed(&self) -> &[HoneypotConfiguration] {
        &self.deployed
    }

    /// Trace history
    #[inline]
    #[must_use]
    pub fn history(&self) -> &TraceHistory {
        &self.history
    }

    /// Active criterion
    #[inline]
    #[must_use]
    pub fn criterion(&self) -> &ReconfigCriterion {
        &self.criterion
    }

    /// Current epoch (zero-based)
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Token counters
    #[inline]
    #[must_use]
    pub fn tokens(&self) -> &TokenLedger {
        &self.tokens
    }

    /// Deploy the initial configuration, synthesising one if none was given
    ///
    /// # Errors
    /// Returns [`CoreError::NoInitialConfiguration`] if bootstrap synthesis
    /// is exhausted, [`CoreError::Deployment`] if the initial configuration
    /// cannot be deployed, or [`CoreError::Store`] on persistence failure.
    pub async fn start(&mut self) -> Result<(), CoreError> {
        if self.started {
            return Ok(());
        }
        if let Some(store) = &self.store {
            store.write_metadata(&self.config).await?;
        }

        let initial = match self.current.take() {
            Some(config) => config,
            None => {
                tracing::info!("No initial configuration, synthesising one");
                let report = self.synthesizer.synthesize(None, &[], &self.history).await;
                self.record_synthesis(0, &report).await?;
                match report.outcome {
                    SynthesisOutcome::Accepted { config, .. } => *config,
                    SynthesisOutcome::Exhausted { .. } => {
                        return Err(CoreError::NoInitialConfiguration);
                    }
                }
            }
        };

        self.deployment.deploy(&initial).await?;
        if let Some(store) = &self.store {
            store.save_config(self.epoch, &initial).await?;
        }
        tracing::info!("Epoch {} started with configuration {}", self.epoch, initial.id);

        self.deployed.push(initial.clone());
        self.current = Some(initial);
        self.started = true;
        Ok(())
    }

    /// Run every configured session
    ///
    /// # Errors
    /// See [`start`](Self::start) and [`run_session`](Self::run_session).
    pub async fn run(&mut self) -> Result<ExperimentSummary, CoreError> {
        self.start().await?;
        while self.session_index < self.config.sessions {
            self.run_session().await?;
        }

        let summary = self.summary();
        tracing::info!(
            "Experiment {} finished: {} sessions, {} epochs, {} novel sessions, {} tokens",
            self.config.name,
            summary.sessions,
            summary.epochs,
            summary.novel_sessions,
            summary.tokens.total()
        );
        Ok(summary)
    }

    /// Run one session and act on the criterion's verdict
    ///
    /// # Errors
    /// Only persistence failures and a failed start are fatal; session and
    /// synthesis problems are absorbed.
    pub async fn run_session(&mut self) -> Result<SessionRecord, CoreError> {
        self.start().await?;
        let config_id = self
            .current
            .as_ref()
            .map(HoneypotConfiguration::id_string)
            .ok_or(CoreError::NoInitialConfiguration)?;
        let index = self.session_index;
        tracing::info!(
            "Running attack session {} / {} (epoch {})",
            index + 1,
            self.config.sessions,
            self.epoch
        );

        let report = self.runner.run(self.initial_conversation.clone()).await;
        let sequence = report.trace.attack_sequence();
        let novel = !sequence.is_empty()
            && NoveltyChecker::check_observed(sequence, &self.history).is_novel();

        self.history
            .append(self.epoch, config_id.clone(), report.trace.clone());
        self.criterion.update(&report.trace);
        self.session_index += 1;
        self.sessions_in_epoch += 1;
        self.tokens.record(report.usage);
        if novel {
            self.novel_sessions += 1;
        }

        let record = SessionRecord {
            index,
            epoch: self.epoch,
            config_id,
            novel,
            rejected_calls: report.rejected_calls,
            usage: report.usage,
            trace: report.trace,
        };
        if let Some(store) = &self.store {
            store.append_session(&record).await?;
            store.save_tokens(&self.tokens).await?;
        }

        let decision = self.criterion.evaluate();
        let floor_met = self.sessions_in_epoch >= self.config.min_sessions_before_reconfig;
        let blocked_by_floor = decision.reconfigure && !floor_met;
        if blocked_by_floor {
            tracing::warn!(
                "Criterion {} asks for reconfiguration but only {}/{} sessions ran under the current configuration",
                self.criterion.name(),
                self.sessions_in_epoch,
                self.config.min_sessions_before_reconfig
            );
        } else if decision.reconfigure {
            tracing::info!("Criterion {}: {}", self.criterion.name(), decision);
        } else {
            tracing::debug!("Criterion {}: {}", self.criterion.name(), decision);
        }

        let reconfigure = decision.reconfigure && floor_met;
        self.audit(&AuditEvent::Decision {
            session: index,
            epoch: self.epoch,
            criterion: self.criterion.name(),
            sessions_in_epoch: self.sessions_in_epoch,
            blocked_by_floor,
            decision,
        })
        .await?;

        if reconfigure {
            self.reconfigure(index).await?;
        }
        Ok(record)
    }

    /// Totals so far
    #[must_use]
    pub fn summary(&self) -> ExperimentSummary {
        ExperimentSummary {
            sessions: self.session_index,
            epochs: self.epoch + 1,
            reconfigurations: self.reconfigurations,
            exhausted_syntheses: self.exhausted_syntheses,
            failed_deployments: self.failed_deployments,
            novel_sessions: self.novel_sessions,
            tokens: self.tokens.total,
            final_config_id: self
                .current
                .as_ref()
                .map(HoneypotConfiguration::id_string)
                .unwrap_or_default(),
        }
    }

    async fn reconfigure(&mut self, session: u32) -> Result<(), CoreError> {
        let report = self
            .synthesizer
            .synthesize(self.current.as_ref(), &self.deployed, &self.history)
            .await;
        self.record_synthesis(session, &report).await?;

        let config = match report.outcome {
            SynthesisOutcome::Accepted { config, .. } => *config,
            SynthesisOutcome::Exhausted { attempts } => {
                self.exhausted_syntheses += 1;
                tracing::warn!(
                    "No replacement available after {} attempts, keeping configuration {}",
                    attempts.len(),
                    self.current_id()
                );
                return Ok(());
            }
        };

        if let Err(e) = self.deployment.deploy(&config).await {
            self.failed_deployments += 1;
            tracing::error!(
                "Deployment of {} failed, keeping configuration {}: {}",
                config.id,
                self.current_id(),
                e
            );
            return self
                .audit(&AuditEvent::DeploymentFailed {
                    session,
                    config_id: config.id_string(),
                    error: e.to_string(),
                })
                .await
                .map_err(CoreError::from);
        }

        self.epoch += 1;
        self.sessions_in_epoch = 0;
        self.reconfigurations += 1;
        if self.config.reset_on_reconfigure {
            self.criterion.reset();
        }
        if let Some(store) = &self.store {
            store.save_config(self.epoch, &config).await?;
        }
        tracing::info!("Epoch {} started with configuration {}", self.epoch, config.id);

        self.deployed.push(config.clone());
        self.current = Some(config);
        Ok(())
    }

    async fn record_synthesis(&self, session: u32, report: &SynthesisReport) -> Result<(), StoreError> {
        self.audit(&AuditEvent::Reconfiguration {
            session,
            epoch: self.epoch,
            state: report.outcome.state(),
            config_id: report.outcome.config().map(HoneypotConfiguration::id_string),
            query: report.query.text.clone(),
            vulnerabilities: report.vulnerabilities.clone(),
            retrieval_error: report.retrieval_error.clone(),
            attempts: report.outcome.attempts().to_vec(),
        })
        .await
    }

    async fn audit(&self, event: &AuditEvent) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => store.append_audit(event).await,
            None => Ok(()),
        }
    }

    fn current_id(&self) -> String {
        self.current
            .as_ref()
            .map_or_else(|| "<none>".to_string(), HoneypotConfiguration::id_string)
    }
}

impl fmt::Debug for ReconfigurationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconfigurationController")
            .field("experiment", &self.config.name)
            .field("criterion", &self.criterion.name())
            .field("epoch", &self.epoch)
            .field("sessions", &self.session_index)
            .field("current", &self.current.as_ref().map(|c| c.id))
            .field("runner", &self.runner)
            .field("synthesizer", &self.synthesizer)
            .finish_non_exhaustive()
    }
}
