//! Experiment persistence
//!
//! One directory per run:
//!
//! ```text
//! <experiment_dir>/<name>_<YYYYmmddTHHMMSS>/
//!     metadata.json                     experiment settings
//!     sessions.jsonl                    one record per session (append-only)
//!     decisions.jsonl                   criterion decisions and reconfigurations
//!     tokens.json                       running token counters
//!     configs/config_<epoch>_<id>.json  one document per epoch
//! ```

use crate::agent::TokenUsage;
use crate::config::ExperimentConfig;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use mirage_criterion::Decision;
use mirage_synthesis::{AttemptRecord, AttemptState, HoneypotConfiguration};
use mirage_trace::SessionTrace;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const METADATA_FILE: &str = "metadata.json";
const SESSIONS_FILE: &str = "sessions.jsonl";
const DECISIONS_FILE: &str = "decisions.jsonl";
const TOKENS_FILE: &str = "tokens.json";
const CONFIGS_DIR: &str = "configs";

/// Run-level metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentMetadata {
    /// Start of the run
    pub started_at: DateTime<Utc>,
    /// Crate version that produced the run
    pub version: String,
    /// Settings
    pub config: ExperimentConfig,
}

/// One persisted session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Zero-based session index within the experiment
    pub index: u32,
    /// Epoch the session ran in
    pub epoch: u32,
    /// Configuration live during the session
    pub config_id: String,
    /// Whether the observed attack sequence was new to the experiment
    pub novel: bool,
    /// Tool calls rejected for contract violations
    pub rejected_calls: u32,
    /// Tokens used
    pub usage: TokenUsage,
    /// Frozen trace
    pub trace: SessionTrace,
}

/// Audit entry in `decisions.jsonl`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Criterion evaluated after a session
    Decision {
        /// Session index
        session: u32,
        /// Epoch
        epoch: u32,
        /// Criterion name
        criterion: &'static str,
        /// Sessions under the current configuration
        sessions_in_epoch: u32,
        /// Whether the minimum-sessions floor held reconfiguration back
        blocked_by_floor: bool,
        /// Decision and its reason
        decision: Decision,
    },
    /// Synthesis ran
    Reconfiguration {
        /// Session index that triggered it
        session: u32,
        /// Epoch being replaced
        epoch: u32,
        /// `ACCEPTED` or `EXHAUSTED`
        state: AttemptState,
        /// Accepted configuration id
        #[serde(skip_serializing_if = "Option::is_none")]
        config_id: Option<String>,
        /// Retrieval query
        query: String,
        /// Retrieved vulnerability ids
        vulnerabilities: Vec<String>,
        /// Retrieval failure
        #[serde(skip_serializing_if = "Option::is_none")]
        retrieval_error: Option<String>,
        /// Every attempt with its cause
        attempts: Vec<AttemptRecord>,
    },
    /// Accepted configuration could not be deployed
    DeploymentFailed {
        /// Session index that triggered the reconfiguration
        session: u32,
        /// Rejected configuration id
        config_id: String,
        /// Failure
        error: String,
    },
}

/// Running token counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLedger {
    /// Whole experiment
    pub total: TokenUsage,
    /// Per session, in order
    pub sessions: Vec<TokenUsage>,
}

impl TokenLedger {
    /// Account for one session
    pub fn record(&mut self, usage: TokenUsage) {
        self.total += usage;
        self.sessions.push(usage);
    }
}

/// Files of one experiment run
#[derive(Debug, Clone)]
pub struct ExperimentStore {
    root: PathBuf,
}

impl ExperimentStore {
    /// Create a fresh timestamped run directory under `parent`
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the directories cannot be created.
    pub async fn create(parent: impl AsRef<Path>, name: &str) -> Result<Self, StoreError> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        Self::open(parent.as_ref().join(format!("{name}_{stamp}"))).await
    }

    /// Create the run directory for `config` under its `experiment_dir`
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the directories cannot be created.
    pub async fn for_experiment(config: &ExperimentConfig) -> Result<Self, StoreError> {
        Self::create(&config.experiment_dir, &config.name).await
    }

    /// Use `root` as the run directory, creating it if needed
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the directories cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let configs = root.join(CONFIGS_DIR);
        tokio::fs::create_dir_all(&configs)
            .await
            .map_err(|e| StoreError::io(&configs, e))?;
        tracing::info!("Experiment directory: {}", root.display());
        Ok(Self { root })
    }

    /// Run directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `metadata.json`
    ///
    /// # Errors
    /// Returns [`StoreError`] on encoding or I/O failure.
    pub async fn write_metadata(&self, config: &ExperimentConfig) -> Result<(), StoreError> {
        let metadata = ExperimentMetadata {
            started_at: Utc::now(),
            version: crate::VERSION.to_string(),
            config: config.clone(),
        };
        self.write_json(&self.root.join(METADATA_FILE), &metadata).await
    }

    /// Append to `sessions.jsonl`
    ///
    /// # Errors
    /// Returns [`StoreError`] on encoding or I/O failure.
    pub async fn append_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.append_line(&self.root.join(SESSIONS_FILE), record).await
    }

    /// Append to `decisions.jsonl`
    ///
    /// # Errors
    /// Returns [`StoreError`] on encoding or I/O failure.
    pub async fn append_audit(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.append_line(&self.root.join(DECISIONS_FILE), event).await
    }

    /// Rewrite `tokens.json`
    ///
    /// # Errors
    /// Returns [`StoreError`] on encoding or I/O failure.
    pub async fn save_tokens(&self, ledger: &TokenLedger) -> Result<(), StoreError> {
        self.write_json(&self.root.join(TOKENS_FILE), ledger).await
    }

    /// Write the document of an epoch's configuration
    ///
    /// # Errors
    /// Returns [`StoreError`] on encoding or I/O failure.
    pub async fn save_config(
        &self,
        epoch: u32,
        config: &HoneypotConfiguration,
    ) -> Result<PathBuf, StoreError> {
        let path = self
            .root
            .join(CONFIGS_DIR)
            .join(format!("config_{epoch}_{}.json", config.id));
        self.write_json(&path, config).await?;
        Ok(path)
    }

    /// Read back every session record
    ///
    /// # Errors
    /// Returns [`StoreError`] if the log cannot be read or a line does not decode.
    pub async fn read_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let path = self.root.join(SESSIONS_FILE);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(value)?;
        tokio::fs::write(path, text)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn append_line<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(value)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::io(path, e))?;
        file.flush().await.map_err(|e| StoreError::io(path, e))
    }
}
