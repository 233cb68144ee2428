//! Testing utilities for the Mirage workspace
//!
//! Deterministic stand-ins for every external collaborator of the
//! reconfiguration loop, plus fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirage_core::{
    AgentError, AgentReply, AttackerAgent, DeploymentError, HoneypotDeployment,
    HoneypotLogSource, LogSourceError, Terminal, TerminalError,
};
use mirage_synthesis::{
    ConfigValidator, CorpusIndex, Embedder, Embedding, EmbeddingCache, GenerativeModel,
    HoneypotConfiguration, ModelError, VulnerabilityRecord,
};
use mirage_trace::{Message, Transcript};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub const SYSTEM_PROMPT: &str = "You are an autonomous penetration tester with shell access to \
    an attack machine. Use the execute tool for every command and terminate when you are done.";

pub const TASK_PROMPT: &str = "The target is at 172.20.0.3. Gain access and explore it.";

pub fn initial_conversation() -> Transcript {
    Transcript::from_messages(vec![Message::system(SYSTEM_PROMPT), Message::user(TASK_PROMPT)])
}

pub fn execute(command: &str, tactic: &str, technique: &str) -> AgentReply {
    AgentReply::call(
        "execute",
        json!({ "command": command, "tactic": tactic, "technique": technique }),
    )
}

pub fn terminate(success: bool) -> AgentReply {
    AgentReply::call("terminate", json!({ "success": success }))
}

/// Replays one script per session, cycling when scripts run out
///
/// A conversation with no assistant message starts a new session; a script
/// that runs out of replies terminates successfully.
pub struct ScriptedAgent {
    scripts: Vec<Vec<AgentReply>>,
    sessions: Mutex<usize>,
}

impl ScriptedAgent {
    pub fn new(scripts: Vec<Vec<AgentReply>>) -> Arc<Self> {
        assert!(!scripts.is_empty(), "at least one script");
        Arc::new(Self {
            scripts,
            sessions: Mutex::new(0),
        })
    }

    pub fn repeating(script: Vec<AgentReply>) -> Arc<Self> {
        Self::new(vec![script])
    }

    pub fn sessions_started(&self) -> usize {
        *self.sessions.lock()
    }
}

#[async_trait]
impl AttackerAgent for ScriptedAgent {
    async fn respond(&self, conversation: &Transcript, _tools: &Value) -> Result<AgentReply, AgentError> {
        let step = conversation
            .messages()
            .iter()
            .filter(|message| matches!(message, Message::Assistant { .. }))
            .count();
        let session = {
            let mut sessions = self.sessions.lock();
            if step == 0 {
                *sessions += 1;
            }
            sessions.saturating_sub(1)
        };
        let script = &self.scripts[session % self.scripts.len()];
        Ok(script.get(step).cloned().unwrap_or_else(|| terminate(true)))
    }

    fn model_name(&self) -> &str {
        "scripted-agent"
    }
}

/// Agent whose service is down
pub struct UnavailableAgent;

#[async_trait]
impl AttackerAgent for UnavailableAgent {
    async fn respond(&self, _conversation: &Transcript, _tools: &Value) -> Result<AgentReply, AgentError> {
        Err(AgentError::Unavailable("connection refused".into()))
    }
}

/// Honeypot log lines produced by [`EchoTerminal`]
#[derive(Default)]
pub struct EchoLogs {
    pending: Mutex<Vec<String>>,
}

impl EchoLogs {
    pub fn push_ssh_command(&self, command: &str) {
        let line = json!({ "event": { "Protocol": "SSH", "Command": command } }).to_string();
        self.pending.lock().push(line);
    }
}

#[async_trait]
impl HoneypotLogSource for EchoLogs {
    async fn fetch_since(
        &self,
        _since: DateTime<Utc>,
    ) -> Result<Vec<String>, LogSourceError> {
        Ok(std::mem::take(&mut *self.pending.lock()))
    }
}

/// Terminal that answers every command with a fixed line and logs it as an
/// SSH command seen by the honeypot
pub struct EchoTerminal {
    logs: Arc<EchoLogs>,
    commands: Mutex<Vec<String>>,
}

impl EchoTerminal {
    pub fn new() -> (Arc<Self>, Arc<EchoLogs>) {
        let logs = Arc::new(EchoLogs::default());
        let terminal = Arc::new(Self {
            logs: Arc::clone(&logs),
            commands: Mutex::new(Vec::new()),
        });
        (terminal, logs)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl Terminal for EchoTerminal {
    async fn send(&self, command: &str) -> Result<String, TerminalError> {
        self.commands.lock().push(command.to_string());
        self.logs.push_ssh_command(command);
        Ok(format!("root@honeypot:~$ {command}\nok\n"))
    }

    async fn interrupt(&self) -> Result<String, TerminalError> {
        Ok("^C\n".into())
    }
}

/// Terminal whose commands never finish
pub struct HangingTerminal;

#[async_trait]
impl Terminal for HangingTerminal {
    async fn send(&self, _command: &str) -> Result<String, TerminalError> {
        std::future::pending::<()>().await;
        Ok(String::new())
    }

    async fn interrupt(&self) -> Result<String, TerminalError> {
        Ok("^C\n".into())
    }
}

/// Deterministic hashed bag-of-words embedder
pub struct KeywordEmbedder {
    dim: usize,
}

impl KeywordEmbedder {
    pub fn new(dim: usize) -> Arc<Self> {
        assert!(dim > 1, "dimension must leave room for keywords");
        Arc::new(Self { dim })
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, ModelError> {
        let mut values = vec![0.0_f32; self.dim];
        values[0] = 1.0;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = 1 + (hasher.finish() % (self.dim as u64 - 1)) as usize;
            values[bucket] += 1.0;
        }
        Ok(Embedding::new(values))
    }

    fn model_name(&self) -> &str {
        "keyword-embedder"
    }
}

pub fn sample_records() -> Vec<VulnerabilityRecord> {
    vec![
        VulnerabilityRecord::new(
            "CVE-2012-2122",
            "MySQL authentication bypass through repeated password attempts",
        ),
        VulnerabilityRecord::new(
            "CVE-2014-6271",
            "Bash shellshock remote code execution through crafted environment variables in CGI",
        ),
        VulnerabilityRecord::new(
            "CVE-2018-10933",
            "libssh server authentication bypass by sending an unexpected success message",
        ),
        VulnerabilityRecord::new(
            "CVE-2021-41773",
            "Apache HTTP Server path traversal and file disclosure",
        ),
        VulnerabilityRecord::new(
            "CVE-2017-0144",
            "SMBv1 remote code execution in Windows file sharing",
        ),
    ]
}

pub async fn sample_corpus(embedder: &dyn Embedder) -> Arc<CorpusIndex> {
    let index = CorpusIndex::build(sample_records(), embedder, &EmbeddingCache::default())
        .await
        .unwrap();
    Arc::new(index)
}

pub fn reference_validator() -> Arc<ConfigValidator> {
    Arc::new(ConfigValidator::reference().unwrap())
}

/// Single-service configuration document as a model would write it
pub fn tcp_config_document(port: u16, banner: &str) -> Value {
    json!({
        "description": format!("MySQL decoy on port {port}"),
        "services": [{
            "protocol": "tcp",
            "address": format!(":{port}"),
            "description": "MySQL",
            "cve_tags": ["CVE-2012-2122"],
            "cve_description": "MySQL authentication bypass",
            "banner": banner,
            "deadlineTimeoutSeconds": 10
        }]
    })
}

pub fn tcp_config(port: u16, banner: &str) -> HoneypotConfiguration {
    let mut document = tcp_config_document(port, banner);
    document["id"] = json!("0b7c6a52-9d1e-4f3a-8c2b-5e4d3c2b1a09");
    document["timestamp"] = json!("2025-06-12T14:30:00Z");
    HoneypotConfiguration::from_value(document).unwrap()
}

/// Generation model answering both retrieval-query and configuration prompts
///
/// Configuration drafts get a fresh port per call; the first
/// `invalid_drafts` drafts are unparseable.
pub struct FixtureGenerator {
    drafts: Mutex<u32>,
    invalid_drafts: u32,
    prompts: Mutex<Vec<String>>,
}

impl FixtureGenerator {
    pub fn new() -> Arc<Self> {
        Self::with_invalid_drafts(0)
    }

    pub fn with_invalid_drafts(invalid_drafts: u32) -> Arc<Self> {
        Arc::new(Self {
            drafts: Mutex::new(0),
            invalid_drafts,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn drafts(&self) -> u32 {
        *self.drafts.lock()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl GenerativeModel for FixtureGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().push(prompt.to_string());
        if prompt.ends_with("Query:") {
            return Ok("Authentication bypass in database services".into());
        }

        let draft = {
            let mut drafts = self.drafts.lock();
            *drafts += 1;
            *drafts
        };
        if draft <= self.invalid_drafts {
            return Ok("I cannot produce a configuration right now.".into());
        }
        let port = 3300 + u16::try_from(draft % 1000).unwrap_or(0);
        Ok(format!(
            "Here is the configuration:\n```json\n{}\n```",
            tcp_config_document(port, &format!("5.7.{draft}"))
        ))
    }

    fn model_name(&self) -> &str {
        "fixture-generator"
    }
}

/// Attack-pattern predictor
pub enum PredictorStub {
    /// Same answer every call
    Fixed(String),
    /// A different single-step sequence every call
    Unique(Mutex<u32>),
    /// Service down
    Unavailable,
}

impl PredictorStub {
    pub fn fixed(answer: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::Fixed(answer.into()))
    }

    pub fn unique() -> Arc<Self> {
        Arc::new(Self::Unique(Mutex::new(0)))
    }
}

#[async_trait]
impl GenerativeModel for PredictorStub {
    async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
        match self {
            Self::Fixed(answer) => Ok(answer.clone()),
            Self::Unique(calls) => {
                let call = {
                    let mut calls = calls.lock();
                    *calls += 1;
                    *calls
                };
                Ok(json!([{ "tactic": "Discovery", "technique": format!("T9{call:03}") }]).to_string())
            }
            Self::Unavailable => Err(ModelError::Unavailable("predictor offline".into())),
        }
    }
}

/// Records deployments, optionally failing after a number of successes
pub struct RecordingDeployment {
    deployed: Mutex<Vec<HoneypotConfiguration>>,
    fail_after: Option<usize>,
}

impl RecordingDeployment {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            deployed: Mutex::new(Vec::new()),
            fail_after: None,
        })
    }

    pub fn failing_after(successes: usize) -> Arc<Self> {
        Arc::new(Self {
            deployed: Mutex::new(Vec::new()),
            fail_after: Some(successes),
        })
    }

    pub fn deployed(&self) -> Vec<HoneypotConfiguration> {
        self.deployed.lock().clone()
    }
}

#[async_trait]
impl HoneypotDeployment for RecordingDeployment {
    async fn deploy(&self, config: &HoneypotConfiguration) -> Result<(), DeploymentError> {
        let mut deployed = self.deployed.lock();
        if self.fail_after.is_some_and(|limit| deployed.len() >= limit) {
            return Err(DeploymentError::Rejected("honeypot container did not restart".into()));
        }
        deployed.push(config.clone());
        Ok(())
    }
}
