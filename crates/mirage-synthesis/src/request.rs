//! Prompts for the generative model
//!
//! - [`GenerationRequest`]: schema + retrieved vulnerabilities + optional
//!   refinement seed, rendered into a configuration prompt
//! - [`QueryComposer`]: asks the model for a retrieval query that steers
//!   away from what was already deployed, with a deterministic fallback

use crate::config::HoneypotConfiguration;
use crate::error::ModelError;
use crate::vulnerability::VulnerabilityRecord;
use async_trait::async_trait;
use indexmap::IndexSet;
use mirage_trace::{AttackStep, TraceHistory};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;

/// Generative-config model
///
/// Free text in, free text out; no structural guarantee on the output.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Complete a prompt
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;

    /// Model identifier for logs
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Input of one configuration generation
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    schema: &'a Value,
    vulnerabilities: &'a [VulnerabilityRecord],
    seed: Option<&'a HoneypotConfiguration>,
}

impl<'a> GenerationRequest<'a> {
    /// Bootstrap request (no prior configuration)
    #[inline]
    #[must_use]
    pub fn new(schema: &'a Value, vulnerabilities: &'a [VulnerabilityRecord]) -> Self {
        Self {
            schema,
            vulnerabilities,
            seed: None,
        }
    }

    /// Refine from a prior configuration
    #[inline]
    #[must_use]
    pub fn with_seed(mut self, seed: Option<&'a HoneypotConfiguration>) -> Self {
        self.seed = seed;
        self
    }

    /// Whether this request refines a prior configuration
    #[inline]
    #[must_use]
    pub fn is_refinement(&self) -> bool {
        self.seed.is_some()
    }

    /// Vulnerabilities the configuration should expose
    #[inline]
    #[must_use]
    pub fn vulnerabilities(&self) -> &[VulnerabilityRecord] {
        self.vulnerabilities
    }

    /// Render the prompt
    #[must_use]
    pub fn render(&self) -> String {
        let mut prompt = String::from(
            "Generate a new honeypot configuration for cybersecurity research.\n\n\
             Requirements:\n\
             1. Use several distinct services mixing the http, ssh and tcp protocols.\n\
             2. Every service exposes one of the vulnerabilities below, with matching \
             cve_tags and a meaningful cve_description.\n\
             3. http and ssh services carry an explicit plugin field (null when unused); \
             tcp services have no plugin field.\n\
             4. Follow the JSON schema exactly.\n\n\
             Return ONLY the JSON object, beginning with `{` and ending with `}`.\n",
        );

        let schema = serde_json::to_string_pretty(self.schema).unwrap_or_else(|_| self.schema.to_string());
        let _ = write!(prompt, "\nSchema:\n{schema}\n\nVulnerabilities:\n");
        for vulnerability in self.vulnerabilities {
            let _ = writeln!(prompt, "- {}: {}", vulnerability.id, vulnerability.description);
        }

        if let Some(seed) = self.seed {
            let seed = serde_json::to_string_pretty(seed).unwrap_or_default();
            let _ = write!(
                prompt,
                "\nThe configuration below is currently deployed and no longer attracts new \
                 attack techniques. Replace its services; do not reuse its CVEs.\n{seed}\n"
            );
        }
        prompt
    }
}

/// Summary of a deployed configuration and the attacks it attracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSummary {
    /// Configuration id
    pub id: String,
    /// Configuration description
    pub description: Option<String>,
    /// Service descriptions
    pub services: Vec<String>,
    /// Distinct tactic/technique pairs observed, in first-seen order
    pub attacks: Vec<AttackStep>,
}

impl ConfigSummary {
    /// Summarize a configuration against the traces observed under it
    #[must_use]
    pub fn from_history(config: &HoneypotConfiguration, history: &TraceHistory) -> Self {
        let id = config.id_string();
        let attacks: IndexSet<AttackStep> = history
            .records()
            .iter()
            .filter(|record| record.config_id == id)
            .flat_map(|record| record.trace.attack_sequence().steps().to_vec())
            .filter(|step| !step.tactic.is_empty() && !step.technique.is_empty())
            .collect();

        Self {
            id,
            description: config.description.clone(),
            services: config.service_descriptions().map(str::to_string).collect(),
            attacks: attacks.into_iter().collect(),
        }
    }
}

/// Where a retrieval query came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySource {
    /// Composed by the model
    Model,
    /// Deterministic fallback
    Fallback,
}

/// A retrieval query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalQuery {
    /// Query text
    pub text: String,
    /// Origin
    pub source: QuerySource,
}

/// Composes retrieval queries from deployment history
#[derive(Clone)]
pub struct QueryComposer {
    model: Arc<dyn GenerativeModel>,
}

impl QueryComposer {
    /// Create a composer
    #[inline]
    #[must_use]
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Prompt listing prior configurations and the attacks they attracted
    #[must_use]
    pub fn prompt(prior: &[ConfigSummary], k: usize) -> String {
        let mut prompt = format!(
            "You are helping design the next honeypot configuration by writing a query for a \
             semantic vulnerability search. The query must steer retrieval toward {k} \
             vulnerabilities on new attack surfaces, unrelated services and techniques not \
             represented below. Do not mention prior services, CVEs or techniques.\n\n\
             Prior configurations:\n\n"
        );
        for summary in prior {
            let attacks: Vec<String> = summary
                .attacks
                .iter()
                .map(|step| format!("{} -> {}", step.tactic, step.technique))
                .collect();
            let _ = write!(
                prompt,
                "Config ID: {}\nDescription: {}\nServices: {:?}\nAttacks: {:?}\n\n",
                summary.id,
                summary.description.as_deref().unwrap_or(""),
                summary.services,
                attacks
            );
        }
        prompt.push_str("Query:");
        prompt
    }

    /// Deterministic query used when the model cannot be reached
    #[must_use]
    pub fn fallback(current: Option<&HoneypotConfiguration>) -> String {
        let explored: Vec<&str> = current
            .map(|config| config.cve_descriptions().collect())
            .unwrap_or_default();
        if explored.is_empty() {
            "Remotely exploitable vulnerabilities in network-facing http, ssh and tcp services"
                .to_string()
        } else {
            format!(
                "Remotely exploitable network service vulnerabilities unrelated to: {}",
                explored.join("; ")
            )
        }
    }

    /// Compose a query, falling back deterministically on model failure
    pub async fn compose(
        &self,
        prior: &[ConfigSummary],
        current: Option<&HoneypotConfiguration>,
        k: usize,
    ) -> RetrievalQuery {
        match self.model.generate(&Self::prompt(prior, k)).await {
            Ok(text) if !text.trim().is_empty() => RetrievalQuery {
                text: text.trim().to_string(),
                source: QuerySource::Model,
            },
            Ok(_) => {
                tracing::warn!("Query composer returned nothing, using fallback query");
                Self::fallback_query(current)
            }
            Err(e) => {
                tracing::warn!("Query composer failed ({}), using fallback query", e);
                Self::fallback_query(current)
            }
        }
    }

    fn fallback_query(current: Option<&HoneypotConfiguration>) -> RetrievalQuery {
        RetrievalQuery {
            text: Self::fallback(current),
            source: QuerySource::Fallback,
        }
    }
}

impl std::fmt::Debug for QueryComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryComposer")
            .field("model", &self.model.model_name())
            .finish()
    }
}
