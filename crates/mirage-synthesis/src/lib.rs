//! Mirage Synthesis - producing replacement honeypot configurations
//!
//! Retrieval-augmented generation under a hard validity gate:
//! - Vulnerability corpus loading, embedding and cosine ranking
//! - Retrieval-query composition from deployment history
//! - Free-text model output parsed, normalised and schema-validated
//! - Novelty check of the attack sequence a candidate is expected to attract
//! - Bounded retries, ending in an explicit exhausted outcome
//!
//! Nothing reaches deployment unless it has passed both the schema and the
//! novelty check.
//!
//! # Example
//!
//! ```rust
//! use mirage_synthesis::document::{normalize, parse_document};
//! use mirage_synthesis::ConfigValidator;
//!
//! let raw = r#"Sure: {"services": [{"protocol": "tcp", "address": ":3306",
//!     "description": "MySQL", "cve_tags": [], "cve_description": "",
//!     "banner": "5.7", "deadlineTimeoutSeconds": 10}]}"#;
//! let (document, _) = parse_document(raw).unwrap();
//! let document = serde_json::Value::Object(normalize(document).unwrap());
//! assert!(ConfigValidator::reference().unwrap().is_valid(&document));
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod novelty;
pub mod pipeline;
pub mod request;
pub mod retriever;
pub mod validator;
pub mod vulnerability;

pub use config::{HoneypotConfiguration, LlmPlugin, Protocol, Service, ServiceDetails};
pub use document::{normalize, parse_document, ParseStage};
pub use embedding::{CacheStats, CorpusIndex, Embedder, Embedding, EmbeddingCache};
pub use error::{DocumentError, ModelError, SynthesisError};
pub use novelty::{NoveltyChecker, NoveltyVerdict};
pub use pipeline::{
    AttemptRecord, AttemptState, ConfigSynthesizer, RejectionCause, SynthesisOutcome,
    SynthesisPipeline, SynthesisReport, SynthesisSettings,
};
pub use request::{
    ConfigSummary, GenerationRequest, GenerativeModel, QueryComposer, QuerySource, RetrievalQuery,
};
pub use retriever::{rank, ScoredRecord, VulnerabilityRetriever};
pub use validator::{ConfigValidator, SchemaViolation, REFERENCE_SCHEMA};
pub use vulnerability::{load_nvd_feed, parse_nvd_feed, Severity, VulnerabilityRecord};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for synthesis
    pub use crate::{
        ConfigSynthesizer, ConfigValidator, CorpusIndex, Embedder, GenerativeModel,
        HoneypotConfiguration, ModelError, SynthesisOutcome, SynthesisPipeline,
        SynthesisSettings, VulnerabilityRecord,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
