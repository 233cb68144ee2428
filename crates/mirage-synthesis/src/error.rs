//! Error types for configuration synthesis
//!
//! Provides error handling for:
//! - Collaborator failures (embedding and generative models)
//! - Corpus loading and index consistency
//! - Generated-document parsing and normalisation
//!
//! A single failed synthesis attempt is not an error: it is recorded as an
//! [`AttemptRecord`](crate::pipeline::AttemptRecord) and retried.

/// Failure of an external model collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Service could not be reached or refused the call
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// Service answered with something unusable
    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    /// Call exceeded its deadline
    #[error("model call timed out after {secs}s")]
    Timeout {
        /// Deadline in seconds
        secs: u64,
    },
}

impl ModelError {
    /// Whether retrying the same call may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Failure turning raw model output into a configuration document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// Output was empty
    #[error("model output is empty")]
    Empty,

    /// Neither the strict nor the lenient parse succeeded
    #[error("unparseable document (json: {json}; yaml: {yaml})")]
    Unparseable {
        /// Strict parse failure
        json: String,
        /// Lenient parse failure
        yaml: String,
    },

    /// Parsed value is not a mapping
    #[error("document root must be an object, found {0}")]
    NotAnObject(&'static str),

    /// `services` is present but not a list
    #[error("`services` must be a list")]
    ServicesNotAList,
}

/// Main synthesis error type
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// Embedding or generation collaborator failed
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Document could not be parsed or normalised
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// Vulnerability corpus is malformed
    #[error("invalid corpus: {0}")]
    InvalidCorpus(String),

    /// Records and embeddings disagree
    #[error("corpus index mismatch: {records} records, {embeddings} embeddings")]
    IndexMismatch {
        /// Number of records
        records: usize,
        /// Number of embedding vectors
        embeddings: usize,
    },

    /// Embedding dimension differs from the index
    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Dimension of the index
        expected: usize,
        /// Dimension received
        found: usize,
    },

    /// Schema document failed to compile
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Typed configuration could not be built from a validated document
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem access failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    /// Whether the failure comes from a collaborator and may be transient
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Model(err) => err.is_retryable(),
            _ => false,
        }
    }
}
