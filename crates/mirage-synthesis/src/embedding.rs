//! Embeddings and the precomputed corpus index
//!
//! Corpus vectors are computed once (offline or at start-up) and reused for
//! every query. [`EmbeddingCache`] memoizes vectors by record id so an index
//! rebuild never re-embeds a known record.

use crate::error::{ModelError, SynthesisError};
use crate::vulnerability::VulnerabilityRecord;
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Fixed-length real vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap a raw vector
    #[inline]
    #[must_use]
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Components
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.0
    }

    /// Dimension
    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Euclidean norm
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.0
            .iter()
            .map(|&x| f64::from(x) * f64::from(x))
            .sum::<f64>()
            .sqrt()
    }

    /// Cosine similarity: dot(a, b) / (||a|| * ||b||)
    ///
    /// Returns `0.0` when either vector has (near) zero norm.
    #[must_use]
    pub fn cosine(&self, other: &Self) -> f64 {
        let norm_a = self.norm();
        let norm_b = other.norm();
        if norm_a < 1e-10 || norm_b < 1e-10 {
            return 0.0;
        }
        let dot: f64 = self
            .0
            .iter()
            .zip(&other.0)
            .map(|(&a, &b)| f64::from(a) * f64::from(b))
            .sum();
        dot / (norm_a * norm_b)
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Embedding service
///
/// Must be deterministic for a given text and model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Embedding, ModelError>;

    /// Model identifier, recorded in the corpus index
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of cached vectors
    pub entry_count: u64,
}

/// Record-id keyed embedding cache
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    inner: Cache<String, Arc<Embedding>>,
}

impl EmbeddingCache {
    /// Create a cache holding at most `max_capacity` vectors
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Cached vector for a record id
    pub async fn get(&self, id: &str) -> Option<Arc<Embedding>> {
        self.inner.get(id).await
    }

    /// Store a vector
    pub async fn insert(&self, id: impl Into<String>, embedding: Embedding) {
        self.inner.insert(id.into(), Arc::new(embedding)).await;
    }

    /// Cached vector, or embed `text` and cache the result
    ///
    /// # Errors
    /// Returns the embedder's error; nothing is cached on failure.
    pub async fn get_or_embed(
        &self,
        id: &str,
        text: &str,
        embedder: &dyn Embedder,
    ) -> Result<Arc<Embedding>, ModelError> {
        if let Some(cached) = self.get(id).await {
            return Ok(cached);
        }
        let embedding = Arc::new(embedder.embed(text).await?);
        self.inner.insert(id.to_string(), Arc::clone(&embedding)).await;
        Ok(embedding)
    }

    /// Drop every entry
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Cache statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(100_000)
    }
}

/// Corpus records with their precomputed vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusIndex {
    model: String,
    dim: usize,
    records: Vec<VulnerabilityRecord>,
    embeddings: Vec<Embedding>,
}

impl CorpusIndex {
    /// Assemble an index from precomputed vectors
    ///
    /// # Errors
    /// Returns [`SynthesisError`] if the counts differ or vectors disagree on
    /// dimension.
    pub fn from_parts(
        model: impl Into<String>,
        records: Vec<VulnerabilityRecord>,
        embeddings: Vec<Embedding>,
    ) -> Result<Self, SynthesisError> {
        if records.len() != embeddings.len() {
            return Err(SynthesisError::IndexMismatch {
                records: records.len(),
                embeddings: embeddings.len(),
            });
        }
        let dim = embeddings.first().map_or(0, Embedding::dim);
        if let Some(bad) = embeddings.iter().find(|e| e.dim() != dim) {
            return Err(SynthesisError::DimensionMismatch {
                expected: dim,
                found: bad.dim(),
            });
        }
        Ok(Self {
            model: model.into(),
            dim,
            records,
            embeddings,
        })
    }

    /// Embed every record, reusing cached vectors
    ///
    /// # Errors
    /// Fails on the first embedding error or on inconsistent dimensions.
    pub async fn build(
        records: Vec<VulnerabilityRecord>,
        embedder: &dyn Embedder,
        cache: &EmbeddingCache,
    ) -> Result<Self, SynthesisError> {
        let mut embeddings = Vec::with_capacity(records.len());
        for record in &records {
            let embedding = cache
                .get_or_embed(&record.id, &record.embedding_text(), embedder)
                .await?;
            embeddings.push(embedding.as_ref().clone());
        }
        tracing::info!(
            "Built corpus index: {} records with {}",
            records.len(),
            embedder.model_name()
        );
        Self::from_parts(embedder.model_name(), records, embeddings)
    }

    /// Embedding model the vectors came from
    #[inline]
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Vector dimension (0 for an empty index)
    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in corpus order
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[VulnerabilityRecord] {
        &self.records
    }

    /// (record, vector) pairs in corpus order
    pub fn entries(&self) -> impl Iterator<Item = (&VulnerabilityRecord, &Embedding)> {
        self.records.iter().zip(&self.embeddings)
    }

    /// Serialize to JSON
    ///
    /// # Errors
    /// Returns [`SynthesisError::Serialization`] on encoder failure.
    pub fn to_json(&self) -> Result<String, SynthesisError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON, re-checking consistency
    ///
    /// # Errors
    /// Returns [`SynthesisError`] for malformed JSON or an inconsistent index.
    pub fn from_json(text: &str) -> Result<Self, SynthesisError> {
        let index: Self = serde_json::from_str(text)?;
        Self::from_parts(index.model, index.records, index.embeddings)
    }

    /// Write the index to disk
    ///
    /// # Errors
    /// Fails on serialization or I/O errors.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SynthesisError> {
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }

    /// Read an index from disk
    ///
    /// # Errors
    /// Fails on I/O errors or an invalid index.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SynthesisError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_json(&text)
    }
}
