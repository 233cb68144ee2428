//! Top-K semantic vulnerability search

use crate::embedding::{CorpusIndex, Embedder, Embedding};
use crate::error::SynthesisError;
use crate::vulnerability::VulnerabilityRecord;
use std::cmp::Ordering;

/// A retrieved record with its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord<'a> {
    /// Corpus entry
    pub record: &'a VulnerabilityRecord,
    /// Cosine similarity to the query
    pub score: f64,
}

/// Rank an index against a query vector
///
/// Most similar first; ties keep corpus order and NaN scores sort last.
/// Returns at most `k` entries.
///
/// # Errors
/// Returns [`SynthesisError::DimensionMismatch`] if the query vector does not
/// match the index dimension.
pub fn rank<'a>(
    query: &Embedding,
    index: &'a CorpusIndex,
    k: usize,
) -> Result<Vec<ScoredRecord<'a>>, SynthesisError> {
    if !index.is_empty() && query.dim() != index.dim() {
        return Err(SynthesisError::DimensionMismatch {
            expected: index.dim(),
            found: query.dim(),
        });
    }

    let mut scored: Vec<ScoredRecord<'a>> = index
        .entries()
        .map(|(record, embedding)| ScoredRecord {
            record,
            score: query.cosine(embedding),
        })
        .collect();

    // sort_by is stable
    scored.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal),
    });
    scored.truncate(k);
    Ok(scored)
}

/// Embedding-based retriever over a precomputed corpus index
pub struct VulnerabilityRetriever<'e> {
    embedder: &'e dyn Embedder,
}

impl<'e> VulnerabilityRetriever<'e> {
    /// Create a retriever using `embedder` for queries
    #[inline]
    #[must_use]
    pub fn new(embedder: &'e dyn Embedder) -> Self {
        Self { embedder }
    }

    /// Up to `k` records most similar to `query`, most similar first
    ///
    /// One embedding call per retrieval; corpus vectors are never recomputed.
    ///
    /// # Errors
    /// Fails if the query cannot be embedded or its dimension is wrong.
    pub async fn retrieve(
        &self,
        query: &str,
        index: &CorpusIndex,
        k: usize,
    ) -> Result<Vec<VulnerabilityRecord>, SynthesisError> {
        let embedding = self.embedder.embed(query).await?;
        let ranked = rank(&embedding, index, k)?;

        tracing::info!(
            "Retrieved {} of {} vulnerabilities (k = {})",
            ranked.len(),
            index.len(),
            k
        );
        for hit in &ranked {
            tracing::debug!("  {} ({:.4})", hit.record.id, hit.score);
        }

        Ok(ranked.into_iter().map(|hit| hit.record.clone()).collect())
    }
}

impl std::fmt::Debug for VulnerabilityRetriever<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulnerabilityRetriever")
            .field("model", &self.embedder.model_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use async_trait::async_trait;
    use proptest::prelude::*;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Embedding, ModelError> {
            Ok(Embedding::new(self.0.clone()))
        }
    }

    fn index(vectors: &[[f32; 2]]) -> CorpusIndex {
        let records = (0..vectors.len())
            .map(|i| VulnerabilityRecord::new(format!("CVE-{i}"), format!("vuln {i}")))
            .collect();
        let embeddings = vectors.iter().map(|v| Embedding::new(v.to_vec())).collect();
        CorpusIndex::from_parts("test", records, embeddings).unwrap()
    }

    fn ids(records: &[VulnerabilityRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn most_similar_first() {
        let index = index(&[[0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]);
        let embedder = FixedEmbedder(vec![1.0, 0.1]);
        let retriever = VulnerabilityRetriever::new(&embedder);

        let top = retriever.retrieve("ssh", &index, 2).await.unwrap();
        assert_eq!(ids(&top), vec!["CVE-1", "CVE-2"]);
    }

    #[tokio::test]
    async fn ties_keep_corpus_order_and_small_corpus_returns_all() {
        let index = index(&[[1.0, 0.0], [0.0, 1.0], [2.0, 0.0]]);
        let embedder = FixedEmbedder(vec![1.0, 0.0]);
        let retriever = VulnerabilityRetriever::new(&embedder);

        let top = retriever.retrieve("q", &index, 10).await.unwrap();
        assert_eq!(ids(&top), vec!["CVE-0", "CVE-2", "CVE-1"]);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_an_error() {
        let index = index(&[[1.0, 0.0]]);
        let embedder = FixedEmbedder(vec![1.0, 0.0, 0.0]);
        let retriever = VulnerabilityRetriever::new(&embedder);
        assert!(matches!(
            retriever.retrieve("q", &index, 1).await,
            Err(SynthesisError::DimensionMismatch { expected: 2, found: 3 })
        ));
    }

    proptest! {
        #[test]
        fn prop_rank_is_sorted_and_bounded(
            vectors in proptest::collection::vec((-1.0f32..1.0, -1.0f32..1.0), 0..20),
            query in (-1.0f32..1.0, -1.0f32..1.0),
            k in 0usize..25,
        ) {
            let vectors: Vec<[f32; 2]> = vectors.into_iter().map(|(a, b)| [a, b]).collect();
            let index = index(&vectors);
            let query = Embedding::new(vec![query.0, query.1]);

            let ranked = rank(&query, &index, k).unwrap();
            prop_assert_eq!(ranked.len(), k.min(vectors.len()));
            prop_assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }
}
