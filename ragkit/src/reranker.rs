//! Post-search reordering of retrieved chunks.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::document::SearchResult;
use crate::error::Result;

/// Reorders the candidates returned by the vector store before the
/// similarity threshold is applied.
///
/// A reranker may rewrite scores; the [`Retriever`](crate::Retriever) filters
/// on whatever scores it returns. Failures surface as
/// [`RagError::RerankerError`](crate::RagError::RerankerError).
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>>;
}

/// Leaves the ranking untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(&self, _query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        Ok(results)
    }
}

/// Blends vector similarity with lexical overlap.
///
/// The new score is `(1 - weight) * score + weight * overlap`, where
/// `overlap` is the fraction of distinct query terms found in the chunk.
/// Ties keep their incoming order.
#[derive(Debug, Clone, Copy)]
pub struct KeywordReranker {
    weight: f32,
}

impl KeywordReranker {
    /// `weight` is clamped to `0.0..=1.0`.
    pub fn new(weight: f32) -> Self {
        Self { weight: weight.clamp(0.0, 1.0) }
    }
}

impl Default for KeywordReranker {
    fn default() -> Self {
        Self::new(0.3)
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl Reranker for KeywordReranker {
    async fn rerank(
        &self,
        query: &str,
        mut results: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(results);
        }

        for result in &mut results {
            let chunk_terms = terms(&result.chunk.text);
            let shared = query_terms.intersection(&chunk_terms).count();
            let overlap = shared as f32 / query_terms.len() as f32;
            result.score = (1.0 - self.weight) * result.score + self.weight * overlap;
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chunk, Metadata};

    fn result(id: &str, text: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: id.into(),
                text: text.into(),
                metadata: Metadata::new(),
                document_id: "doc".into(),
            },
            score,
        }
    }

    #[tokio::test]
    async fn keyword_overlap_promotes_exact_terms() {
        let results = vec![
            result("a", "planning with memory", 0.60),
            result("b", "Task decomposition splits work", 0.55),
        ];
        let reranked =
            KeywordReranker::new(0.5).rerank("task decomposition", results).await.unwrap();
        assert_eq!(reranked[0].chunk.id, "b");
        assert!((reranked[0].score - 0.775).abs() < 1e-6);
        assert!((reranked[1].score - 0.30).abs() < 1e-6);
    }

    #[tokio::test]
    async fn zero_weight_keeps_scores() {
        let results = vec![result("a", "x", 0.9), result("b", "y", 0.1)];
        let reranked = KeywordReranker::new(0.0).rerank("x", results.clone()).await.unwrap();
        assert_eq!(reranked, results);
        assert_eq!(NoOpReranker.rerank("x", results.clone()).await.unwrap(), results);
    }
}
