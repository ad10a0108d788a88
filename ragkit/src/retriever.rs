//! Query-time retrieval: embed the question, search, rerank, filter.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::reranker::Reranker;
use crate::vectorstore::VectorStore;

const DEFAULT_TOP_K: usize = 6;

/// Returns the chunks most similar to a query.
///
/// The embedder must be the one used to index the store. Results are ranked
/// by non-increasing score; when the store holds fewer than `k` entries the
/// result is shorter, and an empty store yields an empty result rather than
/// an error.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use ragkit::{HashingEmbeddingProvider, InMemoryVectorStore, Retriever};
///
/// # async fn run() -> ragkit::Result<()> {
/// let retriever = Retriever::new(
///     Arc::new(HashingEmbeddingProvider::new(128)),
///     Arc::new(InMemoryVectorStore::new()),
/// )
/// .with_top_k(4);
/// assert!(retriever.retrieve("anything").await?.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
    similarity_threshold: Option<f32>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("top_k", &self.top_k)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("reranker", &self.reranker.is_some())
            .finish_non_exhaustive()
    }
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store, top_k: DEFAULT_TOP_K, similarity_threshold: None, reranker: None }
    }

    /// Set the default number of results.
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// Drop results scoring below `threshold`.
    pub fn with_similarity_threshold(mut self, threshold: Option<f32>) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve the configured number of chunks for `query`.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        self.retrieve_k(query, self.top_k).await
    }

    /// Retrieve up to `k` chunks for `query`.
    ///
    /// `k == 0` returns an empty result without embedding the query.
    ///
    /// # Errors
    ///
    /// Propagates embedding, search and reranking failures unchanged.
    pub async fn retrieve_k(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            debug!("retrieval with k = 0");
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during retrieval");
            e
        })?;

        let results = match self.store.search(&embedding, k).await {
            Ok(results) => results,
            Err(RagError::EmptyIndex) => {
                debug!("retrieval against an empty index");
                return Ok(Vec::new());
            }
            Err(e) => {
                error!(error = %e, "vector store search failed");
                return Err(e);
            }
        };

        let results = if let Some(reranker) = &self.reranker {
            reranker.rerank(query, results).await.map_err(|e| {
                error!(error = %e, "reranking failed");
                e
            })?
        } else {
            results
        };

        let filtered: RetrievalResult = match self.similarity_threshold {
            Some(threshold) => results.into_iter().filter(|r| r.score >= threshold).collect(),
            None => results,
        };

        info!(k, result_count = filtered.len(), "retrieval completed");
        Ok(filtered)
    }
}
