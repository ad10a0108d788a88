//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;
use tracing::debug;

use crate::document::Embedding;
use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (OpenAI, local hashing,
/// etc.) behind a unified async interface. The same provider must be used for
/// indexing and for querying, otherwise similarity scores are meaningless.
///
/// The default [`embed_many`](EmbeddingProvider::embed_many) implementation
/// calls [`embed`](EmbeddingProvider::embed) sequentially; backends that
/// support native batching should override it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generate embedding vectors for a batch of text inputs, one per input,
    /// in input order.
    async fn embed_many(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// A deterministic, offline embedding provider based on feature hashing.
///
/// Text is lowercased and split into alphanumeric tokens; each token is hashed
/// (FNV-1a) into one of `dimensions` buckets with a hash-derived sign, and the
/// resulting bag-of-words vector is L2-normalized. Texts that share words get
/// positive cosine similarity, which is enough for tests, demos and small
/// keyword-heavy corpora.
///
/// # Example
///
/// ```rust
/// use ragkit::{EmbeddingProvider, HashingEmbeddingProvider};
///
/// # async fn run() -> ragkit::Result<()> {
/// let provider = HashingEmbeddingProvider::new(256);
/// let embedding = provider.embed("task decomposition").await?;
/// assert_eq!(embedding.len(), 256);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider producing vectors of `dimensions` components.
    ///
    /// A zero dimension is bumped to one.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn vectorize(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.vectorize(text))
    }

    async fn embed_many(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        debug!(count = texts.len(), dimensions = self.dimensions, "hashing embeddings");
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}

/// Check that `embeddings` has one vector of the expected dimension per input.
pub(crate) fn check_batch(
    provider: &str,
    embeddings: &[Embedding],
    expected_count: usize,
    dimensions: usize,
) -> Result<()> {
    if embeddings.len() != expected_count {
        return Err(RagError::EmbeddingError {
            provider: provider.to_string(),
            message: format!("expected {expected_count} embeddings, got {}", embeddings.len()),
        });
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
        return Err(RagError::EmbeddingError {
            provider: provider.to_string(),
            message: format!("expected dimension {dimensions}, got {}", bad.len()),
        });
    }
    Ok(())
}
