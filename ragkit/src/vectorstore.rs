//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;

use crate::document::{IndexEntry, SearchResult};
use crate::error::Result;

/// A storage backend for vector embeddings with similarity search.
///
/// # Example
///
/// ```rust,ignore
/// use ragkit::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.upsert(entries).await?;
/// let results = store.search(&query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store entries. All entries of one call become visible together.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Search for the `top_k` most similar entries to the given embedding.
    ///
    /// Returns results ordered by descending similarity score. Backends may
    /// return [`RagError::EmptyIndex`](crate::RagError::EmptyIndex) when
    /// nothing has been stored.
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// Remove every stored entry.
    async fn clear(&self) -> Result<()>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
