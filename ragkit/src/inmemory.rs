//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a dependency-free vector store
//! backed by a `Vec` protected by a `tokio::sync::RwLock`. Search is exact
//! brute force, which is suitable for development, testing, and corpora of a
//! few tens of thousands of chunks.

use std::cmp::Ordering;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::document::{IndexEntry, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "InMemory";

/// An in-memory vector store using cosine similarity for search.
///
/// Entries are kept in insertion order; storing the same chunk twice keeps
/// both copies. Results with equal scores are returned in insertion order.
/// The dimension of the first stored embedding is enforced for later
/// upserts and queries until the store is cleared.
///
/// # Example
///
/// ```rust
/// use ragkit::{InMemoryVectorStore, VectorStore};
///
/// # async fn run() -> ragkit::Result<()> {
/// let store = InMemoryVectorStore::new();
/// assert_eq!(store.len().await?, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<IndexEntry>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn dimension_error(expected: usize, actual: usize) -> RagError {
    error!(expected, actual, "embedding dimension mismatch");
    RagError::VectorStoreError {
        backend: BACKEND.to_string(),
        message: format!("expected embedding dimension {expected}, got {actual}"),
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, new_entries: Vec<IndexEntry>) -> Result<()> {
        let mut entries = self.entries.write().await;

        let expected = entries
            .first()
            .or_else(|| new_entries.first())
            .map(|e| e.embedding.len())
            .unwrap_or_default();
        if let Some(bad) = new_entries.iter().find(|e| e.embedding.len() != expected) {
            return Err(dimension_error(expected, bad.embedding.len()));
        }

        debug!(
            added = new_entries.len(),
            total = entries.len() + new_entries.len(),
            "upserted entries"
        );
        entries.extend(new_entries);
        Ok(())
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let entries = self.entries.read().await;
        let Some(first) = entries.first() else {
            return Err(RagError::EmptyIndex);
        };
        if first.embedding.len() != embedding.len() {
            return Err(dimension_error(first.embedding.len(), embedding.len()));
        }

        let mut scored: Vec<SearchResult> = entries
            .iter()
            .map(|entry| SearchResult {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(&entry.embedding, embedding),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().await;
        debug!(removed = entries.len(), "cleared in-memory store");
        entries.clear();
        entries.shrink_to_fit();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}
