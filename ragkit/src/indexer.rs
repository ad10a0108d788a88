//! Embeds chunks and stores them in a [`VectorStore`].

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::document::{Chunk, Embedding, IndexEntry};
use crate::embedding::{EmbeddingProvider, check_batch};
use crate::error::Result;
use crate::vectorstore::VectorStore;

const DEFAULT_BATCH_SIZE: usize = 64;

/// Turns chunks into [`IndexEntry`]s and writes them to a vector store.
///
/// Embeddings are requested in batches of `batch_size` texts. All entries
/// of one [`index`](Indexer::index) call are written with a single
/// [`VectorStore::upsert`], so a failed embedding stores nothing.
#[derive(Clone)]
pub struct Indexer {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("dimensions", &self.embedder.dimensions())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Indexer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store, batch_size: DEFAULT_BATCH_SIZE }
    }

    /// Set the number of texts per embedding request. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Embed `chunks` and store them. Returns the number of entries added.
    ///
    /// Indexing the same chunks twice stores them twice.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`](crate::RagError::EmbeddingError)
    /// if the provider fails or returns the wrong number or shape of vectors,
    /// and the store's error if the upsert fails.
    pub async fn index(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let embeddings = self.embed_chunks(chunks).await?;
        let entries: Vec<IndexEntry> = chunks
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();
        let count = entries.len();

        self.store.upsert(entries).await.map_err(|e| {
            error!(error = %e, "upsert failed during indexing");
            e
        })?;

        info!(chunk_count = count, "indexed chunks");
        Ok(count)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Embedding>> {
        let dimensions = self.embedder.dimensions();
        let mut embeddings = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = self.embedder.embed_many(&texts).await.map_err(|e| {
                error!(batch_len = texts.len(), error = %e, "embedding failed during indexing");
                e
            })?;
            check_batch("embedder", &vectors, texts.len(), dimensions)?;
            debug!(batch_len = texts.len(), "embedded batch");
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    /// Remove every entry from the underlying store.
    pub async fn delete_all(&self) -> Result<()> {
        self.store.clear().await.map_err(|e| {
            error!(error = %e, "failed to clear vector store");
            e
        })?;
        info!("deleted all index entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::document::Metadata;
    use crate::error::RagError;
    use crate::embedding::HashingEmbeddingProvider;
    use crate::inmemory::InMemoryVectorStore;

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                id: format!("doc_{i}"),
                text: format!("chunk number {i}"),
                metadata: Metadata::new(),
                document_id: "doc".to_string(),
            })
            .collect()
    }

    /// Counts batch calls and fails on the configured call.
    struct CountingEmbedder {
        inner: HashingEmbeddingProvider,
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Embedding> {
            self.inner.embed(text).await
        }

        async fn embed_many(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_call == Some(call) {
                return Err(RagError::EmbeddingError {
                    provider: "counting".into(),
                    message: "quota exceeded".into(),
                });
            }
            self.inner.embed_many(texts).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }
    }

    fn counting(fail_on_call: Option<usize>) -> Arc<CountingEmbedder> {
        Arc::new(CountingEmbedder {
            inner: HashingEmbeddingProvider::new(32),
            calls: AtomicUsize::new(0),
            fail_on_call,
        })
    }

    #[tokio::test]
    async fn indexes_in_batches_with_one_upsert() {
        let embedder = counting(None);
        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = Indexer::new(embedder.clone(), store.clone()).with_batch_size(4);

        assert_eq!(indexer.index(&chunks(10)).await.unwrap(), 10);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.len().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn failed_batch_stores_nothing() {
        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = Indexer::new(counting(Some(1)), store.clone()).with_batch_size(2);

        let err = indexer.index(&chunks(5)).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingError { .. }));
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicates_are_kept_and_delete_all_clears() {
        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = Indexer::new(Arc::new(HashingEmbeddingProvider::new(16)), store.clone());

        indexer.index(&chunks(3)).await.unwrap();
        indexer.index(&chunks(3)).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 6);

        indexer.delete_all().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
        assert_eq!(indexer.index(&[]).await.unwrap(), 0);
    }
}
