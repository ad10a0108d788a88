//! Data types for documents, chunks, index entries, and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A vector embedding. Its length is fixed per [`EmbeddingProvider`](crate::EmbeddingProvider).
pub type Embedding = Vec<f32>;

/// Free-form metadata carried by documents and chunks.
pub type Metadata = HashMap<String, Value>;

/// Metadata key holding a chunk's position within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Metadata key holding a chunk's character offset within its document.
pub const START_INDEX_KEY: &str = "start_index";

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: Metadata,
    /// Optional URI pointing to the original source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: Metadata::new(), source_uri: None }
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A segment of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk, `{document_id}_{chunk_index}`.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// Metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: Metadata,
    /// The ID of the parent [`Document`].
    pub document_id: String,
}

impl Chunk {
    /// Position of this chunk within its document, if recorded.
    pub fn chunk_index(&self) -> Option<usize> {
        self.metadata.get(CHUNK_INDEX_KEY).and_then(Value::as_u64).map(|i| i as usize)
    }

    /// Character offset of this chunk's first character in the document, if recorded.
    pub fn start_index(&self) -> Option<usize> {
        self.metadata.get(START_INDEX_KEY).and_then(Value::as_u64).map(|i| i as usize)
    }
}

/// A [`Chunk`] together with its embedding, as held by a vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Embedding,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Search results ranked by non-increasing score.
pub type RetrievalResult = Vec<SearchResult>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_deserializes_without_optional_fields() {
        let doc: Document = serde_json::from_str(r#"{"id":"d1","text":"hello"}"#).unwrap();
        assert_eq!(doc, Document::new("d1", "hello"));
    }

    #[test]
    fn chunk_reads_positional_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert(CHUNK_INDEX_KEY.to_string(), 3.into());
        metadata.insert(START_INDEX_KEY.to_string(), 120.into());
        let chunk = Chunk {
            id: "d1_3".into(),
            text: "text".into(),
            metadata,
            document_id: "d1".into(),
        };
        assert_eq!(chunk.chunk_index(), Some(3));
        assert_eq!(chunk.start_index(), Some(120));
    }
}
