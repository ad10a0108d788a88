//! Pipeline settings: chunking, retrieval and prompt limits.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Tunables shared by the chunker, indexer, retriever and assembler.
///
/// Deserializing fills missing fields with their defaults; call
/// [`validate`](Self::validate) afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Characters two neighbouring chunks may share.
    pub chunk_overlap: usize,
    /// Chunks retrieved per question (K).
    pub top_k: usize,
    /// Drop retrieved chunks scoring below this, after reranking.
    pub similarity_threshold: Option<f32>,
    /// Record each chunk's character offset in its metadata.
    pub add_start_index: bool,
    /// Upper bound on the assembled prompt, in characters.
    pub max_prompt_chars: Option<usize>,
    /// Number of chunk texts sent to the embedding provider per call.
    pub embedding_batch_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 6,
            similarity_threshold: None,
            add_start_index: true,
            max_prompt_chars: None,
            embedding_batch_size: 64,
        }
    }
}

impl RagConfig {
    /// Start from the defaults.
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embedding_batch_size == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builds a [`RagConfig`], validating on [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Only keep chunks scoring at least `threshold`.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    pub fn add_start_index(mut self, enabled: bool) -> Self {
        self.config.add_start_index = enabled;
        self
    }

    /// Reject prompts longer than `limit` characters.
    pub fn max_prompt_chars(mut self, limit: usize) -> Self {
        self.config.max_prompt_chars = Some(limit);
        self
    }

    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
