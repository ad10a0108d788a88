//! Error types for the `ragkit` crate.

use std::fmt;

use ragkit_model::ModelError;
use thiserror::Error;

/// The pipeline stage an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Load,
    Embed,
    Index,
    Retrieve,
    Assemble,
    Generate,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Load => "load",
            PipelineStage::Embed => "embed",
            PipelineStage::Index => "index",
            PipelineStage::Retrieve => "retrieve",
            PipelineStage::Assemble => "assemble",
            PipelineStage::Generate => "generate",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A document source could not be read or parsed.
    #[error("Load error ({origin}): {message}")]
    LoadError {
        /// The path, URL, or source name that failed.
        origin: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector store holds no entries.
    #[error("Vector index is empty")]
    EmptyIndex,

    /// The assembled prompt exceeds the model's input limit.
    #[error("Context too large: prompt is {size} characters, limit is {limit}")]
    ContextTooLarge {
        /// Prompt size in characters.
        size: usize,
        /// The enforced limit in characters.
        limit: usize,
    },

    /// The language model failed; the provider error is kept verbatim.
    #[error("Generation error: {0}")]
    GenerationError(#[from] ModelError),

    /// A prompt template could not be parsed or filled.
    #[error("Template error: {0}")]
    TemplateError(String),

    /// An error occurred during result reranking.
    #[error("Reranker error ({reranker}): {message}")]
    RerankerError {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A failure inside the pipeline, tagged with the stage it came from.
    #[error("Pipeline {stage} stage failed: {source}")]
    PipelineError {
        /// The stage that failed.
        stage: PipelineStage,
        /// The underlying error.
        source: Box<RagError>,
    },
}

impl RagError {
    /// Wrap `self` with the stage it occurred in.
    pub fn at_stage(self, stage: PipelineStage) -> Self {
        RagError::PipelineError { stage, source: Box::new(self) }
    }

    /// The failing stage, if this error came out of the pipeline.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            RagError::PipelineError { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error, looking through stage wrappers.
    pub fn root(&self) -> &RagError {
        match self {
            RagError::PipelineError { source, .. } => source.root(),
            other => other,
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
