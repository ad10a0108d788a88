//! # ragkit
//!
//! Retrieval-augmented generation: split documents into overlapping chunks,
//! embed and index them, retrieve the chunks most similar to a question, and
//! have a language model answer from them.
//!
//! ## Overview
//!
//! - [`Chunker`] - [`RecursiveChunker`] and [`FixedSizeChunker`]
//! - [`EmbeddingProvider`] - [`HashingEmbeddingProvider`], plus
//!   `OpenAIEmbeddingProvider` with the `openai` feature
//! - [`VectorStore`] - [`InMemoryVectorStore`] (exact cosine search)
//! - [`Indexer`] and [`Retriever`] - the write and read sides of the index
//! - [`PromptTemplate`] and [`PromptAssembler`] - template slots filled with
//!   retrieved context
//! - [`Generator`] - atomic or streaming calls to a
//!   [`LanguageModel`](ragkit_model::LanguageModel)
//! - [`RagPipeline`] - the orchestrator tying it together
//! - [`DocumentSource`] - [`StaticSource`], [`TextFileSource`], and
//!   `HttpSource` with the `http` feature
//!
//! ## Features
//!
//! | feature  | enables                                             |
//! |----------|-----------------------------------------------------|
//! | `openai` | `OpenAIEmbeddingProvider` and the OpenAI chat model |
//! | `http`   | `HttpSource`                                        |
//! | `full`   | everything                                          |

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod indexer;
pub mod inmemory;
pub mod loader;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod reranker;
pub mod retriever;
pub mod vectorstore;

pub use chunking::{Chunker, FixedSizeChunker, LengthUnit, RecursiveChunker, SeparatorPlacement};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, Embedding, IndexEntry, Metadata, RetrievalResult, SearchResult};
pub use embedding::{EmbeddingProvider, HashingEmbeddingProvider};
pub use error::{PipelineStage, RagError, Result};
pub use generator::Generator;
pub use indexer::Indexer;
pub use inmemory::InMemoryVectorStore;
#[cfg(feature = "http")]
pub use loader::HttpSource;
pub use loader::{DocumentSource, StaticSource, TextFileSource};
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
pub use pipeline::{Answer, AnswerStream, IndexReport, RagPipeline, RagPipelineBuilder};
pub use prompt::{PromptAssembler, PromptTemplate, PromptValues, StringPromptTemplate};
pub use reranker::{KeywordReranker, NoOpReranker, Reranker};
pub use retriever::Retriever;
pub use vectorstore::VectorStore;
