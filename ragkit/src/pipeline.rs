//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] composes the offline phase (load → chunk → embed →
//! index) and the per-question phase (retrieve → assemble → generate).
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ragkit::{Document, HashingEmbeddingProvider, RagConfig, RagPipeline, StringPromptTemplate};
//! use ragkit_model::MockLlm;
//!
//! # async fn run() -> ragkit::Result<()> {
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::builder().chunk_size(200).chunk_overlap(20).top_k(2).build()?)
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::new(256)))
//!     .template(Arc::new(StringPromptTemplate::parse("{context}\n\nQuestion: {question}")?))
//!     .language_model(Arc::new(MockLlm::new("mock")))
//!     .build()?;
//!
//! pipeline.index_documents(&[Document::new("notes", "Agents plan by splitting tasks.")]).await?;
//! let answer = pipeline.answer_with_sources("How do agents plan?").await?;
//! assert_eq!(answer.sources.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::{Stream, StreamExt};
use ragkit_model::{GenerationConfig, LanguageModel};
use ragkit_telemetry::{TraceCollector, TraceRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, Document, RetrievalResult, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{PipelineStage, RagError, Result};
use crate::generator::{Generator, TracedStream};
use crate::indexer::Indexer;
use crate::inmemory::InMemoryVectorStore;
use crate::loader::DocumentSource;
use crate::prompt::{PromptAssembler, PromptTemplate};
use crate::reranker::Reranker;
use crate::retriever::Retriever;
use crate::vectorstore::VectorStore;

/// A generated answer together with the chunks it was grounded in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: RetrievalResult,
}

/// Counts from the offline phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub documents: usize,
    pub chunks: usize,
}

/// Embedding failures are reported as the `embed` stage wherever they occur.
fn tag(error: RagError, stage: PipelineStage) -> RagError {
    let stage = match &error {
        RagError::EmbeddingError { .. } => PipelineStage::Embed,
        _ => stage,
    };
    error.at_stage(stage)
}

/// The RAG pipeline orchestrator.
///
/// Stateless between calls apart from the shared vector store. Construct one
/// via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    chunker: Arc<dyn Chunker>,
    indexer: Indexer,
    retriever: Retriever,
    assembler: PromptAssembler,
    generator: Generator,
    collector: Option<Arc<dyn TraceCollector>>,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("config", &self.config)
            .field("retriever", &self.retriever)
            .field("assembler", &self.assembler)
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        self.indexer.store()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn assembler(&self) -> &PromptAssembler {
        &self.assembler
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    fn emit(&self, record: TraceRecord) {
        if let Some(collector) = &self.collector {
            collector.record(record);
        }
    }

    /// Chunk a single document and index its chunks.
    ///
    /// Returns the chunks that were stored.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] tagged `embed` or `index`.
    pub async fn ingest(&self, document: &Document) -> Result<Vec<Chunk>> {
        let chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            info!(document.id = %document.id, chunk_count = 0, "ingested document (empty)");
            return Ok(chunks);
        }

        self.indexer.index(&chunks).await.map_err(|e| {
            error!(document.id = %document.id, error = %e, "indexing failed during ingestion");
            tag(e, PipelineStage::Index)
        })?;

        info!(document.id = %document.id, chunk_count = chunks.len(), "ingested document");
        Ok(chunks)
    }

    /// Chunk every document and index all chunks in one bulk operation.
    ///
    /// Either all chunks are stored or, on error, none are.
    pub async fn index_documents(&self, documents: &[Document]) -> Result<IndexReport> {
        let span = info_span!("rag.index", documents = documents.len());
        async {
            let started = Instant::now();
            let chunks: Vec<Chunk> =
                documents.iter().flat_map(|d| self.chunker.chunk(d)).collect();
            debug!(
                chunk_count = chunks.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "chunked documents"
            );

            let stored = self.indexer.index(&chunks).await.map_err(|e| {
                error!(error = %e, "bulk indexing failed");
                tag(e, PipelineStage::Index)
            })?;

            let report = IndexReport { documents: documents.len(), chunks: stored };
            info!(documents = report.documents, chunks = report.chunks, "indexed documents");
            Ok::<_, RagError>(report)
        }
        .instrument(span)
        .await
    }

    /// Load documents from `source`, then index them.
    pub async fn load_and_index(&self, source: &dyn DocumentSource) -> Result<IndexReport> {
        let documents = source.load().await.map_err(|e| {
            error!(source = source.name(), error = %e, "failed to load documents");
            e.at_stage(PipelineStage::Load)
        })?;
        self.index_documents(&documents).await
    }

    /// Retrieve the configured top-K chunks for `question`.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievalResult> {
        self.retriever.retrieve(question).await.map_err(|e| tag(e, PipelineStage::Retrieve))
    }

    /// Answer `question`, discarding the sources.
    pub async fn answer(&self, question: &str) -> Result<String> {
        Ok(self.answer_with_sources(question).await?.text)
    }

    /// Answer `question`: retrieve → assemble → generate.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] identifying the failing stage.
    /// Model failures keep the provider's [`ModelError`](ragkit_model::ModelError)
    /// as their root cause.
    pub async fn answer_with_sources(&self, question: &str) -> Result<Answer> {
        let mut record = TraceRecord::new("rag.answer", json!({ "question": question }));
        let span =
            info_span!("rag.answer", run.id = %record.run_id, top_k = self.retriever.top_k());
        let started = Instant::now();

        let result = async {
            let sources =
                self.timed(&mut record, PipelineStage::Retrieve, self.retrieve(question)).await?;
            let prompt = self.timed_sync(&mut record, PipelineStage::Assemble, || {
                self.assembler.assemble(&sources, question)
            })?;
            let text = self
                .timed(&mut record, PipelineStage::Generate, async {
                    let generated = self.generator.generate(&prompt).await;
                    generated.map_err(|e| e.at_stage(PipelineStage::Generate))
                })
                .await?;
            Ok::<_, RagError>(Answer { text, sources })
        }
        .instrument(span)
        .await;

        record.set_latency(started.elapsed());
        match &result {
            Ok(answer) => {
                let source_ids: Vec<&str> =
                    answer.sources.iter().map(|s| s.chunk.id.as_str()).collect();
                record.outputs = Some(json!({ "answer": answer.text, "sources": source_ids }));
                info!(run.id = %record.run_id, sources = answer.sources.len(), "answered question");
            }
            Err(e) => {
                error!(run.id = %record.run_id, error = %e, "answer failed");
                record.error = Some(e.to_string());
            }
        }
        self.emit(record);
        result
    }

    /// Answer `question` incrementally.
    ///
    /// Retrieval and prompt assembly complete before this returns, so the
    /// sources are available immediately; the answer text arrives through
    /// the stream. Dropping the stream cancels generation.
    pub async fn answer_stream(&self, question: &str) -> Result<AnswerStream> {
        let mut record = TraceRecord::new("rag.answer_stream", json!({ "question": question }));
        let run_id = record.run_id;
        let span =
            info_span!("rag.answer_stream", run.id = %run_id, top_k = self.retriever.top_k());
        let started = Instant::now();

        let prepared = async {
            let sources =
                self.timed(&mut record, PipelineStage::Retrieve, self.retrieve(question)).await?;
            let prompt = self.timed_sync(&mut record, PipelineStage::Assemble, || {
                self.assembler.assemble(&sources, question)
            })?;
            let stream = self
                .generator
                .generate_stream(&prompt)
                .await
                .map_err(|e| e.at_stage(PipelineStage::Generate))?;
            Ok::<_, RagError>((sources, stream))
        }
        .instrument(span)
        .await;

        match prepared {
            Ok((sources, stream)) => {
                let inner = TracedStream::new(stream, record, self.collector.clone(), started)
                    .with_stage(PipelineStage::Generate.as_str());
                debug!(run.id = %run_id, sources = sources.len(), "answer stream opened");
                Ok(AnswerStream { run_id, sources, inner })
            }
            Err(e) => {
                error!(run.id = %run_id, error = %e, "answer stream failed to start");
                record.set_latency(started.elapsed());
                record.error = Some(e.to_string());
                self.emit(record);
                Err(e)
            }
        }
    }

    /// Remove every indexed entry.
    pub async fn clear(&self) -> Result<()> {
        self.indexer.delete_all().await.map_err(|e| e.at_stage(PipelineStage::Index))
    }

    async fn timed<T>(
        &self,
        record: &mut TraceRecord,
        stage: PipelineStage,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = fut.await;
        record.push_stage(stage.as_str(), started.elapsed());
        result
    }

    fn timed_sync<T>(
        &self,
        record: &mut TraceRecord,
        stage: PipelineStage,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = f().map_err(|e| e.at_stage(stage));
        record.push_stage(stage.as_str(), started.elapsed());
        result
    }
}

/// An answer arriving as text fragments, with its sources known up front.
///
/// Yields `Err` at most once, tagged with the `generate` stage, and ends
/// afterwards. Dropping the stream before the end cancels the model request
/// and records the run as cancelled.
pub struct AnswerStream {
    run_id: Uuid,
    sources: RetrievalResult,
    inner: TracedStream,
}

impl std::fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerStream")
            .field("run_id", &self.run_id)
            .field("sources", &self.sources.len())
            .finish_non_exhaustive()
    }
}

impl AnswerStream {
    /// The chunks the answer is grounded in.
    pub fn sources(&self) -> &[SearchResult] {
        &self.sources
    }

    /// ID of the `rag.answer_stream` trace record for this run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Drain the stream into a complete [`Answer`].
    pub async fn collect_answer(mut self) -> Result<Answer> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(Answer { text, sources: std::mem::take(&mut self.sources) })
    }
}

impl Stream for AnswerStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_next(cx).map(|item| {
            item.map(|fragment| {
                fragment.map_err(|e| RagError::from(e).at_stage(PipelineStage::Generate))
            })
        })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `embedding_provider`, `template` and `language_model` are required. The
/// vector store defaults to an [`InMemoryVectorStore`], the chunker to a
/// [`RecursiveChunker`] built from the config, and the config to
/// [`RagConfig::default()`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))          // optional
///     .chunker(Arc::new(chunker))             // optional
///     .template(Arc::new(template))
///     .language_model(Arc::new(model))
///     .generation_config(GenerationConfig::new().with_temperature(0.0))
///     .reranker(Arc::new(reranker))           // optional
///     .trace_collector(Arc::new(collector))   // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    template: Option<Arc<dyn PromptTemplate>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    generation_config: Option<GenerationConfig>,
    reranker: Option<Arc<dyn Reranker>>,
    trace_collector: Option<Arc<dyn TraceCollector>>,
    context_slot: Option<(String, String)>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for both indexing and querying.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the prompt template.
    pub fn template(mut self, template: Arc<dyn PromptTemplate>) -> Self {
        self.template = Some(template);
        self
    }

    /// Use slots other than `context` and `question`.
    pub fn slots(mut self, context: impl Into<String>, question: impl Into<String>) -> Self {
        self.context_slot = Some((context.into(), question.into()));
        self
    }

    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    pub fn generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    /// Set an optional reranker for post-search result reordering.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Receive a [`TraceRecord`] for every answer and generation.
    pub fn trace_collector(mut self, collector: Arc<dyn TraceCollector>) -> Self {
        self.trace_collector = Some(collector);
        self
    }

    /// Build the [`RagPipeline`], validating the config and required fields.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or the
    /// configuration or generation settings are invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let template =
            self.template.ok_or_else(|| RagError::ConfigError("template is required".to_string()))?;
        let language_model = self
            .language_model
            .ok_or_else(|| RagError::ConfigError("language_model is required".to_string()))?;

        let generation_config = self.generation_config.unwrap_or_default();
        generation_config.validate().map_err(|e| RagError::ConfigError(e.to_string()))?;

        let vector_store: Arc<dyn VectorStore> =
            self.vector_store.unwrap_or_else(|| Arc::new(InMemoryVectorStore::new()));
        let chunker: Arc<dyn Chunker> =
            self.chunker.unwrap_or_else(|| Arc::new(RecursiveChunker::from_config(&config)));

        let indexer = Indexer::new(embedding_provider.clone(), vector_store.clone())
            .with_batch_size(config.embedding_batch_size);

        let mut retriever = Retriever::new(embedding_provider, vector_store)
            .with_top_k(config.top_k)
            .with_similarity_threshold(config.similarity_threshold);
        if let Some(reranker) = self.reranker {
            retriever = retriever.with_reranker(reranker);
        }

        let prompt_limit = match (config.max_prompt_chars, language_model.max_input_chars()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let mut assembler = PromptAssembler::new(template).with_max_chars(prompt_limit);
        if let Some((context, question)) = self.context_slot {
            assembler = assembler.with_slots(context, question);
        }

        let mut generator = Generator::new(language_model).with_config(generation_config);
        if let Some(collector) = &self.trace_collector {
            generator = generator.with_trace_collector(collector.clone());
        }

        Ok(RagPipeline {
            config,
            chunker,
            indexer,
            retriever,
            assembler,
            generator,
            collector: self.trace_collector,
        })
    }
}
